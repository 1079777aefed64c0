//! The channel layer: the pub/sub substrate behind rooms and broadcasts.
//!
//! Sessions subscribe a private channel; namespace sockets register that
//! channel in groups keyed by `(namespace, room)`. Broadcasting publishes an
//! already-encoded packet to a set of groups and the layer delivers it once
//! to every member channel. Only group membership and message fan-out live
//! here; session state never crosses the layer.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use engineio_core::Sid;

/// A room name within a namespace.
pub type Room = String;

/// A subscriber channel name. Every session owns exactly one.
pub type Channel = String;

/// The private channel of an Engine.IO session.
pub fn session_channel(sid: Sid) -> Channel {
    format!("session.{sid}")
}

/// A broadcast group key. `room: None` is the well-known whole-namespace
/// group every connected socket joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group {
    pub ns: String,
    pub room: Option<Room>,
}

impl Group {
    pub fn ns_wide(ns: &str) -> Self {
        Self {
            ns: ns.to_string(),
            room: None,
        }
    }

    pub fn room(ns: &str, room: Room) -> Self {
        Self {
            ns: ns.to_string(),
            room: Some(room),
        }
    }
}

/// An encoded Socket.IO packet ready for an Engine.IO queue: the textual
/// frame plus its binary attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub msg: String,
    pub bin: Vec<Vec<u8>>,
}

/// Delivery callback registered per subscriber channel.
pub type Inbox = Box<dyn Fn(ChannelMessage) + Send + Sync + 'static>;

/// The pub/sub interface. A cross-process implementation (e.g. over redis)
/// plugs in here; [`LocalChannelLayer`] covers single-process deployments and
/// tests. Delivery is at-least-once, in publish order per subscriber.
pub trait ChannelLayer: Send + Sync + 'static {
    /// Registers the receive side of a channel, replacing any previous inbox.
    fn subscribe(&self, channel: Channel, inbox: Inbox);

    fn unsubscribe(&self, channel: &str);

    fn group_add(&self, group: Group, channel: Channel);

    fn group_discard(&self, group: &Group, channel: &str);

    fn group_channels(&self, group: &Group) -> Vec<Channel>;

    /// Delivers `msg` exactly once to every channel in the union of `groups`,
    /// skipping the channels in `except`.
    fn group_send(&self, groups: &[Group], msg: ChannelMessage, except: &HashSet<Channel>);

    /// Publishes `msg` to a single subscriber channel.
    fn send(&self, channel: &str, msg: ChannelMessage);
}

/// In-memory, single-process channel layer.
#[derive(Default)]
pub struct LocalChannelLayer {
    subscribers: RwLock<HashMap<Channel, Inbox>>,
    groups: RwLock<HashMap<Group, HashSet<Channel>>>,
}

impl LocalChannelLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelLayer for LocalChannelLayer {
    fn subscribe(&self, channel: Channel, inbox: Inbox) {
        self.subscribers.write().unwrap().insert(channel, inbox);
    }

    fn unsubscribe(&self, channel: &str) {
        self.subscribers.write().unwrap().remove(channel);
    }

    fn group_add(&self, group: Group, channel: Channel) {
        self.groups
            .write()
            .unwrap()
            .entry(group)
            .or_default()
            .insert(channel);
    }

    fn group_discard(&self, group: &Group, channel: &str) {
        let mut groups = self.groups.write().unwrap();
        if let Some(channels) = groups.get_mut(group) {
            channels.remove(channel);
            if channels.is_empty() {
                groups.remove(group);
            }
        }
    }

    fn group_channels(&self, group: &Group) -> Vec<Channel> {
        self.groups
            .read()
            .unwrap()
            .get(group)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn group_send(&self, groups: &[Group], msg: ChannelMessage, except: &HashSet<Channel>) {
        let mut targets: HashSet<Channel> = HashSet::new();
        {
            let group_map = self.groups.read().unwrap();
            for group in groups {
                if let Some(channels) = group_map.get(group) {
                    targets.extend(channels.iter().cloned());
                }
            }
        }
        let subscribers = self.subscribers.read().unwrap();
        for channel in targets {
            if except.contains(&channel) {
                continue;
            }
            if let Some(inbox) = subscribers.get(&channel) {
                inbox(msg.clone());
            }
        }
    }

    fn send(&self, channel: &str, msg: ChannelMessage) {
        if let Some(inbox) = self.subscribers.read().unwrap().get(channel) {
            inbox(msg);
        }
    }
}

impl fmt::Debug for LocalChannelLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannelLayer")
            .field("subscribers", &self.subscribers.read().unwrap().len())
            .field("groups", &self.groups.read().unwrap().len())
            .finish()
    }
}

//! Chainable broadcast operators: pick rooms, attach binary payloads, emit.

use std::sync::Arc;

use itertools::Itertools;
use serde::Serialize;

use crate::channel::{Channel, ChannelLayer, Room};
use crate::errors::BroadcastError;
use crate::ns::Namespace;
use crate::packet::Packet;

/// Anything usable as a room selector: a room, a list of rooms, a `&str` or
/// an array of them.
pub trait RoomParam: 'static {
    type IntoIter: Iterator<Item = Room>;
    fn into_room_iter(self) -> Self::IntoIter;
}

impl RoomParam for Room {
    type IntoIter = std::iter::Once<Room>;
    fn into_room_iter(self) -> Self::IntoIter {
        std::iter::once(self)
    }
}

impl RoomParam for Vec<Room> {
    type IntoIter = std::vec::IntoIter<Room>;
    fn into_room_iter(self) -> Self::IntoIter {
        self.into_iter()
    }
}

impl RoomParam for &'static str {
    type IntoIter = std::iter::Once<Room>;
    fn into_room_iter(self) -> Self::IntoIter {
        std::iter::once(self.to_string())
    }
}

impl<const COUNT: usize> RoomParam for [&'static str; COUNT] {
    type IntoIter =
        std::iter::Map<std::array::IntoIter<&'static str, COUNT>, fn(&'static str) -> Room>;

    fn into_room_iter(self) -> Self::IntoIter {
        self.into_iter().map(|room| room.to_string())
    }
}

/// Target selection accumulated by the operators.
#[derive(Debug, Clone, Default)]
pub(crate) struct BroadcastOptions {
    /// Selected rooms; empty means the whole namespace.
    pub rooms: Vec<Room>,
    /// Rooms whose members are filtered out.
    pub except: Vec<Room>,
    /// Excludes the sending socket from delivery.
    pub skip_self: bool,
    /// The sender's channel, when the selection originates from a socket.
    pub sender: Option<Channel>,
}

/// Selects sockets to broadcast to and configures the emitted packet.
///
/// Obtained from a socket (`socket.to("room")…`) or from the namespace level
/// (`io.of("/")…`), then consumed by [`emit`](Operators::emit).
pub struct Operators<C: ChannelLayer> {
    ns: Arc<Namespace<C>>,
    opts: BroadcastOptions,
    binary: Vec<Vec<u8>>,
}

impl<C: ChannelLayer> Operators<C> {
    pub(crate) fn new(ns: Arc<Namespace<C>>, sender: Option<Channel>) -> Self {
        Self {
            ns,
            opts: BroadcastOptions {
                sender,
                ..Default::default()
            },
            binary: vec![],
        }
    }

    /// Selects all sockets in the given rooms, the current socket excluded.
    /// Use [`within`](Operators::within) to include it.
    pub fn to(mut self, rooms: impl RoomParam) -> Self {
        self.opts.rooms.extend(rooms.into_room_iter().unique());
        self.opts.skip_self = true;
        self
    }

    /// Selects all sockets in the given rooms, the current socket included.
    pub fn within(mut self, rooms: impl RoomParam) -> Self {
        self.opts.rooms.extend(rooms.into_room_iter().unique());
        self
    }

    /// Filters out every socket that joined one of the given rooms.
    pub fn except(mut self, rooms: impl RoomParam) -> Self {
        self.opts.except.extend(rooms.into_room_iter().unique());
        self
    }

    /// Selects the whole namespace, the current socket excluded.
    pub fn broadcast(mut self) -> Self {
        self.opts.skip_self = true;
        self
    }

    /// Attaches binary payloads; the emit becomes a BINARY_EVENT.
    pub fn bin(mut self, binary: Vec<Vec<u8>>) -> Self {
        self.binary = binary;
        self
    }

    /// Emits an event to every selected socket via the channel layer.
    pub fn emit(
        self,
        event: impl Into<String>,
        data: impl Serialize,
    ) -> Result<(), BroadcastError> {
        let data = serde_json::to_value(data)?;
        let packet = if self.binary.is_empty() {
            Packet::event(self.ns.path.clone(), event, data)
        } else {
            Packet::bin_event(self.ns.path.clone(), event, data, self.binary)
        };
        self.ns.broadcast(packet, self.opts)
    }
}

impl<C: ChannelLayer> std::fmt::Debug for Operators<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operators")
            .field("ns", &self.ns.path)
            .field("opts", &self.opts)
            .field("binary", &self.binary.len())
            .finish()
    }
}

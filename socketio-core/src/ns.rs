use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::FutureExt;
use futures::Future;
use serde_json::Value;
use tracing::debug;

use engineio_core::Sid;

use crate::channel::{Channel, ChannelLayer, ChannelMessage, Group};
use crate::client::SocketData;
use crate::config::SocketIoConfig;
use crate::errors::{BroadcastError, Error};
use crate::handler::{AckSender, ConnectHook, ConnectRefusal, DisconnectHook, EventHandler};
use crate::operators::BroadcastOptions;
use crate::packet::{Packet, PacketData};
use crate::socket::{DisconnectReason, Socket};

type EIoSocket = engineio_core::Socket<SocketData>;

/// A Socket.IO namespace: a handler table fixed at registration time plus the
/// sockets currently connected to it, keyed by their engine session id.
pub struct Namespace<C: ChannelLayer> {
    pub path: String,
    pub(crate) channel: Arc<C>,
    pub(crate) disconnect_hook: Option<DisconnectHook<C>>,
    connect_hook: Option<ConnectHook<C>>,
    handlers: HashMap<Cow<'static, str>, EventHandler<C>>,
    sockets: RwLock<HashMap<Sid, Arc<Socket<C>>>>,
}

impl<C: ChannelLayer> Namespace<C> {
    pub(crate) fn from_builder(
        path: String,
        builder: NamespaceBuilder<C>,
        channel: Arc<C>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path,
            channel,
            connect_hook: builder.connect_hook,
            disconnect_hook: builder.disconnect_hook,
            handlers: builder.handlers,
            sockets: RwLock::new(HashMap::new()),
        })
    }

    pub(crate) fn handler(&self, event: &str) -> Option<&EventHandler<C>> {
        self.handlers.get(event)
    }

    /// Runs the CONNECT handshake for one session: consults the connect hook,
    /// then either refuses with CONNECT_ERROR or replies with the freshly
    /// allocated namespace socket id and registers the socket.
    pub(crate) async fn connect(
        self: Arc<Self>,
        esocket: Arc<EIoSocket>,
        auth: Option<Value>,
        config: Arc<SocketIoConfig>,
    ) {
        let socket = Arc::new(Socket::new(self.clone(), esocket.clone(), config));
        self.handshake(&socket, &esocket, auth).await;
        // the handshake slot reserved by the dispatcher is free again; a
        // registered socket keeps further CONNECTs out on its own
        esocket.data.connecting.lock().unwrap().remove(&self.path);
    }

    async fn handshake(
        &self,
        socket: &Arc<Socket<C>>,
        esocket: &Arc<EIoSocket>,
        auth: Option<Value>,
    ) {
        if let Some(hook) = &self.connect_hook {
            if let Err(refusal) = hook(socket.clone(), auth).await {
                debug!(
                    "[nsid={}] connection to {} refused: {}",
                    socket.id, self.path, refusal.message
                );
                socket
                    .send(Packet::connect_error(&self.path, &refusal.message))
                    .ok();
                // drop any room membership the hook may have added
                socket.leave_all();
                return;
            }
        }
        if let Err(e) = socket.send(Packet::connect(&self.path, socket.id)) {
            debug!("[nsid={}] error sending CONNECT reply: {e}", socket.id);
            return;
        }
        socket.set_connected(true);
        self.sockets
            .write()
            .unwrap()
            .insert(socket.esid(), socket.clone());
        socket.subscribe_channel();
        // the session may have died while the hook ran
        if esocket.is_closed() {
            socket.close(DisconnectReason::TransportClose);
            return;
        }
        debug!("[nsid={}] connected to {}", socket.id, self.path);
    }

    pub(crate) fn get_socket(&self, esid: Sid) -> Option<Arc<Socket<C>>> {
        self.sockets.read().unwrap().get(&esid).cloned()
    }

    pub(crate) fn remove_socket(&self, esid: Sid) {
        self.sockets.write().unwrap().remove(&esid);
    }

    /// Routes a decoded packet to the namespace socket of the session that
    /// sent it. Packets for sessions that never connected are dropped.
    pub(crate) fn recv(&self, esid: Sid, packet: PacketData) -> Result<(), Error> {
        match self.get_socket(esid) {
            Some(socket) => socket.recv(packet),
            None => {
                debug!("[sid={esid}] packet for {} before CONNECT, ignored", self.path);
                Ok(())
            }
        }
    }

    /// Encodes the packet once and publishes it to the selected groups.
    pub(crate) fn broadcast(
        &self,
        mut packet: Packet,
        opts: BroadcastOptions,
    ) -> Result<(), BroadcastError> {
        let bin = packet.take_attachments();
        let msg: String = packet.try_into()?;

        // No selection at all from a socket means a direct reply to that
        // socket's session, not a namespace-wide broadcast.
        if opts.rooms.is_empty() && opts.except.is_empty() && !opts.skip_self {
            if let Some(sender) = opts.sender {
                self.channel.send(&sender, ChannelMessage { msg, bin });
                return Ok(());
            }
        }

        let groups: Vec<Group> = if opts.rooms.is_empty() {
            vec![Group::ns_wide(&self.path)]
        } else {
            opts.rooms
                .iter()
                .map(|room| Group::room(&self.path, room.clone()))
                .collect()
        };
        let mut except: std::collections::HashSet<Channel> = std::collections::HashSet::new();
        for room in &opts.except {
            except.extend(
                self.channel
                    .group_channels(&Group::room(&self.path, room.clone())),
            );
        }
        if opts.skip_self {
            if let Some(sender) = opts.sender {
                except.insert(sender);
            }
        }
        self.channel.group_send(&groups, ChannelMessage { msg, bin }, &except);
        Ok(())
    }

    /// Detaches every socket, used at server shutdown.
    pub(crate) fn close(&self, reason: DisconnectReason) {
        let sockets: Vec<_> = self.sockets.read().unwrap().values().cloned().collect();
        debug!("closing {} sockets on {}", sockets.len(), self.path);
        for socket in sockets {
            socket.send(Packet::disconnect(&self.path)).ok();
            socket.close(reason);
            socket.close_underlying_transport();
        }
    }
}

impl<C: ChannelLayer> std::fmt::Debug for Namespace<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("path", &self.path)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("sockets", &self.sockets.read().unwrap().len())
            .finish()
    }
}

/// Builds the handler table of a [`Namespace`] before registration.
///
/// Handlers are keyed by event name up front; there is no dynamic
/// registration after the namespace starts serving.
pub struct NamespaceBuilder<C: ChannelLayer> {
    handlers: HashMap<Cow<'static, str>, EventHandler<C>>,
    connect_hook: Option<ConnectHook<C>>,
    disconnect_hook: Option<DisconnectHook<C>>,
}

impl<C: ChannelLayer> Default for NamespaceBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ChannelLayer> NamespaceBuilder<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            connect_hook: None,
            disconnect_hook: None,
        }
    }

    /// Registers the handler for `event`.
    pub fn on<H, Fut>(mut self, event: impl Into<Cow<'static, str>>, handler: H) -> Self
    where
        H: Fn(Arc<Socket<C>>, Value, Vec<Vec<u8>>, Option<AckSender<C>>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.insert(
            event.into(),
            Box::new(move |socket, data, bin, ack| handler(socket, data, bin, ack).boxed()),
        );
        self
    }

    /// Registers the connect hook, consulted before a socket joins the
    /// namespace. Returning an error refuses the handshake.
    pub fn on_connect<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Arc<Socket<C>>, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ConnectRefusal>> + Send + 'static,
    {
        self.connect_hook = Some(Box::new(move |socket, auth| hook(socket, auth).boxed()));
        self
    }

    /// Registers the disconnect hook, fired once per socket when it leaves.
    pub fn on_disconnect<H, Fut>(mut self, hook: H) -> Self
    where
        H: Fn(Arc<Socket<C>>, DisconnectReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disconnect_hook = Some(Box::new(move |socket, reason| hook(socket, reason).boxed()));
        self
    }
}

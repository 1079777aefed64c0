//! A [`Socket`] is one client's membership in one namespace: rooms, acks and
//! the emit surface live here.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use engineio_core::socket::DisconnectReason as EIoDisconnectReason;
use engineio_core::{PeerInfo, Sid, TransportType};

use crate::channel::{session_channel, Channel, ChannelLayer, ChannelMessage, Group, Room};
use crate::client::SocketData;
use crate::config::SocketIoConfig;
use crate::errors::{AckError, Error, SendError};
use crate::handler::AckSender;
use crate::ns::Namespace;
use crate::operators::{Operators, RoomParam};
use crate::packet::{Packet, PacketData};

type EIoSocket = engineio_core::Socket<SocketData>;

/// Why a socket left its namespace, forwarded to the namespace's disconnect
/// hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The underlying connection was closed gracefully.
    TransportClose,
    /// The underlying connection failed.
    TransportError,
    /// No PONG within the ping timeout.
    HeartbeatTimeout,
    /// The client broke the single-concurrent-poll rule.
    MultipleHttpPollingError,
    /// The client sent something unparsable.
    PacketParsingError,
    /// The client sent a DISCONNECT packet for this namespace.
    ClientNSDisconnect,
    /// The server disconnected the socket with [`Socket::disconnect`].
    ServerNSDisconnect,
    /// The server is shutting down.
    ClosingServer,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::HeartbeatTimeout => "ping timeout",
            DisconnectReason::MultipleHttpPollingError => "multiple http polling requests",
            DisconnectReason::PacketParsingError => "parse error",
            DisconnectReason::ClientNSDisconnect => "client disconnect",
            DisconnectReason::ServerNSDisconnect => "server disconnect",
            DisconnectReason::ClosingServer => "server shutdown",
        };
        f.write_str(s)
    }
}

impl From<EIoDisconnectReason> for DisconnectReason {
    fn from(reason: EIoDisconnectReason) -> Self {
        match reason {
            EIoDisconnectReason::TransportClose => DisconnectReason::TransportClose,
            EIoDisconnectReason::TransportError => DisconnectReason::TransportError,
            EIoDisconnectReason::HeartbeatTimeout => DisconnectReason::HeartbeatTimeout,
            EIoDisconnectReason::MultipleHttpPollingError => {
                DisconnectReason::MultipleHttpPollingError
            }
            EIoDisconnectReason::PacketParsingError => DisconnectReason::PacketParsingError,
            EIoDisconnectReason::ClosingServer => DisconnectReason::ClosingServer,
        }
    }
}

/// A client acknowledgement: the reply arguments plus any binary attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct AckResponse {
    pub data: Value,
    pub binary: Vec<Vec<u8>>,
}

type AckEntry = oneshot::Sender<Result<AckResponse, AckError>>;

pub struct Socket<C: ChannelLayer> {
    /// Namespace-scoped socket id, distinct from the engine session id; this
    /// is the `sid` the CONNECT reply advertises.
    pub id: Sid,
    ns: Arc<Namespace<C>>,
    esocket: Arc<EIoSocket>,
    config: Arc<SocketIoConfig>,
    rooms: RwLock<HashSet<Room>>,
    acks: Mutex<HashMap<u64, AckEntry>>,
    ack_counter: AtomicU64,
    connected: AtomicBool,
}

impl<C: ChannelLayer> Socket<C> {
    pub(crate) fn new(
        ns: Arc<Namespace<C>>,
        esocket: Arc<EIoSocket>,
        config: Arc<SocketIoConfig>,
    ) -> Self {
        Self {
            id: Sid::new(),
            ns,
            esocket,
            config,
            rooms: RwLock::new(HashSet::new()),
            acks: Mutex::new(HashMap::new()),
            ack_counter: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        }
    }

    /// The namespace path this socket is connected to.
    pub fn ns(&self) -> &str {
        &self.ns.path
    }

    /// The Engine.IO session id carrying this socket.
    pub fn esid(&self) -> Sid {
        self.esocket.id
    }

    pub fn transport_type(&self) -> TransportType {
        self.esocket.transport_type()
    }

    /// Client metadata captured at the engine handshake.
    pub fn peer_info(&self) -> &PeerInfo {
        &self.esocket.peer_info
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn channel(&self) -> Channel {
        session_channel(self.esocket.id)
    }

    /// Hooks the session's private channel up to its Engine.IO queue and
    /// joins the whole-namespace group.
    pub(crate) fn subscribe_channel(&self) {
        let esocket = Arc::downgrade(&self.esocket);
        self.ns.channel.subscribe(
            self.channel(),
            Box::new(move |msg: ChannelMessage| {
                if let Some(esocket) = esocket.upgrade() {
                    esocket.emit_with_attachments(msg.msg, msg.bin).ok();
                }
            }),
        );
        self.ns
            .channel
            .group_add(Group::ns_wide(&self.ns.path), self.channel());
    }

    /// Emits an event to this client.
    pub fn emit(
        &self,
        event: impl Into<String>,
        data: impl Serialize,
    ) -> Result<(), SendError> {
        let data = serde_json::to_value(data)?;
        self.send(Packet::event(self.ns(), event, data))
    }

    /// Emits an event and waits for the client's acknowledgement, up to the
    /// configured ack timeout.
    pub async fn emit_with_ack(
        self: &Arc<Self>,
        event: impl Into<String>,
        data: impl Serialize,
    ) -> Result<AckResponse, AckError> {
        let data = serde_json::to_value(data).map_err(SendError::from)?;
        let packet = Packet::event(self.ns(), event, data);
        let (ack_id, rx) = self.send_with_ack(packet)?;
        match tokio::time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(res)) => res,
            Ok(Err(_)) => Err(AckError::Closed),
            Err(_) => {
                self.acks.lock().unwrap().remove(&ack_id);
                Err(AckError::Timeout)
            }
        }
    }

    // Room membership. The socket's local set is authoritative; the channel
    // layer mirrors it for broadcast fan-out.

    pub fn join(&self, rooms: impl RoomParam) {
        for room in rooms.into_room_iter() {
            if self.rooms.write().unwrap().insert(room.clone()) {
                self.ns
                    .channel
                    .group_add(Group::room(&self.ns.path, room), self.channel());
            }
        }
    }

    pub fn leave(&self, rooms: impl RoomParam) {
        for room in rooms.into_room_iter() {
            if self.rooms.write().unwrap().remove(&room) {
                self.ns
                    .channel
                    .group_discard(&Group::room(&self.ns.path, room), &self.channel());
            }
        }
    }

    /// The rooms this socket has joined.
    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.read().unwrap().iter().cloned().collect()
    }

    pub(crate) fn leave_all(&self) {
        let rooms: Vec<Room> = self.rooms.write().unwrap().drain().collect();
        for room in rooms {
            self.ns
                .channel
                .group_discard(&Group::room(&self.ns.path, room), &self.channel());
        }
    }

    // Broadcast operators.

    /// Selects the given rooms, excluding this socket.
    pub fn to(&self, rooms: impl RoomParam) -> Operators<C> {
        Operators::new(self.ns.clone(), Some(self.channel())).to(rooms)
    }

    /// Selects the given rooms, including this socket.
    pub fn within(&self, rooms: impl RoomParam) -> Operators<C> {
        Operators::new(self.ns.clone(), Some(self.channel())).within(rooms)
    }

    /// Filters out sockets in the given rooms.
    pub fn except(&self, rooms: impl RoomParam) -> Operators<C> {
        Operators::new(self.ns.clone(), Some(self.channel())).except(rooms)
    }

    /// Selects every socket in the namespace except this one.
    pub fn broadcast(&self) -> Operators<C> {
        Operators::new(self.ns.clone(), Some(self.channel())).broadcast()
    }

    /// Attaches binary payloads to the next emit.
    pub fn bin(&self, binary: Vec<Vec<u8>>) -> Operators<C> {
        Operators::new(self.ns.clone(), Some(self.channel())).bin(binary)
    }

    /// Disconnects this socket from its namespace, telling the client first.
    pub fn disconnect(self: Arc<Self>) -> Result<(), SendError> {
        self.send(Packet::disconnect(&self.ns.path))?;
        self.close(DisconnectReason::ServerNSDisconnect);
        Ok(())
    }

    pub(crate) fn send(&self, mut packet: Packet) -> Result<(), SendError> {
        let bin = packet.take_attachments();
        let msg: String = packet.try_into()?;
        let res = if bin.is_empty() {
            self.esocket.emit(msg)
        } else {
            self.esocket.emit_with_attachments(msg, bin)
        };
        res.map_err(|_| SendError::Closed)
    }

    fn send_with_ack(
        &self,
        mut packet: Packet,
    ) -> Result<(u64, oneshot::Receiver<Result<AckResponse, AckError>>), SendError> {
        let ack_id = self.ack_counter.fetch_add(1, Ordering::SeqCst) + 1;
        packet.set_ack_id(ack_id);
        let (tx, rx) = oneshot::channel();
        self.acks.lock().unwrap().insert(ack_id, tx);
        if let Err(e) = self.send(packet) {
            self.acks.lock().unwrap().remove(&ack_id);
            return Err(e);
        }
        Ok((ack_id, rx))
    }

    /// Detaches the socket from the namespace. Idempotent; fires the
    /// disconnect hook, resolves pending acks with an error and leaves every
    /// room and group.
    pub(crate) fn close(self: &Arc<Self>, reason: DisconnectReason) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("[nsid={}] closing socket: {reason}", self.id);
        if let Some(hook) = &self.ns.disconnect_hook {
            tokio::spawn(hook(self.clone(), reason));
        }
        let pending: Vec<AckEntry> = {
            let mut acks = self.acks.lock().unwrap();
            acks.drain().map(|(_, tx)| tx).collect()
        };
        for tx in pending {
            tx.send(Err(AckError::Closed)).ok();
        }
        self.leave_all();
        self.ns
            .channel
            .group_discard(&Group::ns_wide(&self.ns.path), &self.channel());
        self.ns.remove_socket(self.esocket.id);
    }

    /// Closes the Engine.IO session under this socket, used at shutdown.
    pub(crate) fn close_underlying_transport(&self) {
        if !self.esocket.is_closed() {
            self.esocket.close(EIoDisconnectReason::ClosingServer);
        }
    }

    /// Dispatches a decoded packet addressed to this socket.
    pub(crate) fn recv(self: &Arc<Self>, packet: PacketData) -> Result<(), Error> {
        match packet {
            PacketData::Event(event, data, ack) => self.recv_event(event, data, vec![], ack),
            PacketData::BinaryEvent(event, payload, ack) => {
                self.recv_event(event, payload.data, payload.bin, ack)
            }
            PacketData::EventAck(data, ack_id) => self.recv_ack(data, vec![], ack_id),
            PacketData::BinaryAck(payload, ack_id) => {
                self.recv_ack(payload.data, payload.bin, ack_id)
            }
            PacketData::Disconnect => {
                self.close(DisconnectReason::ClientNSDisconnect);
                Ok(())
            }
            // CONNECT is handled one level up; CONNECT_ERROR is client-bound
            _ => Err(Error::InvalidPayload),
        }
    }

    fn recv_event(
        self: &Arc<Self>,
        event: String,
        data: Value,
        bin: Vec<Vec<u8>>,
        ack_id: Option<u64>,
    ) -> Result<(), Error> {
        match self.ns.handler(&event) {
            Some(handler) => {
                let ack = ack_id.map(|id| AckSender::new(self.clone(), id));
                tokio::spawn(handler(self.clone(), data, bin, ack));
            }
            None => debug!("[nsid={}] no handler for event {event:?}", self.id),
        }
        Ok(())
    }

    fn recv_ack(&self, data: Value, binary: Vec<Vec<u8>>, ack_id: u64) -> Result<(), Error> {
        if let Some(tx) = self.acks.lock().unwrap().remove(&ack_id) {
            tx.send(Ok(AckResponse { data, binary })).ok();
        } else {
            debug!("[nsid={}] ack {ack_id} has no pending callback", self.id);
        }
        Ok(())
    }
}

impl<C: ChannelLayer> fmt::Debug for Socket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("nsid", &self.id)
            .field("esid", &self.esocket.id)
            .field("ns", &self.ns.path)
            .field("connected", &self.connected())
            .finish()
    }
}

//! Glue between the Engine.IO engine and the namespace layer: packet
//! dispatch, the CONNECT handshake and binary packet reassembly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tracing::debug;

use engineio_core::handler::EngineIoHandler;
use engineio_core::socket::DisconnectReason as EIoDisconnectReason;
use engineio_core::Sid;

use crate::channel::{session_channel, ChannelLayer};
use crate::config::SocketIoConfig;
use crate::errors::Error;
use crate::ns::{Namespace, NamespaceBuilder};
use crate::packet::{Packet, PacketData};

type EIoSocket = engineio_core::Socket<SocketData>;

/// Per-session state the Socket.IO layer keeps on the engine socket.
#[derive(Debug, Default)]
pub struct SocketData {
    /// A binary packet whose header arrived but whose attachments are still
    /// in flight. At most one can be pending per session: the protocol does
    /// not interleave multi-part packets.
    pub(crate) partial_bin_packet: Mutex<Option<Packet>>,

    /// Namespaces whose CONNECT handshake is still running. Reserved before
    /// the connect hook is spawned so a racing second CONNECT is caught even
    /// though registration only happens once the hook resolves.
    pub(crate) connecting: Mutex<HashSet<String>>,
}

pub struct Client<C: ChannelLayer> {
    pub(crate) config: Arc<SocketIoConfig>,
    pub(crate) channel: Arc<C>,
    ns: RwLock<HashMap<String, Arc<Namespace<C>>>>,
}

impl<C: ChannelLayer> Client<C> {
    pub(crate) fn new(config: SocketIoConfig, channel: C) -> Self {
        Self {
            config: Arc::new(config),
            channel: Arc::new(channel),
            ns: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn add_ns(&self, path: String, builder: NamespaceBuilder<C>) {
        debug!("adding namespace {path}");
        let ns = Namespace::from_builder(path.clone(), builder, self.channel.clone());
        self.ns.write().unwrap().insert(path, ns);
    }

    pub(crate) fn get_ns(&self, path: &str) -> Option<Arc<Namespace<C>>> {
        self.ns.read().unwrap().get(path).cloned()
    }

    /// Disconnects every socket of every namespace, for server shutdown.
    pub(crate) fn close(&self) {
        debug!("closing all namespaces");
        let namespaces: Vec<_> = self.ns.read().unwrap().values().cloned().collect();
        for ns in namespaces {
            ns.close(crate::socket::DisconnectReason::ClosingServer);
        }
    }

    /// CONNECT handshake entry. Unknown namespaces answer CONNECT_ERROR; a
    /// second CONNECT for a joined namespace is a protocol error.
    fn sock_connect(
        &self,
        auth: Option<Value>,
        ns_path: String,
        esocket: &Arc<EIoSocket>,
    ) -> Result<(), Error> {
        if let Some(ns) = self.get_ns(&ns_path) {
            // reserve the handshake slot before the hook runs; the namespace
            // releases it once the handshake settles
            {
                let mut connecting = esocket.data.connecting.lock().unwrap();
                if ns.get_socket(esocket.id).is_some() || !connecting.insert(ns_path) {
                    return Err(Error::DuplicateConnect);
                }
            }
            let config = self.config.clone();
            let esocket = esocket.clone();
            tokio::spawn(ns.connect(esocket, auth, config));
            Ok(())
        } else {
            debug!("[sid={}] unknown namespace: {ns_path}", esocket.id);
            let packet: String = Packet::connect_error(&ns_path, "Invalid namespace").try_into()?;
            esocket.emit(packet).ok();
            Ok(())
        }
    }

    /// Routes a non-handshake packet to its namespace socket.
    fn sock_propagate_packet(&self, packet: Packet, esid: Sid) -> Result<(), Error> {
        match self.get_ns(&packet.ns) {
            Some(ns) => ns.recv(esid, packet.inner),
            None => {
                debug!("[sid={esid}] packet for unknown namespace {}", packet.ns);
                Ok(())
            }
        }
    }

    /// Stashes a binary packet header until its attachments arrive.
    fn sock_recv_bin_packet(&self, esocket: &EIoSocket, packet: Packet) {
        esocket
            .data
            .partial_bin_packet
            .lock()
            .unwrap()
            .replace(packet);
    }

    /// Adds one attachment to the pending binary packet. `Ok(true)` once the
    /// packet is complete.
    fn apply_payload(&self, data: Vec<u8>, esocket: &EIoSocket) -> Result<bool, Error> {
        match &mut *esocket.data.partial_bin_packet.lock().unwrap() {
            Some(packet) => match &mut packet.inner {
                PacketData::BinaryEvent(_, payload, _) | PacketData::BinaryAck(payload, _) => {
                    payload.add_payload(data);
                    Ok(payload.is_complete())
                }
                _ => Err(Error::UnexpectedBinary),
            },
            None => {
                debug!("[sid={}] binary with no pending packet", esocket.id);
                Err(Error::UnexpectedBinary)
            }
        }
    }
}

impl<C: ChannelLayer> EngineIoHandler for Client<C> {
    type Data = SocketData;

    fn on_connect(&self, socket: Arc<EIoSocket>) {
        debug!("[sid={}] engine session connected", socket.id);
    }

    fn on_disconnect(&self, socket: Arc<EIoSocket>, reason: EIoDisconnectReason) {
        debug!("[sid={}] engine session disconnected: {reason}", socket.id);
        let sockets: Vec<_> = self
            .ns
            .read()
            .unwrap()
            .values()
            .filter_map(|ns| ns.get_socket(socket.id))
            .collect();
        for ns_socket in sockets {
            ns_socket.close(reason.into());
        }
        self.channel.unsubscribe(&session_channel(socket.id));
    }

    fn on_message(&self, msg: String, socket: Arc<EIoSocket>) {
        // a textual frame in the middle of a binary batch truncates it
        if socket.data.partial_bin_packet.lock().unwrap().is_some() {
            debug!("[sid={}] text frame while attachments pending", socket.id);
            socket.close(EIoDisconnectReason::PacketParsingError);
            return;
        }
        let packet = match Packet::try_from(msg.as_str()) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("[sid={}] packet parse error: {e}", socket.id);
                socket.close(EIoDisconnectReason::PacketParsingError);
                return;
            }
        };
        let res = match packet.inner {
            PacketData::Connect(auth) => self.sock_connect(auth, packet.ns, &socket),
            PacketData::BinaryEvent(..) | PacketData::BinaryAck(..) => {
                self.sock_recv_bin_packet(&socket, packet);
                Ok(())
            }
            // CONNECT_ERROR only ever flows server → client
            PacketData::ConnectError(_) => Err(Error::InvalidPayload),
            _ => self.sock_propagate_packet(packet, socket.id),
        };
        if let Err(ref e) = res {
            debug!("[sid={}] error processing packet: {e}", socket.id);
            if let Some(reason) = e.into() {
                socket.close(reason);
            }
        }
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<EIoSocket>) {
        let complete = match self.apply_payload(data, &socket) {
            Ok(complete) => complete,
            Err(e) => {
                debug!("[sid={}] binary error: {e}", socket.id);
                socket.close(EIoDisconnectReason::PacketParsingError);
                return;
            }
        };
        if !complete {
            return;
        }
        let packet = socket.data.partial_bin_packet.lock().unwrap().take();
        if let Some(packet) = packet {
            let validation = match &packet.inner {
                PacketData::BinaryEvent(_, payload, _) | PacketData::BinaryAck(payload, _) => {
                    payload.validate_placeholders()
                }
                _ => Ok(()),
            };
            let res = validation.and_then(|_| self.sock_propagate_packet(packet, socket.id));
            if let Err(ref e) = res {
                debug!("[sid={}] error dispatching binary packet: {e}", socket.id);
                if let Some(reason) = e.into() {
                    socket.close(reason);
                }
            }
        }
    }
}

impl<C: ChannelLayer> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("namespaces", &self.ns.read().unwrap().keys().collect::<Vec<_>>())
            .finish()
    }
}

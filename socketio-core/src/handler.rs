//! Handler capability set: every event handler receives the namespace
//! socket, the decoded argument array, the binary attachments and, when the
//! client asked for one, an [`AckSender`].

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::channel::ChannelLayer;
use crate::errors::SendError;
use crate::packet::Packet;
use crate::socket::{DisconnectReason, Socket};

/// Rejection returned by a connect hook, reported to the client as a
/// CONNECT_ERROR packet.
#[derive(Debug, Clone)]
pub struct ConnectRefusal {
    pub message: String,
}

impl ConnectRefusal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub(crate) type EventHandler<C> = Box<
    dyn Fn(Arc<Socket<C>>, Value, Vec<Vec<u8>>, Option<AckSender<C>>) -> BoxFuture<'static, ()>
        + Send
        + Sync,
>;

pub(crate) type ConnectHook<C> = Box<
    dyn Fn(Arc<Socket<C>>, Option<Value>) -> BoxFuture<'static, Result<(), ConnectRefusal>>
        + Send
        + Sync,
>;

pub(crate) type DisconnectHook<C> =
    Box<dyn Fn(Arc<Socket<C>>, DisconnectReason) -> BoxFuture<'static, ()> + Send + Sync>;

/// One-shot reply handle for an EVENT that carried an ack id.
///
/// Consuming `send` makes double-acking unrepresentable; dropping the sender
/// simply never acknowledges, which is what happens when a handler declines
/// to answer.
pub struct AckSender<C: ChannelLayer> {
    socket: Arc<Socket<C>>,
    ack_id: u64,
    binary: Vec<Vec<u8>>,
}

impl<C: ChannelLayer> AckSender<C> {
    pub(crate) fn new(socket: Arc<Socket<C>>, ack_id: u64) -> Self {
        Self {
            socket,
            ack_id,
            binary: vec![],
        }
    }

    /// Attaches binary payloads, turning the reply into a BINARY_ACK.
    pub fn bin(mut self, binary: Vec<Vec<u8>>) -> Self {
        self.binary = binary;
        self
    }

    /// Sends the acknowledgement with the handler's reply arguments.
    pub fn send(self, data: impl Serialize) -> Result<(), SendError> {
        let data = serde_json::to_value(data)?;
        let ns = self.socket.ns();
        let packet = if self.binary.is_empty() {
            Packet::ack(ns, data, self.ack_id)
        } else {
            Packet::bin_ack(ns, data, self.binary, self.ack_id)
        };
        self.socket.send(packet)
    }
}

impl<C: ChannelLayer> std::fmt::Debug for AckSender<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckSender")
            .field("ack_id", &self.ack_id)
            .field("binary", &self.binary.len())
            .finish()
    }
}

use std::sync::Arc;

use crate::socket::{DisconnectReason, Socket};

/// Callbacks driven by the engine as sessions open, exchange messages and
/// close.
///
/// The layer above stores its per-session state in the associated `Data`
/// type, which lives on the [`Socket`] itself.
pub trait EngineIoHandler: Send + Sync + 'static {
    /// Per-session data attached to every [`Socket`].
    type Data: Default + Send + Sync + 'static;

    /// Called once the session handshake completed on its original transport.
    fn on_connect(&self, socket: Arc<Socket<Self::Data>>);

    /// Called exactly once when the session is torn down.
    fn on_disconnect(&self, socket: Arc<Socket<Self::Data>>, reason: DisconnectReason);

    /// Called for every MESSAGE packet with a text payload.
    fn on_message(&self, msg: String, socket: Arc<Socket<Self::Data>>);

    /// Called for every MESSAGE packet with a binary payload.
    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<Self::Data>>);
}

impl<T: EngineIoHandler> EngineIoHandler for Arc<T> {
    type Data = T::Data;

    fn on_connect(&self, socket: Arc<Socket<Self::Data>>) {
        (**self).on_connect(socket)
    }

    fn on_disconnect(&self, socket: Arc<Socket<Self::Data>>, reason: DisconnectReason) {
        (**self).on_disconnect(socket, reason)
    }

    fn on_message(&self, msg: String, socket: Arc<Socket<Self::Data>>) {
        (**self).on_message(msg, socket)
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<Self::Data>>) {
        (**self).on_binary(data, socket)
    }
}

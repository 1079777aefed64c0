use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use crate::config::EngineIoConfig;
use crate::handler::EngineIoHandler;
use crate::packet::Packet;
use crate::sid::Sid;
use crate::socket::{DisconnectReason, PeerInfo, Socket};
use crate::transport::TransportType;

/// Process-wide session registry plus the pieces every transport needs: the
/// user handler and the global config.
pub(crate) struct EngineIo<H: EngineIoHandler> {
    sockets: RwLock<HashMap<Sid, Arc<Socket<H::Data>>>>,
    pub handler: H,
    pub config: EngineIoConfig,
}

impl<H: EngineIoHandler> EngineIo<H> {
    pub fn new(handler: H, config: EngineIoConfig) -> Self {
        Self {
            sockets: RwLock::new(HashMap::new()),
            handler,
            config,
        }
    }

    /// Creates a session and registers it. The socket closes itself through a
    /// weak back-reference, so the registry stays the sole owner.
    pub fn create_session(
        self: &Arc<Self>,
        transport: TransportType,
        peer_info: PeerInfo,
    ) -> Arc<Socket<H::Data>> {
        let engine: Weak<Self> = Arc::downgrade(self);
        let close_fn = Box::new(move |sid: Sid, reason: DisconnectReason| {
            if let Some(engine) = engine.upgrade() {
                engine.close_session(sid, reason);
            }
        });
        let socket = Arc::new(Socket::new(transport, peer_info, close_fn));
        debug!("[sid={}] new {} session", socket.id, transport);
        self.sockets
            .write()
            .unwrap()
            .insert(socket.id, socket.clone());
        socket
    }

    pub fn get_socket(&self, sid: Sid) -> Option<Arc<Socket<H::Data>>> {
        self.sockets.read().unwrap().get(&sid).cloned()
    }

    /// Tears a session down. Removal from the registry is the commit point,
    /// so the timers, waiters and the disconnect callback run exactly once
    /// however many close paths race.
    pub fn close_session(&self, sid: Sid, reason: DisconnectReason) {
        let socket = self.sockets.write().unwrap().remove(&sid);
        if let Some(socket) = socket {
            debug!("[sid={sid}] closing session: {reason}");
            if socket.is_ws() {
                // gives the websocket writer a close frame to deliver
                socket.send(Packet::Close).ok();
            }
            socket.shutdown();
            self.handler.on_disconnect(socket, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default)]
    struct CountingHandler {
        disconnects: Arc<AtomicUsize>,
    }

    impl EngineIoHandler for CountingHandler {
        type Data = ();
        fn on_connect(&self, _: Arc<Socket<()>>) {}
        fn on_disconnect(&self, _: Arc<Socket<()>>, _: DisconnectReason) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        fn on_message(&self, _: String, _: Arc<Socket<()>>) {}
        fn on_binary(&self, _: Vec<u8>, _: Arc<Socket<()>>) {}
    }

    #[tokio::test]
    async fn create_then_lookup() {
        let engine = Arc::new(EngineIo::new(
            CountingHandler::default(),
            EngineIoConfig::default(),
        ));
        let socket = engine.create_session(TransportType::Polling, PeerInfo::default());
        assert!(engine.get_socket(socket.id).is_some());
        assert!(engine.get_socket(Sid::new()).is_none());
    }

    #[tokio::test]
    async fn close_session_runs_once() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(EngineIo::new(
            CountingHandler {
                disconnects: disconnects.clone(),
            },
            EngineIoConfig::default(),
        ));
        let socket = engine.create_session(TransportType::Polling, PeerInfo::default());
        engine.close_session(socket.id, DisconnectReason::TransportClose);
        engine.close_session(socket.id, DisconnectReason::TransportClose);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(socket.is_closed());
        assert!(engine.get_socket(socket.id).is_none());
    }
}

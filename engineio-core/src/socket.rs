use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::Error;
use crate::packet::Packet;
use crate::sid::Sid;
use crate::transport::TransportType;

/// Why a session was torn down, forwarded to
/// [`EngineIoHandler::on_disconnect`](crate::handler::EngineIoHandler::on_disconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed the connection or sent a CLOSE packet.
    TransportClose,
    /// The connection failed underneath the session.
    TransportError,
    /// No PONG arrived within the ping timeout.
    HeartbeatTimeout,
    /// A second GET was issued while a poll was already pending.
    MultipleHttpPollingError,
    /// The client sent bytes that do not parse as a packet.
    PacketParsingError,
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
            DisconnectReason::ClosingServer => "server shutdown",
        };
        f.write_str(s)
    }
}

/// Opaque client metadata captured from the request that opened the session.
#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    pub uri: http::Uri,
    pub headers: http::HeaderMap,
}

impl From<&http::request::Parts> for PeerInfo {
    fn from(parts: &http::request::Parts) -> Self {
        Self {
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }
}

pub(crate) type CloseFn = Box<dyn Fn(Sid, DisconnectReason) + Send + Sync + 'static>;

const TRANSPORT_POLLING: u8 = 0;
const TRANSPORT_WEBSOCKET: u8 = 1;

/// One Engine.IO session.
///
/// All outbound traffic funnels through the FIFO packet buffer; the active
/// transport drains it under `poll_lock`, which doubles as the single
/// concurrent GET guard and, after upgrade, as the websocket writer's
/// exclusive claim on delivery.
pub struct Socket<D> {
    pub id: Sid,
    /// Per-session state owned by the layer above.
    pub data: D,
    pub peer_info: PeerInfo,

    transport: AtomicU8,
    upgrading: AtomicBool,
    closed: AtomicBool,

    buf: Mutex<VecDeque<Packet>>,
    readable: Notify,
    pub(crate) poll_lock: AsyncMutex<()>,

    heartbeat_tx: mpsc::Sender<()>,
    heartbeat_rx: AsyncMutex<mpsc::Receiver<()>>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,

    close_fn: CloseFn,
}

impl<D: Default> Socket<D> {
    pub(crate) fn new(transport: TransportType, peer_info: PeerInfo, close_fn: CloseFn) -> Self {
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(1);
        Self {
            id: Sid::new(),
            data: D::default(),
            peer_info,
            transport: AtomicU8::new(encode_transport(transport)),
            upgrading: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            buf: Mutex::new(VecDeque::new()),
            readable: Notify::new(),
            poll_lock: AsyncMutex::new(()),
            heartbeat_tx,
            heartbeat_rx: AsyncMutex::new(heartbeat_rx),
            heartbeat_handle: Mutex::new(None),
            close_fn,
        }
    }
}

impl<D> Socket<D> {
    pub fn transport_type(&self) -> TransportType {
        match self.transport.load(Ordering::SeqCst) {
            TRANSPORT_WEBSOCKET => TransportType::Websocket,
            _ => TransportType::Polling,
        }
    }

    pub(crate) fn is_http(&self) -> bool {
        self.transport_type() == TransportType::Polling
    }

    pub(crate) fn is_ws(&self) -> bool {
        self.transport_type() == TransportType::Websocket
    }

    /// Claims the upgrade slot. Returns `false` if another websocket already
    /// probes this session.
    pub(crate) fn start_upgrade(&self) -> bool {
        self.upgrading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn cancel_upgrade(&self) {
        self.upgrading.store(false, Ordering::SeqCst);
    }

    /// Makes the websocket authoritative. Called with the poll lock held, so
    /// no polling request is in flight.
    pub(crate) fn upgrade_to_websocket(&self) {
        debug!("[sid={}] upgrading to websocket", self.id);
        self.transport
            .store(TRANSPORT_WEBSOCKET, Ordering::SeqCst);
        self.upgrading.store(false, Ordering::SeqCst);
    }

    /// Queues a packet for delivery, in enqueue order.
    pub(crate) fn send(&self, packet: Packet) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        self.buf.lock().unwrap().push_back(packet);
        self.readable.notify_one();
        Ok(())
    }

    /// Sends a MESSAGE packet with a text payload.
    pub fn emit(&self, msg: String) -> Result<(), Error> {
        self.send(Packet::Message(msg))
    }

    /// Sends a MESSAGE packet with a binary payload.
    pub fn emit_binary(&self, data: Vec<u8>) -> Result<(), Error> {
        self.send(Packet::Binary(data))
    }

    /// Queues a text message and its binary attachments as one contiguous
    /// run: nothing enqueued concurrently can land between them.
    pub fn emit_with_attachments(&self, msg: String, bin: Vec<Vec<u8>>) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let mut buf = self.buf.lock().unwrap();
        buf.push_back(Packet::Message(msg));
        for data in bin {
            buf.push_back(Packet::Binary(data));
        }
        drop(buf);
        self.readable.notify_one();
        Ok(())
    }

    /// Pops queued packets in FIFO order up to roughly `max_bytes` of encoded
    /// payload. An oversized packet at the head is still returned alone.
    pub(crate) fn drain(&self, max_bytes: u64) -> Vec<Packet> {
        let mut buf = self.buf.lock().unwrap();
        let mut batch = Vec::new();
        let mut size = 0u64;
        while let Some(packet) = buf.front() {
            size += packet.size_hint() as u64 + 1;
            if !batch.is_empty() && size > max_bytes {
                break;
            }
            batch.push(buf.pop_front().unwrap());
        }
        batch
    }

    /// Puts a drained batch back, preserving its original position ahead of
    /// everything queued since.
    pub(crate) fn requeue_front(&self, packets: Vec<Packet>) {
        let mut buf = self.buf.lock().unwrap();
        for packet in packets.into_iter().rev() {
            buf.push_front(packet);
        }
        drop(buf);
        self.readable.notify_one();
    }

    /// Resolves once the buffer is non-empty or the session is closed.
    pub(crate) async fn next_readable(&self) {
        loop {
            if self.is_closed() || !self.buf.lock().unwrap().is_empty() {
                return;
            }
            self.readable.notified().await;
        }
    }

    /// [`next_readable`](Self::next_readable) bounded by the polling
    /// deadline.
    pub(crate) async fn wait_readable(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.next_readable()).await;
    }

    /// Feeds a client PING/PONG to the heartbeat task.
    pub(crate) fn pong(&self) -> Result<(), Error> {
        self.heartbeat_tx
            .try_send(())
            .map_err(|_| Error::HeartbeatTimeout)
    }

    pub(crate) fn spawn_heartbeat(self: std::sync::Arc<Self>, interval: Duration, timeout: Duration)
    where
        D: Send + Sync + 'static,
    {
        let socket = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = socket.heartbeat_job(interval, timeout).await {
                debug!("[sid={}] heartbeat stopped: {}", socket.id, e);
                socket.close(DisconnectReason::HeartbeatTimeout);
            }
        });
        self.heartbeat_handle.lock().unwrap().replace(handle);
    }

    async fn heartbeat_job(&self, interval: Duration, timeout: Duration) -> Result<(), Error> {
        let mut heartbeat_rx = self
            .heartbeat_rx
            .try_lock()
            .map_err(|_| Error::HeartbeatTimeout)?;
        loop {
            tokio::time::sleep(interval).await;
            self.send(Packet::Ping)?;
            tokio::time::timeout(timeout, heartbeat_rx.recv())
                .await
                .map_err(|_| Error::HeartbeatTimeout)?
                .ok_or(Error::HeartbeatTimeout)?;
        }
    }

    /// Requests the engine to tear this session down.
    pub fn close(&self, reason: DisconnectReason) {
        (self.close_fn)(self.id, reason);
    }

    /// Marks the session closed and releases every waiter. Called exactly
    /// once, by the registry, as part of removal.
    pub(crate) fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.readable.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn encode_transport(transport: TransportType) -> u8 {
    match transport {
        TransportType::Polling => TRANSPORT_POLLING,
        TransportType::Websocket => TRANSPORT_WEBSOCKET,
    }
}

impl<D> fmt::Debug for Socket<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("sid", &self.id)
            .field("transport", &self.transport_type())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl<D: Default> Socket<D> {
    /// A detached socket for unit tests: no transport, no heartbeat.
    pub fn new_dummy(
        sid: Sid,
        close_fn: Box<dyn Fn(Sid, DisconnectReason) + Send + Sync + 'static>,
    ) -> Self {
        let mut socket = Self::new(TransportType::Polling, PeerInfo::default(), close_fn);
        socket.id = sid;
        socket
    }

    /// Takes every buffered packet, for asserting on emitted traffic.
    pub fn take_buffered(&self) -> Vec<Packet> {
        self.buf.lock().unwrap().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> Socket<()> {
        Socket::new_dummy(Sid::new(), Box::new(|_, _| ()))
    }

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let socket = dummy();
        socket.emit("one".into()).unwrap();
        socket.emit_binary(vec![1, 2, 3]).unwrap();
        socket.emit("two".into()).unwrap();
        let batch = socket.drain(u64::MAX);
        assert_eq!(
            batch,
            vec![
                Packet::Message("one".into()),
                Packet::Binary(vec![1, 2, 3]),
                Packet::Message("two".into()),
            ]
        );
    }

    #[tokio::test]
    async fn drain_respects_the_byte_limit() {
        let socket = dummy();
        socket.emit("x".repeat(100)).unwrap();
        socket.emit("y".repeat(100)).unwrap();
        socket.emit("z".into()).unwrap();
        let batch = socket.drain(150);
        assert_eq!(batch.len(), 1);
        // the rest stays queued
        assert_eq!(socket.drain(u64::MAX).len(), 2);
    }

    #[tokio::test]
    async fn oversized_head_packet_still_drains() {
        let socket = dummy();
        socket.emit("x".repeat(500)).unwrap();
        let batch = socket.drain(10);
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn requeue_preserves_head_position() {
        let socket = dummy();
        socket.emit("first".into()).unwrap();
        let batch = socket.drain(u64::MAX);
        socket.emit("second".into()).unwrap();
        socket.requeue_front(batch);
        let batch = socket.drain(u64::MAX);
        assert_eq!(
            batch,
            vec![
                Packet::Message("first".into()),
                Packet::Message("second".into()),
            ]
        );
    }

    #[tokio::test]
    async fn send_fails_after_shutdown() {
        let socket = dummy();
        socket.shutdown();
        assert!(matches!(
            socket.emit("late".into()),
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn next_readable_wakes_on_send() {
        let socket = std::sync::Arc::new(dummy());
        let waiter = {
            let socket = socket.clone();
            tokio::spawn(async move { socket.next_readable().await })
        };
        socket.emit("wake".into()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn upgrade_slot_is_exclusive() {
        let socket = dummy();
        assert!(socket.start_upgrade());
        assert!(!socket.start_upgrade());
        socket.cancel_upgrade();
        assert!(socket.start_upgrade());
    }
}

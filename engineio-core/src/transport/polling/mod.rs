//! Long-polling transport: handshake `GET`, poll `GET` and packet `POST`.

use std::fmt;
use std::sync::Arc;

use http::{Request, Response, StatusCode};
use http_body::Body;
use tracing::debug;

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::futures::http_response;
use crate::handler::EngineIoHandler;
use crate::packet::{OpenPacket, Packet};
use crate::sid::Sid;
use crate::socket::{DisconnectReason, PeerInfo, Socket};
use crate::transport::TransportType;

pub(crate) mod payload;

/// Handshake request: creates the session and answers with the OPEN packet
/// framed as a polling payload.
pub(crate) fn open_req<H: EngineIoHandler, B>(
    engine: Arc<EngineIo<H>>,
    req: Request<B>,
) -> Result<Response<ResponseBody>, Error> {
    let (parts, _) = req.into_parts();
    let socket = engine.create_session(TransportType::Polling, PeerInfo::from(&parts));
    socket
        .clone()
        .spawn_heartbeat(engine.config.ping_interval, engine.config.ping_timeout);
    engine.handler.on_connect(socket.clone());

    let open = Packet::Open(OpenPacket::new(
        TransportType::Polling,
        socket.id,
        &engine.config,
    ));
    let data = payload::encode(vec![open])?;
    http_response(StatusCode::OK, data).map_err(Error::Http)
}

/// Poll request: parks until the outbound queue is non-empty (or the polling
/// deadline passes), then returns a batch capped at `max_payload`.
pub(crate) async fn polling_req<H: EngineIoHandler>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
) -> Result<Response<ResponseBody>, Error> {
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionId(sid))?;
    if !socket.is_http() {
        return Err(Error::TransportMismatch);
    }

    // only one GET may wait per session
    let _poll = match socket.poll_lock.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            debug!("[sid={sid}] second concurrent polling request");
            socket.close(DisconnectReason::MultipleHttpPollingError);
            return Err(Error::BadRequest);
        }
    };

    debug!("[sid={sid}] polling request");
    socket
        .wait_readable(engine.config.ping_interval + engine.config.ping_timeout)
        .await;

    // If this request is dropped past this point the batch goes back to the
    // head of the queue instead of vanishing.
    let batch = DrainGuard::drain(&socket, engine.config.max_payload);
    let data = payload::encode(batch.packets())?;
    batch.commit();
    debug!("[sid={sid}] sending batch: {data:?}");
    http_response(StatusCode::OK, data).map_err(Error::Http)
}

/// Packet push: decodes the payload and feeds each packet to the session.
pub(crate) async fn post_req<H: EngineIoHandler, B>(
    engine: Arc<EngineIo<H>>,
    sid: Sid,
    req: Request<B>,
) -> Result<Response<ResponseBody>, Error>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: fmt::Debug,
{
    let socket = engine.get_socket(sid).ok_or(Error::UnknownSessionId(sid))?;
    if !socket.is_http() {
        return Err(Error::TransportMismatch);
    }

    let body = hyper::body::to_bytes(req.into_body()).await.map_err(|e| {
        debug!("[sid={sid}] error reading request body: {e:?}");
        Error::BadRequest
    })?;
    let packets = match payload::decode(&body, engine.config.max_payload) {
        Ok(packets) => packets,
        Err(e) => {
            debug!("[sid={sid}] error decoding payload: {e}");
            engine.close_session(sid, DisconnectReason::PacketParsingError);
            return Err(e);
        }
    };

    for packet in packets {
        match packet {
            Packet::Close => {
                debug!("[sid={sid}] session closed by client");
                // frees any parked poll before the session goes away
                socket.send(Packet::Noop).ok();
                engine.close_session(sid, DisconnectReason::TransportClose);
                break;
            }
            Packet::Ping | Packet::Pong => socket.pong()?,
            Packet::Message(msg) => engine.handler.on_message(msg, socket.clone()),
            Packet::Binary(data) => engine.handler.on_binary(data, socket.clone()),
            p => {
                debug!("[sid={sid}] unexpected packet on polling: {p:?}");
                engine.close_session(sid, DisconnectReason::PacketParsingError);
                return Err(Error::BadPacket(p));
            }
        }
    }
    http_response(StatusCode::OK, "ok").map_err(Error::Http)
}

/// A drained batch that returns to the head of the queue unless committed.
struct DrainGuard<'a, D> {
    socket: &'a Socket<D>,
    batch: Option<Vec<Packet>>,
}

impl<'a, D> DrainGuard<'a, D> {
    fn drain(socket: &'a Socket<D>, max_payload: u64) -> Self {
        let mut batch = socket.drain(max_payload);
        if batch.is_empty() {
            // deadline passed with nothing queued
            batch.push(Packet::Noop);
        }
        Self {
            socket,
            batch: Some(batch),
        }
    }

    fn packets(&self) -> Vec<Packet> {
        self.batch.clone().unwrap_or_default()
    }

    fn commit(mut self) {
        self.batch.take();
    }
}

impl<D> Drop for DrainGuard<'_, D> {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            self.socket.requeue_front(batch);
        }
    }
}

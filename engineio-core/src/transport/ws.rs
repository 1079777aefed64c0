//! Websocket transport.
//!
//! [`new_req`] answers the http upgrade and spawns a task that owns the
//! connection: fresh sessions get an OPEN packet straight away, while
//! requests carrying a `sid` run the polling→websocket upgrade handshake
//! before taking over delivery.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt, TryStreamExt};
use http::header::SEC_WEBSOCKET_KEY;
use http::{Request, Response};
use hyper::upgrade::Upgraded;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use tracing::debug;

use crate::body::ResponseBody;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::futures::ws_response;
use crate::handler::EngineIoHandler;
use crate::packet::{OpenPacket, Packet};
use crate::sid::Sid;
use crate::socket::{DisconnectReason, PeerInfo, Socket};
use crate::transport::TransportType;

/// Answers the websocket handshake and spawns the connection task.
///
/// With a `sid` in the query, the connection enters the upgrade probe for the
/// existing session instead of opening a new one.
pub(crate) fn new_req<H: EngineIoHandler, B>(
    engine: Arc<EngineIo<H>>,
    sid: Option<Sid>,
    req: Request<B>,
) -> Result<Response<ResponseBody>, Error> {
    let (parts, _) = req.into_parts();
    let ws_key = parts
        .headers
        .get(SEC_WEBSOCKET_KEY)
        .cloned()
        .ok_or(Error::BadRequest)?;
    let peer_info = PeerInfo::from(&parts);

    let req = Request::from_parts(parts, ());
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(conn) => match serve(engine, conn, sid, peer_info).await {
                Ok(_) => debug!("websocket connection closed"),
                Err(e) => debug!("websocket connection closed with error: {e}"),
            },
            Err(e) => debug!("websocket upgrade error: {e}"),
        }
    });

    ws_response(&ws_key).map_err(Error::Http)
}

/// Runs a websocket connection until it closes: resolves or creates the
/// session, then pumps frames both ways.
async fn serve<H: EngineIoHandler>(
    engine: Arc<EngineIo<H>>,
    conn: Upgraded,
    sid: Option<Sid>,
    peer_info: PeerInfo,
) -> Result<(), Error> {
    let mut ws = WebSocketStream::from_raw_socket(conn, Role::Server, None).await;

    let socket = match sid {
        Some(sid) => {
            let socket = match engine.get_socket(sid) {
                Some(socket) => socket,
                None => {
                    ws.close(None).await.ok();
                    return Err(Error::UnknownSessionId(sid));
                }
            };
            // one authoritative websocket per session
            if socket.is_ws() || !socket.start_upgrade() {
                debug!("[sid={sid}] websocket upgrade collision");
                ws.close(None).await.ok();
                return Err(Error::UpgradeRejected);
            }
            if let Err(e) = upgrade_handshake(&socket, &mut ws).await {
                socket.cancel_upgrade();
                ws.close(None).await.ok();
                return Err(e);
            }
            socket
        }
        None => {
            let socket = engine.create_session(TransportType::Websocket, peer_info);
            debug!("[sid={}] new websocket connection", socket.id);
            let open = Packet::Open(OpenPacket::new(
                TransportType::Websocket,
                socket.id,
                &engine.config,
            ));
            ws.send(Message::Text(open.try_into()?)).await?;
            socket
                .clone()
                .spawn_heartbeat(engine.config.ping_interval, engine.config.ping_timeout);
            engine.handler.on_connect(socket.clone());
            socket
        }
    };

    let (tx, rx) = ws.split();
    let writer = spawn_writer(socket.clone(), tx);

    let result = read_loop(&engine, rx, &socket).await;
    let reason = match &result {
        Ok(()) => DisconnectReason::TransportClose,
        Err(e) => Option::<DisconnectReason>::from(e).unwrap_or(DisconnectReason::TransportClose),
    };
    engine.close_session(socket.id, reason);

    // the writer exits on its own once the session is marked closed
    writer.await.ok();
    result
}

/// Feeds inbound frames to the session until the stream ends or a protocol
/// violation occurs.
async fn read_loop<H: EngineIoHandler>(
    engine: &Arc<EngineIo<H>>,
    mut rx: SplitStream<WebSocketStream<Upgraded>>,
    socket: &Arc<Socket<H::Data>>,
) -> Result<(), Error> {
    while let Some(msg) = rx.try_next().await? {
        match msg {
            Message::Text(msg) => match Packet::try_from(msg.as_str())? {
                Packet::Close => {
                    debug!("[sid={}] session closed by client", socket.id);
                    return Ok(());
                }
                Packet::Ping | Packet::Pong => socket.pong()?,
                Packet::Message(msg) => engine.handler.on_message(msg, socket.clone()),
                p => return Err(Error::BadPacket(p)),
            },
            Message::Binary(data) => engine.handler.on_binary(data, socket.clone()),
            Message::Close(_) => break,
            // tungstenite answers ws-level ping/pong control frames itself
            _ => (),
        }
    }
    Ok(())
}

/// Drains the outbound queue into the sink. The task holds the poll lock for
/// the rest of the session, making the websocket the only consumer.
fn spawn_writer<D: Send + Sync + 'static>(
    socket: Arc<Socket<D>>,
    mut tx: SplitSink<WebSocketStream<Upgraded>, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _queue = socket.poll_lock.lock().await;
        loop {
            socket.next_readable().await;
            let batch = socket.drain(u64::MAX);
            let mut closing = false;
            for packet in batch {
                let res = match packet {
                    Packet::Binary(data) => tx.feed(Message::Binary(data)).await,
                    Packet::Close => {
                        closing = true;
                        break;
                    }
                    // a Noop left over from the upgrade has no meaning here
                    Packet::Noop => continue,
                    packet => match String::try_from(packet) {
                        Ok(msg) => tx.feed(Message::Text(msg)).await,
                        Err(e) => {
                            debug!("[sid={}] skipping unencodable packet: {e}", socket.id);
                            continue;
                        }
                    },
                };
                if let Err(e) = res {
                    debug!("[sid={}] error writing to websocket: {e}", socket.id);
                    return;
                }
            }
            tx.flush().await.ok();
            if closing {
                tx.send(Message::Close(None)).await.ok();
                return;
            }
            if socket.is_closed() {
                return;
            }
        }
    })
}

/// The polling→websocket probe:
///
/// ```text
/// CLIENT                                                 SERVER
///   │  GET /…?EIO=4&transport=websocket&sid=…              │
///   │ ───────────────────────────────────────────────────► │
///   │ ◄─────────────────────────────────────────────────── │
///   │              HTTP 101 (websocket handshake)          │
///   │  2probe  ──────────────────────────────────────────► │
///   │ ◄──────────────────────────────────────────  3probe  │
///   │  5       ──────────────────────────────────────────► │
///   │              (polling drained with a NOOP,           │
///   │               queue handed to the websocket)         │
/// ```
async fn upgrade_handshake<D>(
    socket: &Arc<Socket<D>>,
    ws: &mut WebSocketStream<Upgraded>,
) -> Result<(), Error> {
    debug!("[sid={}] starting websocket upgrade", socket.id);

    let msg = match ws.next().await {
        Some(Ok(Message::Text(msg))) => msg,
        _ => return Err(Error::UpgradeRejected),
    };
    match Packet::try_from(msg.as_str())? {
        Packet::PingProbe => {
            ws.send(Message::Text(Packet::PongProbe.try_into()?)).await?;
        }
        p => return Err(Error::BadPacket(p)),
    }

    let msg = match ws.next().await {
        Some(Ok(Message::Text(msg))) => msg,
        _ => return Err(Error::UpgradeRejected),
    };
    match Packet::try_from(msg.as_str())? {
        Packet::Upgrade => (),
        p => return Err(Error::BadPacket(p)),
    }

    // completes any parked poll so the client can finish its http drain
    socket.send(Packet::Noop).ok();
    // waits for that drain to settle, then the websocket takes over
    let _poll = socket.poll_lock.lock().await;
    socket.upgrade_to_websocket();
    debug!("[sid={}] websocket upgrade complete", socket.id);
    Ok(())
}

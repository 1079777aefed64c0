use http::StatusCode;

use crate::packet::Packet;
use crate::sid::Sid;
use crate::socket::DisconnectReason;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown packet type: {0:?}")]
    UnknownPacketType(Option<char>),
    #[error("unexpected packet payload")]
    InvalidPacketPayload,
    #[error("bad packet received: {0:?}")]
    BadPacket(Packet),
    #[error("invalid base64 in polling payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid utf-8 in payload: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("error serializing json packet: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload exceeds the {0} byte limit")]
    PayloadTooLarge(u64),

    #[error("unknown session id: {0}")]
    UnknownSessionId(Sid),
    #[error("transport mismatch for session")]
    TransportMismatch,
    #[error("websocket upgrade rejected")]
    UpgradeRejected,
    #[error("heartbeat timeout")]
    HeartbeatTimeout,
    #[error("session is closed")]
    SessionClosed,

    #[error("unsupported protocol version")]
    UnsupportedProtocolVersion,
    #[error("unknown transport")]
    UnknownTransport,
    #[error("bad request")]
    BadRequest,

    #[error("http error: {0}")]
    Http(#[from] http::Error),
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Parse-level failures tear the session down; transport-protocol failures
/// only fail the request that carried them.
impl From<&Error> for Option<DisconnectReason> {
    fn from(err: &Error) -> Self {
        use Error::*;
        match err {
            UnknownPacketType(_) | InvalidPacketPayload | BadPacket(_) | Base64(_) | Utf8(_)
            | Json(_) | PayloadTooLarge(_) => Some(DisconnectReason::PacketParsingError),
            HeartbeatTimeout => Some(DisconnectReason::HeartbeatTimeout),
            Ws(_) => Some(DisconnectReason::TransportError),
            _ => None,
        }
    }
}

impl Error {
    /// Status code reported to the HTTP client when the request itself is at
    /// fault.
    pub(crate) fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

use engineio_core::socket::DisconnectReason as EIoDisconnectReason;

/// Protocol-level failures while decoding or dispatching a Socket.IO packet.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown packet type: {0:?}")]
    UnknownPacketType(Option<char>),
    #[error("invalid attachment count")]
    InvalidAttachmentCount,
    #[error("invalid ack id")]
    InvalidAckId,
    #[error("invalid packet payload")]
    InvalidPayload,
    #[error("event payload is not an array led by an event name")]
    InvalidEventPayload,
    #[error("malformed binary placeholder")]
    InvalidPlaceholder,
    #[error("received binary without a pending binary packet")]
    UnexpectedBinary,
    #[error("duplicate CONNECT for an already connected or connecting namespace")]
    DuplicateConnect,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("engine error: {0}")]
    Engine(#[from] engineio_core::errors::Error),
}

/// Every decode failure is fatal for the session carrying it.
impl From<&Error> for Option<EIoDisconnectReason> {
    fn from(err: &Error) -> Self {
        use Error::*;
        match err {
            UnknownPacketType(_) | InvalidAttachmentCount | InvalidAckId | InvalidPayload
            | InvalidEventPayload | InvalidPlaceholder | UnexpectedBinary | DuplicateConnect
            | Json(_) => Some(EIoDisconnectReason::PacketParsingError),
            Engine(_) => None,
        }
    }
}

/// Failures while emitting to a single client.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("error serializing payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("session is closed")]
    Closed,
}

/// Failures while waiting for a client acknowledgement.
#[derive(thiserror::Error, Debug)]
pub enum AckError {
    #[error("acknowledgement timed out")]
    Timeout,
    #[error("socket closed before the acknowledgement arrived")]
    Closed,
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Failures while publishing a broadcast through the channel layer.
///
/// Delivery itself is fire-and-forget (unreachable peers just miss the
/// message); only assembling the packet can fail.
#[derive(thiserror::Error, Debug)]
pub enum BroadcastError {
    #[error("error serializing payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Send(#[from] SendError),
}

//! Small response constructors shared by the transports.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use http::{HeaderValue, Response, StatusCode};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::body::ResponseBody;

pub(crate) fn http_response(
    status: StatusCode,
    body: impl Into<Bytes>,
) -> Result<Response<ResponseBody>, http::Error> {
    let body: Bytes = body.into();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=UTF-8")
        .header(CONTENT_LENGTH, body.len())
        .body(ResponseBody::plain(body))
}

pub(crate) fn empty_response(status: StatusCode) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .body(ResponseBody::empty())
        // status and empty body cannot produce a malformed response
        .unwrap()
}

/// The `101 Switching Protocols` reply completing a websocket handshake.
pub(crate) fn ws_response(ws_key: &HeaderValue) -> Result<Response<ResponseBody>, http::Error> {
    let accept = derive_accept_key(ws_key.as_bytes());
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(UPGRADE, HeaderValue::from_static("websocket"))
        .header(CONNECTION, HeaderValue::from_static("Upgrade"))
        .header(SEC_WEBSOCKET_ACCEPT, accept)
        .body(ResponseBody::empty())
}

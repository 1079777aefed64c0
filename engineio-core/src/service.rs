use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{ready, BoxFuture};
use futures::FutureExt;
use http::{Method, Request, Response};
use http_body::Body;
use tower::Service;
use tracing::debug;

use crate::body::ResponseBody;
use crate::config::EngineIoConfig;
use crate::engine::EngineIo;
use crate::errors::Error;
use crate::futures::empty_response;
use crate::handler::EngineIoHandler;
use crate::sid::Sid;
use crate::transport::{polling, ws, TransportType};

/// The engine as a [`tower::Service`].
///
/// The host router owns the mount point; this service never looks at the
/// request path and derives everything from the query string (`EIO`,
/// `transport`, `sid`) and the method.
pub struct EngineIoService<H: EngineIoHandler> {
    engine: Arc<EngineIo<H>>,
}

impl<H: EngineIoHandler> Clone for EngineIoService<H> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<H: EngineIoHandler> EngineIoService<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, EngineIoConfig::default())
    }

    pub fn with_config(handler: H, config: EngineIoConfig) -> Self {
        Self {
            engine: Arc::new(EngineIo::new(handler, config)),
        }
    }
}

impl<H: EngineIoHandler, ReqBody> Service<Request<ReqBody>> for EngineIoService<H>
where
    ReqBody: Body + Send + Unpin + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: fmt::Debug,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let engine = self.engine.clone();
        let info = match RequestInfo::parse(&req) {
            Ok(info) => info,
            Err(e) => {
                debug!("rejecting request: {e}");
                return ready(Ok(empty_response(e.status()))).boxed();
            }
        };
        let method = req.method().clone();
        match (method, info.transport, info.sid) {
            (Method::GET, TransportType::Polling, None) => {
                ready(Ok(respond(polling::open_req(engine, req)))).boxed()
            }
            (Method::GET, TransportType::Polling, Some(sid)) => {
                async move { Ok(respond(polling::polling_req(engine, sid).await)) }.boxed()
            }
            (Method::POST, TransportType::Polling, Some(sid)) => {
                async move { Ok(respond(polling::post_req(engine, sid, req).await)) }.boxed()
            }
            (Method::GET, TransportType::Websocket, sid) => {
                ready(Ok(respond(ws::new_req(engine, sid, req)))).boxed()
            }
            _ => ready(Ok(respond(Err(Error::BadRequest)))).boxed(),
        }
    }
}

fn respond(res: Result<Response<ResponseBody>, Error>) -> Response<ResponseBody> {
    match res {
        Ok(res) => res,
        Err(e) => {
            debug!("request failed: {e}");
            empty_response(e.status())
        }
    }
}

/// The query parameters every Engine.IO request must carry.
struct RequestInfo {
    sid: Option<Sid>,
    transport: TransportType,
}

impl RequestInfo {
    fn parse<B>(req: &Request<B>) -> Result<Self, Error> {
        let query = req.uri().query().ok_or(Error::BadRequest)?;
        let mut eio = None;
        let mut transport = None;
        let mut sid = None;
        for pair in query.split('&') {
            let mut kv = pair.splitn(2, '=');
            match (kv.next().unwrap_or(""), kv.next().unwrap_or("")) {
                ("EIO", v) => eio = Some(v),
                ("transport", v) => transport = Some(v),
                ("sid", v) => sid = Some(v),
                _ => {}
            }
        }
        if eio != Some("4") {
            return Err(Error::UnsupportedProtocolVersion);
        }
        let transport = transport.ok_or(Error::UnknownTransport)?.parse()?;
        let sid = match sid {
            Some(s) => Some(s.parse().map_err(|_| Error::BadRequest)?),
            None => None,
        };
        Ok(RequestInfo { sid, transport })
    }
}

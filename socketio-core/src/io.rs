//! The server entry point: build a [`SocketIo`] handle plus the tower
//! service to mount wherever the host router wants the endpoint.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::{Request, Response};
use http_body::Body;
use tower::Service;

use engineio_core::body::ResponseBody;
use engineio_core::service::EngineIoService;

use crate::channel::{ChannelLayer, LocalChannelLayer};
use crate::client::Client;
use crate::config::SocketIoConfig;
use crate::ns::NamespaceBuilder;
use crate::operators::Operators;

/// Handle to a running Socket.IO server: namespace registration, namespace
/// level broadcasts and shutdown.
pub struct SocketIo<C: ChannelLayer = LocalChannelLayer>(Arc<Client<C>>);

impl SocketIo<LocalChannelLayer> {
    /// A service/handle pair with default configuration and the in-memory
    /// channel layer.
    pub fn new_svc() -> (SocketIoService<LocalChannelLayer>, SocketIo<LocalChannelLayer>) {
        Self::builder().build_svc()
    }

    pub fn builder() -> SocketIoBuilder<LocalChannelLayer> {
        SocketIoBuilder::new()
    }
}

impl<C: ChannelLayer> SocketIo<C> {
    /// Registers a namespace. Must be called before clients connect to it;
    /// handlers are fixed from this point on.
    pub fn ns(&self, path: impl Into<String>, builder: NamespaceBuilder<C>) {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        self.0.add_ns(path, builder);
    }

    /// Namespace-level broadcast entry: `io.of("/")?.to("room").emit(…)`.
    pub fn of(&self, path: &str) -> Option<Operators<C>> {
        let ns = if path.starts_with('/') {
            self.0.get_ns(path)
        } else {
            self.0.get_ns(&format!("/{path}"))
        };
        ns.map(|ns| Operators::new(ns, None))
    }

    /// Disconnects every socket with the server-shutdown reason and closes
    /// the underlying sessions.
    pub fn close(&self) {
        self.0.close();
    }
}

impl<C: ChannelLayer> Clone for SocketIo<C> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<C: ChannelLayer> fmt::Debug for SocketIo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SocketIo").field(&self.0).finish()
    }
}

/// Configures and builds the service/handle pair.
pub struct SocketIoBuilder<C: ChannelLayer = LocalChannelLayer> {
    config: SocketIoConfig,
    channel: C,
}

impl SocketIoBuilder<LocalChannelLayer> {
    pub fn new() -> Self {
        Self {
            config: SocketIoConfig::default(),
            channel: LocalChannelLayer::new(),
        }
    }
}

impl Default for SocketIoBuilder<LocalChannelLayer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ChannelLayer> SocketIoBuilder<C> {
    /// Replaces the whole configuration, e.g. with
    /// [`SocketIoConfig::from_env`].
    pub fn with_config(mut self, config: SocketIoConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.engine.ping_interval = interval;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.ping_timeout = timeout;
        self
    }

    pub fn max_payload(mut self, max_payload: u64) -> Self {
        self.config.engine.max_payload = max_payload;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// Swaps the channel layer, e.g. for a cross-process implementation.
    pub fn with_channel_layer<C2: ChannelLayer>(self, channel: C2) -> SocketIoBuilder<C2> {
        SocketIoBuilder {
            config: self.config,
            channel,
        }
    }

    pub fn build_svc(self) -> (SocketIoService<C>, SocketIo<C>) {
        let engine_config = self.config.engine.clone();
        let client = Arc::new(Client::new(self.config, self.channel));
        let svc = EngineIoService::with_config(client.clone(), engine_config);
        (SocketIoService { inner: svc }, SocketIo(client))
    }
}

/// The Socket.IO endpoint as a [`tower::Service`], wrapping the engine
/// service.
pub struct SocketIoService<C: ChannelLayer> {
    inner: EngineIoService<Arc<Client<C>>>,
}

impl<C: ChannelLayer> Clone for SocketIoService<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: ChannelLayer, ReqBody> Service<Request<ReqBody>> for SocketIoService<C>
where
    ReqBody: Body + Send + Unpin + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: fmt::Debug,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = <EngineIoService<Arc<Client<C>>> as Service<Request<ReqBody>>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::<Request<ReqBody>>::poll_ready(&mut self.inner, cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        self.inner.call(req)
    }
}

impl<C: ChannelLayer> fmt::Debug for SocketIoService<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketIoService").finish()
    }
}

//! Echo server for driving `engineio-core` with the reference Engine.IO
//! test-suite: every MESSAGE packet, text or binary, is sent straight back.

use std::sync::Arc;

use engineio_core::config::EngineIoConfig;
use engineio_core::handler::EngineIoHandler;
use engineio_core::service::EngineIoService;
use engineio_core::socket::{DisconnectReason, Socket};
use hyper::service::make_service_fn;
use hyper::Server;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct EchoHandler;

impl EngineIoHandler for EchoHandler {
    type Data = ();

    fn on_connect(&self, socket: Arc<Socket<()>>) {
        debug!("[sid={}] socket connect", socket.id);
    }

    fn on_disconnect(&self, socket: Arc<Socket<()>>, reason: DisconnectReason) {
        debug!("[sid={}] socket disconnect: {}", socket.id, reason);
    }

    fn on_message(&self, msg: String, socket: Arc<Socket<()>>) {
        debug!("[sid={}] message: {:?}", socket.id, msg);
        socket.emit(msg).ok();
    }

    fn on_binary(&self, data: Vec<u8>, socket: Arc<Socket<()>>) {
        debug!("[sid={}] binary: {} bytes", socket.id, data.len());
        socket.emit_binary(data).ok();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineIoConfig::from_env()?;
    let svc = EngineIoService::with_config(EchoHandler, config);

    let addr = ([127, 0, 0, 1], 3000).into();
    info!("starting engine.io echo server on {addr}");
    Server::bind(&addr)
        .serve(make_service_fn(move |_| {
            let svc = svc.clone();
            async move { Ok::<_, std::convert::Infallible>(svc) }
        }))
        .await?;
    Ok(())
}

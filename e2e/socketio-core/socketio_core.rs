//! Echo server for driving `socketio-core` with the reference Socket.IO
//! test-suite: `message` events (binary included) come back as
//! `message-back`, and `message-with-ack` echoes through the ack.

use serde_json::Value;
use socketio_core::{NamespaceBuilder, SocketIo};
use hyper::service::make_service_fn;
use hyper::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (svc, io) = SocketIo::builder()
        .with_config(socketio_core::SocketIoConfig::from_env()?)
        .build_svc();

    io.ns(
        "/",
        NamespaceBuilder::new()
            .on("message", |socket, data, bin, _| async move {
                if bin.is_empty() {
                    socket.emit("message-back", data).ok();
                } else {
                    socket.bin(bin).emit("message-back", data).ok();
                }
            })
            .on("message-with-ack", |_, data: Value, bin, ack| async move {
                if let Some(ack) = ack {
                    if bin.is_empty() {
                        ack.send(data).ok();
                    } else {
                        ack.bin(bin).send(data).ok();
                    }
                }
            })
            .on_disconnect(|socket, reason| async move {
                info!("[nsid={}] disconnected: {}", socket.id, reason);
            }),
    );

    let addr = ([127, 0, 0, 1], 3000).into();
    info!("starting socket.io echo server on {addr}");
    Server::bind(&addr)
        .serve(make_service_fn(move |_| {
            let svc = svc.clone();
            async move { Ok::<_, std::convert::Infallible>(svc) }
        }))
        .await?;
    Ok(())
}

//! An [Engine.IO v4](https://socket.io/docs/v4/engine-io-protocol/) server
//! protocol engine, exposed as a [`tower::Service`].
//!
//! The engine owns the session registry, the heartbeat, the long-polling and
//! websocket transports and the polling→websocket upgrade. Everything above
//! the MESSAGE packets — i.e. the whole Socket.IO layer — plugs in through
//! the [`EngineIoHandler`] trait.

pub mod body;
pub mod config;
pub mod errors;
pub mod handler;
pub mod packet;
pub mod service;
pub mod sid;
pub mod socket;
pub mod transport;

mod engine;
mod futures;

pub use config::EngineIoConfig;
pub use handler::EngineIoHandler;
pub use service::EngineIoService;
pub use sid::Sid;
pub use socket::{DisconnectReason, PeerInfo, Socket};
pub use transport::TransportType;

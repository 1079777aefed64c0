//! A [Socket.IO v5](https://socket.io/docs/v4/socket-io-protocol/) server
//! protocol engine layered over [`engineio_core`].
//!
//! Namespaces are registered up front with a [`NamespaceBuilder`] carrying
//! their event handler table and connect/disconnect hooks. Rooms and
//! broadcasts fan out through a pluggable [`channel::ChannelLayer`]; the
//! default [`channel::LocalChannelLayer`] covers single-process deployments.

pub mod channel;
pub mod config;
pub mod errors;
pub mod handler;
pub mod ns;
pub mod operators;
pub mod packet;
pub mod socket;

mod client;
mod io;

pub use config::SocketIoConfig;
pub use handler::{AckSender, ConnectRefusal};
pub use io::{SocketIo, SocketIoBuilder, SocketIoService};
pub use ns::NamespaceBuilder;
pub use operators::{Operators, RoomParam};
pub use socket::{AckResponse, DisconnectReason, Socket};

pub use engineio_core::{PeerInfo, Sid, TransportType};

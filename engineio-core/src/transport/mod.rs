use std::fmt;
use std::str::FromStr;

use crate::errors::Error;

pub mod polling;
pub mod ws;

/// The byte carrier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Polling,
    Websocket,
}

impl FromStr for TransportType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(TransportType::Polling),
            "websocket" => Ok(TransportType::Websocket),
            _ => Err(Error::UnknownTransport),
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Polling => f.write_str("polling"),
            TransportType::Websocket => f.write_str("websocket"),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::config::EngineIoConfig;
use crate::errors::Error;
use crate::sid::Sid;
use crate::transport::TransportType;

/// An Engine.IO v4 packet.
///
/// The string framing is `<type digit><payload>`. Binary message payloads
/// have no type digit: they travel as raw websocket binary frames, or as
/// `b<base64>` records inside a polling payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Open(OpenPacket),
    Close,
    Ping,
    Pong,
    /// `2probe`, sent by the client over the new websocket during upgrade.
    PingProbe,
    /// `3probe`, the server's reply to a probe ping.
    PongProbe,
    Message(String),
    Binary(Vec<u8>),
    Upgrade,
    Noop,
}

impl Packet {
    /// Approximate encoded size, used to cap polling batches.
    pub(crate) fn size_hint(&self) -> usize {
        match self {
            Packet::Open(_) => 156,
            Packet::Message(msg) => 1 + msg.len(),
            // encoded as `b` + base64
            Packet::Binary(data) => 1 + (data.len() * 4 + 2) / 3,
            Packet::PingProbe | Packet::PongProbe => 6,
            _ => 1,
        }
    }
}

impl TryFrom<Packet> for String {
    type Error = Error;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        let encoded = match packet {
            Packet::Open(open) => {
                let mut s = String::from("0");
                s.push_str(&serde_json::to_string(&open)?);
                s
            }
            Packet::Close => "1".into(),
            Packet::Ping => "2".into(),
            Packet::Pong => "3".into(),
            Packet::PingProbe => "2probe".into(),
            Packet::PongProbe => "3probe".into(),
            Packet::Message(msg) => {
                let mut s = String::with_capacity(msg.len() + 1);
                s.push('4');
                s.push_str(&msg);
                s
            }
            Packet::Upgrade => "5".into(),
            Packet::Noop => "6".into(),
            // binary payloads are framed by the transport, not here
            Packet::Binary(_) => return Err(Error::InvalidPacketPayload),
        };
        Ok(encoded)
    }
}

impl TryFrom<&str> for Packet {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let packet_type = chars.next().ok_or(Error::UnknownPacketType(None))?;
        let payload = chars.as_str();
        let packet = match packet_type {
            '0' => Packet::Open(serde_json::from_str(payload)?),
            '1' => Packet::Close,
            '2' if payload == "probe" => Packet::PingProbe,
            '2' if payload.is_empty() => Packet::Ping,
            '3' if payload == "probe" => Packet::PongProbe,
            '3' if payload.is_empty() => Packet::Pong,
            '4' => Packet::Message(payload.to_string()),
            '5' if payload.is_empty() => Packet::Upgrade,
            '6' if payload.is_empty() => Packet::Noop,
            '2' | '3' | '5' | '6' => return Err(Error::InvalidPacketPayload),
            c => return Err(Error::UnknownPacketType(Some(c))),
        };
        Ok(packet)
    }
}

/// Payload of the OPEN packet sent as the first packet of every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: Sid,
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub max_payload: u64,
}

impl OpenPacket {
    pub(crate) fn new(transport: TransportType, sid: Sid, config: &EngineIoConfig) -> Self {
        // a websocket-origin session has nowhere left to upgrade to
        let upgrades = match transport {
            TransportType::Polling => vec!["websocket".to_string()],
            TransportType::Websocket => vec![],
        };
        OpenPacket {
            sid,
            upgrades,
            ping_interval: config.ping_interval.as_millis() as u64,
            ping_timeout: config.ping_timeout.as_millis() as u64,
            max_payload: config.max_payload,
        }
    }
}

//! The Socket.IO packet codec.
//!
//! Textual grammar: `<type digit>[<n>-][/<namespace>,][<ack id>][<json>]`.
//! The whole frame travels as the payload of an Engine.IO MESSAGE packet;
//! binary attachments follow as raw binary MESSAGE packets, exactly
//! `<n>` of them, with `{"_placeholder":true,"num":i}` markers inside the
//! json telling the peer where each buffer belongs.

use serde_json::{json, Value};

use engineio_core::Sid;

use crate::errors::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Namespace the packet belongs to, `"/"` by default.
    pub ns: String,
    pub inner: PacketData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PacketData {
    /// Client → server with an optional auth object; server → client with the
    /// `{"sid": …}` handshake reply.
    Connect(Option<Value>),
    Disconnect,
    /// Event name, argument array (event name excluded) and optional ack id.
    Event(String, Value, Option<u64>),
    /// Acknowledgement for an event the server emitted.
    EventAck(Value, u64),
    ConnectError(Value),
    BinaryEvent(String, BinaryPayload, Option<u64>),
    BinaryAck(BinaryPayload, u64),
}

impl Packet {
    pub(crate) fn connect(ns: &str, nsid: Sid) -> Self {
        Self {
            ns: ns.to_string(),
            inner: PacketData::Connect(Some(json!({ "sid": nsid }))),
        }
    }

    pub(crate) fn connect_error(ns: &str, message: &str) -> Self {
        Self {
            ns: ns.to_string(),
            inner: PacketData::ConnectError(json!({ "message": message })),
        }
    }

    pub(crate) fn disconnect(ns: &str) -> Self {
        Self {
            ns: ns.to_string(),
            inner: PacketData::Disconnect,
        }
    }

    pub fn event(ns: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            ns: ns.into(),
            inner: PacketData::Event(event.into(), data, None),
        }
    }

    pub fn bin_event(
        ns: impl Into<String>,
        event: impl Into<String>,
        data: Value,
        bin: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            ns: ns.into(),
            inner: PacketData::BinaryEvent(event.into(), BinaryPayload::outgoing(data, bin), None),
        }
    }

    pub(crate) fn ack(ns: &str, data: Value, ack_id: u64) -> Self {
        Self {
            ns: ns.to_string(),
            inner: PacketData::EventAck(data, ack_id),
        }
    }

    pub(crate) fn bin_ack(ns: &str, data: Value, bin: Vec<Vec<u8>>, ack_id: u64) -> Self {
        Self {
            ns: ns.to_string(),
            inner: PacketData::BinaryAck(BinaryPayload::outgoing(data, bin), ack_id),
        }
    }

    /// Stamps an ack id on an EVENT/BINARY_EVENT before sending it.
    pub(crate) fn set_ack_id(&mut self, id: u64) {
        match &mut self.inner {
            PacketData::Event(_, _, ack) | PacketData::BinaryEvent(_, _, ack) => *ack = Some(id),
            _ => (),
        }
    }

    /// Binary attachments to send right after the textual frame.
    pub(crate) fn take_attachments(&mut self) -> Vec<Vec<u8>> {
        match &mut self.inner {
            PacketData::BinaryEvent(_, payload, _) | PacketData::BinaryAck(payload, _) => {
                std::mem::take(&mut payload.bin)
            }
            _ => Vec::new(),
        }
    }
}

/// The json arguments of a binary packet together with its attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryPayload {
    /// Argument array, placeholder markers left in place.
    pub data: Value,
    /// Attachments in placeholder index order.
    pub bin: Vec<Vec<u8>>,
    /// Declared attachment count.
    pub expected: usize,
}

impl BinaryPayload {
    /// A freshly decoded header waiting for `expected` attachments.
    pub(crate) fn incoming(data: Value, expected: usize) -> Self {
        Self {
            data,
            bin: Vec::with_capacity(expected),
            expected,
        }
    }

    /// An outgoing payload. Data that does not already carry placeholder
    /// markers (it does when echoing a decoded event) gets one appended per
    /// attachment.
    pub(crate) fn outgoing(data: Value, bin: Vec<Vec<u8>>) -> Self {
        let mut args = match data {
            Value::Array(args) => args,
            Value::Null => vec![],
            v => vec![v],
        };
        let expected = bin.len();
        if !args.iter().any(contains_placeholder) {
            for num in 0..expected {
                args.push(json!({ "_placeholder": true, "num": num }));
            }
        }
        Self {
            data: Value::Array(args),
            bin,
            expected,
        }
    }

    pub(crate) fn add_payload(&mut self, data: Vec<u8>) {
        self.bin.push(data);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.bin.len() == self.expected
    }

    /// Walks the argument tree and checks that every placeholder marker is
    /// well formed and references a received attachment.
    pub(crate) fn validate_placeholders(&self) -> Result<(), Error> {
        validate(&self.data, self.expected)
    }
}

fn validate(value: &Value, expected: usize) -> Result<(), Error> {
    match value {
        Value::Object(map) => {
            if map.contains_key("_placeholder") {
                let marker = map.get("_placeholder").and_then(Value::as_bool);
                let num = map.get("num").and_then(Value::as_u64);
                match (marker, num) {
                    (Some(true), Some(num)) if (num as usize) < expected => Ok(()),
                    _ => Err(Error::InvalidPlaceholder),
                }
            } else {
                map.values().try_for_each(|v| validate(v, expected))
            }
        }
        Value::Array(items) => items.iter().try_for_each(|v| validate(v, expected)),
        _ => Ok(()),
    }
}

fn contains_placeholder(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key("_placeholder") || map.values().any(contains_placeholder)
        }
        Value::Array(items) => items.iter().any(contains_placeholder),
        _ => false,
    }
}

impl PacketData {
    fn type_digit(&self) -> char {
        match self {
            PacketData::Connect(_) => '0',
            PacketData::Disconnect => '1',
            PacketData::Event(..) => '2',
            PacketData::EventAck(..) => '3',
            PacketData::ConnectError(_) => '4',
            PacketData::BinaryEvent(..) => '5',
            PacketData::BinaryAck(..) => '6',
        }
    }
}

impl TryFrom<Packet> for String {
    type Error = serde_json::Error;

    fn try_from(packet: Packet) -> Result<Self, Self::Error> {
        let mut out = String::new();
        out.push(packet.inner.type_digit());

        match &packet.inner {
            PacketData::BinaryEvent(_, payload, _) | PacketData::BinaryAck(payload, _) => {
                out.push_str(&payload.expected.to_string());
                out.push('-');
            }
            _ => (),
        }

        if packet.ns != "/" {
            out.push_str(&packet.ns);
            out.push(',');
        }

        match packet.inner {
            PacketData::Connect(Some(data)) => out.push_str(&serde_json::to_string(&data)?),
            PacketData::Connect(None) | PacketData::Disconnect => (),
            PacketData::Event(event, data, ack) => {
                if let Some(ack) = ack {
                    out.push_str(&ack.to_string());
                }
                let args = prepend_event(event, data);
                out.push_str(&serde_json::to_string(&args)?);
            }
            PacketData::EventAck(data, ack) => {
                out.push_str(&ack.to_string());
                out.push_str(&serde_json::to_string(&as_array(data))?);
            }
            PacketData::ConnectError(data) => out.push_str(&serde_json::to_string(&data)?),
            PacketData::BinaryEvent(event, payload, ack) => {
                if let Some(ack) = ack {
                    out.push_str(&ack.to_string());
                }
                let args = prepend_event(event, payload.data);
                out.push_str(&serde_json::to_string(&args)?);
            }
            PacketData::BinaryAck(payload, ack) => {
                out.push_str(&ack.to_string());
                out.push_str(&serde_json::to_string(&as_array(payload.data))?);
            }
        }
        Ok(out)
    }
}

fn prepend_event(event: String, data: Value) -> Value {
    let mut args = match data {
        Value::Array(args) => args,
        Value::Null => vec![],
        v => vec![v],
    };
    args.insert(0, Value::String(event));
    Value::Array(args)
}

fn as_array(data: Value) -> Value {
    match data {
        Value::Array(_) => data,
        Value::Null => json!([]),
        v => json!([v]),
    }
}

impl TryFrom<&str> for Packet {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        let type_char = chars.next().ok_or(Error::UnknownPacketType(None))?;
        let mut rest = chars.as_str();

        // attachment count, only on the binary variants, always `<n>-`
        let attachments = if type_char == '5' || type_char == '6' {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let (digits, after) = rest.split_at(end);
            if digits.is_empty() || !after.starts_with('-') {
                return Err(Error::InvalidAttachmentCount);
            }
            let n: usize = digits.parse().map_err(|_| Error::InvalidAttachmentCount)?;
            if n == 0 {
                return Err(Error::InvalidAttachmentCount);
            }
            rest = &after[1..];
            n
        } else {
            0
        };

        // a namespace is present iff the next byte is '/'
        let ns = if rest.starts_with('/') {
            match rest.find(',') {
                Some(i) => {
                    let ns = rest[..i].to_string();
                    rest = &rest[i + 1..];
                    ns
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            "/".to_string()
        };

        // the ack id is every digit up to the json payload
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = if end > 0 {
            let (digits, after) = rest.split_at(end);
            let id = digits.parse().map_err(|_| Error::InvalidAckId)?;
            rest = after;
            Some(id)
        } else {
            None
        };

        let inner = match type_char {
            '0' => {
                if ack_id.is_some() {
                    return Err(Error::InvalidPayload);
                }
                if rest.is_empty() {
                    PacketData::Connect(None)
                } else {
                    let auth: Value = serde_json::from_str(rest)?;
                    if !auth.is_object() {
                        return Err(Error::InvalidPayload);
                    }
                    PacketData::Connect(Some(auth))
                }
            }
            '1' => {
                if !rest.is_empty() || ack_id.is_some() {
                    return Err(Error::InvalidPayload);
                }
                PacketData::Disconnect
            }
            '2' => {
                let (event, data) = parse_event_payload(rest)?;
                PacketData::Event(event, data, ack_id)
            }
            '3' => PacketData::EventAck(
                parse_ack_payload(rest)?,
                ack_id.ok_or(Error::InvalidAckId)?,
            ),
            '4' => {
                if rest.is_empty() || ack_id.is_some() {
                    return Err(Error::InvalidPayload);
                }
                PacketData::ConnectError(serde_json::from_str(rest)?)
            }
            '5' => {
                let (event, data) = parse_event_payload(rest)?;
                PacketData::BinaryEvent(event, BinaryPayload::incoming(data, attachments), ack_id)
            }
            '6' => PacketData::BinaryAck(
                BinaryPayload::incoming(parse_ack_payload(rest)?, attachments),
                ack_id.ok_or(Error::InvalidAckId)?,
            ),
            c => return Err(Error::UnknownPacketType(Some(c))),
        };
        Ok(Packet { ns, inner })
    }
}

/// EVENT payloads are a json array whose first element is the event name.
fn parse_event_payload(raw: &str) -> Result<(String, Value), Error> {
    let value: Value = serde_json::from_str(raw).map_err(|_| Error::InvalidEventPayload)?;
    match value {
        Value::Array(mut args) if !args.is_empty() => match args.remove(0) {
            Value::String(event) => Ok((event, Value::Array(args))),
            _ => Err(Error::InvalidEventPayload),
        },
        _ => Err(Error::InvalidEventPayload),
    }
}

/// ACK payloads are a json array of reply arguments.
fn parse_ack_payload(raw: &str) -> Result<Value, Error> {
    let value: Value = serde_json::from_str(raw).map_err(|_| Error::InvalidPayload)?;
    if !value.is_array() {
        return Err(Error::InvalidPayload);
    }
    Ok(value)
}

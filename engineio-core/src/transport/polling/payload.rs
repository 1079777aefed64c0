//! Polling payload codec.
//!
//! A payload is a sequence of packets separated by the record separator
//! `0x1E`. Binary packets cannot travel raw over http, so they are framed as
//! `b<base64>` records.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::errors::Error;
use crate::packet::Packet;

pub(crate) const PACKET_SEPARATOR: char = '\x1e';

pub(crate) fn encode(packets: Vec<Packet>) -> Result<String, Error> {
    let mut out = String::new();
    for packet in packets {
        if !out.is_empty() {
            out.push(PACKET_SEPARATOR);
        }
        match packet {
            Packet::Binary(data) => {
                out.push('b');
                BASE64.encode_string(&data, &mut out);
            }
            packet => out.push_str(&String::try_from(packet)?),
        }
    }
    Ok(out)
}

pub(crate) fn decode(body: &[u8], max_payload: u64) -> Result<Vec<Packet>, Error> {
    if body.len() as u64 > max_payload {
        return Err(Error::PayloadTooLarge(max_payload));
    }
    let body = std::str::from_utf8(body)?;
    body.split(PACKET_SEPARATOR)
        .map(|record| match record.strip_prefix('b') {
            Some(b64) => Ok(Packet::Binary(BASE64.decode(b64)?)),
            None => Packet::try_from(record),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_single_packet_has_no_separator() {
        let out = encode(vec![Packet::Ping]).unwrap();
        assert_eq!(out, "2");
    }

    #[test]
    fn encode_joins_packets_with_the_separator() {
        let out = encode(vec![
            Packet::Message("hello".into()),
            Packet::Noop,
            Packet::Message("world".into()),
        ])
        .unwrap();
        assert_eq!(out, "4hello\x1e6\x1e4world");
    }

    #[test]
    fn encode_frames_binary_as_base64() {
        let out = encode(vec![
            Packet::Message("msg".into()),
            Packet::Binary(vec![1, 2, 3, 4]),
        ])
        .unwrap();
        assert_eq!(out, "4msg\x1ebAQIDBA==");
    }

    #[test]
    fn decode_splits_records() {
        let packets = decode(b"4hello\x1e3\x1e4world", 1_000_000).unwrap();
        assert_eq!(
            packets,
            vec![
                Packet::Message("hello".into()),
                Packet::Pong,
                Packet::Message("world".into()),
            ]
        );
    }

    #[test]
    fn decode_base64_record() {
        let packets = decode(b"bAQIDBA==", 1_000_000).unwrap();
        assert_eq!(packets, vec![Packet::Binary(vec![1, 2, 3, 4])]);
    }

    #[test]
    fn decode_roundtrips_encode() {
        let original = vec![
            Packet::Message("a".into()),
            Packet::Binary(vec![0, 255, 128]),
            Packet::Close,
        ];
        let encoded = encode(original.clone()).unwrap();
        assert_eq!(decode(encoded.as_bytes(), 1_000_000).unwrap(), original);
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        assert!(matches!(
            decode(&[b'4'; 64], 8),
            Err(Error::PayloadTooLarge(8))
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert!(matches!(
            decode(&[b'4', 0xff, 0xfe], 1_000_000),
            Err(Error::Utf8(_))
        ));
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(matches!(
            decode(b"bnot-base64!", 1_000_000),
            Err(Error::Base64(_))
        ));
    }

    #[test]
    fn decode_rejects_garbage_record() {
        assert!(decode(b"4ok\x1ezzz", 1_000_000).is_err());
    }
}

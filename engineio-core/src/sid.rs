//! Url-safe session identifiers handed out at handshake time.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Length of the encoded form: 16 random bytes in unpadded base64url.
const SID_LEN: usize = 22;

/// An Engine.IO session id.
///
/// Generated from 16 random bytes, so collisions over the lifetime of a
/// process are not a practical concern. The encoded form is URL-safe and is
/// used verbatim in the `sid` query parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sid([u8; SID_LEN]);

impl Sid {
    pub fn new() -> Self {
        let mut raw = [0u8; 16];
        rand::thread_rng().fill(&mut raw);
        let mut id = [0u8; SID_LEN];
        // 16 bytes always encode to exactly 22 base64url chars
        URL_SAFE_NO_PAD
            .encode_slice(raw, &mut id)
            .expect("sid buffer sized for 16 input bytes");
        Sid(id)
    }

    pub fn as_str(&self) -> &str {
        // only produced from base64url output, which is ascii
        std::str::from_utf8(&self.0).unwrap()
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

/// The string was not a valid session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSid;

impl fmt::Display for InvalidSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid session id")
    }
}
impl std::error::Error for InvalidSid {}

impl FromStr for Sid {
    type Err = InvalidSid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != SID_LEN {
            return Err(InvalidSid);
        }
        let valid = bytes
            .iter()
            .all(|c| c.is_ascii_alphanumeric() || *c == b'-' || *c == b'_');
        if !valid {
            return Err(InvalidSid);
        }
        let mut id = [0u8; SID_LEN];
        id.copy_from_slice(bytes);
        Ok(Sid(id))
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Sid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Sid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <&str>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_shape() {
        let sid = Sid::new();
        assert_eq!(sid.as_str().len(), SID_LEN);
        assert!(sid
            .as_str()
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
    }

    #[test]
    fn sid_roundtrip() {
        let sid = Sid::new();
        let parsed: Sid = sid.as_str().parse().unwrap();
        assert_eq!(sid, parsed);
    }

    #[test]
    fn sid_uniqueness() {
        let a = Sid::new();
        let b = Sid::new();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed() {
        assert!("too-short".parse::<Sid>().is_err());
        assert!("invalid/chars+in!the~sid".parse::<Sid>().is_err());
        assert!("".parse::<Sid>().is_err());
    }

    #[test]
    fn serde_string_form() {
        let sid = Sid::new();
        let json = serde_json::to_string(&sid).unwrap();
        assert_eq!(json, format!("\"{sid}\""));
        let back: Sid = serde_json::from_str(&json).unwrap();
        assert_eq!(sid, back);
    }
}

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling service errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("room {0} is full")]
    RoomFull(RoomId),

    #[error("unknown target: {0}")]
    UnknownTarget(ConnId),

    #[error("internal error: {0}")]
    Internal(String),
}

const ROOM_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ROOM_ID_LEN: usize = 17;
const CONN_ID_LEN: usize = 21;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Room id: 17-byte fixed array ("room_" + 12 random chars).
///
/// Generated ids carry no information about the members; the id a client
/// supplies on a direct room join is kept as-is (truncated to capacity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId {
    bytes: [u8; ROOM_ID_LEN],
    len: u8,
}

impl RoomId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ROOM_ID_LEN];
        bytes[..5].copy_from_slice(b"room_");

        let mut rng = rand::rng();
        for byte in &mut bytes[5..] {
            *byte = ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())];
        }
        Self {
            bytes,
            len: ROOM_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        let mut bytes = [0u8; ROOM_ID_LEN];
        let src = s.as_bytes();
        let len = src.len().min(ROOM_ID_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <&str>::deserialize(deserializer)?;
        Ok(RoomId::from(s))
    }
}

/// Connection id: 21-byte fixed array ("conn_" + 16 hex).
///
/// A duplicate generated id is treated as fatal by the registry, so the id
/// draws a full 64 random bits to keep that outcome out of reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    bytes: [u8; CONN_ID_LEN],
    len: u8,
}

impl ConnId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CONN_ID_LEN];
        bytes[..5].copy_from_slice(b"conn_");

        let mut rng = rand::rng();
        let value: u64 = rng.random();

        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[5 + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CONN_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ConnId {
    fn from(s: &str) -> Self {
        let mut bytes = [0u8; CONN_ID_LEN];
        let src = s.as_bytes();
        let len = src.len().min(CONN_ID_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Serialize for ConnId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <&str>::deserialize(deserializer)?;
        Ok(ConnId::from(s))
    }
}

/// Claimed user info carried with a matchmaking request.
///
/// The email is optional: anonymous users queue too, and the pool then
/// falls back to the connection id as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub email: Option<String>,
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

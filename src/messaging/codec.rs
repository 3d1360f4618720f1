//! # Serialization Codec
//!
//! Pure payload-to-bytes conversion shared by producer and consumer.
//! Text encodes as UTF-8, structured values as canonical JSON, raw bytes
//! pass through unchanged. Nothing here touches the network.

use serde_json::Value;

use super::errors::{MessagingError, MessagingResult};

/// Application payload as accepted by the broker client.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    /// JSON array or object. Scalar JSON values are rejected by
    /// [`serialize`], matching the set of payload shapes the services
    /// exchange.
    Structured(Value),
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(value)
    }
}

/// Encode a payload to wire bytes.
///
/// Text becomes UTF-8, arrays and objects become JSON, bytes pass through.
/// Scalar `Structured` values fail with a `Serialization` error carrying a
/// rendering of the offending payload.
pub fn serialize(payload: &Payload) -> MessagingResult<Vec<u8>> {
    match payload {
        Payload::Text(text) => Ok(text.as_bytes().to_vec()),
        Payload::Bytes(bytes) => Ok(bytes.clone()),
        Payload::Structured(value) if value.is_array() || value.is_object() => {
            serde_json::to_vec(value)
                .map_err(|e| MessagingError::serialization(format!("{value}: {e}")))
        }
        Payload::Structured(other) => Err(MessagingError::serialization(other.to_string())),
    }
}

/// Decode wire bytes into a payload.
///
/// JSON bodies decode to `Structured`; anything else that is valid UTF-8
/// decodes to `Text`, so `deserialize(serialize(p)) == p` holds for plain
/// text as well as structured payloads. Text that happens to parse as JSON
/// (e.g. `"true"`) comes back `Structured`. Bytes that are neither JSON nor
/// UTF-8 fail with a `Deserialization` error carrying the offending bytes.
pub fn deserialize(bytes: &[u8]) -> MessagingResult<Payload> {
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return Ok(Payload::Structured(value));
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Payload::Text(text.to_string())),
        Err(e) => Err(MessagingError::deserialization(
            e.to_string(),
            bytes.to_vec(),
        )),
    }
}

/// Strict JSON decode, used by the RPC paths where the body must be a
/// JSON envelope.
pub fn deserialize_value(bytes: &[u8]) -> MessagingResult<Value> {
    serde_json::from_slice(bytes)
        .map_err(|e| MessagingError::deserialization(e.to_string(), bytes.to_vec()))
}

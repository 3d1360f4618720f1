//! RPC envelope convention carried over the broker.
//!
//! Requests travel as `{"message": .., "correlation_id": ..}` and
//! responses as `{"response": .., "correlation_id": ..}`, both JSON.
//! Parsing is tolerant: a JSON body without a correlation id is a skip,
//! not an error, so one malformed request can never stop a responder loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::codec;
use super::errors::MessagingResult;

/// Outgoing RPC request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub message: Value,
    pub correlation_id: String,
}

impl RpcRequest {
    /// Wrap a message with a fresh correlation id.
    pub fn new(message: Value) -> Self {
        Self {
            message,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }
}

/// RPC response envelope, correlated to the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub response: Value,
    pub correlation_id: String,
}

impl RpcResponse {
    pub fn new(response: Value, correlation_id: impl Into<String>) -> Self {
        Self {
            response,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(Into::into)
    }
}

/// Parse a request envelope. `Ok(None)` means the body was valid JSON but
/// carried no correlation id.
pub fn parse_request(bytes: &[u8]) -> MessagingResult<Option<RpcRequest>> {
    let value = codec::deserialize_value(bytes)?;
    let Some(correlation_id) = value.get("correlation_id").and_then(Value::as_str) else {
        return Ok(None);
    };
    let message = value.get("message").cloned().unwrap_or(Value::Null);
    Ok(Some(RpcRequest {
        message,
        correlation_id: correlation_id.to_string(),
    }))
}

/// Parse a response envelope. `Ok(None)` means the body was valid JSON but
/// carried no correlation id.
pub fn parse_response(bytes: &[u8]) -> MessagingResult<Option<RpcResponse>> {
    let value = codec::deserialize_value(bytes)?;
    let Some(correlation_id) = value.get("correlation_id").and_then(Value::as_str) else {
        return Ok(None);
    };
    let response = value.get("response").cloned().unwrap_or(Value::Null);
    Ok(Some(RpcResponse {
        response,
        correlation_id: correlation_id.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_round_trip() {
        let request = RpcRequest::new(json!({"id": 42}));
        let bytes = request.to_bytes().unwrap();
        let parsed = parse_request(&bytes).unwrap().unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_response_round_trip() {
        let response = RpcResponse::new(json!({"status": "ok"}), "abc-123");
        let bytes = response.to_bytes().unwrap();
        let parsed = parse_response(&bytes).unwrap().unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_fresh_correlation_ids_are_unique() {
        let a = RpcRequest::new(json!(["x"]));
        let b = RpcRequest::new(json!(["x"]));
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn test_missing_correlation_id_is_a_skip() {
        let bytes = serde_json::to_vec(&json!({"message": {"id": 1}})).unwrap();
        assert!(parse_request(&bytes).unwrap().is_none());
        assert!(parse_response(&bytes).unwrap().is_none());
    }

    #[test]
    fn test_missing_message_defaults_to_null() {
        let bytes = serde_json::to_vec(&json!({"correlation_id": "abc"})).unwrap();
        let parsed = parse_request(&bytes).unwrap().unwrap();
        assert_eq!(parsed.message, Value::Null);
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        assert!(parse_request(b"{not json").is_err());
        assert!(parse_response(b"\xff\xfe").is_err());
    }
}

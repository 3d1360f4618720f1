//! # Messaging Error Types
//!
//! Structured error handling for the messaging layer using thiserror.
//! Handler failures and RPC timeouts are deliberately absent: the former
//! are recovered locally by the consumer's retry budget, the latter are a
//! sentinel (`None`) on the request path, not an error.

use thiserror::Error;

/// Messaging error taxonomy.
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Serialization failed for payload: {payload}")]
    Serialization { payload: String },

    #[error("Deserialization failed: {detail}")]
    Deserialization { detail: String, bytes: Vec<u8> },

    #[error("Broker connection error: {message}")]
    BrokerConnection { message: String },

    #[error("Publish to topic {topic} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscribe failed: {message}")]
    Subscribe { message: String },

    #[error("Consume failed: {message}")]
    Consume { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create a serialization error carrying a rendering of the offending payload
    pub fn serialization(payload: impl Into<String>) -> Self {
        Self::Serialization {
            payload: payload.into(),
        }
    }

    /// Create a deserialization error carrying the offending bytes
    pub fn deserialization(detail: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Deserialization {
            detail: detail.into(),
            bytes,
        }
    }

    /// Create a broker connection error
    pub fn broker_connection(message: impl Into<String>) -> Self {
        Self::BrokerConnection {
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a subscribe error
    pub fn subscribe(message: impl Into<String>) -> Self {
        Self::Subscribe {
            message: message.into(),
        }
    }

    /// Create a consume error
    pub fn consume(message: impl Into<String>) -> Self {
        Self::Consume {
            message: message.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            MessagingError::deserialization(err.to_string(), Vec::new())
        } else {
            MessagingError::serialization(err.to_string())
        }
    }
}

/// Conversion from rdkafka errors to MessagingError
impl From<rdkafka::error::KafkaError> for MessagingError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        MessagingError::broker_connection(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

//! # Messaging Module
//!
//! Kafka-backed messaging for the user and order services: an
//! at-least-once producer/consumer pair, transactional publish, and an
//! RPC-over-stream pattern built on correlation identifiers.

pub mod codec;
pub mod consumer;
pub mod envelope;
pub mod errors;
pub mod producer;

pub use codec::{deserialize, deserialize_value, serialize, Payload};
pub use consumer::{Delivery, HandlerError, KafkaConsumer};
pub use envelope::{RpcRequest, RpcResponse};
pub use errors::{MessagingError, MessagingResult};
pub use producer::{KafkaProducer, PendingResponses, TxOutcome};

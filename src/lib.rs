#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Courier Core
//!
//! Asynchronous messaging and resilient-scheduling core shared by the user
//! and order services.
//!
//! ## Overview
//!
//! Courier Core wraps the Kafka client surface both services depend on:
//! an at-least-once producer/consumer pair, transactional publish, and an
//! RPC-over-stream pattern built on correlation identifiers. Around that
//! sit two scheduling primitives used to drive background work: a
//! bounded-concurrency runner and a self-healing periodic task.
//!
//! ## Module Organization
//!
//! - [`messaging`] - Kafka producer/consumer, codec, RPC envelopes
//! - [`resilience`] - Bounded-concurrency runner and periodic scheduler
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_core::{CourierConfig, KafkaProducer, Payload};
//!
//! # async fn example() -> courier_core::Result<()> {
//! let config = CourierConfig::from_env()?;
//! let mut producer = KafkaProducer::new(config);
//! producer.connect().await?;
//! producer.publish(&Payload::from("order placed"), "orders").await?;
//! producer.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery Semantics
//!
//! The consumer commits offsets only after a handler succeeds, so delivery
//! is at-least-once and idempotency is left to the caller. Transactional
//! publish guarantees exactly one of commit/abort per call; it does not
//! extend exactly-once semantics to consumers.

pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod resilience;

pub use config::{AckMode, CourierConfig};
pub use error::{CourierError, Result};
pub use messaging::{
    Delivery, HandlerError, KafkaConsumer, KafkaProducer, MessagingError, MessagingResult,
    Payload, PendingResponses, RpcRequest, RpcResponse, TxOutcome,
};
pub use resilience::{
    bounded_gather, schedule, try_bounded_gather, JobError, SchedulerError, SchedulerPolicy,
};

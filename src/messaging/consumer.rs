//! # Kafka Consumer
//!
//! Consuming side of the messaging layer: an at-least-once delivery loop
//! with a bounded per-message retry budget, the responder half of the
//! RPC-over-stream pattern, and the loop that feeds correlated responses
//! back into a producer's pending map.
//!
//! Offsets are committed only after a handler succeeds. A message whose
//! retry budget is exhausted is logged and left uncommitted; the loop
//! moves on (dead-lettering is an extension point, not built here).

use std::future::Future;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::ClientConfig;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::CourierConfig;

use super::envelope::{self, RpcResponse};
use super::errors::{MessagingError, MessagingResult};
use super::producer::{KafkaProducer, PendingResponses};

/// Fixed delay between redelivery attempts for a failing handler.
const RETRY_DELAY: Duration = Duration::from_millis(100);
/// Pause after a failed responder iteration before the next request.
const RESPONDER_DELAY: Duration = Duration::from_millis(100);

/// Error type produced by caller-supplied handlers. Handlers are black
/// boxes; anything they raise is recovered by the retry budget, never
/// re-raised into the broker client.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// One inbound message as seen by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Kafka consumer with bounded per-message retry and RPC responder support.
pub struct KafkaConsumer {
    config: CourierConfig,
    consumer: Option<StreamConsumer>,
}

impl KafkaConsumer {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            consumer: None,
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", self.config.bootstrap_servers());
        config.set("group.id", &self.config.group_id);
        // Offsets are committed explicitly, after the handler succeeds.
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        config
    }

    /// Open the broker session and subscribe to the configured topics.
    /// Idempotent; must precede any consume loop.
    pub async fn connect(&mut self) -> MessagingResult<()> {
        if self.consumer.is_some() {
            debug!("Consumer already connected");
            return Ok(());
        }

        let consumer: StreamConsumer = self.client_config().create().map_err(|e| {
            MessagingError::broker_connection(format!("Failed to create Kafka consumer: {e}"))
        })?;

        let topics: Vec<&str> = self.config.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics).map_err(|e| {
            MessagingError::subscribe(format!("Failed to subscribe to {topics:?}: {e}"))
        })?;

        info!(
            topics = ?self.config.topics,
            group_id = %self.config.group_id,
            "Connected Kafka consumer"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    /// Unsubscribe and close the session. Idempotent.
    pub async fn disconnect(&mut self) -> MessagingResult<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            info!("Disconnected Kafka consumer");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.consumer.is_some()
    }

    fn live(&self) -> MessagingResult<&StreamConsumer> {
        self.consumer
            .as_ref()
            .ok_or_else(|| MessagingError::broker_connection("Consumer is not connected"))
    }

    /// At-least-once delivery loop.
    ///
    /// Messages are handled one at a time in arrival order. A failing
    /// handler is retried against the same message up to the configured
    /// retry limit with a fixed short delay; on success the offset is
    /// committed, on exhaustion the message is dropped from this
    /// consumer's progress with one error log. Runs until the connection
    /// is lost or the process exits.
    pub async fn consume<F, Fut>(&self, handler: F) -> MessagingResult<()>
    where
        F: Fn(Delivery) -> Fut,
        Fut: Future<Output = Result<(), HandlerError>>,
    {
        let consumer = self.live()?;
        loop {
            let message = consumer
                .recv()
                .await
                .map_err(|e| MessagingError::consume(e.to_string()))?;
            let Some(delivery) = delivery_of(&message) else {
                warn!(topic = message.topic(), "Received message with no payload");
                continue;
            };

            if deliver_with_retry(&handler, &delivery, self.config.retry_limit).await {
                self.commit(consumer, &message);
            }
        }
    }

    /// RPC responder loop.
    ///
    /// Each inbound request envelope is answered by publishing a
    /// correlated response via the supplied producer on the topic the
    /// request arrived on. Requests without a correlation id are skipped
    /// with a warning; any handler or publish failure is logged and the
    /// loop continues after a short delay. A single bad request never
    /// stops the responder.
    pub async fn respond<F, Fut>(
        &self,
        handler: F,
        producer: &KafkaProducer,
    ) -> MessagingResult<()>
    where
        F: Fn(Value) -> Fut,
        Fut: Future<Output = Result<Value, HandlerError>>,
    {
        let consumer = self.live()?;
        loop {
            let message = consumer
                .recv()
                .await
                .map_err(|e| MessagingError::consume(e.to_string()))?;
            let Some(delivery) = delivery_of(&message) else {
                warn!(topic = message.topic(), "Received request with no payload");
                continue;
            };

            match answer_request(&handler, &delivery, producer).await {
                Ok(_answered) => self.commit(consumer, &message),
                Err(e) => {
                    error!(
                        topic = %delivery.topic,
                        offset = delivery.offset,
                        error = %e,
                        "RPC request handling failed"
                    );
                    tokio::time::sleep(RESPONDER_DELAY).await;
                }
            }
        }
    }

    /// Response-delivery loop: the external resolution path for
    /// [`KafkaProducer::request`].
    ///
    /// Parses each inbound response envelope and resolves it into the
    /// supplied pending map. Unknown or missing correlation ids and
    /// undecodable bodies are logged and dropped, never fatal.
    pub async fn deliver_responses(&self, pending: &PendingResponses) -> MessagingResult<()> {
        let consumer = self.live()?;
        loop {
            let message = consumer
                .recv()
                .await
                .map_err(|e| MessagingError::consume(e.to_string()))?;
            let Some(delivery) = delivery_of(&message) else {
                warn!(topic = message.topic(), "Received response with no payload");
                continue;
            };

            match envelope::parse_response(&delivery.payload) {
                Ok(Some(RpcResponse {
                    response,
                    correlation_id,
                })) => {
                    pending.resolve(&correlation_id, response).await;
                }
                Ok(None) => {
                    warn!(topic = %delivery.topic, "Skipping response without correlation id");
                }
                Err(e) => {
                    warn!(topic = %delivery.topic, error = %e, "Discarding undecodable response");
                }
            }
            self.commit(consumer, &message);
        }
    }

    fn commit(&self, consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
        if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
            error!(
                topic = message.topic(),
                offset = message.offset(),
                error = %e,
                "Failed to commit offset"
            );
        } else {
            debug!(
                topic = message.topic(),
                offset = message.offset(),
                "Offset committed"
            );
        }
    }
}

fn delivery_of(message: &BorrowedMessage<'_>) -> Option<Delivery> {
    let payload = message.payload()?;
    Some(Delivery {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        payload: payload.to_vec(),
    })
}

/// Run the handler against one delivery under the retry budget.
///
/// Returns whether the message may be committed. Each attempt is logged
/// with its index; exhaustion is logged once.
async fn deliver_with_retry<F, Fut>(handler: &F, delivery: &Delivery, retry_limit: u32) -> bool
where
    F: Fn(Delivery) -> Fut,
    Fut: Future<Output = Result<(), HandlerError>>,
{
    let attempts = retry_limit.max(1);
    for attempt in 1..=attempts {
        match handler(delivery.clone()).await {
            Ok(()) => {
                debug!(
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    attempt,
                    "Message handled"
                );
                return true;
            }
            Err(e) => {
                error!(
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    attempt,
                    attempts,
                    error = %e,
                    "Handler failed"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    error!(
        topic = %delivery.topic,
        offset = delivery.offset,
        attempts,
        "Dropping message after exhausting retry budget"
    );
    false
}

/// Answer one RPC request. Returns whether a response was published;
/// `Ok(false)` means the request carried no correlation id and was
/// skipped.
async fn answer_request<F, Fut>(
    handler: &F,
    delivery: &Delivery,
    producer: &KafkaProducer,
) -> Result<bool, HandlerError>
where
    F: Fn(Value) -> Fut,
    Fut: Future<Output = Result<Value, HandlerError>>,
{
    let Some(request) = envelope::parse_request(&delivery.payload)? else {
        warn!(
            topic = %delivery.topic,
            offset = delivery.offset,
            "Skipping request without correlation id"
        );
        return Ok(false);
    };

    let response = handler(request.message).await?;
    let reply = RpcResponse::new(response, request.correlation_id);
    let bytes = reply.to_bytes()?;
    producer.publish_bytes(&bytes, &delivery.topic).await?;
    debug!(
        correlation_id = %reply.correlation_id,
        topic = %delivery.topic,
        "RPC response published"
    );
    Ok(true)
}

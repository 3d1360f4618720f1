//! # Kafka Producer
//!
//! Publishing side of the messaging layer: fire-and-forget publish,
//! transactional publish, and the request half of the RPC-over-stream
//! pattern. Responses are resolved out-of-band through [`PendingResponses`]
//! by a consumer wired with [`KafkaConsumer::deliver_responses`].
//!
//! [`KafkaConsumer::deliver_responses`]: super::consumer::KafkaConsumer::deliver_responses

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::CourierConfig;

use super::codec::{self, Payload};
use super::envelope::RpcRequest;
use super::errors::{MessagingError, MessagingResult};

/// Broker acknowledgment wait for a single publish.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on transactional init/commit/abort round-trips.
const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal state of a transactional publish. Every call ends in exactly
/// one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    Aborted,
}

/// Pending RPC slots keyed by correlation id.
///
/// The requesting task inserts and removes entries; the response-delivery
/// loop resolves them. Each slot is a oneshot sender, so a response can be
/// delivered at most once. Entries are removed on every exit path of
/// [`KafkaProducer::request`] (success, timeout, or error), so the map
/// cannot grow without bound.
#[derive(Debug, Clone, Default)]
pub struct PendingResponses {
    slots: Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
}

impl PendingResponses {
    pub(crate) async fn register(&self, correlation_id: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().await.insert(correlation_id.to_string(), tx);
        rx
    }

    pub(crate) async fn discard(&self, correlation_id: &str) {
        self.slots.lock().await.remove(correlation_id);
    }

    /// Resolve the slot for `correlation_id`, removing it from the map.
    ///
    /// Returns whether a waiter was found. Late or unknown ids are logged
    /// and discarded; they are never an error.
    pub async fn resolve(&self, correlation_id: &str, response: Value) -> bool {
        let sender = self.slots.lock().await.remove(correlation_id);
        match sender {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!(correlation_id, "RPC waiter gone before resolution");
                }
                true
            }
            None => {
                warn!(
                    correlation_id,
                    "Discarding response with unknown correlation id"
                );
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}

/// Kafka producer with transactional and RPC support.
pub struct KafkaProducer {
    config: CourierConfig,
    producer: Option<FutureProducer>,
    pending: PendingResponses,
}

impl KafkaProducer {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            producer: None,
            pending: PendingResponses::default(),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", self.config.bootstrap_servers());
        config.set("acks", self.config.acks.as_str());
        config.set("message.timeout.ms", "5000");
        if let Some(ref transactional_id) = self.config.transactional_id {
            config.set("transactional.id", transactional_id);
            // Kafka requires idempotence for transactional producers.
            config.set("enable.idempotence", "true");
        }
        config
    }

    /// Open the broker session. Idempotent; must precede any publish.
    pub async fn connect(&mut self) -> MessagingResult<()> {
        if self.producer.is_some() {
            debug!("Producer already connected");
            return Ok(());
        }

        let producer: FutureProducer = self.client_config().create().map_err(|e| {
            MessagingError::broker_connection(format!("Failed to create Kafka producer: {e}"))
        })?;

        if self.config.transactional_id.is_some() {
            let transactional = producer.clone();
            run_blocking(move || transactional.init_transactions(TRANSACTION_TIMEOUT))
                .await?
                .map_err(|e| {
                    MessagingError::broker_connection(format!(
                        "Failed to initialize transactions: {e}"
                    ))
                })?;
        }

        info!(
            bootstrap_servers = %self.config.bootstrap_servers(),
            acks = self.config.acks.as_str(),
            transactional = self.config.transactional_id.is_some(),
            "Connected Kafka producer"
        );
        self.producer = Some(producer);
        Ok(())
    }

    /// Flush in-flight deliveries and close the session. Idempotent.
    pub async fn disconnect(&mut self) -> MessagingResult<()> {
        if let Some(producer) = self.producer.take() {
            run_blocking(move || producer.flush(DELIVERY_TIMEOUT))
                .await?
                .map_err(|e| {
                    MessagingError::broker_connection(format!("Failed to flush producer: {e}"))
                })?;
            info!("Disconnected Kafka producer");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.producer.is_some()
    }

    fn live(&self) -> MessagingResult<&FutureProducer> {
        self.producer
            .as_ref()
            .ok_or_else(|| MessagingError::broker_connection("Producer is not connected"))
    }

    /// Serialize and publish one message, waiting for the broker
    /// acknowledgment configured by the acks mode. No internal retry; the
    /// caller decides whether a failed publish is retried.
    pub async fn publish(&self, payload: &Payload, topic: &str) -> MessagingResult<()> {
        let bytes = codec::serialize(payload)?;
        self.publish_bytes(&bytes, topic).await
    }

    pub(crate) async fn publish_bytes(&self, bytes: &[u8], topic: &str) -> MessagingResult<()> {
        let producer = self.live()?;
        let record: FutureRecord<'_, String, [u8]> = FutureRecord::to(topic).payload(bytes);
        let (partition, offset) = producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map_err(|(e, _)| MessagingError::publish(topic, e.to_string()))?;
        debug!(topic, partition, offset, bytes = bytes.len(), "Message published");
        Ok(())
    }

    /// Publish inside a broker transaction.
    ///
    /// On success the transaction is committed; on any failure inside the
    /// body it is aborted and the error is logged, not propagated; the
    /// caller gets `Ok(TxOutcome::Aborted)`. Only infrastructure failures
    /// before a transaction exists (not connected, no transactional id,
    /// begin rejected) return `Err`.
    pub async fn publish_transactional(
        &self,
        payload: &Payload,
        topic: &str,
    ) -> MessagingResult<TxOutcome> {
        let producer = self.live()?;
        if self.config.transactional_id.is_none() {
            return Err(MessagingError::transaction(
                "No transactional id configured for this producer",
            ));
        }

        producer
            .begin_transaction()
            .map_err(|e| MessagingError::transaction(format!("Begin failed: {e}")))?;

        let published = match codec::serialize(payload) {
            Ok(bytes) => self.publish_bytes(&bytes, topic).await,
            Err(e) => Err(e),
        };

        let committer = producer.clone();
        let commit = move || async move {
            run_blocking(move || committer.commit_transaction(TRANSACTION_TIMEOUT))
                .await?
                .map_err(|e| MessagingError::transaction(format!("Commit failed: {e}")))
        };
        let aborter = producer.clone();
        let abort = move || async move {
            let aborted =
                run_blocking(move || aborter.abort_transaction(TRANSACTION_TIMEOUT)).await;
            match aborted {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Transaction abort failed"),
                Err(e) => error!(error = %e, "Transaction abort failed"),
            }
        };

        Ok(conclude_transaction(topic, published, commit, abort).await)
    }

    /// Publish a correlated request and await its response.
    ///
    /// Returns `Ok(None)` when no response arrives within `wait`; absence
    /// is a sentinel, not an error. The pending slot is removed on every
    /// exit path.
    pub async fn request(
        &self,
        payload: &Payload,
        topic: &str,
        wait: Duration,
    ) -> MessagingResult<Option<Value>> {
        let message = match payload {
            Payload::Text(text) => Value::String(text.clone()),
            Payload::Structured(value) => value.clone(),
            Payload::Bytes(_) => {
                return Err(MessagingError::serialization(
                    "Binary payloads cannot be wrapped in an RPC envelope",
                ))
            }
        };

        let envelope = RpcRequest::new(message);
        let correlation_id = envelope.correlation_id.clone();
        let slot = self.pending.register(&correlation_id).await;

        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pending.discard(&correlation_id).await;
                return Err(e);
            }
        };
        if let Err(e) = self.publish_bytes(&bytes, topic).await {
            self.pending.discard(&correlation_id).await;
            return Err(e);
        }

        debug!(correlation_id = %correlation_id, topic, "RPC request published, awaiting response");
        Ok(await_response(&self.pending, &correlation_id, slot, wait).await)
    }

    /// Handle to the pending-response map, for wiring into a consumer's
    /// response-delivery loop.
    pub fn pending(&self) -> PendingResponses {
        self.pending.clone()
    }
}

/// Run a blocking librdkafka call on the blocking pool so a slow broker
/// cannot stall an async worker thread. Transaction control and flush
/// block for up to their configured timeouts.
async fn run_blocking<T, F>(op: F) -> MessagingResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| MessagingError::internal(format!("Blocking broker call panicked: {e}")))
}

/// Decide how an open transaction ends, given the outcome of its body.
///
/// A successful body commits; a failed body, or a failed commit, aborts.
/// Exactly one of `commit` and `abort` runs, and `abort` never runs after
/// a successful commit. Body and commit failures are logged, not
/// propagated.
async fn conclude_transaction<C, Fc, A, Fa>(
    topic: &str,
    published: MessagingResult<()>,
    commit: C,
    abort: A,
) -> TxOutcome
where
    C: FnOnce() -> Fc,
    Fc: Future<Output = MessagingResult<()>>,
    A: FnOnce() -> Fa,
    Fa: Future<Output = ()>,
{
    match published {
        Ok(()) => match commit().await {
            Ok(()) => {
                info!(topic, "Message published and transaction committed");
                TxOutcome::Committed
            }
            Err(e) => {
                error!(topic, error = %e, "Transaction commit failed, rolling back");
                abort().await;
                TxOutcome::Aborted
            }
        },
        Err(e) => {
            error!(topic, error = %e, "Publish failed inside transaction, rolling back");
            abort().await;
            TxOutcome::Aborted
        }
    }
}

/// Wait for a registered slot to resolve, bounded by `wait`.
///
/// The slot is guaranteed gone from the map afterwards: resolution removes
/// it, and the timeout and dropped-sender paths discard it here.
async fn await_response(
    pending: &PendingResponses,
    correlation_id: &str,
    slot: oneshot::Receiver<Value>,
    wait: Duration,
) -> Option<Value> {
    match tokio::time::timeout(wait, slot).await {
        Ok(Ok(response)) => Some(response),
        Ok(Err(_)) => {
            pending.discard(correlation_id).await;
            warn!(correlation_id, "RPC slot dropped before resolution");
            None
        }
        Err(_) => {
            pending.discard(correlation_id).await;
            error!(
                correlation_id,
                timeout_ms = wait.as_millis() as u64,
                "RPC request timed out without a response"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_resolve_wakes_registered_slot() {
        let pending = PendingResponses::default();
        let slot = pending.register("req-1").await;
        assert_eq!(pending.len().await, 1);

        assert!(pending.resolve("req-1", json!({"ok": true})).await);
        assert_eq!(slot.await.unwrap(), json!({"ok": true}));
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_correlation_id_resolves_nothing() {
        let pending = PendingResponses::default();
        let _slot = pending.register("req-1").await;

        assert!(!pending.resolve("someone-else", json!(1)).await);
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_targets_exactly_one_slot() {
        let pending = PendingResponses::default();
        let first = pending.register("a").await;
        let mut second = pending.register("b").await;

        assert!(pending.resolve("a", json!("for a")).await);
        assert_eq!(first.await.unwrap(), json!("for a"));
        assert!(second.try_recv().is_err());
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_await_response_timeout_leaves_no_slot_behind() {
        let pending = PendingResponses::default();
        let slot = pending.register("req-1").await;

        let started = std::time::Instant::now();
        let outcome =
            await_response(&pending, "req-1", slot, Duration::from_millis(50)).await;
        assert!(outcome.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_await_response_resolved_out_of_band() {
        let pending = PendingResponses::default();
        let slot = pending.register("req-1").await;

        let resolver = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve("req-1", json!({"answer": 42})).await;
        });

        let outcome =
            await_response(&pending, "req-1", slot, Duration::from_secs(1)).await;
        assert_eq!(outcome, Some(json!({"answer": 42})));
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_successful_body_commits_and_never_aborts() {
        let aborted = Arc::new(AtomicBool::new(false));
        let abort_flag = aborted.clone();

        let outcome = conclude_transaction(
            "orders",
            Ok(()),
            || async { Ok(()) },
            move || async move {
                abort_flag.store(true, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(outcome, TxOutcome::Committed);
        assert!(!aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_body_aborts_and_never_commits() {
        let committed = Arc::new(AtomicBool::new(false));
        let aborted = Arc::new(AtomicBool::new(false));
        let commit_flag = committed.clone();
        let abort_flag = aborted.clone();

        let outcome = conclude_transaction(
            "orders",
            Err(MessagingError::publish("orders", "delivery failed")),
            move || async move {
                commit_flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            move || async move {
                abort_flag.store(true, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(outcome, TxOutcome::Aborted);
        assert!(!committed.load(Ordering::SeqCst));
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_commit_aborts() {
        let aborted = Arc::new(AtomicBool::new(false));
        let abort_flag = aborted.clone();

        let outcome = conclude_transaction(
            "orders",
            Ok(()),
            || async { Err(MessagingError::transaction("Commit failed: fenced")) },
            move || async move {
                abort_flag.store(true, Ordering::SeqCst);
            },
        )
        .await;

        assert_eq!(outcome, TxOutcome::Aborted);
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_publish_requires_connect() {
        let producer = KafkaProducer::new(CourierConfig::default());
        let err = producer
            .publish(&Payload::from("hello"), "orders")
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::BrokerConnection { .. }));
    }

    #[tokio::test]
    async fn test_transactional_publish_requires_transactional_id() {
        // Connects for real only when a broker is available.
        if std::env::var("TEST_KAFKA_BOOTSTRAP_SERVERS").is_err() {
            println!("Skipping kafka test - no TEST_KAFKA_BOOTSTRAP_SERVERS provided");
            return;
        }

        let mut config = CourierConfig::default();
        let bootstrap = std::env::var("TEST_KAFKA_BOOTSTRAP_SERVERS").unwrap();
        let (host, port) = bootstrap.split_once(':').unwrap();
        config.broker_host = host.to_string();
        config.broker_port = port.parse().unwrap();

        let mut producer = KafkaProducer::new(config);
        producer.connect().await.unwrap();
        let err = producer
            .publish_transactional(&Payload::from("hello"), "orders")
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Transaction { .. }));
        producer.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        if std::env::var("TEST_KAFKA_BOOTSTRAP_SERVERS").is_err() {
            println!("Skipping kafka test - no TEST_KAFKA_BOOTSTRAP_SERVERS provided");
            return;
        }

        let bootstrap = std::env::var("TEST_KAFKA_BOOTSTRAP_SERVERS").unwrap();
        let (host, port) = bootstrap.split_once(':').unwrap();
        let config = CourierConfig {
            broker_host: host.to_string(),
            broker_port: port.parse().unwrap(),
            ..CourierConfig::default()
        };

        let mut producer = KafkaProducer::new(config);
        producer.connect().await.unwrap();
        producer.connect().await.unwrap();
        assert!(producer.is_connected());
        producer.disconnect().await.unwrap();
        producer.disconnect().await.unwrap();
        assert!(!producer.is_connected());
    }
}

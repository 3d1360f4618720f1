use crate::error::{CourierError, Result};
use std::str::FromStr;

/// Broker acknowledgment durability for published messages.
///
/// Maps onto the Kafka `acks` producer setting: how many replicas must
/// confirm a write before the publish future resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// All in-sync replicas must acknowledge (`acks=all`).
    #[default]
    All,
    /// Only the partition leader must acknowledge (`acks=1`).
    Leader,
    /// Fire and forget (`acks=0`).
    None,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::All => "all",
            AckMode::Leader => "1",
            AckMode::None => "0",
        }
    }
}

impl FromStr for AckMode {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" | "-1" => Ok(AckMode::All),
            "1" | "leader" => Ok(AckMode::Leader),
            "0" | "none" => Ok(AckMode::None),
            other => Err(CourierError::ConfigurationError(format!(
                "Invalid acks mode: {other}"
            ))),
        }
    }
}

/// Shared configuration for the messaging and scheduling layer.
///
/// Everything here is supplied at construction and never re-read after a
/// component connects.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub acks: AckMode,
    /// Enables transactional publish when set.
    pub transactional_id: Option<String>,
    pub topics: Vec<String>,
    pub group_id: String,
    /// Per-message handler attempt budget for the consumer.
    pub retry_limit: u32,
    pub scheduler_period_secs: u64,
    pub log_level: String,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 9092,
            acks: AckMode::All,
            transactional_id: None,
            topics: Vec::new(),
            group_id: "courier".to_string(),
            retry_limit: 5,
            scheduler_period_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl CourierConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("COURIER_BROKER_HOST") {
            config.broker_host = host;
        }

        if let Ok(port) = std::env::var("COURIER_BROKER_PORT") {
            config.broker_port = port.parse().map_err(|e| {
                CourierError::ConfigurationError(format!("Invalid broker_port: {e}"))
            })?;
        }

        if let Ok(acks) = std::env::var("COURIER_ACKS") {
            config.acks = acks.parse()?;
        }

        if let Ok(transactional_id) = std::env::var("COURIER_TRANSACTIONAL_ID") {
            config.transactional_id = Some(transactional_id);
        }

        if let Ok(topics) = std::env::var("COURIER_TOPICS") {
            config.topics = topics
                .split(',')
                .map(str::trim)
                .filter(|topic| !topic.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(group_id) = std::env::var("COURIER_GROUP_ID") {
            config.group_id = group_id;
        }

        if let Ok(retry_limit) = std::env::var("COURIER_RETRY_LIMIT") {
            config.retry_limit = retry_limit.parse().map_err(|e| {
                CourierError::ConfigurationError(format!("Invalid retry_limit: {e}"))
            })?;
        }

        if let Ok(period) = std::env::var("COURIER_SCHEDULER_PERIOD_SECS") {
            config.scheduler_period_secs = period.parse().map_err(|e| {
                CourierError::ConfigurationError(format!("Invalid scheduler_period_secs: {e}"))
            })?;
        }

        if let Ok(log_level) = std::env::var("COURIER_LOG") {
            config.log_level = log_level;
        }

        Ok(config)
    }

    /// Renders the broker endpoint as a Kafka bootstrap server string.
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.broker_host, self.broker_port)
    }
}

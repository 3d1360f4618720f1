use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CourierError {
    MessagingError(String),
    SchedulerError(String),
    ConfigurationError(String),
}

impl fmt::Display for CourierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourierError::MessagingError(msg) => write!(f, "Messaging error: {msg}"),
            CourierError::SchedulerError(msg) => write!(f, "Scheduler error: {msg}"),
            CourierError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for CourierError {}

impl From<crate::messaging::MessagingError> for CourierError {
    fn from(err: crate::messaging::MessagingError) -> Self {
        CourierError::MessagingError(err.to_string())
    }
}

impl From<crate::resilience::SchedulerError> for CourierError {
    fn from(err: crate::resilience::SchedulerError) -> Self {
        CourierError::SchedulerError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;

//! # Resilience Module
//!
//! Scheduling primitives for background work: a bounded-concurrency
//! runner for fanning out independent jobs without overwhelming
//! downstream resources, and a self-healing periodic task that keeps a
//! recurring job alive across timeouts and transient failures.

pub mod gather;
pub mod scheduler;

pub use gather::{bounded_gather, try_bounded_gather};
pub use scheduler::{schedule, JobError, SchedulerError, SchedulerPolicy};

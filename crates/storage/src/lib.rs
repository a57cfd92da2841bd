//! Storage abstractions for the flood domain generator.
//!
//! Provides unified interfaces for:
//! - Redis Streams for the forecast notification queue
//! - The local filesystem for extraction artifacts

pub mod artifacts;
pub mod queue;

pub use artifacts::{ArtifactStore, DEFAULT_EXTENSION};
pub use queue::{Delivery, ForecastQueue, MessageQueue, QueueConfig, QueueError};

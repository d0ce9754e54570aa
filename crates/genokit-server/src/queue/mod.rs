//! Queue consumption
//!
//! Two listeners run for the life of the worker, one per queue:
//!
//! - **file-ready**: `{bucket, key}` -> [`IngestionService::process_file`]
//! - **lab-status**: `{sample_id, status, timestamp?, comment?}` ->
//!   [`StatusUpdateService::update_status`]
//!
//! The queue is the retry authority. A message is deleted only after it was
//! handled or found unusable; anything else is left to reappear once its
//! visibility timeout expires.
//!
//! [`IngestionService::process_file`]: crate::ingest::IngestionService::process_file
//! [`StatusUpdateService::update_status`]: crate::ingest::StatusUpdateService::update_status

use async_trait::async_trait;
use thiserror::Error;

pub mod consumer;
pub mod handlers;
pub mod memory;
pub mod messages;
pub mod sqs;

pub use consumer::{Backoff, PollConfig, PollStats, QueueConsumer, QueueListener};
pub use handlers::{FileReadyHandler, LabStatusHandler, MessageHandler};
pub use memory::InMemoryQueue;
pub use messages::{FileReadyMessage, LabStatusMessage};
pub use sqs::SqsQueue;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to receive from {queue}: {message}")]
    Receive { queue: String, message: String },

    #[error("Failed to delete message from {queue}: {message}")]
    Delete { queue: String, message: String },
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// A received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub receipt_handle: String,
    pub body: String,
}

/// At-least-once message source
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Queue identifier for logs (the SQS queue URL)
    fn name(&self) -> &str;

    /// Long-poll for up to `max_messages`, waiting at most `wait_time_seconds`
    async fn receive(&self, max_messages: i32, wait_time_seconds: i32) -> Result<Vec<QueueMessage>>;

    /// Acknowledge a message so it is not redelivered
    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

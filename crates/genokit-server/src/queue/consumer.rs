//! Long-poll listeners

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{MessageHandler, MessageQueue, QueueMessage, Result};

pub const DEFAULT_MAX_MESSAGES: i32 = 10;
pub const DEFAULT_WAIT_TIME_SECONDS: i32 = 20;
pub const DEFAULT_POLL_BASE_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_POLL_MAX_BACKOFF: Duration = Duration::from_millis(300_000);
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub max_messages: i32,
    pub wait_time_seconds: i32,
    /// Delay between polls while messages keep arriving
    pub base_interval: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            base_interval: DEFAULT_POLL_BASE_INTERVAL,
            max_backoff: DEFAULT_POLL_MAX_BACKOFF,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Delay before the next poll: `base * multiplier^empty_receives`, capped.
/// A failed poll leaves the count unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: u32,
    empty_receives: u32,
}

impl Backoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            base: config.base_interval,
            max: config.max_backoff,
            multiplier: config.backoff_multiplier.max(1),
            empty_receives: 0,
        }
    }

    pub fn record_empty(&mut self) {
        self.empty_receives = self.empty_receives.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.empty_receives = 0;
    }

    pub fn empty_receives(&self) -> u32 {
        self.empty_receives
    }

    pub fn next_interval(&self) -> Duration {
        let factor = self.multiplier.checked_pow(self.empty_receives).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
            .max(self.base.min(self.max))
    }
}

/// Result of one receive-and-handle round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub received: usize,
    pub handled: usize,
    pub failed: usize,
}

/// One queue bound to one handler
pub struct QueueListener {
    queue: Arc<dyn MessageQueue>,
    handler: Arc<dyn MessageHandler>,
    config: PollConfig,
}

impl QueueListener {
    pub fn new(queue: Arc<dyn MessageQueue>, handler: Arc<dyn MessageHandler>, config: PollConfig) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        self.queue
            .receive(self.config.max_messages, self.config.wait_time_seconds)
            .await
    }

    /// Receive one batch, handle it concurrently, delete what succeeded
    pub async fn poll_once(&self) -> Result<PollStats> {
        let messages = self.receive().await?;
        Ok(self.handle_batch(&messages).await)
    }

    /// Messages run concurrently, so their order within a batch is not
    /// preserved. One failure does not hold back the others.
    async fn handle_batch(&self, messages: &[QueueMessage]) -> PollStats {
        let mut stats = PollStats {
            received: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            return stats;
        }

        info!(
            listener = self.handler.name(),
            message_count = messages.len(),
            "Received messages"
        );

        let outcomes = join_all(messages.iter().map(|m| self.handler.handle(m))).await;

        for (message, outcome) in messages.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    stats.handled += 1;
                    if let Err(err) = self.queue.delete(&message.receipt_handle).await {
                        // Handled but not acknowledged; it will be redelivered
                        warn!(message_id = %message.id, error = %err, "Failed to delete message");
                    }
                }
                Err(err) => {
                    error!(
                        listener = self.handler.name(),
                        message_id = %message.id,
                        error = %err,
                        "Error handling message, leaving it for redelivery"
                    );
                    stats.failed += 1;
                }
            }
        }

        stats
    }

    /// Poll until cancelled. A cancellation lets the current batch finish.
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(&self.config);
        info!(listener = self.handler.name(), queue = self.queue.name(), "Queue listener started");

        while !cancel.is_cancelled() {
            // Only the receive is interrupted; a received batch is always handled
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.receive() => received,
            };

            match received {
                Ok(messages) if messages.is_empty() => backoff.record_empty(),
                Ok(messages) => {
                    self.handle_batch(&messages).await;
                    backoff.reset();
                }
                Err(err) => error!(listener = self.handler.name(), error = %err, "Queue polling error"),
            }

            let delay = backoff.next_interval();
            if backoff.empty_receives() > 0 {
                debug!(
                    listener = self.handler.name(),
                    next_interval_ms = delay.as_millis() as u64,
                    consecutive_empty_receives = backoff.empty_receives(),
                    "Backing off before next poll"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(listener = self.handler.name(), "Queue listener stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// Owns the worker's listeners
#[derive(Default)]
pub struct QueueConsumer {
    listeners: Vec<QueueListener>,
}

impl QueueConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: QueueListener) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn start(self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.listeners
            .into_iter()
            .map(|listener| listener.spawn(cancel.child_token()))
            .collect()
    }
}

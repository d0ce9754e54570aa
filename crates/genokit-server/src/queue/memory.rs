//! In-memory queue for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::{MessageQueue, QueueError, QueueMessage, Result};

#[derive(Default)]
struct State {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    deleted: Vec<String>,
    receive_calls: usize,
    fail_next_receive: bool,
}

/// Received messages stay in flight until deleted or [`InMemoryQueue::redeliver`]
/// returns them to the queue, mimicking an expired visibility timeout.
pub struct InMemoryQueue {
    name: String,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(0),
            state: Mutex::new(State::default()),
        }
    }

    /// Enqueue a body; returns the message id
    pub async fn push(&self, body: impl Into<String>) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = QueueMessage {
            id: format!("msg-{n}"),
            receipt_handle: format!("rh-{n}"),
            body: body.into(),
        };
        let id = message.id.clone();
        self.state.lock().await.ready.push_back(message);
        id
    }

    /// Ids of acknowledged messages, in deletion order
    pub async fn deleted(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    pub async fn pending(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn receive_calls(&self) -> usize {
        self.state.lock().await.receive_calls
    }

    /// Return every in-flight message to the queue
    pub async fn redeliver(&self) {
        let mut state = self.state.lock().await;
        let returned: Vec<QueueMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
        state.ready.extend(returned);
    }

    pub async fn fail_next_receive(&self) {
        self.state.lock().await.fail_next_receive = true;
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, max_messages: i32, _wait_time_seconds: i32) -> Result<Vec<QueueMessage>> {
        let mut state = self.state.lock().await;
        state.receive_calls += 1;

        if std::mem::take(&mut state.fail_next_receive) {
            return Err(QueueError::Receive {
                queue: self.name.clone(),
                message: "injected failure".to_string(),
            });
        }

        let count = usize::try_from(max_messages.max(1)).unwrap_or(1).min(state.ready.len());
        let batch: Vec<QueueMessage> = state.ready.drain(..count).collect();
        for message in &batch {
            state
                .in_flight
                .insert(message.receipt_handle.clone(), message.clone());
        }
        Ok(batch)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(message) = state.in_flight.remove(receipt_handle) {
            state.deleted.push(message.id);
        }
        Ok(())
    }
}

//! Amazon SQS queue

use async_trait::async_trait;
use aws_sdk_sqs::{error::DisplayErrorContext, Client};
use tracing::{debug, instrument};

use super::{MessageQueue, QueueError, QueueMessage, Result};

/// SQS limits for a single ReceiveMessage call
pub const MAX_MESSAGES_PER_RECEIVE: i32 = 10;
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Client from the shared AWS config, optionally pointed at a local endpoint
    pub fn client(sdk_config: &aws_config::SdkConfig, endpoint_url: Option<&str>) -> Client {
        let mut builder = aws_sdk_sqs::config::Builder::from(sdk_config);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        Client::from_conf(builder.build())
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn name(&self) -> &str {
        &self.queue_url
    }

    #[instrument(skip(self), fields(queue_url = %self.queue_url))]
    async fn receive(&self, max_messages: i32, wait_time_seconds: i32) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.clamp(1, MAX_MESSAGES_PER_RECEIVE))
            .wait_time_seconds(wait_time_seconds.clamp(0, MAX_WAIT_TIME_SECONDS))
            .send()
            .await
            .map_err(|e| QueueError::Receive {
                queue: self.queue_url.clone(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        let messages: Vec<QueueMessage> = output
            .messages()
            .iter()
            .filter_map(|msg| {
                let receipt_handle = msg.receipt_handle()?;
                Some(QueueMessage {
                    id: msg.message_id().unwrap_or_default().to_string(),
                    receipt_handle: receipt_handle.to_string(),
                    body: msg.body().unwrap_or_default().to_string(),
                })
            })
            .collect();

        debug!(message_count = messages.len(), "Messages received");

        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Delete {
                queue: self.queue_url.clone(),
                message: DisplayErrorContext(e).to_string(),
            })?;

        Ok(())
    }
}

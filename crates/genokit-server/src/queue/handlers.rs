//! Per-queue message handlers
//!
//! `Ok` means the message may be deleted: it was processed, or it can never
//! be processed (bad JSON, missing fields) and redelivery would not help.
//! `Err` leaves it on the queue.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::messages::{FileReadyMessage, LabStatusMessage};
use super::QueueMessage;
use crate::ingest::{IngestionService, Result, StatusUpdateService};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, message: &QueueMessage) -> Result<()>;
}

fn decode<T: serde::de::DeserializeOwned>(message: &QueueMessage) -> Option<T> {
    match serde_json::from_str(&message.body) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(error = %err, body = %message.body, "Message body is not valid JSON, discarding");
            None
        }
    }
}

pub struct FileReadyHandler {
    ingestion: Arc<IngestionService>,
}

impl FileReadyHandler {
    pub fn new(ingestion: Arc<IngestionService>) -> Self {
        Self { ingestion }
    }
}

#[async_trait]
impl MessageHandler for FileReadyHandler {
    fn name(&self) -> &'static str {
        "file-ready"
    }

    #[instrument(skip(self, message), fields(trace_id = %message.id))]
    async fn handle(&self, message: &QueueMessage) -> Result<()> {
        let Some(decoded) = decode::<FileReadyMessage>(message) else {
            return Ok(());
        };
        let Some((bucket, key)) = decoded.location() else {
            warn!(body = %message.body, "File message missing bucket or key");
            return Ok(());
        };

        info!(bucket, key, "Processing file-ready message");
        self.ingestion.process_file(bucket, key).await?;
        Ok(())
    }
}

pub struct LabStatusHandler {
    status: Arc<StatusUpdateService>,
}

impl LabStatusHandler {
    pub fn new(status: Arc<StatusUpdateService>) -> Self {
        Self { status }
    }
}

#[async_trait]
impl MessageHandler for LabStatusHandler {
    fn name(&self) -> &'static str {
        "lab-status"
    }

    #[instrument(skip(self, message), fields(trace_id = %message.id))]
    async fn handle(&self, message: &QueueMessage) -> Result<()> {
        let Some(decoded) = decode::<LabStatusMessage>(message) else {
            return Ok(());
        };
        let Some(update) = decoded.into_update(Utc::now()) else {
            warn!(body = %message.body, "Lab status message missing sample_id or status");
            return Ok(());
        };

        info!(sample_id = %update.sample_id, status = %update.status, "Processing lab status message");
        self.status.update_status(&update).await?;
        Ok(())
    }
}

//! Queue listener tests with the in-memory queue
//!
//! A handled message is deleted, a failed one stays in flight for
//! redelivery, and poison messages are acknowledged.

mod common;

use common::{GenotypeFile, Pipeline, BUCKET};
use genokit_server::kits::{KitRepository, KitStatus};
use genokit_server::queue::{
    FileReadyHandler, InMemoryQueue, LabStatusHandler, PollConfig, PollStats, QueueConsumer,
    QueueListener,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn file_listener(pipeline: &Pipeline, queue: &Arc<InMemoryQueue>) -> QueueListener {
    QueueListener::new(
        queue.clone(),
        Arc::new(FileReadyHandler::new(Arc::clone(&pipeline.ingestion))),
        PollConfig::default(),
    )
}

fn status_listener(pipeline: &Pipeline, queue: &Arc<InMemoryQueue>) -> QueueListener {
    QueueListener::new(
        queue.clone(),
        Arc::new(LabStatusHandler::new(Arc::clone(&pipeline.status))),
        PollConfig::default(),
    )
}

#[tokio::test]
async fn test_file_message_is_processed_and_deleted() {
    let pipeline = Pipeline::allowing(&["rs123"]);
    let file = GenotypeFile::new().row("S1", "rs123", "1", "1000", "A", "G").build();
    pipeline.upload("pending/S1.txt", &file).await;

    let queue = Arc::new(InMemoryQueue::new("files"));
    let id = queue
        .push(
            json!({
                "bucket": BUCKET,
                "key": "pending/S1.txt",
                "source": "lab-sftp",
                "size": 2048,
            })
            .to_string(),
        )
        .await;

    let stats = file_listener(&pipeline, &queue).poll_once().await.unwrap();

    assert_eq!(stats, PollStats { received: 1, handled: 1, failed: 0 });
    assert_eq!(queue.deleted().await, vec![id]);
    assert_eq!(queue.in_flight().await, 0);

    let kit = pipeline.repo.find_by_barcode("S1").await.unwrap().unwrap();
    assert!(kit.is_processed);
}

#[tokio::test]
async fn test_failed_message_is_left_for_redelivery() {
    let pipeline = Pipeline::allowing(&["rs123"]);
    let queue = Arc::new(InMemoryQueue::new("files"));
    queue
        .push(json!({"bucket": BUCKET, "key": "pending/not-there-yet.txt"}).to_string())
        .await;
    let listener = file_listener(&pipeline, &queue);

    let stats = listener.poll_once().await.unwrap();
    assert_eq!(stats, PollStats { received: 1, handled: 0, failed: 1 });
    assert!(queue.deleted().await.is_empty());
    assert_eq!(queue.in_flight().await, 1);

    // The file shows up before the visibility timeout expires
    let file = GenotypeFile::new().row("S9", "rs123", "1", "1000", "A", "G").build();
    pipeline.upload("pending/not-there-yet.txt", &file).await;
    queue.redeliver().await;

    let stats = listener.poll_once().await.unwrap();
    assert_eq!(stats.handled, 1);
    assert_eq!(queue.deleted().await.len(), 1);
}

#[tokio::test]
async fn test_poison_messages_are_acknowledged() {
    let pipeline = Pipeline::allowing(&["rs123"]);
    let queue = Arc::new(InMemoryQueue::new("files"));
    queue.push("not json at all").await;
    queue.push(json!({"bucket": BUCKET}).to_string()).await;
    queue.push(json!({"bucket": "", "key": "pending/S1.txt"}).to_string()).await;

    let stats = file_listener(&pipeline, &queue).poll_once().await.unwrap();

    assert_eq!(stats, PollStats { received: 3, handled: 3, failed: 0 });
    assert_eq!(queue.deleted().await.len(), 3);
    assert!(pipeline.repo.kits().await.is_empty());
}

#[tokio::test]
async fn test_batch_is_handled_independently() {
    let pipeline = Pipeline::allowing(&["rs123"]);
    for sample in ["S1", "S2"] {
        let file = GenotypeFile::new().row(sample, "rs123", "1", "1000", "A", "G").build();
        pipeline.upload(&format!("pending/{sample}.txt"), &file).await;
    }

    let queue = Arc::new(InMemoryQueue::new("files"));
    for key in ["pending/S1.txt", "pending/missing.txt", "pending/S2.txt"] {
        queue.push(json!({"bucket": BUCKET, "key": key}).to_string()).await;
    }

    let stats = file_listener(&pipeline, &queue).poll_once().await.unwrap();

    assert_eq!(stats, PollStats { received: 3, handled: 2, failed: 1 });
    assert_eq!(queue.in_flight().await, 1);
    assert_eq!(pipeline.repo.kits().await.len(), 2);
}

#[tokio::test]
async fn test_lab_status_messages() {
    let pipeline = Pipeline::allowing(&[]);
    let queue = Arc::new(InMemoryQueue::new("lab-status"));
    queue
        .push(json!({"sample_id": "S2", "status": "QC_FAILED", "comment": "degraded"}).to_string())
        .await;
    queue.push(json!({"sample_id": "S3"}).to_string()).await;
    queue.push(json!({"sample_id": 12345, "status": "KIT_RECEIVED"}).to_string()).await;

    let stats = status_listener(&pipeline, &queue).poll_once().await.unwrap();

    assert_eq!(stats, PollStats { received: 3, handled: 3, failed: 0 });

    let kit = pipeline.repo.find_by_barcode("S2").await.unwrap().unwrap();
    assert_eq!(kit.status, KitStatus::QcFailed);
    assert_eq!(kit.failed_processing_reason.as_deref(), Some("degraded"));

    let activities = pipeline.repo.activities(kit.id).await;
    let timestamp = activities[0].metadata["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

    assert!(pipeline.repo.find_by_barcode("S3").await.unwrap().is_none());
    assert!(pipeline.repo.find_by_barcode("12345").await.unwrap().is_some());
}

#[tokio::test]
async fn test_receive_error_is_reported() {
    let pipeline = Pipeline::allowing(&[]);
    let queue = Arc::new(InMemoryQueue::new("lab-status"));
    queue.fail_next_receive().await;

    assert!(status_listener(&pipeline, &queue).poll_once().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_consumer_stops_on_cancellation() {
    let pipeline = Pipeline::allowing(&["rs123"]);
    let file = GenotypeFile::new().row("S1", "rs123", "1", "1000", "A", "G").build();
    pipeline.upload("pending/S1.txt", &file).await;

    let files = Arc::new(InMemoryQueue::new("files"));
    let statuses = Arc::new(InMemoryQueue::new("lab-status"));
    files
        .push(json!({"bucket": BUCKET, "key": "pending/S1.txt"}).to_string())
        .await;
    statuses
        .push(json!({"sample_id": "S7", "status": "QC_PASSED"}).to_string())
        .await;

    let cancel = CancellationToken::new();
    let handles = QueueConsumer::new()
        .with_listener(file_listener(&pipeline, &files))
        .with_listener(status_listener(&pipeline, &statuses))
        .start(&cancel);

    // Long enough for the first polls and a few backoff rounds
    tokio::time::sleep(Duration::from_secs(30)).await;
    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(files.deleted().await.len(), 1);
    assert_eq!(statuses.deleted().await.len(), 1);
    assert!(pipeline.repo.find_by_barcode("S1").await.unwrap().unwrap().is_processed);
    assert!(pipeline.repo.find_by_barcode("S7").await.unwrap().is_some());

    // 1 s, then 2, 4, 8, 16 s of backoff fit in 30 s
    assert!(files.receive_calls().await <= 6);
}

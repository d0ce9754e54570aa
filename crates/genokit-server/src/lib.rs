//! Genokit ingestion worker library
//!
//! Turns raw genotyping-array exports dropped into object storage into
//! per-kit marker breakdowns in PostgreSQL, and keeps kit statuses in step
//! with the lab's status feed.
//!
//! # Overview
//!
//! - **Genotype parsing** ([`genotype`]): header/data-section text exports,
//!   filtered against the reference catalog
//! - **Kits** ([`kits`]): status vocabulary, feed-code mapping and the
//!   repository over kits, breakdown rows and activity logs
//! - **Ingestion** ([`ingest`]): file processing, status updates,
//!   reconciliation and the pending-file sweep
//! - **Queues** ([`queue`]): long-polling SQS listeners with backoff
//! - **Storage** ([`storage`]): S3 download, listing and relocation
//!
//! # Flow
//!
//! ```text
//! SQS file-ready ─► IngestionService ─► S3 download ─► parser ─► kits/breakdown
//! SQS lab-status ─► StatusUpdateService ───────────────────────► kits/activities
//! ```
//!
//! The `genokit-worker` binary wires both listeners together with a health
//! endpoint; `reconcile-breakdowns` and `sweep-pending` are one-shot jobs.

pub mod catalog;
pub mod config;
pub mod genotype;
pub mod ingest;
pub mod kits;
pub mod queue;
pub mod server;
pub mod storage;

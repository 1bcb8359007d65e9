//! # consulta-ingest
//!
//! Multi-stage asynchronous ingestion orchestrator: audio and document
//! pipelines with compare-and-swap status transitions, soft-failure
//! semantics for diarization and indexing, a bounded submission queue, and
//! per-record cancellation.

pub mod audio;
pub mod cancel;
pub mod context;
pub mod document;
pub mod extraction;
pub mod worker;

pub use cancel::CancelRegistry;
pub use context::{Deadlines, IngestContext};
pub use document::DocumentUploadMeta;
pub use extraction::Extractor;
pub use worker::{IngestHandle, IngestWorker, WorkItem, WorkerConfig};

//! Ingestion worker: bounded submission queue and worker pool.
//!
//! Each record is processed by exactly one worker task from its first stage
//! through completion; per-record work is serialized by the record's own
//! status machine. The queue is bounded, so submissions past the bound fail
//! fast with `Busy`.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};
use uuid::Uuid;

use consulta_core::defaults::{
    ENV_INGEST_MAX_CONCURRENT, ENV_INGEST_QUEUE_CAPACITY, INGEST_MAX_CONCURRENT,
    INGEST_QUEUE_CAPACITY,
};
use consulta_core::{Error, Result};

use crate::audio::process_recording;
use crate::cancel::CancelRegistry;
use crate::context::IngestContext;
use crate::document::{process_document, DocumentUploadMeta};

/// One queued unit of ingestion work, carrying the raw upload bytes.
pub enum WorkItem {
    Audio {
        id: Uuid,
        data: Vec<u8>,
    },
    Document {
        id: Uuid,
        data: Vec<u8>,
        meta: DocumentUploadMeta,
    },
}

impl WorkItem {
    pub fn record_id(&self) -> Uuid {
        match self {
            WorkItem::Audio { id, .. } => *id,
            WorkItem::Document { id, .. } => *id,
        }
    }
}

/// Configuration for the ingestion worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum records processed concurrently.
    pub max_concurrent: usize,
    /// Bounded submission queue capacity.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: INGEST_MAX_CONCURRENT,
            queue_capacity: INGEST_QUEUE_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    pub fn from_env() -> Self {
        let max_concurrent = std::env::var(ENV_INGEST_MAX_CONCURRENT)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(INGEST_MAX_CONCURRENT)
            .max(1);
        let queue_capacity = std::env::var(ENV_INGEST_QUEUE_CAPACITY)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(INGEST_QUEUE_CAPACITY)
            .max(1);
        Self {
            max_concurrent,
            queue_capacity,
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Handle for submitting work and controlling the running worker.
#[derive(Clone)]
pub struct IngestHandle {
    queue_tx: mpsc::Sender<WorkItem>,
    shutdown_tx: mpsc::Sender<()>,
    cancels: Arc<CancelRegistry>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl IngestHandle {
    /// Enqueue a work item; a full queue fails fast with `Busy`.
    pub fn submit(&self, item: WorkItem) -> Result<()> {
        let id = item.record_id();
        self.queue_tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Busy("ingestion queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::Internal("ingestion worker is stopped".to_string())
            }
        })?;
        debug!(record_id = %id, "Work item enqueued");
        Ok(())
    }

    /// Signal cancellation of an in-flight record. Returns false when the
    /// record is not currently being processed.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.cancels.cancel(id)
    }

    /// Stop accepting work and wait for in-flight records to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        // Draining every permit means every worker task has finished.
        let _ = self
            .semaphore
            .acquire_many(self.max_concurrent as u32)
            .await;
        info!("Ingestion worker stopped");
    }
}

/// Ingestion worker that drives records through their pipelines.
pub struct IngestWorker {
    ctx: Arc<IngestContext>,
    config: WorkerConfig,
}

impl IngestWorker {
    pub fn new(ctx: IngestContext, config: WorkerConfig) -> Self {
        Self {
            ctx: Arc::new(ctx),
            config,
        }
    }

    /// Start the dispatcher loop and return the submission handle.
    pub fn start(self) -> IngestHandle {
        let (queue_tx, mut queue_rx) = mpsc::channel::<WorkItem>(self.config.queue_capacity);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let cancels = Arc::new(CancelRegistry::new());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));

        let handle = IngestHandle {
            queue_tx,
            shutdown_tx,
            cancels: cancels.clone(),
            semaphore: semaphore.clone(),
            max_concurrent: self.config.max_concurrent,
        };

        let ctx = self.ctx;
        let max_concurrent = self.config.max_concurrent;
        tokio::spawn(async move {
            info!(max_concurrent, "Ingestion worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Ingestion worker received shutdown signal");
                        break;
                    }
                    item = queue_rx.recv() => {
                        let Some(item) = item else { break };
                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let ctx = ctx.clone();
                        let cancels = cancels.clone();
                        tokio::spawn(async move {
                            let id = item.record_id();
                            let mut cancel_rx = cancels.register(id);
                            let result = match item {
                                WorkItem::Audio { id, data } => {
                                    process_recording(&ctx, id, data, &mut cancel_rx).await
                                }
                                WorkItem::Document { id, data, meta } => {
                                    process_document(&ctx, id, data, meta, &mut cancel_rx).await
                                }
                            };
                            if let Err(e) = result {
                                error!(record_id = %id, error = %e, "Pipeline aborted with store error");
                            }
                            cancels.remove(id);
                            drop(permit);
                        });
                    }
                }
            }
        });

        handle
    }
}

//! Shared dependencies and deadlines for the ingestion pipelines.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use consulta_core::defaults::{
    ASR_TIMEOUT_SECS, EMBED_TIMEOUT_SECS, LLM_TIMEOUT_SECS, OCR_TIMEOUT_SECS, VECTOR_TIMEOUT_SECS,
};
use consulta_core::{
    AsrBackend, ChatBackend, DocumentStore, EmbeddingBackend, Error, OcrBackend, RecordingStore,
    Result, VectorIndex,
};
use consulta_diarize::Diarizer;

use crate::extraction::Extractor;

/// Per-capability deadlines for external calls.
#[derive(Debug, Clone)]
pub struct Deadlines {
    pub asr: Duration,
    pub ocr: Duration,
    pub llm: Duration,
    pub embed: Duration,
    pub vector: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            asr: Duration::from_secs(ASR_TIMEOUT_SECS),
            ocr: Duration::from_secs(OCR_TIMEOUT_SECS),
            llm: Duration::from_secs(LLM_TIMEOUT_SECS),
            embed: Duration::from_secs(EMBED_TIMEOUT_SECS),
            vector: Duration::from_secs(VECTOR_TIMEOUT_SECS),
        }
    }
}

/// Everything a pipeline stage needs: stores, index, providers, deadlines.
pub struct IngestContext {
    pub recordings: Arc<dyn RecordingStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub asr: Arc<dyn AsrBackend>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub ocr: Arc<dyn OcrBackend>,
    pub extractor: Extractor,
    pub diarizer: Diarizer,
    pub deadlines: Deadlines,
}

impl IngestContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recordings: Arc<dyn RecordingStore>,
        documents: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorIndex>,
        asr: Arc<dyn AsrBackend>,
        chat: Arc<dyn ChatBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        ocr: Arc<dyn OcrBackend>,
    ) -> Self {
        Self {
            recordings,
            documents,
            vectors,
            asr,
            embedder,
            ocr,
            extractor: Extractor::new(chat),
            diarizer: Diarizer::default(),
            deadlines: Deadlines::default(),
        }
    }

    pub fn with_deadlines(mut self, deadlines: Deadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn with_diarizer(mut self, diarizer: Diarizer) -> Self {
        self.diarizer = diarizer;
        self
    }
}

/// Run a stage future under its deadline, racing the record's cancellation
/// flag. A fired deadline yields `Timeout`; a fired flag yields `Cancelled`.
pub async fn guarded<T, F>(
    stage: &str,
    deadline: Duration,
    cancel: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if *cancel.borrow() {
        return Err(Error::Cancelled(format!("{} aborted", stage)));
    }
    tokio::select! {
        changed = cancel.changed() => {
            // A dropped sender means the registry entry is gone; treat it as
            // a cancellation so the stage never runs unguarded.
            let _ = changed;
            Err(Error::Cancelled(format!("{} aborted", stage)))
        }
        result = tokio::time::timeout(deadline, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {:?}",
                stage, deadline
            ))),
        },
    }
}

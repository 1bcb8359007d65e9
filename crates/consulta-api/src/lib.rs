//! # consulta-api
//!
//! Stable façade over the consulta engine: submit/poll/list/delete for
//! ingestion records, chat and search over the indexed corpus, and component
//! health. An external HTTP layer maps these operations 1:1 onto its wire
//! format using `Error::status_code()`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use consulta_core::{
    media, AsrBackend, ChatBackend, ChatRequest, ChatResult, Document, DocumentStore,
    EmbeddingBackend, IndexStats, IngestStatus, OcrBackend, Page, PageOf, RankedContext,
    RecordFilter, Recording, RecordingStore, Result, SourceKind, VectorIndex,
};
use consulta_ingest::{DocumentUploadMeta, IngestContext, IngestHandle, IngestWorker, WorkItem, WorkerConfig};
use consulta_rag::RagEngine;

/// Acknowledgement returned on submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: Uuid,
    pub status: IngestStatus,
}

/// Health of one engine component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
}

/// Aggregate health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub components: Vec<ComponentHealth>,
}

/// Everything the engine needs at construction.
pub struct EngineConfig {
    pub recordings: Arc<dyn RecordingStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub asr: Arc<dyn AsrBackend>,
    pub chat: Arc<dyn ChatBackend>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub ocr: Arc<dyn OcrBackend>,
    pub worker: WorkerConfig,
}

/// The engine façade.
pub struct Engine {
    recordings: Arc<dyn RecordingStore>,
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorIndex>,
    asr: Arc<dyn AsrBackend>,
    chat_backend: Arc<dyn ChatBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    ocr: Arc<dyn OcrBackend>,
    rag: RagEngine,
    ingest: IngestHandle,
}

impl Engine {
    /// Wire up the orchestrator and RAG pipeline and start the worker.
    pub fn start(config: EngineConfig) -> Self {
        let ctx = IngestContext::new(
            config.recordings.clone(),
            config.documents.clone(),
            config.vectors.clone(),
            config.asr.clone(),
            config.chat.clone(),
            config.embedder.clone(),
            config.ocr.clone(),
        );
        let ingest = IngestWorker::new(ctx, config.worker).start();
        let rag = RagEngine::new(
            config.vectors.clone(),
            config.embedder.clone(),
            config.chat.clone(),
        );

        info!("Engine started");
        Self {
            recordings: config.recordings,
            documents: config.documents,
            vectors: config.vectors,
            asr: config.asr,
            chat_backend: config.chat,
            embedder: config.embedder,
            ocr: config.ocr,
            rag,
            ingest,
        }
    }

    // ── Ingestion ──────────────────────────────────────────────────────

    /// Validate and enqueue an audio upload. Fails fast with `InvalidMedia`
    /// on bad uploads and `Busy` when the queue is full.
    pub async fn submit_audio(&self, filename: &str, data: Vec<u8>) -> Result<SubmissionReceipt> {
        let kind = media::validate_audio(filename, &data)?;
        let recording =
            Recording::from_upload(filename, data.len() as u64, media::mime_for(kind));
        let recording = self.recordings.create(recording).await?;

        if let Err(e) = self.ingest.submit(WorkItem::Audio {
            id: recording.id,
            data,
        }) {
            // Do not leave an orphan Pending record behind.
            let _ = self.recordings.delete(recording.id).await;
            return Err(e);
        }

        info!(recording_id = %recording.id, filename, "Audio submitted");
        Ok(SubmissionReceipt {
            id: recording.id,
            status: recording.status,
        })
    }

    /// Validate and enqueue a document upload.
    pub async fn submit_document(
        &self,
        filename: &str,
        data: Vec<u8>,
        meta: DocumentUploadMeta,
    ) -> Result<SubmissionReceipt> {
        let file_kind = media::validate_document(filename, &data)?;
        let mime = media::sniff(&data)
            .map(media::mime_for)
            .unwrap_or("application/octet-stream");
        let document = Document::from_upload(filename, data.len() as u64, mime, file_kind);
        let document = self.documents.create(document).await?;

        if let Err(e) = self.ingest.submit(WorkItem::Document {
            id: document.id,
            data,
            meta,
        }) {
            let _ = self.documents.delete(document.id).await;
            return Err(e);
        }

        info!(document_id = %document.id, filename, "Document submitted");
        Ok(SubmissionReceipt {
            id: document.id,
            status: document.status,
        })
    }

    /// Signal cancellation of an in-flight record.
    pub fn cancel(&self, id: Uuid) -> bool {
        self.ingest.cancel(id)
    }

    // ── Records ────────────────────────────────────────────────────────

    pub async fn recording(&self, id: Uuid) -> Result<Recording> {
        self.recordings.get(id).await
    }

    pub async fn document(&self, id: Uuid) -> Result<Document> {
        self.documents.get(id).await
    }

    pub async fn list_recordings(
        &self,
        filter: RecordFilter,
        page: Page,
    ) -> Result<PageOf<Recording>> {
        self.recordings.list(filter, page).await
    }

    pub async fn list_documents(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Document>> {
        self.documents.list(filter, page).await
    }

    /// Delete a recording; its vector entries cascade.
    pub async fn delete_recording(&self, id: Uuid) -> Result<()> {
        self.vectors
            .delete_by_source(SourceKind::Recording, id)
            .await?;
        self.recordings.delete(id).await
    }

    /// Delete a document; its vector entries cascade.
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        self.vectors
            .delete_by_source(SourceKind::Document, id)
            .await?;
        self.documents.delete(id).await
    }

    // ── Retrieval ──────────────────────────────────────────────────────

    /// Answer a clinical question against the indexed corpus.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResult> {
        self.rag.chat(&request).await
    }

    /// Semantic search without generation.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RankedContext>> {
        self.rag.search(query, max_results).await
    }

    /// Semantic search restricted to documents.
    pub async fn search_documents(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RankedContext>> {
        let contexts = self.rag.search(query, max_results * 2).await?;
        Ok(contexts
            .into_iter()
            .filter(|c| c.source_kind == SourceKind::Document)
            .take(max_results)
            .collect())
    }

    // ── Health ─────────────────────────────────────────────────────────

    /// Vector collection shape and size.
    pub async fn index_status(&self) -> Result<IndexStats> {
        self.vectors.stats().await
    }

    /// Component-by-component health.
    pub async fn health(&self) -> HealthReport {
        let mut components = Vec::new();

        let store_ok = self
            .recordings
            .list(
                RecordFilter::default(),
                Page {
                    page: 1,
                    per_page: 1,
                },
            )
            .await
            .is_ok();
        components.push(ComponentHealth {
            name: "record_store".to_string(),
            healthy: store_ok,
        });

        let vector_ok = self.vectors.stats().await.is_ok();
        components.push(ComponentHealth {
            name: "vector_index".to_string(),
            healthy: vector_ok,
        });

        components.push(ComponentHealth {
            name: "asr".to_string(),
            healthy: self.asr.health_check().await.unwrap_or(false),
        });
        components.push(ComponentHealth {
            name: "llm".to_string(),
            healthy: self.chat_backend.health_check().await.unwrap_or(false),
        });
        components.push(ComponentHealth {
            name: "embedder".to_string(),
            healthy: self.embedder.health_check().await.unwrap_or(false),
        });
        components.push(ComponentHealth {
            name: "ocr".to_string(),
            healthy: self.ocr.health_check().await.unwrap_or(false),
        });

        HealthReport {
            healthy: components.iter().all(|c| c.healthy),
            components,
        }
    }
}

//! Core traits for consulta abstractions.
//!
//! These traits define the seams between the engine and its pluggable
//! backends: record stores, the vector index, and the four provider
//! capabilities (ASR, chat LLM, embedder, OCR).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// RECORD STORE TRAITS
// =============================================================================

/// Partial update applied to a recording; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordingPatch {
    pub transcript_text: Option<String>,
    pub structured: Option<StructuredFields>,
    pub unstructured: Option<UnstructuredFields>,
    pub language: Option<String>,
    pub duration_s: Option<f64>,
    pub confidence: Option<f64>,
    pub vector_stored: Option<StageOutcome>,
    pub vector_id: Option<String>,
    pub speaker_segments: Option<Vec<SpeakerSegment>>,
    pub speaker_stats: Option<SpeakerStats>,
    pub diarization: Option<StageOutcome>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<FailureInfo>,
}

/// Partial update applied to a document.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub extracted_text: Option<String>,
    pub page_count: Option<usize>,
    pub ocr_confidence: Option<f64>,
    pub language: Option<String>,
    pub metadata: Option<DocumentMetadata>,
    pub recording_id: Option<Uuid>,
    pub vector_stored: Option<StageOutcome>,
    pub vector_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<FailureInfo>,
}

/// Durable store for audio ingestion records.
///
/// Mutations are serialized per record id; `update` is a compare-and-swap on
/// `updated_at` and `transition` on the current status, both failing with
/// `Conflict` when the record moved underneath the caller.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Persist a new record.
    async fn create(&self, recording: Recording) -> Result<Recording>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Recording>;

    /// List records, newest first, stable order `created_at desc, id`.
    async fn list(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Recording>>;

    /// Apply a patch iff `updated_at` still equals `expected_updated_at`.
    async fn update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        patch: RecordingPatch,
    ) -> Result<Recording>;

    /// Advance the status machine iff the current status equals `from`.
    async fn transition(&self, id: Uuid, from: IngestStatus, to: IngestStatus) -> Result<()>;

    /// Remove a record permanently.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// All completed recordings carrying an extracted patient name, for
    /// fuzzy document linking.
    async fn list_named_patients(&self) -> Result<Vec<(Uuid, String)>>;
}

/// Durable store for document ingestion records; same contract as
/// [`RecordingStore`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: Document) -> Result<Document>;

    async fn get(&self, id: Uuid) -> Result<Document>;

    async fn list(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Document>>;

    async fn update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        patch: DocumentPatch,
    ) -> Result<Document>;

    async fn transition(&self, id: Uuid, from: IngestStatus, to: IngestStatus) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// VECTOR INDEX TRAIT
// =============================================================================

/// Embedding storage with similarity search and metadata filtering.
///
/// Implementations are internally thread-safe; a missing collection is
/// auto-initialized on first write. Search ordering is similarity
/// descending, ties broken by metadata date descending then source id
/// ascending.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry with the same `vector_id`; returns the id.
    async fn upsert(&self, entry: VectorEntry) -> Result<String>;

    /// Remove one entry.
    async fn delete(&self, vector_id: &str) -> Result<()>;

    /// Remove every entry belonging to a source record.
    async fn delete_by_source(&self, kind: SourceKind, source_id: Uuid) -> Result<()>;

    /// Top-k cosine search after metadata filtering.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>>;

    /// Patient-name lookup, exact or fuzzy (threshold 0.55).
    async fn search_by_patient(
        &self,
        name: &str,
        strategy: NameMatch,
        k: usize,
    ) -> Result<Vec<VectorHit>>;

    /// Collection shape and size.
    async fn stats(&self) -> Result<IndexStats>;
}

// =============================================================================
// PROVIDER CAPABILITY TRAITS
// =============================================================================

/// A segment of transcribed audio with timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrSegment {
    pub t_start: f64,
    pub t_end: f64,
    pub text: String,
}

/// Result of audio transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    pub duration_s: Option<f64>,
    pub confidence: Option<f64>,
    pub segments: Vec<AsrSegment>,
}

/// Backend for transcribing audio.
#[async_trait]
pub trait AsrBackend: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime: &str,
        language: Option<&str>,
    ) -> Result<Transcription>;

    async fn health_check(&self) -> Result<bool>;

    fn model_name(&self) -> &str;
}

/// A chat message for the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for a completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Option<Vec<String>>,
    /// Ask the provider for a strict-JSON response body.
    pub json_mode: bool,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: crate::defaults::CHAT_TEMPERATURE,
            max_tokens: crate::defaults::CHAT_MAX_TOKENS,
            stop: None,
            json_mode: false,
        }
    }
}

impl CompletionParams {
    /// Parameters tuned for deterministic JSON extraction.
    pub fn extraction() -> Self {
        Self {
            temperature: crate::defaults::EXTRACTION_TEMPERATURE,
            max_tokens: crate::defaults::EXTRACTION_MAX_TOKENS,
            stop: None,
            json_mode: true,
        }
    }
}

/// Backend for text generation (LLM). Rate-limited calls are retried inside
/// the implementation with exponential backoff.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams)
        -> Result<String>;

    async fn health_check(&self) -> Result<bool>;

    fn model_name(&self) -> &str;
}

/// Backend for generating text embeddings. Must be deterministic for
/// identical input.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn health_check(&self) -> Result<bool>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Text extracted from a PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfExtraction {
    pub text: String,
    pub page_count: usize,
}

/// Text recognized from an image, with mean OCR confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageExtraction {
    pub text: String,
    /// Mean word confidence in [0, 1].
    pub confidence: f64,
}

/// Backend for PDF text extraction and image OCR.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Extract the text layer of a PDF, reading at most `max_pages` pages.
    async fn extract_pdf(&self, data: &[u8], max_pages: usize) -> Result<PdfExtraction>;

    /// OCR an image in the given Tesseract language.
    async fn extract_image(&self, data: &[u8], lang: &str) -> Result<ImageExtraction>;

    async fn health_check(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("eres un asistente");
        assert_eq!(sys.role, "system");
        let user = ChatMessage::user("hola");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "hola");
    }

    #[test]
    fn test_completion_params_default() {
        let params = CompletionParams::default();
        assert!(!params.json_mode);
        assert_eq!(params.max_tokens, crate::defaults::CHAT_MAX_TOKENS);
    }

    #[test]
    fn test_completion_params_extraction() {
        let params = CompletionParams::extraction();
        assert!(params.json_mode);
        assert!(params.temperature <= 0.2 + f32::EPSILON);
    }

    #[test]
    fn test_transcription_serde_roundtrip() {
        let t = Transcription {
            text: "buenos días".to_string(),
            language: Some("es".to_string()),
            duration_s: Some(12.0),
            confidence: Some(0.93),
            segments: vec![AsrSegment {
                t_start: 0.0,
                t_end: 2.0,
                text: "buenos días".to_string(),
            }],
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: Transcription = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_patch_defaults_are_noop() {
        let patch = RecordingPatch::default();
        assert!(patch.transcript_text.is_none());
        assert!(patch.error.is_none());
        let patch = DocumentPatch::default();
        assert!(patch.extracted_text.is_none());
        assert!(patch.metadata.is_none());
    }
}

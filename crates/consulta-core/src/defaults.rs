//! Default values and environment variable names shared across crates.

// ─── Upload limits ─────────────────────────────────────────────────────────

/// Maximum audio upload size in bytes (25 MiB).
pub const AUDIO_MAX_SIZE_BYTES: u64 = 26_214_400;

/// Maximum document upload size in bytes (10 MiB).
pub const DOCUMENT_MAX_SIZE_BYTES: u64 = 10_485_760;

/// Allowed audio file extensions.
pub const AUDIO_ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// Maximum PDF pages extracted per document.
pub const PDF_MAX_PAGES: usize = 50;

/// Minimum acceptable OCR confidence for image documents.
pub const OCR_MIN_CONFIDENCE: f32 = 0.60;

// ─── Embedding / vector index ──────────────────────────────────────────────

/// Embedding dimension for the default model.
pub const EMBED_DIMENSION: usize = 384;

/// Default embedding model identifier.
pub const EMBED_MODEL: &str = "all-minilm";

/// Logical vector collection name.
pub const VECTOR_COLLECTION: &str = "medical_conversations";

/// Maximum characters of payload text sent to the embedder.
pub const PAYLOAD_MAX_CHARS: usize = 8_000;

// ─── Extraction ────────────────────────────────────────────────────────────

/// Maximum transcript characters fed into one extraction prompt.
pub const EXTRACTION_MAX_CHARS: usize = 4_000;

/// Extraction LLM temperature (low for consistent JSON).
pub const EXTRACTION_TEMPERATURE: f32 = 0.2;

/// Extraction LLM max tokens.
pub const EXTRACTION_MAX_TOKENS: u32 = 1_500;

/// Chat generation temperature.
pub const CHAT_TEMPERATURE: f32 = 0.3;

/// Chat generation max tokens.
pub const CHAT_MAX_TOKENS: u32 = 2_000;

// ─── Diarization ───────────────────────────────────────────────────────────

/// Minimum segment length in seconds before merging with a neighbor.
pub const SPEAKER_MIN_SEGMENT_SECS: f64 = 1.0;

/// Fixed k-means seed so diarization is reproducible.
pub const DIARIZATION_KMEANS_SEED: u64 = 42;

/// Audio weight in the hybrid speaker score.
pub const DIARIZATION_AUDIO_WEIGHT: f64 = 0.3;

/// Text weight in the hybrid speaker score.
pub const DIARIZATION_TEXT_WEIGHT: f64 = 0.7;

// ─── RAG ───────────────────────────────────────────────────────────────────

/// Default number of contexts retrieved per chat query.
pub const CHAT_MAX_RESULTS: usize = 5;

/// Minimum similarity for general semantic retrieval.
pub const SEARCH_MIN_SCORE: f32 = 0.6;

/// Maximum characters of assembled context handed to the generator.
pub const CONTEXT_MAX_CHARS: usize = 4_000;

/// Maximum characters of a generated answer.
pub const ANSWER_MAX_CHARS: usize = 2_000;

/// Maximum length of a retrieval excerpt.
pub const EXCERPT_MAX_CHARS: usize = 300;

// ─── Fuzzy name matching ───────────────────────────────────────────────────

/// Default threshold for fuzzy patient-name search matches.
pub const FUZZY_MATCH_THRESHOLD: f32 = 0.55;

/// Threshold for linking a document to an existing recording.
pub const FUZZY_LINK_THRESHOLD: f32 = 0.85;

// ─── Orchestrator ──────────────────────────────────────────────────────────

/// Ingestion worker pool size.
pub const INGEST_MAX_CONCURRENT: usize = 4;

/// Bounded submission queue capacity; submissions past this fail with Busy.
pub const INGEST_QUEUE_CAPACITY: usize = 64;

// ─── Deadlines (seconds) ───────────────────────────────────────────────────

pub const ASR_TIMEOUT_SECS: u64 = 300;
pub const OCR_TIMEOUT_SECS: u64 = 120;
pub const LLM_TIMEOUT_SECS: u64 = 60;
pub const EMBED_TIMEOUT_SECS: u64 = 30;
pub const VECTOR_TIMEOUT_SECS: u64 = 10;

// ─── Provider retry policy ─────────────────────────────────────────────────

/// Maximum attempts for rate-limited / transiently unavailable providers.
pub const PROVIDER_MAX_ATTEMPTS: u32 = 3;

/// Base backoff delay in milliseconds.
pub const PROVIDER_BACKOFF_BASE_MS: u64 = 1_000;

/// Backoff cap in milliseconds.
pub const PROVIDER_BACKOFF_CAP_MS: u64 = 10_000;

// ─── Environment variable names ────────────────────────────────────────────

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_WHISPER_BASE_URL: &str = "WHISPER_BASE_URL";
pub const ENV_WHISPER_MODEL: &str = "WHISPER_MODEL";
pub const ENV_LLM_BASE_URL: &str = "LLM_BASE_URL";
pub const ENV_LLM_API_KEY: &str = "LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
pub const ENV_EMBED_BASE_URL: &str = "EMBED_BASE_URL";
pub const ENV_EMBED_MODEL: &str = "EMBED_MODEL";
pub const ENV_EMBED_DIM: &str = "EMBED_DIM";
pub const ENV_OCR_LANGUAGE: &str = "OCR_LANGUAGE";
pub const ENV_INGEST_MAX_CONCURRENT: &str = "INGEST_MAX_CONCURRENT";
pub const ENV_INGEST_QUEUE_CAPACITY: &str = "INGEST_QUEUE_CAPACITY";

/// Default Whisper-compatible transcription endpoint.
pub const DEFAULT_WHISPER_BASE_URL: &str = "http://localhost:8000";

/// Default Whisper model slug.
pub const DEFAULT_WHISPER_MODEL: &str = "base";

/// Default OpenAI-compatible chat endpoint.
pub const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";

/// Default generation model.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default Ollama-compatible embedding endpoint.
pub const DEFAULT_EMBED_BASE_URL: &str = "http://localhost:11434";

/// Default Tesseract language for clinical documents.
pub const DEFAULT_OCR_LANGUAGE: &str = "spa";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_limits() {
        assert_eq!(AUDIO_MAX_SIZE_BYTES, 25 * 1024 * 1024);
        assert_eq!(DOCUMENT_MAX_SIZE_BYTES, 10 * 1024 * 1024);
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((DIARIZATION_AUDIO_WEIGHT + DIARIZATION_TEXT_WEIGHT - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_thresholds_ordering() {
        assert!(FUZZY_LINK_THRESHOLD > FUZZY_MATCH_THRESHOLD);
        assert!(OCR_MIN_CONFIDENCE > 0.0 && OCR_MIN_CONFIDENCE < 1.0);
    }
}

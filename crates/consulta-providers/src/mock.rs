//! Deterministic mock backends for hermetic testing.
//!
//! Every mock is scriptable: fixed responses, keyword-routed responses, and
//! queued failures so provider-outage scenarios replay deterministically.
//! The mock embedder hashes tokens into a fixed-dimension vector, so equal
//! text yields identical embeddings and token overlap yields cosine
//! similarity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use consulta_core::defaults::EMBED_DIMENSION;
use consulta_core::{
    AsrBackend, AsrSegment, ChatBackend, ChatMessage, CompletionParams, EmbeddingBackend, Error,
    ImageExtraction, OcrBackend, PdfExtraction, Result, Transcription,
};

fn pop_failure(queue: &Mutex<VecDeque<Error>>) -> Option<Error> {
    queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
}

// =============================================================================
// MOCK ASR
// =============================================================================

/// Scriptable ASR backend.
#[derive(Clone)]
pub struct MockAsr {
    result: Arc<Mutex<Transcription>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockAsr {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAsr {
    pub fn new() -> Self {
        Self {
            result: Arc::new(Mutex::new(Transcription {
                text: String::new(),
                language: Some("es".to_string()),
                duration_s: Some(0.0),
                confidence: Some(0.9),
                segments: vec![],
            })),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the transcription every successful call returns.
    pub fn with_result(self, result: Transcription) -> Self {
        *self.result.lock().unwrap() = result;
        self
    }

    /// Convenience: plain text with evenly spread segments.
    pub fn with_text_and_segments(self, text: &str, segments: Vec<AsrSegment>) -> Self {
        let duration = segments.last().map(|s| s.t_end);
        self.with_result(Transcription {
            text: text.to_string(),
            language: Some("es".to_string()),
            duration_s: duration,
            confidence: Some(0.9),
            segments,
        })
    }

    /// Queue errors returned (in order) before successes resume.
    pub fn with_failures(self, failures: Vec<Error>) -> Self {
        self.failures.lock().unwrap().extend(failures);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsrBackend for MockAsr {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _mime: &str,
        _language: Option<&str>,
    ) -> Result<Transcription> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = pop_failure(&self.failures) {
            return Err(err);
        }
        Ok(self.result.lock().unwrap().clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.failures.lock().unwrap().is_empty())
    }

    fn model_name(&self) -> &str {
        "mock-whisper"
    }
}

// =============================================================================
// MOCK CHAT
// =============================================================================

/// Scriptable chat backend with keyword routing.
///
/// The first mapping whose marker appears in the concatenated prompt wins;
/// otherwise the default response is returned.
#[derive(Clone)]
pub struct MockChat {
    default_response: Arc<Mutex<String>>,
    mappings: Arc<Mutex<Vec<(String, String)>>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            default_response: Arc::new(Mutex::new("{}".to_string())),
            mappings: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock().unwrap() = response.into();
        self
    }

    /// Route prompts containing `marker` to `response`.
    pub fn with_response_for(self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.mappings
            .lock()
            .unwrap()
            .push((marker.into(), response.into()));
        self
    }

    pub fn with_failures(self, failures: Vec<Error>) -> Self {
        self.failures.lock().unwrap().extend(failures);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts seen so far (concatenated message contents).
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for MockChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &CompletionParams,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt: String = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt.clone());

        if let Some(err) = pop_failure(&self.failures) {
            return Err(err);
        }

        let mappings = self.mappings.lock().unwrap();
        for (marker, response) in mappings.iter() {
            if prompt.contains(marker) {
                return Ok(response.clone());
            }
        }
        Ok(self.default_response.lock().unwrap().clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}

// =============================================================================
// MOCK EMBEDDING
// =============================================================================

/// Deterministic token-hash embedder.
#[derive(Clone)]
pub struct MockEmbedding {
    dimension: usize,
    failures: Arc<Mutex<VecDeque<Error>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self {
            dimension: EMBED_DIMENSION,
            failures: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_failures(self, failures: Vec<Error>) -> Self {
        self.failures.lock().unwrap().extend(failures);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// FNV-1a over a token, used as the bucket index.
    fn token_hash(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    /// Hash tokens into buckets, then L2-normalize.
    ///
    /// Bucket 0 carries a shared bias so any two texts have a moderate
    /// baseline cosine similarity, the way dense sentence embeddings do;
    /// token overlap then raises it above retrieval thresholds.
    pub fn embed_deterministic(&self, text: &str) -> Vec<f32> {
        const SHARED_BIAS: f32 = 2.83; // squared ≈ 8 token-weights

        let mut vector = vec![0f32; self.dimension];
        vector[0] = SHARED_BIAS;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
        {
            let bucket = 1 + (Self::token_hash(token) % (self.dimension as u64 - 1)) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = pop_failure(&self.failures) {
            return Err(err);
        }
        Ok(self.embed_deterministic(text))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// =============================================================================
// MOCK OCR
// =============================================================================

/// Scriptable OCR backend.
#[derive(Clone)]
pub struct MockOcr {
    pdf_text: Arc<Mutex<String>>,
    pdf_pages: Arc<Mutex<usize>>,
    image_text: Arc<Mutex<String>>,
    image_confidence: Arc<Mutex<f64>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
}

impl Default for MockOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOcr {
    pub fn new() -> Self {
        Self {
            pdf_text: Arc::new(Mutex::new(String::new())),
            pdf_pages: Arc::new(Mutex::new(1)),
            image_text: Arc::new(Mutex::new(String::new())),
            image_confidence: Arc::new(Mutex::new(0.9)),
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn with_pdf(self, text: impl Into<String>, pages: usize) -> Self {
        *self.pdf_text.lock().unwrap() = text.into();
        *self.pdf_pages.lock().unwrap() = pages;
        self
    }

    pub fn with_image(self, text: impl Into<String>, confidence: f64) -> Self {
        *self.image_text.lock().unwrap() = text.into();
        *self.image_confidence.lock().unwrap() = confidence;
        self
    }

    pub fn with_failures(self, failures: Vec<Error>) -> Self {
        self.failures.lock().unwrap().extend(failures);
        self
    }
}

#[async_trait]
impl OcrBackend for MockOcr {
    async fn extract_pdf(&self, _data: &[u8], _max_pages: usize) -> Result<PdfExtraction> {
        if let Some(err) = pop_failure(&self.failures) {
            return Err(err);
        }
        Ok(PdfExtraction {
            text: self.pdf_text.lock().unwrap().clone(),
            page_count: *self.pdf_pages.lock().unwrap(),
        })
    }

    async fn extract_image(&self, _data: &[u8], _lang: &str) -> Result<ImageExtraction> {
        if let Some(err) = pop_failure(&self.failures) {
            return Err(err);
        }
        Ok(ImageExtraction {
            text: self.image_text.lock().unwrap().clone(),
            confidence: *self.image_confidence.lock().unwrap(),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

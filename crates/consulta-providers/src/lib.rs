//! # consulta-providers
//!
//! Concrete provider adapters behind the capability traits of
//! `consulta-core`: Whisper-compatible ASR, OpenAI-compatible chat, an
//! Ollama-compatible embedder, CLI-based OCR, and deterministic mocks for
//! hermetic tests.

pub mod embedding;
pub mod mock;
pub mod ocr;
pub mod openai;
pub mod retry;
pub mod whisper;

pub use embedding::HttpEmbeddingBackend;
pub use mock::{MockAsr, MockChat, MockEmbedding, MockOcr};
pub use ocr::CliOcrBackend;
pub use openai::OpenAiChatBackend;
pub use whisper::WhisperBackend;

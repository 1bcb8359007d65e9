//! # consulta-core
//!
//! Core types, traits, and abstractions for the consulta clinical ingestion
//! and retrieval engine.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the other consulta crates depend on.

pub mod defaults;
pub mod error;
pub mod fuzzy;
pub mod logging;
pub mod media;
pub mod models;
pub mod payload;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ErrorKind, Result};
pub use fuzzy::{fuzzy_name_score, is_fuzzy_match, normalize_name};
pub use media::{sniff, validate_audio, validate_document, MediaKind};
pub use models::*;
pub use payload::{build_document_payload, build_recording_payload, truncate_chars};
pub use traits::*;

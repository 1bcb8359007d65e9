//! Payload-text assembly for embedding.
//!
//! The embedded text is the source text plus a stable serialization of its
//! medical metadata, labels in a fixed order: patient, diagnosis,
//! medications, symptoms, context. Truncated at a UTF-8-safe boundary.

use crate::defaults::PAYLOAD_MAX_CHARS;
use crate::models::{DocumentMetadata, StructuredFields, UnstructuredFields};

/// Truncate a string at `max_chars` characters on a char boundary,
/// appending an ellipsis when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Assemble the payload text for a transcribed recording.
pub fn build_recording_payload(
    transcript: &str,
    structured: Option<&StructuredFields>,
    unstructured: Option<&UnstructuredFields>,
) -> String {
    let mut parts: Vec<String> = vec![transcript.to_string()];

    if let Some(s) = structured {
        if let Some(name) = &s.name {
            parts.push(format!("Paciente: {}", name));
        }
        if let Some(dx) = &s.diagnosis {
            parts.push(format!("Diagnóstico: {}", dx));
        }
        if !s.medications.is_empty() {
            parts.push(format!("Medicamentos: {}", s.medications.join(", ")));
        }
    }
    if let Some(u) = unstructured {
        if !u.symptoms.is_empty() {
            parts.push(format!("Síntomas: {}", u.symptoms.join(", ")));
        }
        if let Some(ctx) = &u.context {
            parts.push(format!("Contexto: {}", ctx));
        }
    }

    truncate_chars(&parts.join(" | "), PAYLOAD_MAX_CHARS)
}

/// Assemble the payload text for an ingested document.
pub fn build_document_payload(extracted_text: &str, meta: &DocumentMetadata) -> String {
    let mut parts: Vec<String> = vec![extracted_text.to_string()];

    if let Some(name) = &meta.patient_name {
        parts.push(format!("Paciente: {}", name));
    }
    if !meta.conditions.is_empty() {
        parts.push(format!("Diagnóstico: {}", meta.conditions.join(", ")));
    }
    if !meta.medications.is_empty() {
        parts.push(format!("Medicamentos: {}", meta.medications.join(", ")));
    }
    if !meta.procedures.is_empty() {
        parts.push(format!("Procedimientos: {}", meta.procedures.join(", ")));
    }
    if let Some(doc_type) = &meta.document_type {
        parts.push(format!("Tipo de documento: {}", doc_type));
    }

    truncate_chars(&parts.join(" | "), PAYLOAD_MAX_CHARS)
}

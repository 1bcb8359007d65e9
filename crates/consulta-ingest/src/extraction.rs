//! LLM-driven extraction of structured, unstructured, and document medical
//! fields from clinical text.
//!
//! Output must be strict JSON against a closed schema. A parse failure gets
//! one retry with a JSON-only reminder; a second failure yields empty fields
//! and a soft error (the record keeps processing).

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use consulta_core::defaults::EXTRACTION_MAX_CHARS;
use consulta_core::{
    ChatBackend, ChatMessage, CompletionParams, DocumentMetadata, Result, StructuredFields,
    UnstructuredFields, Urgency,
};

const STRUCTURED_SYSTEM_PROMPT: &str = r#"Eres un asistente médico especializado en extraer información estructurada de conversaciones médicas.

Analiza la transcripción y extrae ÚNICAMENTE la información que esté explícitamente mencionada. Si un campo no se menciona, déjalo como null. No inventes ni deduzcas información.

Debes responder ÚNICAMENTE con un objeto JSON válido con estos campos:

{
  "name": "string o null - Nombre del paciente mencionado",
  "age": "number o null - Edad en años si se menciona",
  "date": "string o null - Fecha mencionada en formato YYYY-MM-DD",
  "diagnosis": "string o null - Diagnóstico médico específico mencionado",
  "physician": "string o null - Nombre del médico mencionado",
  "medications": "array de strings o null - Medicamentos mencionados",
  "phone": "string o null - Número de teléfono mencionado",
  "email": "string o null - Dirección de email mencionada"
}

Responde SOLO con el JSON, sin explicaciones adicionales."#;

const UNSTRUCTURED_SYSTEM_PROMPT: &str = r#"Eres un asistente médico especializado en extraer información contextual de conversaciones médicas.

Analiza la transcripción y extrae información contextual, emocional y observacional, basándote solo en lo que realmente se dice.

Debes responder ÚNICAMENTE con un objeto JSON válido:

{
  "symptoms": "array de strings o null - Síntomas mencionados",
  "context": "string o null - Descripción del contexto de la conversación",
  "observations": "string o null - Observaciones relevantes",
  "emotions": "array de strings o null - Emociones detectadas",
  "urgency": "string o null - Nivel de urgencia: 'baja', 'media', 'alta'",
  "recommendations": "array de strings o null - Recomendaciones dadas",
  "questions": "array de strings o null - Preguntas importantes",
  "answers": "array de strings o null - Respuestas clave"
}

Responde SOLO con el JSON, sin explicaciones adicionales."#;

const DOCUMENT_SYSTEM_PROMPT: &str = r#"Eres un asistente médico especializado en extraer metadatos de documentos clínicos (exámenes, recetas, informes).

Analiza el texto del documento y extrae ÚNICAMENTE la información presente.

Debes responder ÚNICAMENTE con un objeto JSON válido:

{
  "patient_name": "string o null - Nombre del paciente",
  "document_date": "string o null - Fecha del documento en formato YYYY-MM-DD",
  "document_type": "string o null - Tipo de documento (examen, receta, informe...)",
  "conditions": "array de strings o null - Condiciones médicas mencionadas",
  "medications": "array de strings o null - Medicamentos mencionados",
  "procedures": "array de strings o null - Procedimientos mencionados"
}

Responde SOLO con el JSON, sin explicaciones adicionales."#;

const JSON_ONLY_REMINDER: &str =
    "Tu respuesta anterior no fue JSON válido. Responde SOLO con el objeto JSON, sin ningún texto adicional.";

/// LLM extraction service.
pub struct Extractor {
    chat: Arc<dyn ChatBackend>,
}

impl Extractor {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self { chat }
    }

    /// Extract canonical structured fields from a transcript.
    pub async fn extract_structured(&self, text: &str) -> Result<StructuredFields> {
        match self.extract_json(STRUCTURED_SYSTEM_PROMPT, text).await? {
            Some(value) => Ok(parse_structured(&value)),
            None => Ok(StructuredFields::default()),
        }
    }

    /// Extract contextual fields from a transcript.
    pub async fn extract_unstructured(&self, text: &str) -> Result<UnstructuredFields> {
        match self.extract_json(UNSTRUCTURED_SYSTEM_PROMPT, text).await? {
            Some(value) => Ok(parse_unstructured(&value)),
            None => Ok(UnstructuredFields::default()),
        }
    }

    /// Extract medical metadata from document text.
    pub async fn extract_document_metadata(&self, text: &str) -> Result<DocumentMetadata> {
        match self.extract_json(DOCUMENT_SYSTEM_PROMPT, text).await? {
            Some(value) => Ok(parse_document_metadata(&value)),
            None => Ok(DocumentMetadata::default()),
        }
    }

    /// One extraction round-trip with a single JSON-only retry. Provider
    /// failures propagate; parse failures degrade to `None`.
    async fn extract_json(&self, system: &str, text: &str) -> Result<Option<JsonValue>> {
        let input = truncate_at_sentence(text, EXTRACTION_MAX_CHARS);
        let user = format!("TRANSCRIPCIÓN A ANALIZAR:\n{}", input);
        let params = CompletionParams::extraction();

        let first = self
            .chat
            .complete(
                &[ChatMessage::system(system), ChatMessage::user(&user)],
                &params,
            )
            .await?;

        if let Ok(value) = serde_json::from_str::<JsonValue>(&first) {
            return Ok(Some(value));
        }
        debug!(response_len = first.len(), "Extraction response was not JSON, retrying");

        let second = self
            .chat
            .complete(
                &[
                    ChatMessage::system(system),
                    ChatMessage::user(&user),
                    ChatMessage::user(JSON_ONLY_REMINDER),
                ],
                &params,
            )
            .await?;

        match serde_json::from_str::<JsonValue>(&second) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(error = %e, "Extraction failed to produce JSON twice, returning empty fields");
                Ok(None)
            }
        }
    }
}

/// Cut text at a sentence boundary at or before `max_chars` characters.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    match head.rfind(['.', '!', '?']) {
        Some(pos) => head[..=pos].to_string(),
        None => head,
    }
}

fn string_field(value: &JsonValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn list_field(value: &JsonValue, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Field-wise validation: wrong-typed or out-of-range values are dropped,
/// never failing the whole map.
pub fn parse_structured(value: &JsonValue) -> StructuredFields {
    let age = value.get("age").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });
    StructuredFields {
        name: string_field(value, "name"),
        age: age.filter(|a| *a <= 150).map(|a| a as u8),
        date: string_field(value, "date"),
        diagnosis: string_field(value, "diagnosis"),
        physician: string_field(value, "physician"),
        medications: list_field(value, "medications"),
        phone: string_field(value, "phone"),
        email: string_field(value, "email").filter(|e| e.contains('@')),
    }
}

pub fn parse_unstructured(value: &JsonValue) -> UnstructuredFields {
    UnstructuredFields {
        symptoms: list_field(value, "symptoms"),
        context: string_field(value, "context"),
        observations: string_field(value, "observations"),
        emotions: list_field(value, "emotions"),
        urgency: string_field(value, "urgency").and_then(|u| Urgency::parse(&u)),
        recommendations: list_field(value, "recommendations"),
        questions: list_field(value, "questions"),
        answers: list_field(value, "answers"),
    }
}

pub fn parse_document_metadata(value: &JsonValue) -> DocumentMetadata {
    DocumentMetadata {
        patient_name: string_field(value, "patient_name"),
        document_date: string_field(value, "document_date"),
        document_type: string_field(value, "document_type"),
        conditions: list_field(value, "conditions"),
        medications: list_field(value, "medications"),
        procedures: list_field(value, "procedures"),
    }
}

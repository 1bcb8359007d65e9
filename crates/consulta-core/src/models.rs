//! Core data model for the consulta engine: ingestion records, speaker
//! diarization output, vector entries, and chat/query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

// =============================================================================
// INGESTION STATUS MACHINE
// =============================================================================

/// Processing status shared by recordings and documents.
///
/// Transitions only move forward, except that any state may fail. Documents
/// skip `Transcribing` and `Diarizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Pending,
    Transcribing,
    Extracting,
    Diarizing,
    Indexing,
    Completed,
    Failed,
}

impl IngestStatus {
    /// Position in the forward ordering; `Failed` is terminal from anywhere.
    fn rank(self) -> u8 {
        match self {
            IngestStatus::Pending => 0,
            IngestStatus::Transcribing => 1,
            IngestStatus::Extracting => 2,
            IngestStatus::Diarizing => 3,
            IngestStatus::Indexing => 4,
            IngestStatus::Completed => 5,
            IngestStatus::Failed => 6,
        }
    }

    /// Whether a transition from `self` to `next` respects the forward-only
    /// status machine.
    pub fn can_transition_to(self, next: IngestStatus) -> bool {
        if self == IngestStatus::Completed || self == IngestStatus::Failed {
            return false;
        }
        next == IngestStatus::Failed || next.rank() > self.rank()
    }

    /// True once the record will never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestStatus::Completed | IngestStatus::Failed)
    }
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IngestStatus::Pending => "pending",
            IngestStatus::Transcribing => "transcribing",
            IngestStatus::Extracting => "extracting",
            IngestStatus::Diarizing => "diarizing",
            IngestStatus::Indexing => "indexing",
            IngestStatus::Completed => "completed",
            IngestStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for IngestStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IngestStatus::Pending),
            "transcribing" => Ok(IngestStatus::Transcribing),
            "extracting" => Ok(IngestStatus::Extracting),
            "diarizing" => Ok(IngestStatus::Diarizing),
            "indexing" => Ok(IngestStatus::Indexing),
            "completed" => Ok(IngestStatus::Completed),
            "failed" => Ok(IngestStatus::Failed),
            other => Err(format!("Invalid ingest status: {}", other)),
        }
    }
}

/// Outcome of a soft (non-fatal) pipeline side effect such as vector
/// indexing or diarization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    #[default]
    NotAttempted,
    Succeeded,
    Failed,
}

/// Failure details persisted on a record that ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: ErrorKind,
    /// Pipeline stage active when the failure happened.
    pub stage: Option<String>,
    pub message: String,
}

// =============================================================================
// EXTRACTED FIELDS
// =============================================================================

/// Perceived urgency of a clinical conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// Parse the Spanish labels the extraction LLM emits.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" | "baja" => Some(Urgency::Low),
            "medium" | "media" => Some(Urgency::Medium),
            "high" | "alta" => Some(Urgency::High),
            _ => None,
        }
    }
}

/// Canonical structured fields extracted from a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredFields {
    pub name: Option<String>,
    /// Age in years, valid range 0..=150; out-of-range values are dropped.
    pub age: Option<u8>,
    /// Conversation date, YYYY-MM-DD.
    pub date: Option<String>,
    pub diagnosis: Option<String>,
    pub physician: Option<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl StructuredFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.age.is_none()
            && self.date.is_none()
            && self.diagnosis.is_none()
            && self.physician.is_none()
            && self.medications.is_empty()
            && self.phone.is_none()
            && self.email.is_none()
    }
}

/// Contextual fields extracted from a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredFields {
    #[serde(default)]
    pub symptoms: Vec<String>,
    pub context: Option<String>,
    pub observations: Option<String>,
    #[serde(default)]
    pub emotions: Vec<String>,
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub answers: Vec<String>,
}

impl UnstructuredFields {
    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
            && self.context.is_none()
            && self.observations.is_none()
            && self.emotions.is_empty()
            && self.urgency.is_none()
            && self.recommendations.is_empty()
            && self.questions.is_empty()
            && self.answers.is_empty()
    }
}

/// Medical metadata extracted from an uploaded document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub patient_name: Option<String>,
    /// Document date, YYYY-MM-DD.
    pub document_date: Option<String>,
    pub document_type: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub procedures: Vec<String>,
}

// =============================================================================
// SPEAKER DIARIZATION
// =============================================================================

/// Role of a speaker in a clinical conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// Health promoter / interviewer.
    Promotor,
    /// Interviewee.
    Patient,
    Unknown,
    /// Overlapping speech.
    Multiple,
}

/// A contiguous stretch of speech attributed to one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker: Speaker,
    pub text: String,
    pub t_start: f64,
    pub t_end: f64,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
    pub word_count: usize,
}

impl SpeakerSegment {
    pub fn duration(&self) -> f64 {
        self.t_end - self.t_start
    }
}

/// Aggregate participation statistics derived from speaker segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeakerStats {
    pub total_speakers: usize,
    pub promotor_time_s: f64,
    pub patient_time_s: f64,
    pub unknown_time_s: f64,
    pub total_duration_s: f64,
    pub speaker_changes: usize,
    pub avg_segment_s: f64,
}

// =============================================================================
// INGESTION RECORDS
// =============================================================================

/// Audio ingestion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    pub filename: String,
    pub size_bytes: u64,
    pub mime: String,
    pub status: IngestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transcript_text: Option<String>,
    pub structured: Option<StructuredFields>,
    pub unstructured: Option<UnstructuredFields>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    pub duration_s: Option<f64>,
    /// ASR confidence, when the backend reports one.
    pub confidence: Option<f64>,
    pub vector_stored: StageOutcome,
    pub vector_id: Option<String>,
    pub speaker_segments: Option<Vec<SpeakerSegment>>,
    pub speaker_stats: Option<SpeakerStats>,
    pub diarization: StageOutcome,
    pub error: Option<FailureInfo>,
}

impl Recording {
    /// Build a fresh pending record for an accepted upload.
    pub fn from_upload(filename: impl Into<String>, size_bytes: u64, mime: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            size_bytes,
            mime: mime.into(),
            status: IngestStatus::Pending,
            created_at: now,
            updated_at: now,
            processed_at: None,
            transcript_text: None,
            structured: None,
            unstructured: None,
            language: None,
            duration_s: None,
            confidence: None,
            vector_stored: StageOutcome::NotAttempted,
            vector_id: None,
            speaker_segments: None,
            speaker_stats: None,
            diarization: StageOutcome::NotAttempted,
            error: None,
        }
    }

    /// Patient name as extracted, if any.
    pub fn patient_name(&self) -> Option<&str> {
        self.structured.as_ref().and_then(|s| s.name.as_deref())
    }
}

/// Kind of uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Pdf => write!(f, "pdf"),
            FileKind::Image => write!(f, "image"),
        }
    }
}

/// PDF or image ingestion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub size_bytes: u64,
    pub mime: String,
    pub file_kind: FileKind,
    pub status: IngestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub extracted_text: Option<String>,
    pub page_count: Option<usize>,
    /// OCR confidence in [0, 1], image documents only.
    pub ocr_confidence: Option<f64>,
    pub language: Option<String>,
    pub patient_name: Option<String>,
    pub document_date: Option<String>,
    pub document_type: Option<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub procedures: Vec<String>,
    /// Linked recording with a fuzzy-matching patient name.
    pub recording_id: Option<Uuid>,
    pub vector_stored: StageOutcome,
    pub vector_id: Option<String>,
    pub error: Option<FailureInfo>,
}

impl Document {
    /// Build a fresh pending record for an accepted upload.
    pub fn from_upload(
        filename: impl Into<String>,
        size_bytes: u64,
        mime: impl Into<String>,
        file_kind: FileKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            size_bytes,
            mime: mime.into(),
            file_kind,
            status: IngestStatus::Pending,
            created_at: now,
            updated_at: now,
            processed_at: None,
            extracted_text: None,
            page_count: None,
            ocr_confidence: None,
            language: None,
            patient_name: None,
            document_date: None,
            document_type: None,
            conditions: Vec::new(),
            medications: Vec::new(),
            procedures: Vec::new(),
            recording_id: None,
            vector_stored: StageOutcome::NotAttempted,
            vector_id: None,
            error: None,
        }
    }

    /// Apply extracted medical metadata in one step.
    pub fn apply_metadata(&mut self, meta: DocumentMetadata) {
        self.patient_name = meta.patient_name;
        self.document_date = meta.document_date;
        self.document_type = meta.document_type;
        self.conditions = meta.conditions;
        self.medications = meta.medications;
        self.procedures = meta.procedures;
    }
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// Origin of a vector entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Recording,
    Document,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Recording => write!(f, "recording"),
            SourceKind::Document => write!(f, "document"),
        }
    }
}

/// Closed metadata set attached to every vector entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub patient_name: Option<String>,
    pub diagnosis: Option<String>,
    /// Comma-joined symptom list, for substring filtering.
    pub symptoms: Option<String>,
    /// Comma-joined document conditions.
    pub conditions: Option<String>,
    /// Source date, YYYY-MM-DD.
    pub date: Option<String>,
    pub urgency: Option<Urgency>,
    /// e.g. "promotor+patient" once diarization succeeded.
    pub speaker_mix: Option<String>,
    pub doc_type: Option<String>,
    pub language: Option<String>,
}

/// One embedded entry in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub vector_id: String,
    pub source_kind: SourceKind,
    pub source_id: Uuid,
    pub embedding: Vec<f32>,
    /// The text that was actually embedded.
    pub payload_text: String,
    pub metadata: VectorMetadata,
}

impl VectorEntry {
    /// Stable vector id for a source record: one entry per source, so a
    /// replayed indexing stage upserts the same id.
    pub fn id_for(kind: SourceKind, source_id: Uuid) -> String {
        match kind {
            SourceKind::Recording => format!("conv_{}", source_id),
            SourceKind::Document => format!("doc_{}", source_id),
        }
    }
}

/// Search hit from the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub entry: VectorEntry,
    /// Cosine similarity in [-1, 1] (1.0 for exact patient-field matches).
    pub similarity: f32,
}

/// Exact-match metadata filter applied before similarity ranking.
///
/// Every field is optional; `None` means "no constraint". String filters are
/// case-insensitive substring matches except `patient_name`, which is exact
/// after name normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub patient_name: Option<String>,
    pub diagnosis: Option<String>,
    pub doc_type: Option<String>,
    pub urgency: Option<Urgency>,
    pub source_kind: Option<SourceKind>,
    /// Inclusive lower bound on the metadata date (YYYY-MM-DD).
    pub date_from: Option<String>,
    /// Inclusive upper bound on the metadata date (YYYY-MM-DD).
    pub date_to: Option<String>,
}

impl MetadataFilter {
    pub fn is_empty(&self) -> bool {
        self.patient_name.is_none()
            && self.diagnosis.is_none()
            && self.doc_type.is_none()
            && self.urgency.is_none()
            && self.source_kind.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    /// Evaluate this filter against entry metadata.
    pub fn matches(&self, kind: SourceKind, meta: &VectorMetadata) -> bool {
        if let Some(want) = self.source_kind {
            if want != kind {
                return false;
            }
        }
        if let Some(ref want) = self.patient_name {
            let got = match meta.patient_name {
                Some(ref name) => crate::fuzzy::normalize_name(name),
                None => return false,
            };
            if got != crate::fuzzy::normalize_name(want) {
                return false;
            }
        }
        if let Some(ref want) = self.diagnosis {
            let got = meta.diagnosis.as_deref().unwrap_or_default().to_lowercase();
            if !got.contains(&want.to_lowercase()) {
                return false;
            }
        }
        if let Some(ref want) = self.doc_type {
            let got = meta.doc_type.as_deref().unwrap_or_default().to_lowercase();
            if got != want.to_lowercase() {
                return false;
            }
        }
        if let Some(want) = self.urgency {
            if meta.urgency != Some(want) {
                return false;
            }
        }
        if let Some(ref from) = self.date_from {
            match meta.date {
                // ISO dates compare correctly as strings
                Some(ref d) if d.as_str() >= from.as_str() => {}
                _ => return false,
            }
        }
        if let Some(ref to) = self.date_to {
            match meta.date {
                Some(ref d) if d.as_str() <= to.as_str() => {}
                _ => return false,
            }
        }
        true
    }
}

/// Name matching strategy for patient lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMatch {
    Exact,
    Fuzzy,
}

/// Vector index health and shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
    pub model_id: String,
}

// =============================================================================
// QUERY ANALYSIS & CHAT
// =============================================================================

/// Closed set of recognized chat intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PatientInfo,
    ConditionList,
    SymptomSearch,
    MedicationInfo,
    TemporalQuery,
    GeneralQuery,
    Unknown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Intent::PatientInfo => "patient_info",
            Intent::ConditionList => "condition_list",
            Intent::SymptomSearch => "symptom_search",
            Intent::MedicationInfo => "medication_info",
            Intent::TemporalQuery => "temporal_query",
            Intent::GeneralQuery => "general_query",
            Intent::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Entities recognized in a chat query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    pub patients: Vec<String>,
    pub conditions: Vec<String>,
    pub symptoms: Vec<String>,
    pub medications: Vec<String>,
    pub dates: Vec<String>,
}

impl Entities {
    pub fn total(&self) -> usize {
        self.patients.len()
            + self.conditions.len()
            + self.symptoms.len()
            + self.medications.len()
            + self.dates.len()
    }
}

/// Analyzed form of a chat query, driving retrieval strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub raw_query: String,
    pub normalized: String,
    pub intent: Intent,
    pub entities: Entities,
    pub filters: MetadataFilter,
    pub search_terms: Vec<String>,
}

/// A retrieved context after ranking, ready for prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedContext {
    pub vector_id: String,
    pub source_kind: SourceKind,
    pub source_id: Uuid,
    pub patient_name: Option<String>,
    pub diagnosis: Option<String>,
    pub symptoms: Option<String>,
    pub date: Option<String>,
    pub payload_text: String,
    pub similarity: f32,
    pub final_score: f32,
    pub excerpt: String,
}

/// One cited source in a chat answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: Uuid,
    pub source_kind: SourceKind,
    pub patient_name: Option<String>,
    pub relevance: f32,
    pub excerpt: String,
    pub date: Option<String>,
}

/// How the analyzer classified the query, echoed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryClassification {
    pub entities: Entities,
    pub search_terms: Vec<String>,
    pub normalized_query: String,
}

/// Final answer from the RAG generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    /// Clamped to [0.1, 0.95]; ≤ 0.3 when the context was insufficient.
    pub confidence: f32,
    pub intent: Intent,
    pub follow_up_suggestions: Vec<String>,
    pub classification: QueryClassification,
    pub elapsed_ms: u64,
}

/// Chat request accepted by the façade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub max_results: Option<usize>,
    #[serde(default)]
    pub filters: MetadataFilter,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

fn default_true() -> bool {
    true
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
            filters: MetadataFilter::default(),
            include_sources: true,
        }
    }
}

// =============================================================================
// LISTING & PAGINATION
// =============================================================================

/// Page request for listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub page: usize,
    pub per_page: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Page {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }
}

/// One page of results plus the total count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

/// Filter for listing ingestion records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    pub status: Option<IngestStatus>,
    /// Case-insensitive patient-name substring (documents and completed
    /// recordings).
    pub patient: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_forward_transitions() {
        use IngestStatus::*;
        assert!(Pending.can_transition_to(Transcribing));
        assert!(Pending.can_transition_to(Extracting));
        assert!(Transcribing.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Diarizing));
        assert!(Diarizing.can_transition_to(Indexing));
        assert!(Indexing.can_transition_to(Completed));
    }

    #[test]
    fn test_status_rejects_backward_transitions() {
        use IngestStatus::*;
        assert!(!Extracting.can_transition_to(Transcribing));
        assert!(!Indexing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Indexing));
    }

    #[test]
    fn test_any_active_status_can_fail() {
        use IngestStatus::*;
        for status in [Pending, Transcribing, Extracting, Diarizing, Indexing] {
            assert!(status.can_transition_to(Failed), "{} -> Failed", status);
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_status_terminal() {
        assert!(IngestStatus::Completed.is_terminal());
        assert!(IngestStatus::Failed.is_terminal());
        assert!(!IngestStatus::Indexing.is_terminal());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&IngestStatus::Transcribing).unwrap();
        assert_eq!(json, "\"transcribing\"");
        let back: IngestStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(back, IngestStatus::Completed);
    }

    #[test]
    fn test_status_from_str_roundtrip() {
        use IngestStatus::*;
        for status in [Pending, Transcribing, Extracting, Diarizing, Indexing, Completed, Failed] {
            let parsed: IngestStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<IngestStatus>().is_err());
    }

    #[test]
    fn test_urgency_parse_spanish_and_english() {
        assert_eq!(Urgency::parse("baja"), Some(Urgency::Low));
        assert_eq!(Urgency::parse("media"), Some(Urgency::Medium));
        assert_eq!(Urgency::parse("Alta"), Some(Urgency::High));
        assert_eq!(Urgency::parse("high"), Some(Urgency::High));
        assert_eq!(Urgency::parse("critical"), None);
    }

    #[test]
    fn test_recording_from_upload_defaults() {
        let rec = Recording::from_upload("consulta1.wav", 1024, "audio/wav");
        assert_eq!(rec.status, IngestStatus::Pending);
        assert_eq!(rec.vector_stored, StageOutcome::NotAttempted);
        assert_eq!(rec.diarization, StageOutcome::NotAttempted);
        assert!(rec.transcript_text.is_none());
        assert!(rec.error.is_none());
        assert_eq!(rec.created_at, rec.updated_at);
    }

    #[test]
    fn test_vector_entry_id_is_stable() {
        let id = Uuid::new_v4();
        assert_eq!(
            VectorEntry::id_for(SourceKind::Recording, id),
            VectorEntry::id_for(SourceKind::Recording, id)
        );
        assert_ne!(
            VectorEntry::id_for(SourceKind::Recording, id),
            VectorEntry::id_for(SourceKind::Document, id)
        );
    }

    #[test]
    fn test_metadata_filter_empty_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(SourceKind::Recording, &VectorMetadata::default()));
    }

    #[test]
    fn test_metadata_filter_patient_exact_normalized() {
        let filter = MetadataFilter {
            patient_name: Some("Pepito Gómez".to_string()),
            ..Default::default()
        };
        let meta = VectorMetadata {
            patient_name: Some("pepito gomez".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(SourceKind::Recording, &meta));

        let other = VectorMetadata {
            patient_name: Some("Juana Pérez".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(SourceKind::Recording, &other));
    }

    #[test]
    fn test_metadata_filter_diagnosis_substring() {
        let filter = MetadataFilter {
            diagnosis: Some("diabetes".to_string()),
            ..Default::default()
        };
        let meta = VectorMetadata {
            diagnosis: Some("Diabetes mellitus tipo 2".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(SourceKind::Recording, &meta));
        assert!(!filter.matches(SourceKind::Recording, &VectorMetadata::default()));
    }

    #[test]
    fn test_metadata_filter_date_range() {
        let filter = MetadataFilter {
            date_from: Some("2026-01-01".to_string()),
            date_to: Some("2026-06-30".to_string()),
            ..Default::default()
        };
        let inside = VectorMetadata {
            date: Some("2026-03-15".to_string()),
            ..Default::default()
        };
        let outside = VectorMetadata {
            date: Some("2025-12-31".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(SourceKind::Recording, &inside));
        assert!(!filter.matches(SourceKind::Recording, &outside));
        assert!(!filter.matches(SourceKind::Recording, &VectorMetadata::default()));
    }

    #[test]
    fn test_metadata_filter_source_kind() {
        let filter = MetadataFilter {
            source_kind: Some(SourceKind::Document),
            ..Default::default()
        };
        assert!(filter.matches(SourceKind::Document, &VectorMetadata::default()));
        assert!(!filter.matches(SourceKind::Recording, &VectorMetadata::default()));
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::default().offset(), 0);
        let p = Page {
            page: 3,
            per_page: 20,
        };
        assert_eq!(p.offset(), 40);
        let zero = Page {
            page: 0,
            per_page: 20,
        };
        assert_eq!(zero.offset(), 0);
    }

    #[test]
    fn test_structured_fields_is_empty() {
        assert!(StructuredFields::default().is_empty());
        let with_name = StructuredFields {
            name: Some("Pepito Gómez".to_string()),
            ..Default::default()
        };
        assert!(!with_name.is_empty());
    }

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"query": "¿Qué enfermedad tiene Pepito?"}"#).unwrap();
        assert!(req.include_sources);
        assert!(req.max_results.is_none());
        assert!(req.filters.is_empty());
    }

    #[test]
    fn test_speaker_segment_duration() {
        let seg = SpeakerSegment {
            speaker: Speaker::Promotor,
            text: "buenos días".to_string(),
            t_start: 1.5,
            t_end: 3.0,
            confidence: 0.8,
            word_count: 2,
        };
        assert!((seg.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_document_apply_metadata() {
        let mut doc = Document::from_upload("examen.pdf", 2048, "application/pdf", FileKind::Pdf);
        doc.apply_metadata(DocumentMetadata {
            patient_name: Some("Pepito Gómez".to_string()),
            document_date: Some("2026-07-01".to_string()),
            document_type: Some("examen de laboratorio".to_string()),
            conditions: vec!["diabetes".to_string()],
            medications: vec![],
            procedures: vec!["glucosa en sangre".to_string()],
        });
        assert_eq!(doc.patient_name.as_deref(), Some("Pepito Gómez"));
        assert_eq!(doc.conditions, vec!["diabetes"]);
    }

    #[test]
    fn test_intent_display() {
        assert_eq!(Intent::PatientInfo.to_string(), "patient_info");
        assert_eq!(Intent::ConditionList.to_string(), "condition_list");
        assert_eq!(Intent::GeneralQuery.to_string(), "general_query");
    }

    #[test]
    fn test_recording_serde_roundtrip() {
        let mut rec = Recording::from_upload("a.wav", 10, "audio/wav");
        rec.structured = Some(StructuredFields {
            name: Some("Ana Díaz".to_string()),
            age: Some(44),
            ..Default::default()
        });
        let json = serde_json::to_string(&rec).unwrap();
        let back: Recording = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}

//! Document ingestion pipeline:
//! validate → OCR/PDF extract → metadata extract → index → link → complete.

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use consulta_core::defaults::{FUZZY_LINK_THRESHOLD, OCR_MIN_CONFIDENCE, PDF_MAX_PAGES};
use consulta_core::{
    build_document_payload, fuzzy, DocumentPatch, Error, FailureInfo, FileKind, IngestStatus,
    Result, SourceKind, StageOutcome, VectorEntry, VectorMetadata,
};

use crate::context::{guarded, IngestContext};

/// Caller-provided metadata accompanying a document upload; provided values
/// take precedence over extracted ones.
#[derive(Debug, Clone, Default)]
pub struct DocumentUploadMeta {
    pub patient_name: Option<String>,
    pub document_type: Option<String>,
    pub description: Option<String>,
    /// Accept images whose OCR confidence falls below the minimum.
    pub allow_low_confidence: bool,
    /// OCR language override (Tesseract code).
    pub ocr_language: Option<String>,
}

/// Drive one document through the whole pipeline. The record must be
/// Pending. Hard failures mark the record Failed and return `Ok`.
pub async fn process_document(
    ctx: &IngestContext,
    id: Uuid,
    data: Vec<u8>,
    meta: DocumentUploadMeta,
    cancel: &mut watch::Receiver<bool>,
) -> Result<()> {
    // ── Stage: extract text (OCR / PDF text layer) ─────────────────────
    ctx.documents
        .transition(id, IngestStatus::Pending, IngestStatus::Extracting)
        .await?;

    let document = ctx.documents.get(id).await?;
    let ocr_lang = meta.ocr_language.as_deref().unwrap_or("spa");

    let text_patch = match document.file_kind {
        FileKind::Pdf => {
            match guarded(
                "extract_pdf",
                ctx.deadlines.ocr,
                cancel,
                ctx.ocr.extract_pdf(&data, PDF_MAX_PAGES),
            )
            .await
            {
                Ok(extraction) => DocumentPatch {
                    extracted_text: Some(extraction.text),
                    page_count: Some(extraction.page_count),
                    ..Default::default()
                },
                Err(e) => return fail_document(ctx, id, "extract_pdf", e).await,
            }
        }
        FileKind::Image => {
            match guarded(
                "extract_image",
                ctx.deadlines.ocr,
                cancel,
                ctx.ocr.extract_image(&data, ocr_lang),
            )
            .await
            {
                Ok(extraction) => {
                    if extraction.confidence < OCR_MIN_CONFIDENCE as f64
                        && !meta.allow_low_confidence
                    {
                        return fail_document(
                            ctx,
                            id,
                            "extract_image",
                            Error::InvalidMedia(format!(
                                "OCR confidence {:.2} below minimum {:.2}",
                                extraction.confidence, OCR_MIN_CONFIDENCE
                            )),
                        )
                        .await;
                    }
                    DocumentPatch {
                        extracted_text: Some(extraction.text),
                        page_count: Some(1),
                        ocr_confidence: Some(extraction.confidence),
                        ..Default::default()
                    }
                }
                Err(e) => return fail_document(ctx, id, "extract_image", e).await,
            }
        }
    };

    let extracted_text = text_patch.extracted_text.clone().unwrap_or_default();
    let document = ctx.documents.get(id).await?;
    ctx.documents
        .update(id, document.updated_at, text_patch)
        .await?;

    // ── Stage: medical metadata extraction ─────────────────────────────
    let mut metadata = match guarded(
        "extract_metadata",
        ctx.deadlines.llm * 2,
        cancel,
        ctx.extractor.extract_document_metadata(&extracted_text),
    )
    .await
    {
        Ok(metadata) => metadata,
        Err(e) => return fail_document(ctx, id, "extract_metadata", e).await,
    };
    // Caller-provided fields win over extraction.
    if meta.patient_name.is_some() {
        metadata.patient_name = meta.patient_name.clone();
    }
    if meta.document_type.is_some() {
        metadata.document_type = meta.document_type.clone();
    }

    let document = ctx.documents.get(id).await?;
    let document = ctx
        .documents
        .update(
            id,
            document.updated_at,
            DocumentPatch {
                metadata: Some(metadata.clone()),
                ..Default::default()
            },
        )
        .await?;

    // ── Stage: index (soft) ────────────────────────────────────────────
    ctx.documents
        .transition(id, IngestStatus::Extracting, IngestStatus::Indexing)
        .await?;

    let payload = build_document_payload(&extracted_text, &metadata);
    let index_result = guarded(
        "index",
        ctx.deadlines.embed + ctx.deadlines.vector,
        cancel,
        async {
            let embedding = ctx.embedder.embed(&payload).await?;
            let entry = VectorEntry {
                vector_id: VectorEntry::id_for(SourceKind::Document, id),
                source_kind: SourceKind::Document,
                source_id: id,
                embedding,
                payload_text: payload.clone(),
                metadata: VectorMetadata {
                    patient_name: metadata.patient_name.clone(),
                    diagnosis: if metadata.conditions.is_empty() {
                        None
                    } else {
                        Some(metadata.conditions.join(", "))
                    },
                    symptoms: None,
                    conditions: if metadata.conditions.is_empty() {
                        None
                    } else {
                        Some(metadata.conditions.join(", "))
                    },
                    date: metadata.document_date.clone(),
                    urgency: None,
                    speaker_mix: None,
                    doc_type: metadata.document_type.clone(),
                    language: document.language.clone(),
                },
            };
            ctx.vectors.upsert(entry).await
        },
    )
    .await;

    let index_patch = match index_result {
        Ok(vector_id) => DocumentPatch {
            vector_stored: Some(StageOutcome::Succeeded),
            vector_id: Some(vector_id),
            ..Default::default()
        },
        Err(e) if matches!(e, Error::Cancelled(_)) => {
            return fail_document(ctx, id, "index", e).await;
        }
        Err(e) => {
            warn!(document_id = %id, error = %e, "Vector indexing failed, continuing");
            DocumentPatch {
                vector_stored: Some(StageOutcome::Failed),
                ..Default::default()
            }
        }
    };

    let document = ctx.documents.get(id).await?;
    ctx.documents
        .update(id, document.updated_at, index_patch)
        .await?;

    // ── Stage: link to a recording by fuzzy patient name ───────────────
    if let Some(patient) = metadata.patient_name.as_deref() {
        if let Some(recording_id) = best_recording_match(ctx, patient).await? {
            let document = ctx.documents.get(id).await?;
            ctx.documents
                .update(
                    id,
                    document.updated_at,
                    DocumentPatch {
                        recording_id: Some(recording_id),
                        ..Default::default()
                    },
                )
                .await?;
            info!(document_id = %id, recording_id = %recording_id, "Document linked to recording");
        }
    }

    // ── Complete ───────────────────────────────────────────────────────
    ctx.documents
        .transition(id, IngestStatus::Indexing, IngestStatus::Completed)
        .await?;
    let document = ctx.documents.get(id).await?;
    ctx.documents
        .update(
            id,
            document.updated_at,
            DocumentPatch {
                processed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    info!(document_id = %id, "Document pipeline completed");
    Ok(())
}

/// Find the single most similar completed recording by patient name, at or
/// above the linking threshold.
async fn best_recording_match(ctx: &IngestContext, patient: &str) -> Result<Option<Uuid>> {
    let candidates = ctx.recordings.list_named_patients().await?;
    Ok(candidates
        .into_iter()
        .map(|(id, name)| (id, fuzzy::fuzzy_name_score(patient, &name)))
        .filter(|(_, score)| *score >= FUZZY_LINK_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id))
}

/// Mark a document Failed with its classified error kind and stage.
pub async fn fail_document(ctx: &IngestContext, id: Uuid, stage: &str, error: Error) -> Result<()> {
    let kind = if error.is_classified_failure() {
        error.kind()
    } else {
        consulta_core::ErrorKind::Internal
    };
    warn!(document_id = %id, stage, kind = %kind, error = %error, "Document failed");

    let document = ctx.documents.get(id).await?;
    let current = document.status;
    ctx.documents
        .update(
            id,
            document.updated_at,
            DocumentPatch {
                error: Some(FailureInfo {
                    kind,
                    stage: Some(stage.to_string()),
                    message: error.to_string(),
                }),
                processed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;
    ctx.documents
        .transition(id, current, IngestStatus::Failed)
        .await?;
    Ok(())
}

//! Audio ingestion pipeline:
//! validate → transcribe → extract → diarize → index → complete.
//!
//! Each stage re-reads the record and advances it with a compare-and-swap
//! transition; diarization and indexing failures are soft.

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use consulta_core::{
    build_recording_payload, Error, FailureInfo, IngestStatus, RecordingPatch, Result, Speaker,
    StageOutcome, VectorEntry, VectorMetadata,
};

use crate::context::{guarded, IngestContext};

/// Drive one recording through the whole pipeline. The record must be
/// Pending. Hard failures mark the record Failed and return `Ok`; only
/// store-level errors escape.
pub async fn process_recording(
    ctx: &IngestContext,
    id: Uuid,
    audio: Vec<u8>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<()> {
    // ── Stage: transcribe ──────────────────────────────────────────────
    ctx.recordings
        .transition(id, IngestStatus::Pending, IngestStatus::Transcribing)
        .await?;

    let record = ctx.recordings.get(id).await?;
    let transcription = match guarded(
        "transcribe",
        ctx.deadlines.asr,
        cancel,
        ctx.asr.transcribe(&audio, &record.mime, None),
    )
    .await
    {
        Ok(t) => t,
        Err(e) => return fail_recording(ctx, id, "transcribe", e).await,
    };

    let record = ctx.recordings.get(id).await?;
    ctx.recordings
        .update(
            id,
            record.updated_at,
            RecordingPatch {
                transcript_text: Some(transcription.text.clone()),
                language: transcription.language.clone(),
                duration_s: transcription.duration_s,
                confidence: transcription.confidence,
                ..Default::default()
            },
        )
        .await?;

    // ── Stage: extract ─────────────────────────────────────────────────
    ctx.recordings
        .transition(id, IngestStatus::Transcribing, IngestStatus::Extracting)
        .await?;

    let extract_deadline = ctx.deadlines.llm * 2;
    let extracted = guarded("extract", extract_deadline, cancel, async {
        let (structured, unstructured) = tokio::join!(
            ctx.extractor.extract_structured(&transcription.text),
            ctx.extractor.extract_unstructured(&transcription.text),
        );
        Ok((structured?, unstructured?))
    })
    .await;

    let (structured, unstructured) = match extracted {
        Ok(pair) => pair,
        Err(e) => return fail_recording(ctx, id, "extract", e).await,
    };

    let record = ctx.recordings.get(id).await?;
    ctx.recordings
        .update(
            id,
            record.updated_at,
            RecordingPatch {
                structured: Some(structured.clone()),
                unstructured: Some(unstructured.clone()),
                ..Default::default()
            },
        )
        .await?;

    // ── Stage: diarize (soft) ──────────────────────────────────────────
    ctx.recordings
        .transition(id, IngestStatus::Extracting, IngestStatus::Diarizing)
        .await?;

    let diarization_patch =
        match ctx
            .diarizer
            .diarize(&transcription.text, &transcription.segments, Some(&audio))
        {
            Ok(output) => RecordingPatch {
                speaker_segments: Some(output.segments),
                speaker_stats: Some(output.stats),
                diarization: Some(StageOutcome::Succeeded),
                ..Default::default()
            },
            Err(e) => {
                warn!(recording_id = %id, error = %e, "Diarization failed, continuing");
                RecordingPatch {
                    diarization: Some(StageOutcome::Failed),
                    ..Default::default()
                }
            }
        };
    let record = ctx.recordings.get(id).await?;
    let record = ctx
        .recordings
        .update(id, record.updated_at, diarization_patch)
        .await?;

    // ── Stage: index (soft) ────────────────────────────────────────────
    ctx.recordings
        .transition(id, IngestStatus::Diarizing, IngestStatus::Indexing)
        .await?;

    let payload =
        build_recording_payload(&transcription.text, Some(&structured), Some(&unstructured));
    let speaker_mix = record.speaker_segments.as_deref().map(describe_speaker_mix);

    let index_result = guarded(
        "index",
        ctx.deadlines.embed + ctx.deadlines.vector,
        cancel,
        async {
            let embedding = ctx.embedder.embed(&payload).await?;
            let entry = VectorEntry {
                vector_id: VectorEntry::id_for(consulta_core::SourceKind::Recording, id),
                source_kind: consulta_core::SourceKind::Recording,
                source_id: id,
                embedding,
                payload_text: payload.clone(),
                metadata: VectorMetadata {
                    patient_name: structured.name.clone(),
                    diagnosis: structured.diagnosis.clone(),
                    symptoms: if unstructured.symptoms.is_empty() {
                        None
                    } else {
                        Some(unstructured.symptoms.join(", "))
                    },
                    conditions: None,
                    date: structured.date.clone(),
                    urgency: unstructured.urgency,
                    speaker_mix,
                    doc_type: None,
                    language: record.language.clone(),
                },
            };
            ctx.vectors.upsert(entry).await
        },
    )
    .await;

    let index_patch = match index_result {
        Ok(vector_id) => RecordingPatch {
            vector_stored: Some(StageOutcome::Succeeded),
            vector_id: Some(vector_id),
            ..Default::default()
        },
        Err(e) if matches!(e, Error::Cancelled(_)) => {
            return fail_recording(ctx, id, "index", e).await;
        }
        Err(e) => {
            warn!(recording_id = %id, error = %e, "Vector indexing failed, continuing");
            RecordingPatch {
                vector_stored: Some(StageOutcome::Failed),
                ..Default::default()
            }
        }
    };

    let record = ctx.recordings.get(id).await?;
    ctx.recordings
        .update(id, record.updated_at, index_patch)
        .await?;

    // ── Complete ───────────────────────────────────────────────────────
    ctx.recordings
        .transition(id, IngestStatus::Indexing, IngestStatus::Completed)
        .await?;
    let record = ctx.recordings.get(id).await?;
    ctx.recordings
        .update(
            id,
            record.updated_at,
            RecordingPatch {
                processed_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    info!(recording_id = %id, "Recording pipeline completed");
    Ok(())
}

/// Summarize which roles were detected, e.g. "promotor+patient".
fn describe_speaker_mix(segments: &[consulta_core::SpeakerSegment]) -> String {
    let mut parts = Vec::new();
    if segments.iter().any(|s| s.speaker == Speaker::Promotor) {
        parts.push("promotor");
    }
    if segments.iter().any(|s| s.speaker == Speaker::Patient) {
        parts.push("patient");
    }
    if parts.is_empty() {
        parts.push("unknown");
    }
    parts.join("+")
}

/// Mark a recording Failed with its classified error kind and stage.
pub async fn fail_recording(
    ctx: &IngestContext,
    id: Uuid,
    stage: &str,
    error: Error,
) -> Result<()> {
    let kind = if error.is_classified_failure() {
        error.kind()
    } else {
        consulta_core::ErrorKind::Internal
    };
    warn!(recording_id = %id, stage, kind = %kind, error = %error, "Recording failed");

    let record = ctx.recordings.get(id).await?;
    let current = record.status;
    ctx.recordings
        .update(
            id,
            record.updated_at,
            RecordingPatch {
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
    ctx.recordings
        .transition(id, current, IngestStatus::Failed)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use consulta_core::SpeakerSegment;

    fn seg(speaker: Speaker) -> SpeakerSegment {
        SpeakerSegment {
            speaker,
            text: "texto".to_string(),
            t_start: 0.0,
            t_end: 1.0,
            confidence: 0.8,
            word_count: 1,
        }
    }

    #[test]
    fn test_describe_speaker_mix() {
        assert_eq!(
            describe_speaker_mix(&[seg(Speaker::Promotor), seg(Speaker::Patient)]),
            "promotor+patient"
        );
        assert_eq!(describe_speaker_mix(&[seg(Speaker::Promotor)]), "promotor");
        assert_eq!(describe_speaker_mix(&[seg(Speaker::Unknown)]), "unknown");
        assert_eq!(describe_speaker_mix(&[]), "unknown");
    }
}

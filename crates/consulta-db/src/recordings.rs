//! PostgreSQL implementation of the recording store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use consulta_core::{
    Error, IngestStatus, Page, PageOf, RecordFilter, Recording, RecordingPatch, RecordingStore,
    Result, StageOutcome,
};

/// PostgreSQL-backed [`RecordingStore`].
pub struct PgRecordingStore {
    pool: PgPool,
}

impl PgRecordingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_recording(row: &PgRow) -> Result<Recording> {
        let status: String = row.get("status");
        let vector_stored: String = row.get("vector_stored");
        let diarization: String = row.get("diarization");

        Ok(Recording {
            id: row.get("id"),
            filename: row.get("filename"),
            size_bytes: row.get::<i64, _>("size_bytes") as u64,
            mime: row.get("mime"),
            status: status
                .parse()
                .map_err(|e: String| Error::Internal(format!("corrupt status column: {}", e)))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            processed_at: row.get("processed_at"),
            transcript_text: row.get("transcript_text"),
            structured: row
                .get::<Option<serde_json::Value>, _>("structured")
                .map(serde_json::from_value)
                .transpose()?,
            unstructured: row
                .get::<Option<serde_json::Value>, _>("unstructured")
                .map(serde_json::from_value)
                .transpose()?,
            language: row.get("language"),
            duration_s: row.get("duration_s"),
            confidence: row.get("confidence"),
            vector_stored: parse_outcome(&vector_stored)?,
            vector_id: row.get("vector_id"),
            speaker_segments: row
                .get::<Option<serde_json::Value>, _>("speaker_segments")
                .map(serde_json::from_value)
                .transpose()?,
            speaker_stats: row
                .get::<Option<serde_json::Value>, _>("speaker_stats")
                .map(serde_json::from_value)
                .transpose()?,
            diarization: parse_outcome(&diarization)?,
            error: row
                .get::<Option<serde_json::Value>, _>("error")
                .map(serde_json::from_value)
                .transpose()?,
        })
    }

    async fn write_full(
        tx: &mut Transaction<'_, Postgres>,
        recording: &Recording,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE recording SET
                status = $2, updated_at = $3, processed_at = $4,
                transcript_text = $5, structured = $6, unstructured = $7,
                language = $8, duration_s = $9, confidence = $10,
                vector_stored = $11, vector_id = $12,
                speaker_segments = $13, speaker_stats = $14,
                diarization = $15, error = $16
            WHERE id = $1
            "#,
        )
        .bind(recording.id)
        .bind(recording.status.to_string())
        .bind(recording.updated_at)
        .bind(recording.processed_at)
        .bind(&recording.transcript_text)
        .bind(
            recording
                .structured
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            recording
                .unstructured
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&recording.language)
        .bind(recording.duration_s)
        .bind(recording.confidence)
        .bind(outcome_str(recording.vector_stored))
        .bind(&recording.vector_id)
        .bind(
            recording
                .speaker_segments
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(
            recording
                .speaker_stats
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(outcome_str(recording.diarization))
        .bind(recording.error.as_ref().map(serde_json::to_value).transpose()?)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

pub(crate) fn outcome_str(outcome: StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::NotAttempted => "not_attempted",
        StageOutcome::Succeeded => "succeeded",
        StageOutcome::Failed => "failed",
    }
}

pub(crate) fn parse_outcome(value: &str) -> Result<StageOutcome> {
    match value {
        "not_attempted" => Ok(StageOutcome::NotAttempted),
        "succeeded" => Ok(StageOutcome::Succeeded),
        "failed" => Ok(StageOutcome::Failed),
        other => Err(Error::Internal(format!(
            "corrupt stage outcome column: {}",
            other
        ))),
    }
}

/// Apply a patch to an in-memory recording, bumping `updated_at`.
pub(crate) fn apply_recording_patch(recording: &mut Recording, patch: RecordingPatch) {
    if let Some(v) = patch.transcript_text {
        recording.transcript_text = Some(v);
    }
    if let Some(v) = patch.structured {
        recording.structured = Some(v);
    }
    if let Some(v) = patch.unstructured {
        recording.unstructured = Some(v);
    }
    if let Some(v) = patch.language {
        recording.language = Some(v);
    }
    if let Some(v) = patch.duration_s {
        recording.duration_s = Some(v);
    }
    if let Some(v) = patch.confidence {
        recording.confidence = Some(v);
    }
    if let Some(v) = patch.vector_stored {
        recording.vector_stored = v;
    }
    if let Some(v) = patch.vector_id {
        recording.vector_id = Some(v);
    }
    if let Some(v) = patch.speaker_segments {
        recording.speaker_segments = Some(v);
    }
    if let Some(v) = patch.speaker_stats {
        recording.speaker_stats = Some(v);
    }
    if let Some(v) = patch.diarization {
        recording.diarization = v;
    }
    if let Some(v) = patch.processed_at {
        recording.processed_at = Some(v);
    }
    if let Some(v) = patch.error {
        recording.error = Some(v);
    }
    recording.updated_at = Utc::now();
}

#[async_trait]
impl RecordingStore for PgRecordingStore {
    async fn create(&self, recording: Recording) -> Result<Recording> {
        sqlx::query(
            r#"
            INSERT INTO recording (
                id, filename, size_bytes, mime, status, created_at, updated_at,
                vector_stored, diarization
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(recording.id)
        .bind(&recording.filename)
        .bind(recording.size_bytes as i64)
        .bind(&recording.mime)
        .bind(recording.status.to_string())
        .bind(recording.created_at)
        .bind(recording.updated_at)
        .bind(outcome_str(recording.vector_stored))
        .bind(outcome_str(recording.diarization))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(recording_id = %recording.id, "Recording created");
        Ok(recording)
    }

    async fn get(&self, id: Uuid) -> Result<Recording> {
        let row = sqlx::query("SELECT * FROM recording WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::RecordingNotFound(id))?;
        Self::row_to_recording(&row)
    }

    async fn list(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Recording>> {
        const WHERE_SQL: &str = r#"
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
              AND ($4::text IS NULL OR structured->>'name' ILIKE '%' || $4 || '%')
        "#;

        let list_sql = format!(
            "SELECT * FROM recording {} ORDER BY created_at DESC, id LIMIT $5 OFFSET $6",
            WHERE_SQL
        );
        let count_sql = format!("SELECT COUNT(*) AS total FROM recording {}", WHERE_SQL);

        let status = filter.status.map(|s| s.to_string());

        let rows = sqlx::query(&list_sql)
            .bind(&status)
            .bind(filter.created_from)
            .bind(filter.created_to)
            .bind(&filter.patient)
            .bind(page.per_page as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let total_row = sqlx::query(&count_sql)
            .bind(&status)
            .bind(filter.created_from)
            .bind(filter.created_to)
            .bind(&filter.patient)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        let total: i64 = total_row.get("total");

        let items = rows
            .iter()
            .map(Self::row_to_recording)
            .collect::<Result<Vec<_>>>()?;

        Ok(PageOf {
            items,
            total: total as usize,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        patch: RecordingPatch,
    ) -> Result<Recording> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query("SELECT * FROM recording WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::RecordingNotFound(id))?;
        let mut recording = Self::row_to_recording(&row)?;

        if recording.updated_at != expected_updated_at {
            return Err(Error::Conflict(format!(
                "recording {} changed at {}",
                id, recording.updated_at
            )));
        }

        apply_recording_patch(&mut recording, patch);
        Self::write_full(&mut tx, &recording).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(recording)
    }

    async fn transition(&self, id: Uuid, from: IngestStatus, to: IngestStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidInput(format!(
                "illegal transition {} -> {}",
                from, to
            )));
        }
        let result = sqlx::query(
            "UPDATE recording SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "recording {} is not in status {}",
                id, from
            )));
        }
        debug!(recording_id = %id, from = %from, to = %to, "Recording transitioned");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM recording WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::RecordingNotFound(id));
        }
        Ok(())
    }

    async fn list_named_patients(&self) -> Result<Vec<(Uuid, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT id, structured->>'name' AS name
            FROM recording
            WHERE status = 'completed' AND structured->>'name' IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("name")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consulta_core::StructuredFields;

    #[test]
    fn test_outcome_roundtrip() {
        for outcome in [
            StageOutcome::NotAttempted,
            StageOutcome::Succeeded,
            StageOutcome::Failed,
        ] {
            assert_eq!(parse_outcome(outcome_str(outcome)).unwrap(), outcome);
        }
        assert!(parse_outcome("bogus").is_err());
    }

    #[test]
    fn test_apply_patch_sets_fields_and_bumps_updated_at() {
        let mut rec = Recording::from_upload("a.wav", 10, "audio/wav");
        let before = rec.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));

        apply_recording_patch(
            &mut rec,
            RecordingPatch {
                transcript_text: Some("hola".to_string()),
                structured: Some(StructuredFields {
                    name: Some("Pepito".to_string()),
                    ..Default::default()
                }),
                vector_stored: Some(StageOutcome::Succeeded),
                ..Default::default()
            },
        );

        assert_eq!(rec.transcript_text.as_deref(), Some("hola"));
        assert_eq!(rec.vector_stored, StageOutcome::Succeeded);
        assert!(rec.updated_at > before);
        // Untouched fields stay None.
        assert!(rec.language.is_none());
    }
}

//! pgvector-backed implementation of the vector index.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use consulta_core::defaults::{EMBED_DIMENSION, EMBED_MODEL, FUZZY_MATCH_THRESHOLD};
use consulta_core::{
    fuzzy, Error, IndexStats, MetadataFilter, NameMatch, Result, SourceKind, Urgency, VectorEntry,
    VectorHit, VectorIndex, VectorMetadata,
};

/// PostgreSQL + pgvector implementation of [`VectorIndex`].
///
/// The backing table is created lazily on first write.
pub struct PgVectorIndex {
    pool: PgPool,
    dimension: usize,
    model_id: String,
    initialized: AtomicBool,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dimension: EMBED_DIMENSION,
            model_id: EMBED_MODEL.to_string(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_model(mut self, dimension: usize, model_id: impl Into<String>) -> Self {
        self.dimension = dimension;
        self.model_id = model_id.into();
        self
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        crate::schema::ensure_schema(&self.pool).await?;
        self.initialized.store(true, Ordering::Release);
        info!(dimension = self.dimension, "Vector collection initialized");
        Ok(())
    }

    fn row_to_hit(row: &PgRow) -> Result<VectorHit> {
        let kind: String = row.get("source_kind");
        let embedding: Vector = row.get("embedding");
        let urgency: Option<String> = row.get("urgency");
        Ok(VectorHit {
            entry: VectorEntry {
                vector_id: row.get("vector_id"),
                source_kind: parse_kind(&kind)?,
                source_id: row.get("source_id"),
                embedding: embedding.to_vec(),
                payload_text: row.get("payload_text"),
                metadata: VectorMetadata {
                    patient_name: row.get("patient_name"),
                    diagnosis: row.get("diagnosis"),
                    symptoms: row.get("symptoms"),
                    conditions: row.get("conditions"),
                    date: row.get("date"),
                    urgency: urgency.as_deref().and_then(Urgency::parse),
                    speaker_mix: row.get("speaker_mix"),
                    doc_type: row.get("doc_type"),
                    language: row.get("language"),
                },
            },
            similarity: row.get::<f64, _>("similarity") as f32,
        })
    }
}

fn parse_kind(value: &str) -> Result<SourceKind> {
    match value {
        "recording" => Ok(SourceKind::Recording),
        "document" => Ok(SourceKind::Document),
        other => Err(Error::Internal(format!(
            "corrupt source_kind column: {}",
            other
        ))),
    }
}

fn urgency_str(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Low => "low",
        Urgency::Medium => "medium",
        Urgency::High => "high",
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(&self, entry: VectorEntry) -> Result<String> {
        if entry.embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: entry.embedding.len(),
            });
        }
        self.ensure_initialized().await?;

        let patient_norm = entry
            .metadata
            .patient_name
            .as_deref()
            .map(fuzzy::normalize_name);

        sqlx::query(
            r#"
            INSERT INTO vector_entry (
                vector_id, source_kind, source_id, embedding, payload_text,
                patient_name, patient_name_norm, diagnosis, symptoms,
                conditions, date, urgency, speaker_mix, doc_type, language
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (vector_id) DO UPDATE SET
                source_kind = EXCLUDED.source_kind,
                source_id = EXCLUDED.source_id,
                embedding = EXCLUDED.embedding,
                payload_text = EXCLUDED.payload_text,
                patient_name = EXCLUDED.patient_name,
                patient_name_norm = EXCLUDED.patient_name_norm,
                diagnosis = EXCLUDED.diagnosis,
                symptoms = EXCLUDED.symptoms,
                conditions = EXCLUDED.conditions,
                date = EXCLUDED.date,
                urgency = EXCLUDED.urgency,
                speaker_mix = EXCLUDED.speaker_mix,
                doc_type = EXCLUDED.doc_type,
                language = EXCLUDED.language
            "#,
        )
        .bind(&entry.vector_id)
        .bind(entry.source_kind.to_string())
        .bind(entry.source_id)
        .bind(Vector::from(entry.embedding.clone()))
        .bind(&entry.payload_text)
        .bind(&entry.metadata.patient_name)
        .bind(&patient_norm)
        .bind(&entry.metadata.diagnosis)
        .bind(&entry.metadata.symptoms)
        .bind(&entry.metadata.conditions)
        .bind(&entry.metadata.date)
        .bind(entry.metadata.urgency.map(urgency_str))
        .bind(&entry.metadata.speaker_mix)
        .bind(&entry.metadata.doc_type)
        .bind(&entry.metadata.language)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(vector_id = %entry.vector_id, "Vector entry upserted");
        Ok(entry.vector_id)
    }

    async fn delete(&self, vector_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vector_entry WHERE vector_id = $1")
            .bind(vector_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete_by_source(&self, kind: SourceKind, source_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM vector_entry WHERE source_kind = $1 AND source_id = $2")
            .bind(kind.to_string())
            .bind(source_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
        min_score: Option<f32>,
    ) -> Result<Vec<VectorHit>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        self.ensure_initialized().await?;

        let rows = sqlx::query(
            r#"
            SELECT *, 1.0 - (embedding <=> $1) AS similarity
            FROM vector_entry
            WHERE ($2::text IS NULL OR source_kind = $2)
              AND ($3::text IS NULL OR patient_name_norm = $3)
              AND ($4::text IS NULL OR diagnosis ILIKE '%' || $4 || '%')
              AND ($5::text IS NULL OR doc_type = $5)
              AND ($6::text IS NULL OR urgency = $6)
              AND ($7::text IS NULL OR date >= $7)
              AND ($8::text IS NULL OR date <= $8)
              AND (1.0 - (embedding <=> $1)) >= $9
            ORDER BY similarity DESC, date DESC NULLS LAST, source_id ASC
            LIMIT $10
            "#,
        )
        .bind(Vector::from(query.to_vec()))
        .bind(filter.source_kind.map(|k| k.to_string()))
        .bind(filter.patient_name.as_deref().map(fuzzy::normalize_name))
        .bind(&filter.diagnosis)
        .bind(filter.doc_type.as_deref().map(str::to_lowercase))
        .bind(filter.urgency.map(urgency_str))
        .bind(&filter.date_from)
        .bind(&filter.date_to)
        .bind(min_score.unwrap_or(-1.0) as f64)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::row_to_hit).collect()
    }

    async fn search_by_patient(
        &self,
        name: &str,
        strategy: NameMatch,
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        self.ensure_initialized().await?;
        let normalized = fuzzy::normalize_name(name);

        match strategy {
            NameMatch::Exact => {
                let rows = sqlx::query(
                    r#"
                    SELECT *, 1.0::float8 AS similarity
                    FROM vector_entry
                    WHERE patient_name_norm = $1
                    ORDER BY date DESC NULLS LAST, source_id ASC
                    LIMIT $2
                    "#,
                )
                .bind(&normalized)
                .bind(k as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
                rows.iter().map(Self::row_to_hit).collect()
            }
            NameMatch::Fuzzy => {
                // Score candidate names in Rust; the set of distinct patient
                // names stays small compared to the entry count.
                let rows = sqlx::query(
                    r#"
                    SELECT *, 1.0::float8 AS similarity
                    FROM vector_entry
                    WHERE patient_name IS NOT NULL
                    ORDER BY date DESC NULLS LAST, source_id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

                let mut hits: Vec<VectorHit> = rows
                    .iter()
                    .map(Self::row_to_hit)
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .filter_map(|mut hit| {
                        let candidate = hit.entry.metadata.patient_name.as_deref()?;
                        let score = fuzzy::fuzzy_name_score(name, candidate);
                        if score >= FUZZY_MATCH_THRESHOLD {
                            hit.similarity = score;
                            Some(hit)
                        } else {
                            None
                        }
                    })
                    .collect();

                hits.sort_by(|a, b| {
                    b.similarity
                        .partial_cmp(&a.similarity)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.entry.metadata.date.cmp(&a.entry.metadata.date))
                        .then_with(|| a.entry.source_id.cmp(&b.entry.source_id))
                });
                hits.truncate(k);
                Ok(hits)
            }
        }
    }

    async fn stats(&self) -> Result<IndexStats> {
        self.ensure_initialized().await?;
        let row = sqlx::query("SELECT COUNT(*) AS total FROM vector_entry")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        let total: i64 = row.get("total");
        Ok(IndexStats {
            count: total as usize,
            dimension: self.dimension,
            model_id: self.model_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("recording").unwrap(), SourceKind::Recording);
        assert_eq!(parse_kind("document").unwrap(), SourceKind::Document);
        assert!(parse_kind("note").is_err());
    }

    #[test]
    fn test_urgency_str() {
        assert_eq!(urgency_str(Urgency::Low), "low");
        assert_eq!(urgency_str(Urgency::High), "high");
    }
}

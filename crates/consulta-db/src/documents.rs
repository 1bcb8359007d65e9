//! PostgreSQL implementation of the document store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;
use uuid::Uuid;

use consulta_core::{
    Document, DocumentPatch, DocumentStore, Error, FileKind, IngestStatus, Page, PageOf,
    RecordFilter, Result,
};

use crate::recordings::{outcome_str, parse_outcome};

/// PostgreSQL-backed [`DocumentStore`].
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_document(row: &PgRow) -> Result<Document> {
        let status: String = row.get("status");
        let file_kind: String = row.get("file_kind");
        let vector_stored: String = row.get("vector_stored");

        Ok(Document {
            id: row.get("id"),
            filename: row.get("filename"),
            size_bytes: row.get::<i64, _>("size_bytes") as u64,
            mime: row.get("mime"),
            file_kind: match file_kind.as_str() {
                "pdf" => FileKind::Pdf,
                "image" => FileKind::Image,
                other => {
                    return Err(Error::Internal(format!(
                        "corrupt file_kind column: {}",
                        other
                    )))
                }
            },
            status: status
                .parse()
                .map_err(|e: String| Error::Internal(format!("corrupt status column: {}", e)))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            processed_at: row.get("processed_at"),
            extracted_text: row.get("extracted_text"),
            page_count: row.get::<Option<i64>, _>("page_count").map(|v| v as usize),
            ocr_confidence: row.get("ocr_confidence"),
            language: row.get("language"),
            patient_name: row.get("patient_name"),
            document_date: row.get("document_date"),
            document_type: row.get("document_type"),
            conditions: serde_json::from_value(row.get("conditions"))?,
            medications: serde_json::from_value(row.get("medications"))?,
            procedures: serde_json::from_value(row.get("procedures"))?,
            recording_id: row.get("recording_id"),
            vector_stored: parse_outcome(&vector_stored)?,
            vector_id: row.get("vector_id"),
            error: row
                .get::<Option<serde_json::Value>, _>("error")
                .map(serde_json::from_value)
                .transpose()?,
        })
    }

    async fn write_full(tx: &mut Transaction<'_, Postgres>, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE document SET
                status = $2, updated_at = $3, processed_at = $4,
                extracted_text = $5, page_count = $6, ocr_confidence = $7,
                language = $8, patient_name = $9, document_date = $10,
                document_type = $11, conditions = $12, medications = $13,
                procedures = $14, recording_id = $15,
                vector_stored = $16, vector_id = $17, error = $18
            WHERE id = $1
            "#,
        )
        .bind(document.id)
        .bind(document.status.to_string())
        .bind(document.updated_at)
        .bind(document.processed_at)
        .bind(&document.extracted_text)
        .bind(document.page_count.map(|v| v as i64))
        .bind(document.ocr_confidence)
        .bind(&document.language)
        .bind(&document.patient_name)
        .bind(&document.document_date)
        .bind(&document.document_type)
        .bind(serde_json::to_value(&document.conditions)?)
        .bind(serde_json::to_value(&document.medications)?)
        .bind(serde_json::to_value(&document.procedures)?)
        .bind(document.recording_id)
        .bind(outcome_str(document.vector_stored))
        .bind(&document.vector_id)
        .bind(document.error.as_ref().map(serde_json::to_value).transpose()?)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

/// Apply a patch to an in-memory document, bumping `updated_at`.
pub(crate) fn apply_document_patch(document: &mut Document, patch: DocumentPatch) {
    if let Some(v) = patch.extracted_text {
        document.extracted_text = Some(v);
    }
    if let Some(v) = patch.page_count {
        document.page_count = Some(v);
    }
    if let Some(v) = patch.ocr_confidence {
        document.ocr_confidence = Some(v);
    }
    if let Some(v) = patch.language {
        document.language = Some(v);
    }
    if let Some(v) = patch.metadata {
        document.apply_metadata(v);
    }
    if let Some(v) = patch.recording_id {
        document.recording_id = Some(v);
    }
    if let Some(v) = patch.vector_stored {
        document.vector_stored = v;
    }
    if let Some(v) = patch.vector_id {
        document.vector_id = Some(v);
    }
    if let Some(v) = patch.processed_at {
        document.processed_at = Some(v);
    }
    if let Some(v) = patch.error {
        document.error = Some(v);
    }
    document.updated_at = Utc::now();
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, document: Document) -> Result<Document> {
        sqlx::query(
            r#"
            INSERT INTO document (
                id, filename, size_bytes, mime, file_kind, status,
                created_at, updated_at, conditions, medications, procedures,
                vector_stored
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, '[]', '[]', '[]', $9)
            "#,
        )
        .bind(document.id)
        .bind(&document.filename)
        .bind(document.size_bytes as i64)
        .bind(&document.mime)
        .bind(document.file_kind.to_string())
        .bind(document.status.to_string())
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(outcome_str(document.vector_stored))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(document_id = %document.id, "Document created");
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Result<Document> {
        let row = sqlx::query("SELECT * FROM document WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::DocumentNotFound(id))?;
        Self::row_to_document(&row)
    }

    async fn list(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Document>> {
        const WHERE_SQL: &str = r#"
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
              AND ($4::text IS NULL OR patient_name ILIKE '%' || $4 || '%')
        "#;

        let list_sql = format!(
            "SELECT * FROM document {} ORDER BY created_at DESC, id LIMIT $5 OFFSET $6",
            WHERE_SQL
        );
        let count_sql = format!("SELECT COUNT(*) AS total FROM document {}", WHERE_SQL);

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
            .map(Self::row_to_document)
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
        patch: DocumentPatch,
    ) -> Result<Document> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query("SELECT * FROM document WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::DocumentNotFound(id))?;
        let mut document = Self::row_to_document(&row)?;

        if document.updated_at != expected_updated_at {
            return Err(Error::Conflict(format!(
                "document {} changed at {}",
                id, document.updated_at
            )));
        }

        apply_document_patch(&mut document, patch);
        Self::write_full(&mut tx, &document).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(document)
    }

    async fn transition(&self, id: Uuid, from: IngestStatus, to: IngestStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidInput(format!(
                "illegal transition {} -> {}",
                from, to
            )));
        }
        let result = sqlx::query(
            "UPDATE document SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "document {} is not in status {}",
                id, from
            )));
        }
        debug!(document_id = %id, from = %from, to = %to, "Document transitioned");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM document WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consulta_core::DocumentMetadata;

    #[test]
    fn test_apply_document_patch() {
        let mut doc = Document::from_upload("examen.pdf", 100, "application/pdf", FileKind::Pdf);
        let before = doc.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));

        apply_document_patch(
            &mut doc,
            DocumentPatch {
                extracted_text: Some("Glucosa 180 mg/dL".to_string()),
                page_count: Some(2),
                metadata: Some(DocumentMetadata {
                    patient_name: Some("Pepito Gómez".to_string()),
                    conditions: vec!["diabetes".to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        assert_eq!(doc.extracted_text.as_deref(), Some("Glucosa 180 mg/dL"));
        assert_eq!(doc.page_count, Some(2));
        assert_eq!(doc.patient_name.as_deref(), Some("Pepito Gómez"));
        assert!(doc.updated_at > before);
    }
}

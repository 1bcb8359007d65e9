//! Schema bootstrap: tables and indexes created if absent.

use sqlx::postgres::PgPool;

use consulta_core::defaults::EMBED_DIMENSION;
use consulta_core::{Error, Result};

/// Create all tables and secondary indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recording (
            id UUID PRIMARY KEY,
            filename TEXT NOT NULL,
            size_bytes BIGINT NOT NULL,
            mime TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            processed_at TIMESTAMPTZ,
            transcript_text TEXT,
            structured JSONB,
            unstructured JSONB,
            language TEXT,
            duration_s DOUBLE PRECISION,
            confidence DOUBLE PRECISION,
            vector_stored TEXT NOT NULL DEFAULT 'not_attempted',
            vector_id TEXT,
            speaker_segments JSONB,
            speaker_stats JSONB,
            diarization TEXT NOT NULL DEFAULT 'not_attempted',
            error JSONB
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document (
            id UUID PRIMARY KEY,
            filename TEXT NOT NULL,
            size_bytes BIGINT NOT NULL,
            mime TEXT NOT NULL,
            file_kind TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            processed_at TIMESTAMPTZ,
            extracted_text TEXT,
            page_count BIGINT,
            ocr_confidence DOUBLE PRECISION,
            language TEXT,
            patient_name TEXT,
            document_date TEXT,
            document_type TEXT,
            conditions JSONB NOT NULL DEFAULT '[]',
            medications JSONB NOT NULL DEFAULT '[]',
            procedures JSONB NOT NULL DEFAULT '[]',
            recording_id UUID,
            vector_stored TEXT NOT NULL DEFAULT 'not_attempted',
            vector_id TEXT,
            error JSONB
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS vector_entry (
            vector_id TEXT PRIMARY KEY,
            source_kind TEXT NOT NULL,
            source_id UUID NOT NULL,
            embedding vector({dim}) NOT NULL,
            payload_text TEXT NOT NULL,
            patient_name TEXT,
            patient_name_norm TEXT,
            diagnosis TEXT,
            symptoms TEXT,
            conditions TEXT,
            date TEXT,
            urgency TEXT,
            speaker_mix TEXT,
            doc_type TEXT,
            language TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        dim = EMBED_DIMENSION
    ))
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS recording_status_idx ON recording (status)",
        "CREATE INDEX IF NOT EXISTS recording_created_idx ON recording (created_at DESC)",
        "CREATE INDEX IF NOT EXISTS document_status_idx ON document (status)",
        "CREATE INDEX IF NOT EXISTS document_created_idx ON document (created_at DESC)",
        "CREATE INDEX IF NOT EXISTS document_patient_idx ON document (patient_name)",
        "CREATE INDEX IF NOT EXISTS vector_source_idx ON vector_entry (source_kind, source_id)",
        "CREATE INDEX IF NOT EXISTS vector_patient_idx ON vector_entry (patient_name_norm)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
    }

    Ok(())
}

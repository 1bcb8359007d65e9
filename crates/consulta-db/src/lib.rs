//! # consulta-db
//!
//! Persistence layer for the consulta engine:
//! - PostgreSQL record stores for recordings and documents (CAS updates,
//!   serialized per-record transitions)
//! - pgvector-backed vector index with metadata filtering and fuzzy patient
//!   lookup
//! - in-memory twins of both, sharing the same trait contracts, for tests
//!   and embedded deployments

pub mod documents;
pub mod memory;
pub mod pool;
pub mod recordings;
pub mod schema;
pub mod vector;

// Re-export core types
pub use consulta_core::*;

pub use documents::PgDocumentStore;
pub use memory::{MemoryDocumentStore, MemoryRecordingStore, MemoryVectorIndex};
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use recordings::PgRecordingStore;
pub use schema::ensure_schema;
pub use vector::PgVectorIndex;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::PgPool,
    /// Recording store.
    pub recordings: PgRecordingStore,
    /// Document store.
    pub documents: PgDocumentStore,
    /// Vector index.
    pub vectors: PgVectorIndex,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            recordings: PgRecordingStore::new(pool.clone()),
            documents: PgDocumentStore::new(pool.clone()),
            vectors: PgVectorIndex::new(pool.clone()),
            pool,
        }
    }

    /// Connect and construct all repositories.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.pool).await
    }
}

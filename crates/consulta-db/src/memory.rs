//! In-memory store and vector index with the same contracts as the
//! PostgreSQL implementations.
//!
//! Always compiled (not test-gated) so integration tests and embedded
//! deployments can run the full engine without external services.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use consulta_core::defaults::{EMBED_DIMENSION, EMBED_MODEL, FUZZY_MATCH_THRESHOLD};
use consulta_core::{
    fuzzy, Document, DocumentPatch, DocumentStore, Error, IndexStats, IngestStatus, MetadataFilter,
    NameMatch, Page, PageOf, RecordFilter, Recording, RecordingPatch, RecordingStore, Result,
    SourceKind, VectorEntry, VectorHit, VectorIndex,
};

use crate::documents::apply_document_patch;
use crate::recordings::apply_recording_patch;

fn matches_filter_times(
    created_at: DateTime<Utc>,
    filter: &RecordFilter,
) -> bool {
    if let Some(from) = filter.created_from {
        if created_at < from {
            return false;
        }
    }
    if let Some(to) = filter.created_to {
        if created_at > to {
            return false;
        }
    }
    true
}

fn paginate<T: Clone>(mut items: Vec<T>, page: Page) -> PageOf<T> {
    let total = items.len();
    let start = page.offset().min(total);
    let end = (start + page.per_page).min(total);
    PageOf {
        items: items.drain(start..end).collect(),
        total,
        page: page.page,
        per_page: page.per_page,
    }
}

// =============================================================================
// RECORDING STORE
// =============================================================================

/// In-memory [`RecordingStore`]; per-id mutation serialized by the map lock.
#[derive(Default)]
pub struct MemoryRecordingStore {
    records: Mutex<HashMap<Uuid, Recording>>,
}

impl MemoryRecordingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordingStore for MemoryRecordingStore {
    async fn create(&self, recording: Recording) -> Result<Recording> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(recording.id, recording.clone());
        Ok(recording)
    }

    async fn get(&self, id: Uuid) -> Result<Recording> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .get(&id)
            .cloned()
            .ok_or(Error::RecordingNotFound(id))
    }

    async fn list(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Recording>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut items: Vec<Recording> = records
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| matches_filter_times(r.created_at, &filter))
            .filter(|r| {
                filter.patient.as_ref().map_or(true, |p| {
                    r.patient_name()
                        .map(|name| name.to_lowercase().contains(&p.to_lowercase()))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(items, page))
    }

    async fn update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        patch: RecordingPatch,
    ) -> Result<Recording> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let recording = records.get_mut(&id).ok_or(Error::RecordingNotFound(id))?;
        if recording.updated_at != expected_updated_at {
            return Err(Error::Conflict(format!(
                "recording {} changed at {}",
                id, recording.updated_at
            )));
        }
        apply_recording_patch(recording, patch);
        Ok(recording.clone())
    }

    async fn transition(&self, id: Uuid, from: IngestStatus, to: IngestStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidInput(format!(
                "illegal transition {} -> {}",
                from, to
            )));
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let recording = records.get_mut(&id).ok_or(Error::RecordingNotFound(id))?;
        if recording.status != from {
            return Err(Error::Conflict(format!(
                "recording {} is not in status {}",
                id, from
            )));
        }
        recording.status = to;
        recording.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::RecordingNotFound(id))
    }

    async fn list_named_patients(&self) -> Result<Vec<(Uuid, String)>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .values()
            .filter(|r| r.status == IngestStatus::Completed)
            .filter_map(|r| r.patient_name().map(|n| (r.id, n.to_string())))
            .collect())
    }
}

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    records: Mutex<HashMap<Uuid, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: Document) -> Result<Document> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get(&self, id: Uuid) -> Result<Document> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(&id).cloned().ok_or(Error::DocumentNotFound(id))
    }

    async fn list(&self, filter: RecordFilter, page: Page) -> Result<PageOf<Document>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut items: Vec<Document> = records
            .values()
            .filter(|d| filter.status.map_or(true, |s| d.status == s))
            .filter(|d| matches_filter_times(d.created_at, &filter))
            .filter(|d| {
                filter.patient.as_ref().map_or(true, |p| {
                    d.patient_name
                        .as_deref()
                        .map(|name| name.to_lowercase().contains(&p.to_lowercase()))
                        .unwrap_or(false)
                })
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(items, page))
    }

    async fn update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        patch: DocumentPatch,
    ) -> Result<Document> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let document = records.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        if document.updated_at != expected_updated_at {
            return Err(Error::Conflict(format!(
                "document {} changed at {}",
                id, document.updated_at
            )));
        }
        apply_document_patch(document, patch);
        Ok(document.clone())
    }

    async fn transition(&self, id: Uuid, from: IngestStatus, to: IngestStatus) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidInput(format!(
                "illegal transition {} -> {}",
                from, to
            )));
        }
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let document = records.get_mut(&id).ok_or(Error::DocumentNotFound(id))?;
        if document.status != from {
            return Err(Error::Conflict(format!(
                "document {} is not in status {}",
                id, from
            )));
        }
        document.status = to;
        document.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::DocumentNotFound(id))
    }
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn order_hits(hits: &mut [VectorHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.entry.metadata.date.cmp(&a.entry.metadata.date))
            .then_with(|| a.entry.source_id.cmp(&b.entry.source_id))
    });
}

/// In-memory [`VectorIndex`] with hand-rolled cosine similarity.
pub struct MemoryVectorIndex {
    entries: Mutex<HashMap<String, VectorEntry>>,
    dimension: usize,
    model_id: String,
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            dimension: EMBED_DIMENSION,
            model_id: EMBED_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, dimension: usize, model_id: impl Into<String>) -> Self {
        self.dimension = dimension;
        self.model_id = model_id.into();
        self
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, entry: VectorEntry) -> Result<String> {
        if entry.embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: entry.embedding.len(),
            });
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let id = entry.vector_id.clone();
        entries.insert(id.clone(), entry);
        Ok(id)
    }

    async fn delete(&self, vector_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(vector_id);
        Ok(())
    }

    async fn delete_by_source(&self, kind: SourceKind, source_id: Uuid) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| !(e.source_kind == kind && e.source_id == source_id));
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
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<VectorHit> = entries
            .values()
            .filter(|e| filter.matches(e.source_kind, &e.metadata))
            .map(|e| VectorHit {
                similarity: cosine(query, &e.embedding),
                entry: e.clone(),
            })
            .filter(|h| min_score.map_or(true, |m| h.similarity >= m))
            .collect();
        order_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn search_by_patient(
        &self,
        name: &str,
        strategy: NameMatch,
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        let normalized = fuzzy::normalize_name(name);
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let mut hits: Vec<VectorHit> = entries
            .values()
            .filter_map(|e| {
                let candidate = e.metadata.patient_name.as_deref()?;
                let score = match strategy {
                    NameMatch::Exact => {
                        if fuzzy::normalize_name(candidate) == normalized {
                            1.0
                        } else {
                            return None;
                        }
                    }
                    NameMatch::Fuzzy => {
                        let score = fuzzy::fuzzy_name_score(name, candidate);
                        if score < FUZZY_MATCH_THRESHOLD {
                            return None;
                        }
                        score
                    }
                };
                Some(VectorHit {
                    similarity: score,
                    entry: e.clone(),
                })
            })
            .collect();
        order_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(IndexStats {
            count: entries.len(),
            dimension: self.dimension,
            model_id: self.model_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consulta_core::VectorMetadata;

    fn entry(kind: SourceKind, id: Uuid, dim: usize, value: f32, name: Option<&str>) -> VectorEntry {
        let mut embedding = vec![0.0; dim];
        embedding[0] = value;
        embedding[1] = 1.0 - value;
        VectorEntry {
            vector_id: VectorEntry::id_for(kind, id),
            source_kind: kind,
            source_id: id,
            embedding,
            payload_text: "texto".to_string(),
            metadata: VectorMetadata {
                patient_name: name.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn index() -> MemoryVectorIndex {
        MemoryVectorIndex::new().with_model(4, "test-model")
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let idx = index();
        let id = Uuid::new_v4();
        idx.upsert(entry(SourceKind::Recording, id, 4, 1.0, None))
            .await
            .unwrap();
        idx.upsert(entry(SourceKind::Recording, id, 4, 0.5, None))
            .await
            .unwrap();
        assert_eq!(idx.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let idx = index();
        let err = idx
            .upsert(entry(SourceKind::Recording, Uuid::new_v4(), 3, 1.0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));

        let err = idx.search(&[0.0; 7], 5, &MetadataFilter::default(), None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let idx = index();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        idx.upsert(entry(SourceKind::Recording, near, 4, 1.0, None))
            .await
            .unwrap();
        idx.upsert(entry(SourceKind::Recording, far, 4, 0.0, None))
            .await
            .unwrap();

        let hits = idx
            .search(&[1.0, 0.0, 0.0, 0.0], 10, &MetadataFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.source_id, near);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn test_search_min_score_filters() {
        let idx = index();
        idx.upsert(entry(SourceKind::Recording, Uuid::new_v4(), 4, 0.0, None))
            .await
            .unwrap();
        let hits = idx
            .search(&[1.0, 0.0, 0.0, 0.0], 10, &MetadataFilter::default(), Some(0.9))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_applies_metadata_filter() {
        let idx = index();
        idx.upsert(entry(SourceKind::Recording, Uuid::new_v4(), 4, 1.0, Some("Ana Díaz")))
            .await
            .unwrap();
        idx.upsert(entry(SourceKind::Recording, Uuid::new_v4(), 4, 1.0, Some("Luis Soto")))
            .await
            .unwrap();

        let filter = MetadataFilter {
            patient_name: Some("ana diaz".to_string()),
            ..Default::default()
        };
        let hits = idx
            .search(&[1.0, 0.0, 0.0, 0.0], 10, &filter, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].entry.metadata.patient_name.as_deref(),
            Some("Ana Díaz")
        );
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let idx = index();
        let id = Uuid::new_v4();
        idx.upsert(entry(SourceKind::Recording, id, 4, 1.0, None))
            .await
            .unwrap();
        idx.upsert(entry(SourceKind::Document, id, 4, 1.0, None))
            .await
            .unwrap();

        idx.delete_by_source(SourceKind::Recording, id).await.unwrap();
        assert_eq!(idx.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_patient_search_exact_and_fuzzy() {
        let idx = index();
        idx.upsert(entry(
            SourceKind::Recording,
            Uuid::new_v4(),
            4,
            1.0,
            Some("Pepito Gómez"),
        ))
        .await
        .unwrap();

        let exact = idx
            .search_by_patient("pepito gomez", NameMatch::Exact, 10)
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].similarity, 1.0);

        let fuzzy_hits = idx
            .search_by_patient("Pepito Antonio Gómez", NameMatch::Fuzzy, 10)
            .await
            .unwrap();
        assert_eq!(fuzzy_hits.len(), 1);
        assert!(fuzzy_hits[0].similarity >= FUZZY_MATCH_THRESHOLD);

        let miss = idx
            .search_by_patient("Carlos Ruiz", NameMatch::Fuzzy, 10)
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn test_recording_store_cas_conflict() {
        let store = MemoryRecordingStore::new();
        let rec = store
            .create(Recording::from_upload("a.wav", 10, "audio/wav"))
            .await
            .unwrap();

        let stale = rec.updated_at - chrono::Duration::seconds(10);
        let err = store
            .update(rec.id, stale, RecordingPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let ok = store
            .update(rec.id, rec.updated_at, RecordingPatch::default())
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_recording_store_transition_semantics() {
        let store = MemoryRecordingStore::new();
        let rec = store
            .create(Recording::from_upload("a.wav", 10, "audio/wav"))
            .await
            .unwrap();

        store
            .transition(rec.id, IngestStatus::Pending, IngestStatus::Transcribing)
            .await
            .unwrap();

        // Wrong `from` loses the CAS.
        let err = store
            .transition(rec.id, IngestStatus::Pending, IngestStatus::Extracting)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Backward transitions are rejected before touching the store.
        let err = store
            .transition(rec.id, IngestStatus::Transcribing, IngestStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_list_order_and_pagination() {
        let store = MemoryRecordingStore::new();
        for i in 0..5 {
            let mut rec = Recording::from_upload(format!("f{}.wav", i), 10, "audio/wav");
            rec.created_at = Utc::now() - chrono::Duration::seconds(100 - i);
            rec.updated_at = rec.created_at;
            store.create(rec).await.unwrap();
        }

        let page1 = store
            .list(
                RecordFilter::default(),
                Page {
                    page: 1,
                    per_page: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page1.total, 5);
        assert_eq!(page1.items.len(), 2);
        // Newest first.
        assert_eq!(page1.items[0].filename, "f4.wav");

        let page3 = store
            .list(
                RecordFilter::default(),
                Page {
                    page: 3,
                    per_page: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page3.items.len(), 1);
    }

    #[tokio::test]
    async fn test_list_status_filter() {
        let store = MemoryRecordingStore::new();
        let rec = store
            .create(Recording::from_upload("a.wav", 10, "audio/wav"))
            .await
            .unwrap();
        store
            .create(Recording::from_upload("b.wav", 10, "audio/wav"))
            .await
            .unwrap();
        store
            .transition(rec.id, IngestStatus::Pending, IngestStatus::Failed)
            .await
            .unwrap();

        let failed = store
            .list(
                RecordFilter {
                    status: Some(IngestStatus::Failed),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert_eq!(failed.items[0].id, rec.id);
    }

    #[tokio::test]
    async fn test_document_store_basics() {
        let store = MemoryDocumentStore::new();
        let doc = store
            .create(Document::from_upload(
                "examen.pdf",
                100,
                "application/pdf",
                consulta_core::FileKind::Pdf,
            ))
            .await
            .unwrap();

        let fetched = store.get(doc.id).await.unwrap();
        assert_eq!(fetched.filename, "examen.pdf");

        store.delete(doc.id).await.unwrap();
        assert!(store.get(doc.id).await.is_err());
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}

//! End-to-end pipeline tests over the in-memory store and mock providers.

use std::sync::Arc;
use std::time::Duration;

use consulta_core::{
    AsrSegment, Document, DocumentStore, Error, ErrorKind, FileKind, IngestStatus, Recording,
    RecordingStore, Speaker, StageOutcome, VectorIndex,
};
use consulta_db::{MemoryDocumentStore, MemoryRecordingStore, MemoryVectorIndex};
use consulta_ingest::{
    DocumentUploadMeta, IngestContext, IngestWorker, WorkItem, WorkerConfig,
};
use consulta_providers::{MockAsr, MockChat, MockEmbedding, MockOcr};

const STRUCTURED_JSON: &str = r#"{
    "name": "Pepito Gómez",
    "age": 45,
    "date": "2026-07-01",
    "diagnosis": "migraña crónica",
    "medications": ["ibuprofeno"]
}"#;

const UNSTRUCTURED_JSON: &str = r#"{
    "symptoms": ["dolor de cabeza", "náuseas"],
    "context": "consulta de seguimiento",
    "urgency": "media"
}"#;

const DOCUMENT_JSON: &str = r#"{
    "patient_name": "Pepito Gómez",
    "document_date": "2026-07-10",
    "document_type": "examen de laboratorio",
    "conditions": ["diabetes"],
    "procedures": ["glucosa en sangre"]
}"#;

struct Harness {
    recordings: Arc<MemoryRecordingStore>,
    documents: Arc<MemoryDocumentStore>,
    vectors: Arc<MemoryVectorIndex>,
    asr: MockAsr,
    chat: MockChat,
    handle: consulta_ingest::IngestHandle,
}

fn consultation_asr() -> MockAsr {
    MockAsr::new().with_text_and_segments(
        "Buenos días Pepito, ¿cómo se siente? Me duele la cabeza desde hace tres días doctor.",
        vec![
            AsrSegment {
                t_start: 0.0,
                t_end: 5.0,
                text: "Buenos días Pepito, ¿cómo se siente?".to_string(),
            },
            AsrSegment {
                t_start: 5.0,
                t_end: 12.0,
                text: "Me duele la cabeza desde hace tres días doctor".to_string(),
            },
        ],
    )
}

fn extraction_chat() -> MockChat {
    MockChat::new()
        .with_response_for("información estructurada", STRUCTURED_JSON)
        .with_response_for("información contextual", UNSTRUCTURED_JSON)
        .with_response_for("documentos clínicos", DOCUMENT_JSON)
}

fn harness_with(asr: MockAsr, chat: MockChat, ocr: MockOcr) -> Harness {
    consulta_core::logging::init_tracing();
    let recordings = Arc::new(MemoryRecordingStore::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let vectors = Arc::new(MemoryVectorIndex::new());

    let ctx = IngestContext::new(
        recordings.clone(),
        documents.clone(),
        vectors.clone(),
        Arc::new(asr.clone()),
        Arc::new(chat.clone()),
        Arc::new(MockEmbedding::new()),
        Arc::new(ocr),
    );
    let handle = IngestWorker::new(ctx, WorkerConfig::default()).start();

    Harness {
        recordings,
        documents,
        vectors,
        asr,
        chat,
        handle,
    }
}

fn harness() -> Harness {
    harness_with(consultation_asr(), extraction_chat(), MockOcr::new())
}

async fn wait_terminal_recording(
    store: &MemoryRecordingStore,
    id: uuid::Uuid,
) -> Recording {
    for _ in 0..200 {
        let record = store.get(id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("recording never reached a terminal status");
}

async fn wait_terminal_document(store: &MemoryDocumentStore, id: uuid::Uuid) -> Document {
    for _ in 0..200 {
        let document = store.get(id).await.unwrap();
        if document.status.is_terminal() {
            return document;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("document never reached a terminal status");
}

async fn submit_audio(h: &Harness) -> uuid::Uuid {
    let rec = h
        .recordings
        .create(Recording::from_upload("consulta1.wav", 1024, "audio/wav"))
        .await
        .unwrap();
    h.handle
        .submit(WorkItem::Audio {
            id: rec.id,
            data: b"RIFFxxxxWAVE-not-actual-audio".to_vec(),
        })
        .unwrap();
    rec.id
}

#[tokio::test]
async fn recording_completes_with_fields_segments_and_vector() {
    let h = harness();
    let id = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, id).await;

    assert_eq!(record.status, IngestStatus::Completed);
    assert!(record.transcript_text.as_deref().unwrap().contains("Pepito"));
    assert_eq!(
        record.structured.as_ref().unwrap().name.as_deref(),
        Some("Pepito Gómez")
    );
    assert!(record
        .unstructured
        .as_ref()
        .unwrap()
        .symptoms
        .iter()
        .any(|s| s == "dolor de cabeza"));

    // At least one segment per role.
    let segments = record.speaker_segments.as_ref().unwrap();
    assert!(segments.iter().any(|s| s.speaker == Speaker::Promotor));
    assert!(segments.iter().any(|s| s.speaker == Speaker::Patient));
    assert_eq!(record.diarization, StageOutcome::Succeeded);

    // Vector entry present and resolvable back to the record.
    assert_eq!(record.vector_stored, StageOutcome::Succeeded);
    let vector_id = record.vector_id.as_deref().unwrap();
    assert!(!vector_id.is_empty());
    assert_eq!(h.vectors.stats().await.unwrap().count, 1);
    assert!(record.processed_at.is_some());
}

#[tokio::test]
async fn provider_outage_fails_recording_then_resubmission_succeeds() {
    let asr = consultation_asr().with_failures(vec![
        Error::ProviderUnavailable("asr down".to_string()),
        Error::ProviderUnavailable("asr down".to_string()),
        Error::ProviderUnavailable("asr down".to_string()),
    ]);
    let h = harness_with(asr, extraction_chat(), MockOcr::new());

    // Three failures cover one submission (the orchestrator does not retry
    // stages; the mock feeds one error per call).
    let first = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, first).await;
    assert_eq!(record.status, IngestStatus::Failed);
    let failure = record.error.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::ProviderUnavailable);
    assert_eq!(failure.stage.as_deref(), Some("transcribe"));
    assert_eq!(record.vector_stored, StageOutcome::NotAttempted);
    assert!(record.vector_id.is_none());

    // Burn the remaining scripted failures, then recovery succeeds.
    let second = submit_audio(&h).await;
    wait_terminal_recording(&h.recordings, second).await;
    let third = submit_audio(&h).await;
    wait_terminal_recording(&h.recordings, third).await;

    let resubmitted = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, resubmitted).await;
    assert_eq!(record.status, IngestStatus::Completed);
}

#[tokio::test]
async fn cancellation_mid_transcription_fails_cleanly() {
    // An ASR that hangs until cancelled.
    struct HangingAsr;
    #[async_trait::async_trait]
    impl consulta_core::AsrBackend for HangingAsr {
        async fn transcribe(
            &self,
            _audio: &[u8],
            _mime: &str,
            _language: Option<&str>,
        ) -> consulta_core::Result<consulta_core::Transcription> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            unreachable!("transcription should have been cancelled")
        }
        async fn health_check(&self) -> consulta_core::Result<bool> {
            Ok(true)
        }
        fn model_name(&self) -> &str {
            "hanging"
        }
    }

    consulta_core::logging::init_tracing();
    let recordings = Arc::new(MemoryRecordingStore::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let vectors = Arc::new(MemoryVectorIndex::new());
    let ctx = IngestContext::new(
        recordings.clone(),
        documents.clone(),
        vectors.clone(),
        Arc::new(HangingAsr),
        Arc::new(extraction_chat()),
        Arc::new(MockEmbedding::new()),
        Arc::new(MockOcr::new()),
    );
    let handle = IngestWorker::new(ctx, WorkerConfig::default()).start();

    let rec = recordings
        .create(Recording::from_upload("consulta1.wav", 1024, "audio/wav"))
        .await
        .unwrap();
    handle
        .submit(WorkItem::Audio {
            id: rec.id,
            data: vec![0; 16],
        })
        .unwrap();

    // Give the pipeline time to enter Transcribing, then cancel.
    for _ in 0..100 {
        if recordings.get(rec.id).await.unwrap().status == IngestStatus::Transcribing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(handle.cancel(rec.id));

    let record = wait_terminal_recording(&recordings, rec.id).await;
    assert_eq!(record.status, IngestStatus::Failed);
    assert_eq!(record.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    // No partial vector entry.
    assert_eq!(vectors.stats().await.unwrap().count, 0);
}

#[tokio::test]
async fn indexing_failure_is_soft() {
    consulta_core::logging::init_tracing();
    let recordings = Arc::new(MemoryRecordingStore::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let vectors = Arc::new(MemoryVectorIndex::new());
    let embedder = MockEmbedding::new()
        .with_failures(vec![Error::ProviderUnavailable("embedder down".to_string())]);
    let ctx = IngestContext::new(
        recordings.clone(),
        documents.clone(),
        vectors.clone(),
        Arc::new(consultation_asr()),
        Arc::new(extraction_chat()),
        Arc::new(embedder),
        Arc::new(MockOcr::new()),
    );
    let handle = IngestWorker::new(ctx, WorkerConfig::default()).start();

    let rec = recordings
        .create(Recording::from_upload("consulta1.wav", 1024, "audio/wav"))
        .await
        .unwrap();
    handle
        .submit(WorkItem::Audio {
            id: rec.id,
            data: vec![0; 16],
        })
        .unwrap();

    let record = wait_terminal_recording(&recordings, rec.id).await;
    // The record completes despite the failed embedding.
    assert_eq!(record.status, IngestStatus::Completed);
    assert_eq!(record.vector_stored, StageOutcome::Failed);
    assert!(record.vector_id.is_none());
}

#[tokio::test]
async fn extraction_hard_failure_fails_record() {
    let chat = MockChat::new().with_failures(vec![
        Error::ProviderUnavailable("llm down".to_string()),
        Error::ProviderUnavailable("llm down".to_string()),
    ]);
    let h = harness_with(consultation_asr(), chat, MockOcr::new());

    let id = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, id).await;
    assert_eq!(record.status, IngestStatus::Failed);
    assert_eq!(record.error.as_ref().unwrap().stage.as_deref(), Some("extract"));
}

#[tokio::test]
async fn extraction_parse_failure_is_soft() {
    // Non-JSON on both attempts for both prompts: empty maps, record completes.
    let chat = MockChat::new().with_default_response("lo siento, no puedo");
    let h = harness_with(consultation_asr(), chat, MockOcr::new());

    let id = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, id).await;
    assert_eq!(record.status, IngestStatus::Completed);
    assert!(record.structured.as_ref().unwrap().is_empty());
    assert!(record.unstructured.as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn replaying_indexing_yields_same_vector_id() {
    let h = harness();
    let id = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, id).await;
    let first_vector_id = record.vector_id.clone().unwrap();

    // Replay the indexing work directly: same source, same id, upsert
    // replaces rather than duplicating.
    let hits = h
        .vectors
        .search_by_patient("Pepito Gómez", consulta_core::NameMatch::Exact, 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    let entry = hits[0].entry.clone();
    let replayed_id = h.vectors.upsert(entry).await.unwrap();

    assert_eq!(replayed_id, first_vector_id);
    assert_eq!(h.vectors.stats().await.unwrap().count, 1);
}

#[tokio::test]
async fn document_pipeline_extracts_links_and_indexes() {
    let h = harness();

    // First, a completed recording for Pepito.
    let rec_id = submit_audio(&h).await;
    let record = wait_terminal_recording(&h.recordings, rec_id).await;
    assert_eq!(record.status, IngestStatus::Completed);

    // Then a PDF naming the same patient.
    let ocr = MockOcr::new().with_pdf("Paciente: Pepito Gómez. Glucosa 180 mg/dL", 1);
    let h2 = Harness {
        recordings: h.recordings.clone(),
        documents: h.documents.clone(),
        vectors: h.vectors.clone(),
        asr: h.asr.clone(),
        chat: h.chat.clone(),
        handle: IngestWorker::new(
            IngestContext::new(
                h.recordings.clone(),
                h.documents.clone(),
                h.vectors.clone(),
                Arc::new(h.asr.clone()),
                Arc::new(h.chat.clone()),
                Arc::new(MockEmbedding::new()),
                Arc::new(ocr),
            ),
            WorkerConfig::default(),
        )
        .start(),
    };

    let doc = h2
        .documents
        .create(Document::from_upload(
            "examen.pdf",
            2048,
            "application/pdf",
            FileKind::Pdf,
        ))
        .await
        .unwrap();
    h2.handle
        .submit(WorkItem::Document {
            id: doc.id,
            data: b"%PDF-1.4 fake".to_vec(),
            meta: DocumentUploadMeta::default(),
        })
        .unwrap();

    let document = wait_terminal_document(&h2.documents, doc.id).await;
    assert_eq!(document.status, IngestStatus::Completed);
    assert_eq!(document.patient_name.as_deref(), Some("Pepito Gómez"));
    assert!(document.conditions.iter().any(|c| c.contains("diabetes")));
    // Linked to Pepito's recording by fuzzy match.
    assert_eq!(document.recording_id, Some(rec_id));
    assert_eq!(document.vector_stored, StageOutcome::Succeeded);

    // Both the recording and the document live in the index.
    assert_eq!(h2.vectors.stats().await.unwrap().count, 2);
}

#[tokio::test]
async fn low_ocr_confidence_rejects_image_unless_overridden() {
    let ocr = MockOcr::new().with_image("RECETA", 0.59);
    let h = harness_with(consultation_asr(), extraction_chat(), ocr);

    let doc = h
        .documents
        .create(Document::from_upload(
            "receta.jpg",
            512,
            "image/jpeg",
            FileKind::Image,
        ))
        .await
        .unwrap();
    h.handle
        .submit(WorkItem::Document {
            id: doc.id,
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
            meta: DocumentUploadMeta::default(),
        })
        .unwrap();

    let document = wait_terminal_document(&h.documents, doc.id).await;
    assert_eq!(document.status, IngestStatus::Failed);
    assert_eq!(document.error.as_ref().unwrap().kind, ErrorKind::InvalidMedia);

    // With the override flag, the same confidence passes.
    let ocr = MockOcr::new().with_image("RECETA MÉDICA ibuprofeno", 0.59);
    let h = harness_with(consultation_asr(), extraction_chat(), ocr);
    let doc = h
        .documents
        .create(Document::from_upload(
            "receta.jpg",
            512,
            "image/jpeg",
            FileKind::Image,
        ))
        .await
        .unwrap();
    h.handle
        .submit(WorkItem::Document {
            id: doc.id,
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
            meta: DocumentUploadMeta {
                allow_low_confidence: true,
                ..Default::default()
            },
        })
        .unwrap();
    let document = wait_terminal_document(&h.documents, doc.id).await;
    assert_eq!(document.status, IngestStatus::Completed);
    assert_eq!(document.ocr_confidence, Some(0.59));
}

#[tokio::test]
async fn queue_overflow_fails_fast_with_busy() {
    consulta_core::logging::init_tracing();
    let recordings = Arc::new(MemoryRecordingStore::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let vectors = Arc::new(MemoryVectorIndex::new());

    // A slow ASR keeps workers occupied so the queue can fill.
    struct SlowAsr;
    #[async_trait::async_trait]
    impl consulta_core::AsrBackend for SlowAsr {
        async fn transcribe(
            &self,
            _audio: &[u8],
            _mime: &str,
            _language: Option<&str>,
        ) -> consulta_core::Result<consulta_core::Transcription> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(Error::Timeout("never".to_string()))
        }
        async fn health_check(&self) -> consulta_core::Result<bool> {
            Ok(true)
        }
        fn model_name(&self) -> &str {
            "slow"
        }
    }

    let ctx = IngestContext::new(
        recordings.clone(),
        documents.clone(),
        vectors.clone(),
        Arc::new(SlowAsr),
        Arc::new(MockChat::new()),
        Arc::new(MockEmbedding::new()),
        Arc::new(MockOcr::new()),
    );
    let handle = IngestWorker::new(
        ctx,
        WorkerConfig::default()
            .with_max_concurrent(1)
            .with_queue_capacity(2),
    )
    .start();

    let mut results = Vec::new();
    for i in 0..8 {
        let rec = recordings
            .create(Recording::from_upload(format!("f{}.wav", i), 10, "audio/wav"))
            .await
            .unwrap();
        results.push(handle.submit(WorkItem::Audio {
            id: rec.id,
            data: vec![0; 4],
        }));
    }

    assert!(results.iter().any(|r| r.is_ok()));
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(Error::Busy(_)))),);
}

#[tokio::test]
async fn statuses_only_move_forward() {
    let h = harness();
    let id = submit_audio(&h).await;

    // Sample statuses while the pipeline runs; the observed sequence must be
    // non-decreasing in pipeline order (or jump to Failed).
    let order = |s: IngestStatus| match s {
        IngestStatus::Pending => 0,
        IngestStatus::Transcribing => 1,
        IngestStatus::Extracting => 2,
        IngestStatus::Diarizing => 3,
        IngestStatus::Indexing => 4,
        IngestStatus::Completed => 5,
        IngestStatus::Failed => 6,
    };

    let mut last = 0;
    for _ in 0..200 {
        let record = h.recordings.get(id).await.unwrap();
        let now = order(record.status);
        assert!(now >= last, "status went backwards: {} -> {}", last, now);
        last = now;
        if record.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(last >= 5, "pipeline never reached a terminal status");
}

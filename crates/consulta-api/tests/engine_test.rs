//! Façade-level tests: submit → poll → chat against the whole engine wired
//! with the in-memory store and mock providers.

use std::sync::Arc;
use std::time::Duration;

use consulta_api::{Engine, EngineConfig};
use consulta_core::{
    AsrSegment, ChatRequest, Error, IngestStatus, Intent, Page, RecordFilter,
};
use consulta_db::{MemoryDocumentStore, MemoryRecordingStore, MemoryVectorIndex};
use consulta_ingest::{DocumentUploadMeta, WorkerConfig};
use consulta_providers::{MockAsr, MockChat, MockEmbedding, MockOcr};

const STRUCTURED_JSON: &str = r#"{
    "name": "Pepito Gómez",
    "age": 45,
    "date": "2026-07-01",
    "diagnosis": "migraña crónica",
    "medications": ["ibuprofeno"]
}"#;

const UNSTRUCTURED_JSON: &str = r#"{
    "symptoms": ["dolor de cabeza"],
    "context": "consulta general",
    "urgency": "media"
}"#;

const DOCUMENT_JSON: &str = r#"{
    "patient_name": "Pepito Gómez",
    "document_date": "2026-07-10",
    "document_type": "examen de laboratorio",
    "conditions": ["diabetes"],
    "procedures": ["glucosa en sangre"]
}"#;

fn wav_bytes() -> Vec<u8> {
    let mut v = b"RIFF".to_vec();
    v.extend_from_slice(&[0x24, 0, 0, 0]);
    v.extend_from_slice(b"WAVEfmt ");
    v.extend_from_slice(&[0u8; 64]);
    v
}

fn engine() -> Engine {
    consulta_core::logging::init_tracing();
    let asr = MockAsr::new().with_text_and_segments(
        "Buenos días Pepito, ¿cómo se siente? Me duele la cabeza doctor.",
        vec![
            AsrSegment {
                t_start: 0.0,
                t_end: 4.0,
                text: "Buenos días Pepito, ¿cómo se siente?".to_string(),
            },
            AsrSegment {
                t_start: 4.0,
                t_end: 9.0,
                text: "Me duele la cabeza doctor".to_string(),
            },
        ],
    );
    let chat = MockChat::new()
        .with_response_for("información estructurada", STRUCTURED_JSON)
        .with_response_for("información contextual", UNSTRUCTURED_JSON)
        .with_response_for("documentos clínicos", DOCUMENT_JSON)
        .with_default_response("Pepito Gómez tiene migraña crónica según la conversación.");

    Engine::start(EngineConfig {
        recordings: Arc::new(MemoryRecordingStore::new()),
        documents: Arc::new(MemoryDocumentStore::new()),
        vectors: Arc::new(MemoryVectorIndex::new()),
        asr: Arc::new(asr),
        chat: Arc::new(chat),
        embedder: Arc::new(MockEmbedding::new()),
        ocr: Arc::new(MockOcr::new().with_pdf("Paciente: Pepito Gómez. Glucosa 180 mg/dL", 1)),
        worker: WorkerConfig::default(),
    })
}

async fn wait_completed(engine: &Engine, id: uuid::Uuid) -> consulta_core::Recording {
    for _ in 0..200 {
        let record = engine.recording(id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("recording never reached a terminal status");
}

#[tokio::test]
async fn submit_poll_chat_round_trip() {
    let engine = engine();

    let receipt = engine
        .submit_audio("consulta1.wav", wav_bytes())
        .await
        .unwrap();
    assert_eq!(receipt.status, IngestStatus::Pending);

    let record = wait_completed(&engine, receipt.id).await;
    assert_eq!(record.status, IngestStatus::Completed);
    assert_eq!(
        record.structured.as_ref().unwrap().name.as_deref(),
        Some("Pepito Gómez")
    );

    let result = engine
        .chat(ChatRequest::new("¿Qué enfermedad tiene Pepito Gómez?"))
        .await
        .unwrap();
    assert_eq!(result.intent, Intent::PatientInfo);
    assert!(!result.sources.is_empty());
    assert_eq!(result.sources[0].source_id, receipt.id);
    assert!(result.answer.contains("Pepito"));
    assert!(result.confidence >= 0.6);
}

#[tokio::test]
async fn zero_byte_upload_rejected() {
    let engine = engine();
    let err = engine.submit_audio("vacio.wav", Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidMedia(_)));
    assert_eq!(err.status_code(), 400);

    // No record was left behind.
    let page = engine
        .list_recordings(RecordFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn wrong_magic_rejected() {
    let engine = engine();
    let err = engine
        .submit_audio("fake.wav", b"texto plano, no audio".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidMedia(_)));
}

#[tokio::test]
async fn list_recordings_by_status() {
    let engine = engine();
    let receipt = engine
        .submit_audio("consulta1.wav", wav_bytes())
        .await
        .unwrap();
    wait_completed(&engine, receipt.id).await;

    let completed = engine
        .list_recordings(
            RecordFilter {
                status: Some(IngestStatus::Completed),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(completed.total, 1);

    let failed = engine
        .list_recordings(
            RecordFilter {
                status: Some(IngestStatus::Failed),
                ..Default::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(failed.total, 0);
}

#[tokio::test]
async fn delete_recording_cascades_vector_entries() {
    let engine = engine();
    let receipt = engine
        .submit_audio("consulta1.wav", wav_bytes())
        .await
        .unwrap();
    wait_completed(&engine, receipt.id).await;
    assert_eq!(engine.index_status().await.unwrap().count, 1);

    engine.delete_recording(receipt.id).await.unwrap();
    assert!(engine.recording(receipt.id).await.is_err());
    assert_eq!(engine.index_status().await.unwrap().count, 0);
}

#[tokio::test]
async fn document_submission_completes_and_searches() {
    let engine = engine();

    // A recording first, so the document links to it.
    let audio = engine
        .submit_audio("consulta1.wav", wav_bytes())
        .await
        .unwrap();
    wait_completed(&engine, audio.id).await;

    let receipt = engine
        .submit_document(
            "examen.pdf",
            b"%PDF-1.4 contenido".to_vec(),
            DocumentUploadMeta::default(),
        )
        .await
        .unwrap();

    let document = {
        let mut document = engine.document(receipt.id).await.unwrap();
        for _ in 0..200 {
            if document.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            document = engine.document(receipt.id).await.unwrap();
        }
        document
    };
    assert_eq!(document.status, IngestStatus::Completed);
    assert_eq!(document.recording_id, Some(audio.id));

    let hits = engine.search_documents("glucosa del paciente", 5).await.unwrap();
    assert!(hits
        .iter()
        .all(|h| h.source_kind == consulta_core::SourceKind::Document));
}

#[tokio::test]
async fn health_reports_all_components() {
    let engine = engine();
    let report = engine.health().await;
    let names: Vec<&str> = report.components.iter().map(|c| c.name.as_str()).collect();
    for expected in ["record_store", "vector_index", "asr", "llm", "embedder", "ocr"] {
        assert!(names.contains(&expected), "missing component {}", expected);
    }
    assert!(report.healthy);
}

#[tokio::test]
async fn unknown_record_maps_to_not_found() {
    let engine = engine();
    let err = engine.recording(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

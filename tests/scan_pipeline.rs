use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use httpmock::{
    Method::{GET, POST},
    Mock, MockServer,
};
use privascan::{
    analysis::{PrivacyAnalyzer, RiskLevel},
    discovery::WalkDirDiscovery,
    llm::LlamaCppClient,
    ocr::OllamaOcrEngine,
    processing::DocumentIndexer,
    scan::{ProgressReporter, ScanControl, ScanEntry, ScanOrchestrator, ScanPhase, ScanSettings},
    store::{RankedRecord, StoreError, StoredRecord, VectorStore},
};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingStore {
    records: Mutex<BTreeMap<String, StoredRecord>>,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn upsert(
        &self,
        id: &str,
        text: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.records.lock().unwrap().insert(
            id.to_string(),
            StoredRecord {
                id: id.to_string(),
                text: text.to_string(),
                metadata,
            },
        );
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        self.records.lock().unwrap().retain(|_, record| {
            record.metadata.get("document_id").and_then(Value::as_str) != Some(document_id)
        });
        Ok(())
    }

    async fn get(&self) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().unwrap().len())
    }

    async fn query(&self, _text: &str, _limit: usize) -> Result<Vec<RankedRecord>, StoreError> {
        Ok(Vec::new())
    }
}

fn completion(verdict: Value) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": verdict.to_string() } }]
    })
}

async fn mock_language_model(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({ "status": "ok" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("Passport");
            then.status(200).json_body(completion(json!({
                "contains_sensitive_info": true,
                "risk_level": "high",
                "detected_categories": ["government_ids"],
                "specific_findings": ["Passport number"],
                "recommendations": ["Restrict access"],
                "confidence": "high"
            })));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("notes.txt");
            then.status(200).json_body(completion(json!({
                "contains_sensitive_info": false,
                "risk_level": "none",
                "detected_categories": [],
                "specific_findings": [],
                "recommendations": [],
                "confidence": "medium"
            })));
        })
        .await;
}

struct OcrMocks<'a> {
    load: Mock<'a>,
    recognize: Mock<'a>,
    unload: Mock<'a>,
}

async fn mock_ocr(server: &MockServer) -> OcrMocks<'_> {
    let load = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .json_body(json!({ "model": "glm-ocr", "keep_alive": "30m" }));
            then.status(200).json_body(json!({ "response": "", "done": true }));
        })
        .await;
    let recognize = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .body_contains("\"images\"");
            then.status(200).json_body(json!({
                "response": "Passport number X1234567 issued to Jane Roe",
                "done": true
            }));
        })
        .await;
    let unload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .json_body(json!({ "model": "glm-ocr", "keep_alive": 0 }));
            then.status(200).json_body(json!({ "response": "", "done": true }));
        })
        .await;
    OcrMocks {
        load,
        recognize,
        unload,
    }
}

fn orchestrator(
    llm_server: &MockServer,
    ocr_server: &MockServer,
    output_dir: &Path,
    store: Option<Arc<RecordingStore>>,
) -> ScanOrchestrator {
    let llm = LlamaCppClient::new(llm_server.base_url(), None).expect("llm client");
    let analyzer = PrivacyAnalyzer::new(Arc::new(llm), 1, None);
    let settings = ScanSettings {
        ocr_enabled: true,
        indexing_enabled: store.is_some(),
        ocr_prompt: "Text Recognition:".into(),
        output_dir: output_dir.to_path_buf(),
    };
    let engine = OllamaOcrEngine::new(ocr_server.base_url(), "glm-ocr").expect("ocr engine");
    let mut orchestrator = ScanOrchestrator::new(
        Box::new(WalkDirDiscovery::new().excluding(output_dir)),
        analyzer,
        settings,
    )
    .with_ocr(Box::new(engine));
    if let Some(store) = store {
        orchestrator = orchestrator.with_indexer(DocumentIndexer::new(store, 1000, 2));
    }
    orchestrator
}

#[tokio::test]
async fn scan_extracts_analyzes_indexes_and_summarizes() {
    let llm_server = MockServer::start_async().await;
    let ocr_server = MockServer::start_async().await;
    mock_language_model(&llm_server).await;
    let ocr = mock_ocr(&ocr_server).await;

    let scan_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    std::fs::write(scan_dir.path().join("scan.png"), b"\x89PNG fake").unwrap();
    std::fs::write(
        scan_dir.path().join("notes.txt"),
        "Team lunch moved to Friday.",
    )
    .unwrap();

    let store = Arc::new(RecordingStore::default());
    let mut orchestrator =
        orchestrator(&llm_server, &ocr_server, output_dir.path(), Some(store.clone()));
    let (progress, mut events) = ProgressReporter::channel();
    let control = ScanControl::new(CancellationToken::new(), progress);

    let report = orchestrator.scan(scan_dir.path(), false, &control).await;
    drop(control);

    assert_eq!(report.outcome, ScanPhase::Done, "failure: {:?}", report.failure);
    ocr.load.assert_hits_async(1).await;
    ocr.recognize.assert_hits_async(1).await;
    ocr.unload.assert_hits_async(1).await;

    assert_eq!(report.entries.len(), 2);
    let ScanEntry::Image(image) = &report.entries[0] else {
        panic!("expected image entry first");
    };
    let ocr_text = std::fs::read_to_string(&image.ocr_file).unwrap();
    assert!(ocr_text.contains("X1234567"));
    assert_eq!(
        image.analysis.as_ref().map(|analysis| analysis.risk_level),
        Some(RiskLevel::High)
    );
    assert_eq!(report.entries[1].risk_level(), Some(RiskLevel::None));

    assert_eq!(store.count().await.unwrap(), 2);
    let kinds: Vec<String> = store
        .get()
        .await
        .unwrap()
        .iter()
        .filter_map(|record| record.metadata.get("source_kind")?.as_str().map(String::from))
        .collect();
    assert!(kinds.contains(&"image".to_string()));
    assert!(kinds.contains(&"text".to_string()));

    let summary_path = report.summary_path.expect("summary written");
    let summary: Value = serde_json::from_slice(&std::fs::read(summary_path).unwrap()).unwrap();
    assert_eq!(summary["risk_counts"]["high"], 1);
    assert_eq!(summary["results"].as_array().unwrap().len(), 2);
    assert_eq!(summary["index_stats"]["successful"], 2);

    let mut saw_release = false;
    while let Some(event) = events.recv().await {
        saw_release |= event.phase == ScanPhase::ReleasingOcr;
    }
    assert!(saw_release);
}

#[tokio::test]
async fn cancelled_scan_returns_before_touching_images() {
    let llm_server = MockServer::start_async().await;
    let ocr_server = MockServer::start_async().await;
    mock_language_model(&llm_server).await;
    let ocr = mock_ocr(&ocr_server).await;

    let scan_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    std::fs::write(scan_dir.path().join("scan.png"), b"\x89PNG fake").unwrap();

    let mut orchestrator = orchestrator(&llm_server, &ocr_server, output_dir.path(), None);
    let control = ScanControl::default();
    control.cancel.cancel();

    let report = orchestrator.scan(scan_dir.path(), false, &control).await;

    assert_eq!(report.outcome, ScanPhase::Cancelled);
    assert!(report.entries.is_empty());
    assert!(report.summary_path.is_none());
    assert_eq!(report.summary.completed_phases, vec![ScanPhase::Discovering]);
    ocr.load.assert_hits_async(0).await;
    ocr.recognize.assert_hits_async(0).await;
    ocr.unload.assert_hits_async(0).await;
}

#[tokio::test]
async fn unreachable_language_model_fails_the_scan() {
    let llm_server = MockServer::start_async().await;
    llm_server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(503).body("loading model");
        })
        .await;
    let ocr_server = MockServer::start_async().await;
    let ocr = mock_ocr(&ocr_server).await;

    let scan_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();
    std::fs::write(scan_dir.path().join("notes.txt"), "hello").unwrap();

    let mut orchestrator = orchestrator(&llm_server, &ocr_server, output_dir.path(), None);
    let report = orchestrator
        .scan(scan_dir.path(), false, &ScanControl::default())
        .await;

    assert_eq!(report.outcome, ScanPhase::FailedFatal);
    assert!(report.failure.is_some());
    assert_eq!(report.summary.discovered.text_files, 1);
    ocr.load.assert_hits_async(0).await;
}

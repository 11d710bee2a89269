//! Integration tests for payload ingestion into a persistent store.

use std::sync::Arc;

use registros_core::{
    IngestError, Ingestor, PreferencesBackend, RecordStatus, RecordStore, Turno,
};
use tempfile::TempDir;

async fn setup_ingestor() -> (Ingestor, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let backend = PreferencesBackend::open(temp_dir.path().join("records"))
        .await
        .expect("Failed to open preferences dir");
    (Ingestor::new(RecordStore::new(Arc::new(backend))), temp_dir)
}

#[tokio::test]
async fn test_ingest_json_lines_with_bom_and_bad_lines() {
    let (ingestor, _dir) = setup_ingestor().await;
    let payload = "\u{feff}{\"codigo\":\"V001\",\"peso\":12.5,\"fecha\":\"01/03/2024\",\"hora\":\"06:00\",\"turno\":\"AM\"}\n\
                   not json at all\n\
                   \n\
                   {\"code\":\"V002\",\"weight\":\"11,25\",\"date\":\"01/03/2024\",\"time\":\"18:00\",\"turno\":\"pm\"}\n";

    let report = ingestor.ingest(payload).await.expect("ingest should succeed");
    assert_eq!(report.parsed, 2);
    assert_eq!(report.added, 2);
    assert_eq!(report.invalid_lines, 1);

    let short = ingestor
        .store()
        .get("V002|01/03/2024|18:00")
        .await
        .unwrap()
        .expect("short-form record stored");
    assert!((short.peso - 11.25).abs() < f64::EPSILON);
    assert_eq!(short.turno, Turno::Pm);
    assert_eq!(short.status, RecordStatus::Pending);
}

#[tokio::test]
async fn test_ingest_is_idempotent_across_downloads() {
    let (ingestor, _dir) = setup_ingestor().await;
    let payload = r#"{"records":[
        {"codigo":"V001","peso":12.5,"fecha":"01/03/2024","hora":"06:00"},
        {"codigo":"V002","peso":11.0,"fecha":"01/03/2024","hora":"06:05"}
    ]}"#;

    let first = ingestor.ingest(payload).await.unwrap();
    assert_eq!((first.added, first.skipped), (2, 0));

    let second = ingestor.ingest(payload).await.unwrap();
    assert_eq!((second.added, second.skipped), (0, 2));
    assert_eq!(ingestor.add_new_records(payload).await, 0);

    assert_eq!(ingestor.store().get_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_ingest_keeps_raw_payload_for_forwarding() {
    let (ingestor, _dir) = setup_ingestor().await;
    let payload = r#"[{"id":"abc-1","codigo":"V001","peso":12.5,"fecha":"01/03/2024","hora":"06:00","extra":true}]"#;

    ingestor.ingest(payload).await.unwrap();
    let stored = ingestor.store().get("abc-1").await.unwrap().unwrap();
    let forwarded: serde_json::Value = serde_json::from_str(&stored.forward_payload()).unwrap();
    assert_eq!(forwarded["extra"], true);
    assert_eq!(stored.id, "abc-1");
}

#[tokio::test]
async fn test_ingest_rejects_html_captive_portal() {
    let (ingestor, _dir) = setup_ingestor().await;
    let err = ingestor
        .ingest("<!DOCTYPE html><html><head><title>Login</title></head></html>")
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::HtmlPayload { .. }));
    assert!(ingestor.store().get_all().await.unwrap().is_empty());
    assert_eq!(ingestor.add_new_records("<html></html>").await, 0);
}

#[tokio::test]
async fn test_ingest_scalar_and_blank_payloads_add_nothing() {
    let (ingestor, _dir) = setup_ingestor().await;
    for payload in ["42", "\"hello\"", "", "   \n  "] {
        let report = ingestor.ingest(payload).await.unwrap();
        assert_eq!(report.added, 0, "payload {payload:?}");
    }
}

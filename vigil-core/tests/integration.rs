//! End-to-end tests for the vigil pipeline
//!
//! These tests drive a [`Reconciler`] through an in-memory socket and check
//! the committed state, the extracted findings and the exported views.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use vigil_core::session::SessionFile;
use vigil_core::transport::{MemoryConnector, MemoryPeer};
use vigil_core::view::{self, Column, ExportFormat, SortSpec, ViewQuery};
use vigil_core::{
    ConnectionState, Finding, FindingType, ModuleStatus, OverallStatus, Reconciler,
    ReconcilerOptions, RunState,
};

const RUFF: &str = "B_Ruff";
const ESLINT: &str = "F_ESLint";

fn gzip_base64(text: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    base64::engine::general_purpose::STANDARD.encode(encoder.finish().unwrap())
}

fn frame(value: serde_json::Value) -> String {
    value.to_string()
}

async fn wait_for_state<F>(reconciler: &Reconciler, predicate: F) -> Arc<RunState>
where
    F: Fn(&RunState) -> bool,
{
    let mut rx = reconciler.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            let state = rx.borrow_and_update().clone();
            if predicate(&state) {
                return state;
            }
            rx.changed().await.expect("reconciler stopped");
        }
    })
    .await
    .expect("timed out waiting for state")
}

async fn wait_for_findings<F>(reconciler: &Reconciler, predicate: F) -> Arc<Vec<Finding>>
where
    F: Fn(&[Finding]) -> bool,
{
    let mut rx = reconciler.subscribe_findings();
    tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            let findings = rx.borrow_and_update().clone();
            if predicate(&findings) {
                return findings;
            }
            rx.changed().await.expect("reconciler stopped");
        }
    })
    .await
    .expect("timed out waiting for findings")
}

async fn connect(options: ReconcilerOptions) -> (Reconciler, MemoryPeer) {
    vigil_core::logging::init_test();

    let connector = MemoryConnector::new();
    let peer = connector.accept();
    let reconciler = Reconciler::spawn(options, connector);
    reconciler.connect();

    let mut states = reconciler.subscribe_connection();
    tokio::time::timeout(Duration::from_secs(5), async {
        while *states.borrow_and_update() != ConnectionState::Open {
            states.changed().await.expect("transport stopped");
        }
    })
    .await
    .expect("connection did not open");

    (reconciler, peer)
}

/// Drive one full run with two modules, plain and compressed output.
fn play_run(peer: &MemoryPeer) {
    let eslint_report = serde_json::json!([{
        "filePath": "web/app.js",
        "messages": [
            { "line": 4, "severity": 2, "message": "'x' is not defined", "ruleId": "no-undef" },
            { "line": 9, "severity": 1, "message": "Unexpected console statement", "ruleId": "no-console" }
        ]
    }])
    .to_string();
    let (head, tail) = eslint_report.split_at(eslint_report.len() / 2);

    peer.send(frame(serde_json::json!({ "type": "GLOBAL_INIT" })));
    peer.send(frame(serde_json::json!({ "type": "INIT", "module": RUFF })));
    peer.send(frame(serde_json::json!({ "type": "INIT", "moduleId": ESLINT })));
    peer.send(frame(serde_json::json!({
        "type": "LOG", "module": RUFF, "message": "api/views.py:12:1: E501 line too long"
    })));
    peer.send(frame(serde_json::json!({
        "type": "STREAM", "module_id": ESLINT, "encoding": "gzip_base64", "data": gzip_base64(head)
    })));
    peer.send(frame(serde_json::json!({
        "type": "STREAM", "module_id": ESLINT, "encoding": "gzip_base64", "data": gzip_base64(tail)
    })));
    peer.send(frame(serde_json::json!({
        "type": "STREAM", "module": RUFF, "data": "api/models.py:40:5: F821 undefined name 'db'\n"
    })));
    peer.send(frame(serde_json::json!({
        "type": "METRICS",
        "module": RUFF,
        "data": {
            "total_issues": { "ERROR": 0, "WARNING": 2, "INFO": 0, "COMPLEXITY": 0 },
            "modules": []
        }
    })));
    peer.send(frame(serde_json::json!({
        "type": "END", "module": RUFF, "status": "FAIL", "summary": "2 issues"
    })));
    peer.send(frame(serde_json::json!({ "type": "END", "module": ESLINT, "status": "PASS" })));
    peer.send(frame(serde_json::json!({ "type": "GLOBAL_END", "status": "FAIL" })));
}

#[tokio::test]
async fn test_full_run_reconciles_modules_and_findings() {
    let (reconciler, peer) = connect(ReconcilerOptions::offline("mem://")).await;
    play_run(&peer);

    // GLOBAL_END is not queued behind module chunks, so wait for both
    let state = wait_for_state(&reconciler, |s| {
        s.overall_status == OverallStatus::Failure
            && s.module(ESLINT).map(|m| m.status) == Some(ModuleStatus::Pass)
    })
    .await;
    assert!(!state.is_analyzing);

    let ruff = state.module(RUFF).expect("ruff module");
    assert_eq!(ruff.status, ModuleStatus::Fail);
    assert_eq!(ruff.summary.as_deref(), Some("2 issues"));
    assert_eq!(ruff.metrics.as_ref().map(|m| m.total_issues.warning), Some(2));

    // Compressed halves are inflated and appended in arrival order
    let eslint = state.module(ESLINT).expect("eslint module");
    assert_eq!(eslint.status, ModuleStatus::Pass);
    assert!(eslint.full_text.contains(r#"[{"filePath":"web/app.js""#));

    let findings = wait_for_findings(&reconciler, |f| f.len() == 4).await;
    let eslint_findings: Vec<&Finding> = findings.iter().filter(|f| f.tool == "ESLint").collect();
    assert_eq!(eslint_findings.len(), 2);
    assert!(eslint_findings
        .iter()
        .any(|f| f.finding_type == FindingType::Error && f.rule_id.as_deref() == Some("no-undef")));

    let ruff_files: Vec<&str> = findings
        .iter()
        .filter(|f| f.tool == "Ruff")
        .map(|f| f.filepath.as_str())
        .collect();
    assert_eq!(ruff_files.len(), 2);
    assert!(ruff_files.contains(&"api/views.py"));
    assert!(ruff_files.contains(&"api/models.py"));
}

#[tokio::test]
async fn test_view_and_export_over_live_findings() {
    let (reconciler, peer) = connect(ReconcilerOptions::offline("mem://")).await;
    play_run(&peer);
    wait_for_findings(&reconciler, |f| f.len() == 4).await;

    let mut query = ViewQuery::new();
    query.set_filter(Column::Tool, "ruff");
    query.sort = Some(SortSpec::descending(Column::Line));
    let result = reconciler.view(&query);

    let lines: Vec<u32> = result.rows.iter().map(|r| r.finding.line).collect();
    assert_eq!(lines, vec![40, 12]);
    assert_eq!(result.summary.total(), 2);
    assert_eq!(result.summary.total_warnings, 2);

    let raw = view::serialize(&result.findings(), ExportFormat::Raw).unwrap();
    assert!(raw.starts_with("[WARNING] [Ruff] {api/models.py}:{40}"));

    let json = view::serialize(&result.findings(), ExportFormat::Json).unwrap();
    let parsed: Vec<Finding> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, result.findings());
}

#[tokio::test]
async fn test_new_run_clears_previous_findings() {
    let (reconciler, peer) = connect(ReconcilerOptions::offline("mem://")).await;
    play_run(&peer);
    wait_for_findings(&reconciler, |f| f.len() == 4).await;

    peer.send(frame(serde_json::json!({ "type": "GLOBAL_INIT" })));
    let state = wait_for_state(&reconciler, |s| s.modules.is_empty() && s.is_analyzing).await;
    assert_eq!(state.overall_status, OverallStatus::Running);
    wait_for_findings(&reconciler, |f| f.is_empty()).await;
}

#[tokio::test]
async fn test_server_close_keeps_state_and_reconnects() {
    let connector = MemoryConnector::new();
    let first = connector.accept();
    let second = connector.accept();

    let mut options = ReconcilerOptions::offline("mem://");
    options.reconnect_delay = Duration::from_millis(20);
    let reconciler = Reconciler::spawn(options, connector.clone());
    reconciler.connect();

    first.send(frame(serde_json::json!({ "type": "INIT", "module": RUFF })));
    wait_for_state(&reconciler, |s| s.module(RUFF).is_some()).await;
    first.close();

    second.send(frame(serde_json::json!({
        "type": "LOG", "module": RUFF, "message": "still here"
    })));
    let state = wait_for_state(&reconciler, |s| {
        s.module(RUFF)
            .map(|m| m.full_text.contains("still here"))
            .unwrap_or(false)
    })
    .await;
    assert_eq!(state.module(RUFF).map(|m| m.status), Some(ModuleStatus::Running));
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn test_restored_session_survives_restart() {
    let dir = TempDir::new().unwrap();
    let file = SessionFile::at(dir.path().join("vigil").join("session.json"));

    let mut options = ReconcilerOptions::offline("mem://");
    options.session = Some(file.clone());
    let (reconciler, peer) = connect(options).await;

    reconciler.select_project("/srv/shop");
    peer.send(frame(serde_json::json!({
        "type": "LOG", "message": "watching for changes"
    })));
    wait_for_state(&reconciler, |s| s.project_path == "/srv/shop").await;
    drop(reconciler);

    tokio::time::timeout(Duration::from_secs(5), async {
        while file.load().project_path.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not written");

    let mut options = ReconcilerOptions::offline("mem://");
    options.session = Some(file);
    let restored = Reconciler::spawn(options, MemoryConnector::new());
    assert_eq!(restored.snapshot().project_path, "/srv/shop");
}

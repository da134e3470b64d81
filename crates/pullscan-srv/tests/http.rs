//! End-to-end tests against a live server with a scripted scanner.

mod common;

use std::time::Duration;

use common::{archive, hostile_archive, BrokenScanner, FakeBandit, TestServer, RULE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::task::JoinSet;

const VULNERABLE: &str = "import os\nos.system('ls')\n";
const SAFE: &str = "x = 1\n";

async fn findings(resp: reqwest::Response) -> String {
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    body["simpleFindings"]
        .as_str()
        .expect("simpleFindings is a string")
        .to_string()
}

#[tokio::test]
async fn test_head_only_reports_findings() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv
        .pull(&json!({ "head": archive(&[("app.py", VULNERABLE)]) }))
        .await;

    let text = findings(resp).await;
    assert!(text.contains(RULE), "unexpected findings: {text}");
    assert!(text.contains("./app.py:2"));
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test]
async fn test_clean_head_is_empty_string() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.pull(&json!({ "base": "", "head": archive(&[("app.py", SAFE)]) })).await;

    assert_eq!(findings(resp).await, "");
}

#[tokio::test]
async fn test_findings_in_base_are_suppressed() {
    let srv = TestServer::start(FakeBandit::default()).await;
    let tree = archive(&[("app.py", VULNERABLE)]);

    let resp = srv.pull(&json!({ "base": tree, "head": tree })).await;

    assert_eq!(findings(resp).await, "");
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test]
async fn test_only_new_findings_reported() {
    let srv = TestServer::start(FakeBandit::default()).await;
    let base = archive(&[("old.py", VULNERABLE)]);
    let head = archive(&[("old.py", VULNERABLE), ("new.py", "import os\nos.system(cmd)\n")]);

    let resp = srv.pull(&json!({ "base": base, "head": head })).await;

    let text = findings(resp).await;
    assert!(text.contains("./new.py:2"), "unexpected findings: {text}");
    assert!(!text.contains("old.py"), "baseline finding leaked: {text}");
}

#[tokio::test]
async fn test_nested_directories() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv
        .pull(&json!({ "head": archive(&[("pkg/sub/tool.py", VULNERABLE)]) }))
        .await;

    assert!(findings(resp).await.contains("./pkg/sub/tool.py:2"));
}

#[tokio::test]
async fn test_empty_head_rejected() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.pull(&json!({ "base": archive(&[("app.py", SAFE)]), "head": "" })).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "head cannot be empty");
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test]
async fn test_missing_head_rejected() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.pull(&json!({ "base": "" })).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv
        .client
        .post(srv.url("/pull"))
        .header("content-type", "application/json")
        .body("{\"head\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().starts_with("Unable to read body:"));
}

#[tokio::test]
async fn test_wrong_method() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.client.get(srv.url("/pull")).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_healthz() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.client.get(srv.url("/healthz")).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_invalid_base64_rejected() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.pull(&json!({ "head": "not base64 at all!" })).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().starts_with("Invalid head archive:"));
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test]
async fn test_traversal_archive_rejected() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv.pull(&json!({ "head": hostile_archive("../escaped.py") })).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().starts_with("Invalid head archive:"));
    assert_eq!(srv.live_workspaces(), 0);
    assert!(!srv.tmp_dir().join("escaped.py").exists());
}

#[tokio::test]
async fn test_bad_base_archive_names_phase() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let body = json!({
        "base": hostile_archive("/etc/cron.d/x"),
        "head": archive(&[("a.py", SAFE)]),
    });

    let resp = srv.pull(&body).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().starts_with("Invalid base archive:"));
}

#[tokio::test]
async fn test_conflicting_entries_rejected() {
    let srv = TestServer::start(FakeBandit::default()).await;

    let resp = srv
        .pull(&json!({ "head": archive(&[("pkg", "x"), ("pkg/app.py", VULNERABLE)]) }))
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().starts_with("Invalid head archive:"));
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let srv = TestServer::start_with_limit(FakeBandit::default(), 1024).await;
    let big = "A".repeat(4096);

    let resp = srv.pull(&json!({ "head": big })).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test]
async fn test_scanner_failure_is_internal_and_opaque() {
    let srv = TestServer::start(BrokenScanner).await;

    let resp = srv.pull(&json!({ "head": archive(&[("app.py", SAFE)]) })).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = resp.text().await.unwrap();
    assert_eq!(text, "Internal error: scan failed");
    assert!(!text.contains("Traceback"));
    assert_eq!(srv.live_workspaces(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_isolated() {
    let srv = TestServer::start(FakeBandit {
        delay: Duration::from_millis(50),
    })
    .await;

    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let client = srv.client.clone();
        let url = srv.url("/pull");
        let name = format!("module_{i}.py");
        let body = if i % 2 == 0 { VULNERABLE } else { SAFE };
        let payload = json!({ "head": archive(&[(name.as_str(), body)]) });
        tasks.spawn(async move {
            let resp = client.post(url).json(&payload).send().await.unwrap();
            (i, findings(resp).await)
        });
    }

    let mut seen = 0;
    while let Some(joined) = tasks.join_next().await {
        let (i, text) = joined.unwrap();
        seen += 1;
        if i % 2 == 0 {
            assert!(
                text.contains(&format!("./module_{i}.py:2")),
                "request {i} lost its finding: {text}"
            );
            let foreign = (0..16)
                .filter(|j| *j != i)
                .any(|j| text.contains(&format!("module_{j}.py")));
            assert!(!foreign, "request {i} saw another request's files: {text}");
        } else {
            assert_eq!(text, "", "request {i} should be clean");
        }
    }
    assert_eq!(seen, 16);
    assert_eq!(srv.live_workspaces(), 0);
}

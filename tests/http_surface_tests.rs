// HTTP surface tests driven through the router without binding a port.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use vermon::bridge::Objective;
use vermon::config::{GatewayConfig, Mode};
use vermon::Core;
use vermon_verifier::VerifierSetConfig;

fn capturing_evaluator(dir: &Path, capture: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("evaluator");
    let body = format!(
        "#!/bin/sh\nwhile read line; do\n  echo \"$line\" >> {}\n  echo \"@1.0 (time point 0): ok\"\ndone",
        capture.display()
    );
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn write_specs(dir: &Path, names: &[&str]) {
    for name in names {
        std::fs::write(dir.join(format!("{name}.sig")), "p(int)\n").unwrap();
        std::fs::write(dir.join(format!("{name}.mfotl")), "TRUE\n").unwrap();
    }
}

fn req_core(dir: &Path, evaluator: &Path) -> Arc<Core> {
    let mut config = GatewayConfig::defaults_for(Mode::Req, "localhost:1".to_string());
    config.verifier_set = VerifierSetConfig::new(vec![
        "req-1".to_string(),
        "req-2".to_string(),
        "req-3".to_string(),
    ]);
    config.evaluator.binary = evaluator.display().to_string();
    config.evaluator.spec_dir = dir.to_path_buf();
    Core::new(config).unwrap()
}

fn verdict_request(endpoint: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(endpoint)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn healthz_answers_in_both_modes() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("stream.log");
    let evaluator = capturing_evaluator(dir.path(), &capture);
    write_specs(dir.path(), &["req-1", "req-2", "req-3"]);

    let core = req_core(dir.path(), &evaluator);
    let router = vermon::http::router(Arc::clone(&core));
    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let obj_core = Core::new(GatewayConfig::defaults_for(Mode::Obj, "localhost:1".into())).unwrap();
    let router = vermon::http::router(Arc::clone(&obj_core));
    let response = router
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    core.shutdown().await;
    obj_core.shutdown().await;
}

#[tokio::test]
async fn tier1_verdict_builds_tier2_facts() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("stream.log");
    let evaluator = capturing_evaluator(dir.path(), &capture);
    write_specs(dir.path(), &["req-1", "req-2", "req-3"]);

    let core = req_core(dir.path(), &evaluator);
    let router = vermon::http::router(Arc::clone(&core));

    let response = router
        .clone()
        .oneshot(verdict_request("/response", "verdict=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(core.requirement_bit(Objective::Response), Some(1));

    // response appears in all three requirement bit vectors.
    let lines = std::fs::read_to_string(&capture).unwrap();
    assert!(lines.contains("req1(1, 0, 0)"), "got: {lines}");
    assert!(lines.contains("req2(0, 0, 1, 0)"), "got: {lines}");
    assert!(lines.contains("req3(0, 1, 0)"), "got: {lines}");

    // A defect verdict only touches req1.
    let response = router
        .clone()
        .oneshot(verdict_request("/rel-defect", "verdict=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let lines = std::fs::read_to_string(&capture).unwrap();
    assert!(lines.contains("req1(1, 1, 0)"), "got: {lines}");

    core.shutdown().await;
}

#[tokio::test]
async fn verdict_accepts_numeric_booleans() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("stream.log");
    let evaluator = capturing_evaluator(dir.path(), &capture);
    write_specs(dir.path(), &["req-1", "req-2", "req-3"]);

    let core = req_core(dir.path(), &evaluator);
    let router = vermon::http::router(Arc::clone(&core));

    let response = router
        .clone()
        .oneshot(verdict_request("/reqs-throughput", "verdict=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(core.requirement_bit(Objective::ReqsThroughput), Some(1));

    let response = router
        .clone()
        .oneshot(verdict_request("/reqs-throughput", "verdict=maybe"))
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    core.shutdown().await;
}

#[tokio::test]
async fn obj_endpoints_do_not_exist_in_req_mode() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("stream.log");
    let evaluator = capturing_evaluator(dir.path(), &capture);
    write_specs(dir.path(), &["req-1", "req-2", "req-3"]);

    let core = req_core(dir.path(), &evaluator);
    let router = vermon::http::router(Arc::clone(&core));
    let response = router
        .oneshot(Request::builder().uri("/cart").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    core.shutdown().await;
}

#[tokio::test]
async fn metrics_ingress_routes_resource_usage() {
    let dir = tempfile::tempdir().unwrap();
    let capture = dir.path().join("stream.log");
    let evaluator = capturing_evaluator(dir.path(), &capture);
    write_specs(dir.path(), &["R1.4_resource_usage"]);

    let mut config = GatewayConfig::defaults_for(Mode::Obj, "localhost:1".to_string());
    config.verifier_set = VerifierSetConfig::new(vec!["R1.4_resource_usage".to_string()]);
    config.evaluator.binary = evaluator.display().to_string();
    config.evaluator.spec_dir = dir.path().to_path_buf();
    let core = Core::new(config).unwrap();

    let router = vermon::http::router(Arc::clone(&core));
    let payload = serde_json::json!({
        "service_name": "cart_service",
        "metrics": {"cpu": 42.5, "memory": 512.0}
    });
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/metrics")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let lines = std::fs::read_to_string(&capture).unwrap();
    assert!(lines.contains("CartServiceUsage(42.5, 512)"), "got: {lines}");
    core.shutdown().await;
}

use std::sync::Arc;
use std::time::Duration;

use action_flow::{ActionKind, Step, WorkflowDefinition};
use action_primitives::memory::MemoryHost;
use soulflow::{metrics, Config, Engine};
use soulflow_core_types::SessionId;

#[tokio::test]
async fn metrics_route_exposes_execution_counters() {
    let config = Config::default();
    let engine = Engine::new(
        &config,
        Arc::new(MemoryHost::new()),
        Engine::monitor_for(&config),
    );
    let workflow = WorkflowDefinition::new(vec![
        Step::new(ActionKind::Wait).with_param("duration_ms", 1)
    ]);
    engine
        .run(workflow, SessionId::from("metrics"), Duration::from_secs(5))
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, metrics::router()).await.unwrap();
    });

    let response = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap();
    assert!(response.status().is_success());
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains("soulflow_executions_submitted_total"));
    assert!(body.contains("soulflow_executions_finished_total{status=\"succeeded\"}"));
}

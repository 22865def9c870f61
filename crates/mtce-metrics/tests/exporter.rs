//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "tests"
//! mtce_type: "source"
//! mtce_scope: "test"
//! mtce_description: "Exporter routes over a real listener."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::time::Duration;

use mtce_metrics::{new_registry, render, spawn_http_server, AgentMetrics, MaintenanceMetrics, Readiness};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn exporter_serves_metrics_and_readiness() {
    let registry = new_registry();
    let agent = AgentMetrics::new(&registry).unwrap();
    agent.inc_start();
    agent.set_build_info("0.1.0", "debug");
    agent.observe_tick(Duration::from_micros(300));
    let metrics = MaintenanceMetrics::new(&registry).unwrap();
    metrics.set_hosts(2);

    let readiness = Readiness::default();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let server = spawn_http_server(registry.clone(), readiness.clone(), addr)
        .await
        .unwrap();
    assert_ne!(server.addr().port(), 0);

    let response = get(server.addr(), "/ready").await;
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");
    readiness.set(true);
    let response = get(server.addr(), "/ready").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");

    let response = get(server.addr(), "/metrics").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("mtce_hosts 2"));
    assert!(response.contains("mtcagent_starts_total 1"));

    server.shutdown().await.unwrap();
}

#[test]
fn render_includes_tick_histogram() {
    let registry = new_registry();
    let agent = AgentMetrics::new(&registry).unwrap();
    agent.observe_tick(Duration::from_millis(1));
    agent.observe_tick(Duration::from_millis(2));
    assert_eq!(agent.ticks_observed(), 2);
    let text = render(&registry).unwrap();
    assert!(text.contains("mtcagent_tick_seconds_count 2"));
}

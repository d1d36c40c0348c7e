//! End-to-end tests running the analytics extension inside a real host

use std::path::Path;

use serde_json::json;
use tempfile::tempdir;

use arbor_analytics::{StatsResponse, descriptor};
use arbor_core::{ExtensionHost, HostConfig};
use arbor_extension_api::{CommandArgs, CommandOutput, HttpMethod, MiddlewareAction, RouteRequest};

async fn loaded_host(root: &Path) -> ExtensionHost {
    let host = ExtensionHost::new(HostConfig::rooted_at(root));
    host.register(descriptor()).unwrap();
    host.load("analytics").await.unwrap();
    host
}

async fn fetch_stats(host: &ExtensionHost) -> StatsResponse {
    let (handler, params) = host
        .points()
        .find_route(HttpMethod::Get, "/analytics/stats")
        .expect("stats route registered");
    assert!(params.is_empty());

    let response = handler(RouteRequest::default()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "application/json");
    serde_json::from_slice(&response.body).expect("stats body is JSON")
}

fn hook_count(stats: &StatsResponse, name: &str) -> u64 {
    stats
        .hooks
        .iter()
        .find(|h| h.hook == name)
        .map(|h| h.count)
        .unwrap_or(0)
}

#[tokio::test]
async fn counts_hook_traffic() {
    let dir = tempdir().unwrap();
    let host = loaded_host(dir.path()).await;

    host.run_hook("request:start", json!({})).await;
    host.run_hook("request:start", json!({})).await;
    host.run_hook("request:end", json!({})).await;

    let stats = fetch_stats(&host).await;
    assert_eq!(hook_count(&stats, "request:start"), 2);
    assert_eq!(hook_count(&stats, "request:end"), 1);
    // The extension's own load announcement was counted too
    assert_eq!(hook_count(&stats, "extension:load"), 1);
    assert_eq!(stats.requests, 0);
}

#[tokio::test]
async fn counting_leaves_hook_payloads_untouched() {
    let dir = tempdir().unwrap();
    let host = loaded_host(dir.path()).await;

    let payload = json!({"path": "/events", "user": "mara"});
    let result = host.run_hook("request:start", payload.clone()).await;
    assert_eq!(result, payload, "observer must not rewrite the pipeline value");
}

#[tokio::test]
async fn middleware_counts_requests() {
    let dir = tempdir().unwrap();
    let host = loaded_host(dir.path()).await;

    let chain = host.points().middleware_chain();
    assert_eq!(chain.len(), 1);
    for _ in 0..3 {
        match chain[0](RouteRequest::default()).await {
            MiddlewareAction::Continue(_) => {}
            MiddlewareAction::Respond(_) => panic!("analytics middleware must not respond"),
        }
    }

    let stats = fetch_stats(&host).await;
    assert_eq!(stats.requests, 3);
}

#[tokio::test]
async fn report_command_tabulates_counters() {
    let dir = tempdir().unwrap();
    let host = loaded_host(dir.path()).await;
    host.run_hook("request:start", json!({})).await;

    let handler = host
        .points()
        .find_command("report")
        .expect("report command registered");
    let output = handler(CommandArgs::default()).await.unwrap();

    match output {
        CommandOutput::Table { headers, rows } => {
            assert_eq!(headers, vec!["Counter", "Count"]);
            assert!(rows.iter().any(|r| r[0] == "request:start" && r[1] == "1"));
            assert!(rows.iter().any(|r| r[0] == "requests" && r[1] == "0"));
        }
        other => panic!("expected a table, got {other:?}"),
    }
}

#[tokio::test]
async fn reset_clears_counters() {
    let dir = tempdir().unwrap();
    let host = loaded_host(dir.path()).await;
    host.run_hook("request:start", json!({})).await;

    let reset = host
        .points()
        .find_command("reset")
        .expect("reset command registered");
    match reset(CommandArgs::default()).await.unwrap() {
        CommandOutput::Text(message) => assert!(message.contains("cleared")),
        other => panic!("expected text output, got {other:?}"),
    }

    let stats = fetch_stats(&host).await;
    assert_eq!(hook_count(&stats, "request:start"), 0);
    assert_eq!(hook_count(&stats, "extension:load"), 0);
    assert_eq!(stats.requests, 0);
}

#[tokio::test]
async fn counters_survive_reload() {
    let dir = tempdir().unwrap();
    let host = loaded_host(dir.path()).await;
    host.run_hook("request:start", json!({})).await;

    host.reload("analytics").await.unwrap();
    host.run_hook("request:start", json!({})).await;

    let stats = fetch_stats(&host).await;
    assert_eq!(hook_count(&stats, "request:start"), 2);
    // Loaded twice, announced twice
    assert_eq!(hook_count(&stats, "extension:load"), 2);
}

#[tokio::test]
async fn request_tracking_respects_config_override() {
    let dir = tempdir().unwrap();
    let host = ExtensionHost::new(HostConfig::rooted_at(dir.path()));
    host.register(descriptor()).unwrap();

    let mut overrides = serde_json::Map::new();
    overrides.insert("track_requests".into(), json!(false));
    host.load_with("analytics", overrides).await.unwrap();

    assert_eq!(host.points().middleware_count(), 0);
    assert!(
        host.points()
            .find_route(HttpMethod::Get, "/analytics/stats")
            .is_some(),
        "route registration is independent of request tracking"
    );
}

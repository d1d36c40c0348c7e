//! arbor-analytics - Traffic counters for an arbor host
//!
//! Counts hook pipeline traffic and HTTP requests, persists the
//! counters through the host's namespaced storage, and serves them
//! back through a `GET /analytics/stats` route and a `report` CLI
//! command.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use arbor_extension_api::{
    CommandOutput, Extension, ExtensionContext, ExtensionDescriptor, ExtensionError,
    ExtensionManifest, ExtensionStore, HttpMethod, MiddlewareAction, RouteResponse, command_fn,
    hook_fn, middleware_fn, route_fn,
};

/// Hooks whose traffic is counted
const TRACKED_HOOKS: &[&str] = &["request:start", "request:end", "extension:load"];

/// Storage key for the middleware request counter
const REQUESTS_KEY: &str = "requests";

/// Counter snapshot served by `GET /analytics/stats`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests: u64,
    pub hooks: Vec<HookCount>,
}

/// Traffic through a single hook
#[derive(Debug, Serialize, Deserialize)]
pub struct HookCount {
    pub hook: String,
    pub count: u64,
}

/// Analytics extension: observes hook and request traffic and keeps
/// running counters in storage. Set `track_requests: false` in the
/// config to skip the request-counting middleware.
#[derive(Default)]
pub struct AnalyticsExtension;

#[async_trait]
impl Extension for AnalyticsExtension {
    fn manifest(&self) -> ExtensionManifest {
        ExtensionManifest {
            name: "analytics".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("Hook and request counters for the arbor host".to_string()),
            author: Some("arbor".to_string()),
            hooks: TRACKED_HOOKS.iter().map(|h| (*h).to_string()).collect(),
            default_config: [("track_requests".to_string(), json!(true))]
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }

    async fn load(&mut self, ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
        for hook in TRACKED_HOOKS {
            let storage = ctx.storage();
            let key = counter_key(hook);
            ctx.hook(
                *hook,
                hook_fn(move |_payload| {
                    let storage = Arc::clone(&storage);
                    let key = key.clone();
                    async move {
                        bump(storage.as_ref(), &key);
                        Ok(None)
                    }
                }),
            );
        }

        if ctx.config_get::<bool>("track_requests").unwrap_or(true) {
            let storage = ctx.storage();
            ctx.add_middleware(middleware_fn(move |request| {
                let storage = Arc::clone(&storage);
                async move {
                    bump(storage.as_ref(), REQUESTS_KEY);
                    MiddlewareAction::Continue(request)
                }
            }));
        }

        let storage = ctx.storage();
        ctx.add_route(
            HttpMethod::Get,
            "/analytics/stats",
            route_fn(move |_request| {
                let storage = Arc::clone(&storage);
                async move { RouteResponse::json(200, &snapshot(storage.as_ref())) }
            }),
        )?;

        let storage = ctx.storage();
        ctx.add_command(
            "report",
            "Show collected hook and request counters",
            command_fn(move |_args| {
                let storage = Arc::clone(&storage);
                async move {
                    let stats = snapshot(storage.as_ref());
                    let mut rows = vec![vec!["requests".to_string(), stats.requests.to_string()]];
                    for hook in stats.hooks {
                        rows.push(vec![hook.hook, hook.count.to_string()]);
                    }
                    Ok(CommandOutput::Table {
                        headers: vec!["Counter".to_string(), "Count".to_string()],
                        rows,
                    })
                }
            }),
        )?;

        let storage = ctx.storage();
        ctx.add_command(
            "reset",
            "Clear all collected counters",
            command_fn(move |_args| {
                let storage = Arc::clone(&storage);
                async move {
                    storage.clear();
                    Ok(CommandOutput::Text("Counters cleared".to_string()))
                }
            }),
        )?;

        ctx.log_info("Analytics extension collecting counters");
        Ok(())
    }

    async fn unload(&mut self, ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
        ctx.log_info("Analytics extension stopped");
        Ok(())
    }
}

/// Descriptor for registering the extension with a host
pub fn descriptor() -> ExtensionDescriptor {
    ExtensionDescriptor::new(AnalyticsExtension.manifest(), AnalyticsExtension::default)
}

fn counter_key(hook: &str) -> String {
    format!("hook:{hook}")
}

// Read-modify-write; concurrent hook runs may drop an increment
fn bump(storage: &dyn ExtensionStore, key: &str) {
    let current = storage.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    storage.set(key, json!(current + 1));
}

fn snapshot(storage: &dyn ExtensionStore) -> StatsResponse {
    let requests = storage
        .get(REQUESTS_KEY)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    let hooks = TRACKED_HOOKS
        .iter()
        .map(|hook| HookCount {
            hook: (*hook).to_string(),
            count: storage
                .get(&counter_key(hook))
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
        })
        .collect();
    StatsResponse { requests, hooks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_extension_api::{MemoryStore, NullHost};
    use serde_json::Map;

    #[test]
    fn test_manifest() {
        let manifest = AnalyticsExtension.manifest();

        assert_eq!(manifest.name, "analytics");
        assert!(!manifest.version.is_empty());
        assert!(manifest.hooks.iter().any(|h| h == "request:start"));
        assert_eq!(manifest.default_config.get("track_requests"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_load_buffers_all_registration_kinds() {
        let mut ext = AnalyticsExtension;
        let mut ctx = ExtensionContext::detached("analytics");
        ext.load(&mut ctx).await.unwrap();

        let pending = ctx.pending();
        assert_eq!(pending.hooks.len(), TRACKED_HOOKS.len());
        assert_eq!(pending.routes.len(), 1);
        assert_eq!(pending.commands.len(), 2);
        assert_eq!(pending.middleware.len(), 1);
    }

    #[tokio::test]
    async fn test_request_tracking_can_be_disabled() {
        let mut config = Map::new();
        config.insert("track_requests".into(), json!(false));
        let mut ctx = ExtensionContext::new(
            "analytics",
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(NullHost),
        );

        let mut ext = AnalyticsExtension;
        ext.load(&mut ctx).await.unwrap();

        assert!(ctx.pending().middleware.is_empty());
        assert_eq!(ctx.pending().routes.len(), 1);
    }

    #[test]
    fn test_bump_accumulates() {
        let store = MemoryStore::new();
        bump(&store, &counter_key("request:start"));
        bump(&store, &counter_key("request:start"));

        let stats = snapshot(&store);
        let start = stats
            .hooks
            .iter()
            .find(|h| h.hook == "request:start")
            .unwrap();
        assert_eq!(start.count, 2);
        assert_eq!(stats.requests, 0);
    }
}

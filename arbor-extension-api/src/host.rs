//! Host services exposed to running extensions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of an extension as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionState {
    /// Load in progress
    Loading,
    /// Loaded with the active flag set
    Active,
    /// Loaded with the active flag cleared. Advisory: hooks and routes
    /// stay installed, extensions and the host decide what it means.
    Inactive,
    /// Last load attempt failed; not resident
    Error,
}

/// Snapshot of one extension's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionInfo {
    /// Extension name
    pub name: String,
    /// Version from the manifest
    pub version: String,
    /// Description from the manifest
    pub description: Option<String>,
    /// Author from the manifest
    pub author: Option<String>,
    /// Category tag from the manifest
    pub kind: Option<String>,
    /// Current lifecycle state
    pub state: ExtensionState,
    /// Position in the load order (loaded extensions only)
    pub load_order: Option<usize>,
    /// Hook callback failures attributed to this extension
    pub error_count: u64,
    /// When the extension was loaded
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Services the host provides to extension code at runtime.
///
/// The concrete implementation is supplied by the runtime when it
/// builds an [`ExtensionContext`](crate::ExtensionContext); extensions
/// reach it through the context's peer-inspection and emit methods.
#[async_trait]
pub trait HostServices: Send + Sync {
    /// Look up a single extension by name
    fn extension(&self, name: &str) -> Option<ExtensionInfo>;

    /// Snapshot all loaded extensions in load order
    fn extensions(&self) -> Vec<ExtensionInfo>;

    /// Execute a named hook pipeline, returning the final payload
    async fn run_hook(&self, hook: &str, payload: Value) -> Value;
}

/// [`HostServices`] implementation with no host behind it.
///
/// Reports no peers and echoes hook payloads back unchanged. Useful for
/// unit-testing extension code without a running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

#[async_trait]
impl HostServices for NullHost {
    fn extension(&self, _name: &str) -> Option<ExtensionInfo> {
        None
    }

    fn extensions(&self) -> Vec<ExtensionInfo> {
        Vec::new()
    }

    async fn run_hook(&self, _hook: &str, payload: Value) -> Value {
        payload
    }
}

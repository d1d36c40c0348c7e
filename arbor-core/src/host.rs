//! ExtensionHost - lifecycle orchestration and the public runtime facade
//!
//! The host owns the extension registry and is the only component that
//! moves extensions between states. Loads validate, dependency-check,
//! and run the extension's entry point under a timeout before anything
//! is committed; a failed load leaves no trace in the hook bus or the
//! point registry. A per-name in-flight set rejects concurrent
//! lifecycle operations on the same extension instead of queueing them.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use arbor_extension_api::{
    Extension, ExtensionContext, ExtensionDescriptor, ExtensionFactory, ExtensionInfo,
    ExtensionManifest, ExtensionState, HostServices, PendingRegistrations,
};

use crate::catalog::DescriptorCatalog;
use crate::config::HostConfig;
use crate::discover::{Discovery, ManifestLoader, default_loaders, discover};
use crate::error::{RuntimeError, ValidationError};
use crate::events::{EVENT_CHANNEL_CAPACITY, RuntimeEvent};
use crate::hooks::HookBus;
use crate::points::{CommandSink, ExtensionPointRegistry, ServingLayer};
use crate::resolve::resolve_load_order;
use crate::storage::StorageProvider;
use crate::validate::{schema_mismatches, validate_manifest};

/// The live instance and its context, held together so lifecycle
/// methods can borrow both
struct ExtensionCell {
    instance: Box<dyn Extension>,
    context: ExtensionContext,
}

/// A loaded extension's bookkeeping
struct ExtensionEntry {
    manifest: ExtensionManifest,
    /// Effective config: defaults merged with overrides and any
    /// `update_config` calls the extension committed
    config: Map<String, Value>,
    active: bool,
    loaded_at: DateTime<Utc>,
    /// Hook callback failures attributed to this extension
    error_count: u64,
    cell: Arc<tokio::sync::Mutex<ExtensionCell>>,
}

/// Record of a failed load attempt, kept until the next successful
/// load or explicit unload
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    /// Message of the most recent failure
    pub error: String,
    /// How many attempts have failed
    pub count: u64,
    /// When the most recent failure happened
    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, ExtensionEntry>,
    load_order: Vec<String>,
    in_flight: HashSet<String>,
    failures: HashMap<String, FailureRecord>,
}

/// A load candidate: manifest plus the factory that builds it
struct Candidate {
    manifest: ExtensionManifest,
    factory: ExtensionFactory,
}

/// Outcome of [`ExtensionHost::load_all`]
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    /// Names loaded by this batch, in load order
    pub loaded: Vec<String>,
    /// Names skipped because they were already loaded
    pub skipped: Vec<String>,
    /// Definitive failures after retries, with the final error
    pub failed: HashMap<String, String>,
}

impl LoadReport {
    /// True when nothing failed
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of [`ExtensionHost::restore`]
#[derive(Debug, Default, Clone, Serialize)]
pub struct RestoreReport {
    /// Extensions the restore loaded
    pub loaded: Vec<String>,
    /// Already-loaded extensions whose active flag was changed
    pub toggled: Vec<String>,
    /// Backup entries naming extensions this host does not know
    pub unknown: Vec<String>,
    /// Entries that failed to apply, with the error
    pub failed: HashMap<String, String>,
}

/// Serialized snapshot of the registry for backup and restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    /// When the backup was taken
    pub created_at: DateTime<Utc>,
    /// Loaded names in load sequence
    pub load_order: Vec<String>,
    /// Per-extension state
    pub extensions: Vec<BackupEntry>,
}

/// One extension's state inside a [`BackupDocument`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub name: String,
    pub version: String,
    pub active: bool,
    /// Position in the load order at backup time
    pub load_order: usize,
    pub config: Map<String, Value>,
}

/// Aggregate runtime counters
#[derive(Debug, Clone, Serialize)]
pub struct HostStats {
    /// Loaded extensions
    pub loaded: usize,
    /// Loaded extensions with the active flag set
    pub active: usize,
    /// Names with a standing failure record
    pub failures: usize,
    /// Registered hook callbacks across all hooks
    pub hook_callbacks: usize,
    /// Callback count per hook name
    pub hooks: HashMap<String, usize>,
    /// Extensions with attributed hook failures
    pub error_counts: HashMap<String, u64>,
    /// Time since the host was built
    pub uptime: Duration,
}

/// Overall host condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Outcome of [`ExtensionHost::check_health`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Loaded extensions
    pub loaded: usize,
    /// Standing failure records by name
    pub failures: HashMap<String, FailureRecord>,
    /// Loaded extensions with hook failures, by name
    pub erroring: HashMap<String, u64>,
}

struct HostInner {
    config: HostConfig,
    catalog: StdMutex<DescriptorCatalog>,
    state: StdMutex<RegistryState>,
    hooks: HookBus,
    points: ExtensionPointRegistry,
    storage: Arc<StorageProvider>,
    loaders: Vec<Box<dyn ManifestLoader>>,
    events: broadcast::Sender<RuntimeEvent>,
    started_at: Instant,
}

impl HostInner {
    fn emit(&self, event: RuntimeEvent) {
        let _ = self.events.send(event);
    }

    /// Execute a hook pipeline, book-keeping failures against their
    /// owners and emitting a `hook:error` event per failure
    async fn run_hook(&self, hook: &str, payload: Value) -> Value {
        let (value, failures) = self.hooks.execute(hook, payload).await;
        for failure in failures {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(entry) = state.entries.get_mut(&failure.owner) {
                    entry.error_count += 1;
                }
            }
            self.emit(RuntimeEvent::HookError {
                hook: failure.hook,
                owner: failure.owner,
                error: failure.error,
            });
        }
        value
    }
}

/// Builder wiring optional collaborators into an [`ExtensionHost`]
pub struct HostBuilder {
    config: HostConfig,
    serving: Option<Arc<dyn ServingLayer>>,
    command_sink: Option<Arc<dyn CommandSink>>,
    loaders: Vec<Box<dyn ManifestLoader>>,
}

impl HostBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
            serving: None,
            command_sink: None,
            loaders: default_loaders(),
        }
    }

    /// Replace the host configuration
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// Forward committed routes and middleware to a serving layer
    pub fn serving_layer(mut self, serving: Arc<dyn ServingLayer>) -> Self {
        self.serving = Some(serving);
        self
    }

    /// Forward committed commands to a command sink
    pub fn command_sink(mut self, sink: Arc<dyn CommandSink>) -> Self {
        self.command_sink = Some(sink);
        self
    }

    /// Add a manifest loader for another on-disk format
    pub fn manifest_loader(mut self, loader: Box<dyn ManifestLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Build the host
    pub fn build(self) -> ExtensionHost {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        ExtensionHost {
            inner: Arc::new(HostInner {
                hooks: HookBus::new(self.config.hook_timeout),
                points: ExtensionPointRegistry::new(self.serving, self.command_sink),
                storage: Arc::new(StorageProvider::new(self.config.storage_dir.clone())),
                config: self.config,
                catalog: StdMutex::new(DescriptorCatalog::new()),
                state: StdMutex::new(RegistryState::default()),
                loaders: self.loaders,
                events,
                started_at: Instant::now(),
            }),
        }
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The extension runtime.
///
/// Cheap to clone; all clones share one registry. Every lifecycle
/// operation goes through here.
///
/// # Example
///
/// ```ignore
/// let host = ExtensionHost::new(HostConfig::rooted_at("/var/lib/myapp"));
/// host.register(arbor_analytics::descriptor())?;
/// let report = host.load_all().await;
/// ```
#[derive(Clone)]
pub struct ExtensionHost {
    inner: Arc<HostInner>,
}

impl ExtensionHost {
    /// Create a host with no collaborators
    pub fn new(config: HostConfig) -> Self {
        HostBuilder::new().config(config).build()
    }

    /// Start a builder for collaborator wiring
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// The host configuration
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// The extension point registry (routes, commands, middleware)
    pub fn points(&self) -> &ExtensionPointRegistry {
        &self.inner.points
    }

    /// Subscribe to runtime events
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit_event(&self, event: RuntimeEvent) {
        self.inner.emit(event);
    }

    pub(crate) fn loaders(&self) -> &[Box<dyn ManifestLoader>] {
        &self.inner.loaders
    }

    // ─── Registration ────────────────────────────────────────────────

    /// Register a compiled-in extension descriptor
    pub fn register(&self, descriptor: ExtensionDescriptor) -> Result<(), RuntimeError> {
        debug!(extension = %descriptor.name(), "Descriptor registered");
        self.inner.catalog.lock().unwrap().register(descriptor)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Load an extension by name
    pub async fn load(&self, name: &str) -> Result<(), RuntimeError> {
        self.load_with(name, Map::new()).await
    }

    /// Load an extension with config overrides (merged over the
    /// manifest's `default_config`, override keys win)
    pub async fn load_with(
        &self,
        name: &str,
        overrides: Map<String, Value>,
    ) -> Result<(), RuntimeError> {
        let _guard = self.begin_operation(name)?;

        if self.is_loaded(name) {
            return Err(RuntimeError::AlreadyLoaded {
                name: name.to_string(),
            });
        }

        let candidate = self.resolve_candidate(name)?;
        self.load_candidate(candidate, overrides).await
    }

    /// Unload an extension.
    ///
    /// The extension's `unload` is invoked best-effort under a timeout;
    /// its hooks, routes, commands, and middleware are removed
    /// unconditionally. Persistent storage survives.
    pub async fn unload(&self, name: &str) -> Result<(), RuntimeError> {
        let _guard = self.begin_operation(name)?;
        self.unload_resident(name).await
    }

    /// Reload an extension: unload, then load a fresh instance with the
    /// same config
    pub async fn reload(&self, name: &str) -> Result<(), RuntimeError> {
        self.reload_with(name, Map::new()).await
    }

    /// Reload with config overrides merged over the previous config
    /// (override keys win)
    pub async fn reload_with(
        &self,
        name: &str,
        overrides: Map<String, Value>,
    ) -> Result<(), RuntimeError> {
        let _guard = self.begin_operation(name)?;

        let old_config = {
            let state = self.inner.state.lock().unwrap();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| RuntimeError::NotFound {
                    name: name.to_string(),
                })?;
            entry.config.clone()
        };

        self.unload_resident(name).await?;

        let mut merged = old_config;
        for (key, value) in overrides {
            merged.insert(key, value);
        }

        let candidate = self.resolve_candidate(name)?;
        self.load_candidate(candidate, merged).await
    }

    /// Flip (or set) an extension's active flag.
    ///
    /// Runs `activate`/`deactivate`; their errors are logged and
    /// counted but the flag applies regardless. The flag is advisory:
    /// the extension's registrations stay installed either way.
    /// Returns the resulting flag.
    pub async fn toggle(&self, name: &str, desired: Option<bool>) -> Result<bool, RuntimeError> {
        let _guard = self.begin_operation(name)?;

        let (cell, target) = {
            let state = self.inner.state.lock().unwrap();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| RuntimeError::NotFound {
                    name: name.to_string(),
                })?;
            let target = desired.unwrap_or(!entry.active);
            if entry.active == target {
                return Ok(target);
            }
            (Arc::clone(&entry.cell), target)
        };

        let verb = if target { "activate" } else { "deactivate" };
        let mut callback_error: Option<String> = None;
        let pending = {
            let mut cell = cell.lock().await;
            let ExtensionCell { instance, context } = &mut *cell;
            let call = if target {
                instance.activate(context)
            } else {
                instance.deactivate(context)
            };
            match tokio::time::timeout(self.inner.config.unload_timeout, call).await {
                Ok(Ok(())) => Some(context.take_pending()),
                Ok(Err(e)) => {
                    // Discard anything the failed callback buffered
                    let _ = context.take_pending();
                    callback_error = Some(e.to_string());
                    None
                }
                Err(_) => {
                    let _ = context.take_pending();
                    callback_error = Some(format!(
                        "{verb} timed out after {:?}",
                        self.inner.config.unload_timeout
                    ));
                    None
                }
            }
        };

        if let Some(pending) = pending
            && !pending.is_empty()
        {
            // Conflicts here are logged and skipped, never fatal: the
            // extension is already resident
            let _ = self.commit_registrations(name, pending, false).await;
        }

        {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(entry) = state.entries.get_mut(name) {
                entry.active = target;
                if callback_error.is_some() {
                    entry.error_count += 1;
                }
            }
        }

        if let Some(error) = callback_error {
            warn!(
                extension = %name,
                error = %error,
                "Lifecycle callback failed, active flag applied anyway"
            );
        }

        if target {
            info!(extension = %name, "Extension activated");
            self.inner.emit(RuntimeEvent::Activated {
                name: name.to_string(),
            });
        } else {
            info!(extension = %name, "Extension deactivated");
            self.inner.emit(RuntimeEvent::Deactivated {
                name: name.to_string(),
            });
        }

        Ok(target)
    }

    /// Set the active flag
    pub async fn activate(&self, name: &str) -> Result<(), RuntimeError> {
        self.toggle(name, Some(true)).await.map(|_| ())
    }

    /// Clear the active flag
    pub async fn deactivate(&self, name: &str) -> Result<(), RuntimeError> {
        self.toggle(name, Some(false)).await.map(|_| ())
    }

    /// Discover, order, and load every known extension.
    ///
    /// Candidates are the catalog plus everything discovered on disk;
    /// the dependency resolver fixes the order. Failing loads are
    /// retried with linear backoff and never abort the batch.
    pub async fn load_all(&self) -> LoadReport {
        let discovery = match discover(&self.inner.config.extensions_dir, &self.inner.loaders) {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!(error = %e, "Extension directory scan failed, loading catalog only");
                Discovery::default()
            }
        };

        let mut report = LoadReport::default();
        for (name, error) in &discovery.errors {
            report.failed.insert(name.clone(), error.to_string());
        }

        // Disk manifests shadow catalog metadata for shared names
        let mut manifests: Vec<ExtensionManifest> = Vec::new();
        {
            let catalog = self.inner.catalog.lock().unwrap();
            for descriptor in catalog.iter() {
                if !discovery
                    .extensions
                    .iter()
                    .any(|d| d.name == descriptor.name())
                {
                    manifests.push(descriptor.manifest.clone());
                }
            }
        }
        for discovered in &discovery.extensions {
            manifests.push(discovered.manifest.clone());
        }

        let refs: Vec<&ExtensionManifest> = manifests.iter().collect();
        let resolution = resolve_load_order(&refs);
        for (name, dependency) in &resolution.cycles {
            warn!(
                extension = %name,
                dependency = %dependency,
                "Dependency cycle detected, edge skipped"
            );
        }
        for (name, dependency) in &resolution.missing {
            warn!(
                extension = %name,
                dependency = %dependency,
                "Dependency is not a known extension, skipped"
            );
        }

        for name in &resolution.order {
            if self.is_loaded(name) {
                debug!(extension = %name, "Already loaded, skipping");
                report.skipped.push(name.clone());
                continue;
            }
            match self.load_with_retry(name).await {
                Ok(()) => report.loaded.push(name.clone()),
                Err(e) => {
                    report.failed.insert(name.clone(), e.to_string());
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Extension batch load finished"
        );
        report
    }

    /// Unload everything, newest first
    pub async fn shutdown(&self) {
        let names: Vec<String> = {
            let state = self.inner.state.lock().unwrap();
            state.load_order.iter().rev().cloned().collect()
        };
        for name in names {
            if let Err(e) = self.unload(&name).await {
                warn!(extension = %name, error = %e, "Unload during shutdown failed");
            }
        }
        info!("Extension host shut down");
    }

    // ─── Hooks ───────────────────────────────────────────────────────

    /// Execute a hook pipeline over a payload, returning the final
    /// value. Callback failures are isolated and never surface here.
    pub async fn run_hook(&self, hook: &str, payload: Value) -> Value {
        self.inner.run_hook(hook, payload).await
    }

    // ─── Inspection ──────────────────────────────────────────────────

    /// Loaded extensions, in load order
    pub fn list(&self) -> Vec<ExtensionInfo> {
        let state = self.inner.state.lock().unwrap();
        snapshot_infos(&state)
    }

    /// Status of one loaded extension
    pub fn info(&self, name: &str) -> Option<ExtensionInfo> {
        let state = self.inner.state.lock().unwrap();
        state
            .entries
            .get(name)
            .map(|entry| entry_info(name, entry, &state.load_order))
    }

    /// Whether the name is resident
    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.state.lock().unwrap().entries.contains_key(name)
    }

    /// Number of loaded extensions
    pub fn count(&self) -> usize {
        self.inner.state.lock().unwrap().entries.len()
    }

    /// Lifecycle state of a name the host has seen, loaded or not
    pub fn state_of(&self, name: &str) -> Option<ExtensionState> {
        let state = self.inner.state.lock().unwrap();
        if let Some(entry) = state.entries.get(name) {
            Some(if entry.active {
                ExtensionState::Active
            } else {
                ExtensionState::Inactive
            })
        } else if state.in_flight.contains(name) {
            Some(ExtensionState::Loading)
        } else if state.failures.contains_key(name) {
            Some(ExtensionState::Error)
        } else {
            None
        }
    }

    /// Aggregate counters for dashboards and debugging
    pub fn stats(&self) -> HostStats {
        let state = self.inner.state.lock().unwrap();
        HostStats {
            loaded: state.entries.len(),
            active: state.entries.values().filter(|e| e.active).count(),
            failures: state.failures.len(),
            hook_callbacks: self.inner.hooks.callback_count(),
            hooks: self.inner.hooks.counts_by_hook(),
            error_counts: state
                .entries
                .iter()
                .filter(|(_, e)| e.error_count > 0)
                .map(|(n, e)| (n.clone(), e.error_count))
                .collect(),
            uptime: self.inner.started_at.elapsed(),
        }
    }

    /// Health check: `Healthy` when there are no failure records and
    /// no extension has attributed hook failures
    pub fn check_health(&self) -> HealthReport {
        let state = self.inner.state.lock().unwrap();
        let failures = state.failures.clone();
        let erroring: HashMap<String, u64> = state
            .entries
            .iter()
            .filter(|(_, e)| e.error_count > 0)
            .map(|(n, e)| (n.clone(), e.error_count))
            .collect();
        let status = if failures.is_empty() && erroring.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            loaded: state.entries.len(),
            failures,
            erroring,
        }
    }

    // ─── Backup & Restore ────────────────────────────────────────────

    /// Snapshot the registry: load order, active flags, and configs
    pub fn backup(&self) -> BackupDocument {
        let state = self.inner.state.lock().unwrap();
        let extensions = state
            .load_order
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                state.entries.get(name).map(|entry| BackupEntry {
                    name: name.clone(),
                    version: entry.manifest.version.clone(),
                    active: entry.active,
                    load_order: index,
                    config: entry.config.clone(),
                })
            })
            .collect();
        BackupDocument {
            created_at: Utc::now(),
            load_order: state.load_order.clone(),
            extensions,
        }
    }

    /// Write a backup document to a file as pretty JSON
    pub fn backup_to(&self, path: &Path) -> Result<(), RuntimeError> {
        let document = self.backup();
        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, content)?;
        info!(
            path = %path.display(),
            extensions = document.extensions.len(),
            "Backup written"
        );
        Ok(())
    }

    /// Apply a backup document.
    ///
    /// Missing extensions are loaded in recorded order with their
    /// recorded config, then the recorded active flag is applied.
    /// Already-loaded extensions only get the flag. Names the host
    /// cannot resolve are reported, never fatal.
    pub async fn restore(&self, document: &BackupDocument) -> RestoreReport {
        let mut report = RestoreReport::default();

        let mut entries: Vec<&BackupEntry> = document.extensions.iter().collect();
        entries.sort_by_key(|e| e.load_order);

        for entry in entries {
            if let Some(info) = self.info(&entry.name) {
                let currently_active = info.state == ExtensionState::Active;
                if currently_active != entry.active {
                    match self.toggle(&entry.name, Some(entry.active)).await {
                        Ok(_) => report.toggled.push(entry.name.clone()),
                        Err(e) => {
                            report.failed.insert(entry.name.clone(), e.to_string());
                        }
                    }
                }
                continue;
            }

            match self.load_with(&entry.name, entry.config.clone()).await {
                Ok(()) => {
                    report.loaded.push(entry.name.clone());
                    if !entry.active
                        && let Err(e) = self.toggle(&entry.name, Some(false)).await
                    {
                        report.failed.insert(entry.name.clone(), e.to_string());
                    }
                }
                Err(
                    e @ (RuntimeError::Unknown { .. }
                    | RuntimeError::Validation(ValidationError::MissingEntry { .. })),
                ) => {
                    warn!(extension = %entry.name, error = %e, "Backup names an unknown extension");
                    report.unknown.push(entry.name.clone());
                }
                Err(e) => {
                    report.failed.insert(entry.name.clone(), e.to_string());
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            toggled = report.toggled.len(),
            unknown = report.unknown.len(),
            failed = report.failed.len(),
            "Restore finished"
        );
        report
    }

    /// Read a backup document from a file and apply it
    pub async fn restore_from(&self, path: &Path) -> Result<RestoreReport, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        let document: BackupDocument = serde_json::from_str(&content)?;
        Ok(self.restore(&document).await)
    }

    // ─── Internals ───────────────────────────────────────────────────

    /// Claim the per-name in-flight slot for one lifecycle operation
    fn begin_operation(&self, name: &str) -> Result<OperationGuard, RuntimeError> {
        let mut state = self.inner.state.lock().unwrap();
        if !state.in_flight.insert(name.to_string()) {
            return Err(RuntimeError::Busy {
                name: name.to_string(),
            });
        }
        Ok(OperationGuard {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        })
    }

    /// Resolve what `load(name)` should actually load: the catalog
    /// supplies the entry point, a disk manifest (when present)
    /// supplies the metadata
    fn resolve_candidate(&self, name: &str) -> Result<Candidate, RuntimeError> {
        let disk = self.disk_manifest(name)?;
        let catalog = self.inner.catalog.lock().unwrap();
        match (catalog.get(name), disk) {
            (Some(descriptor), Some(manifest)) => Ok(Candidate {
                manifest,
                factory: Arc::clone(&descriptor.entry),
            }),
            (Some(descriptor), None) => Ok(Candidate {
                manifest: descriptor.manifest.clone(),
                factory: Arc::clone(&descriptor.entry),
            }),
            (None, Some(_)) => Err(ValidationError::MissingEntry {
                name: name.to_string(),
            }
            .into()),
            (None, None) => Err(RuntimeError::Unknown {
                name: name.to_string(),
            }),
        }
    }

    /// Find the on-disk manifest for a name, if any. A manifest that
    /// exists but does not parse is an error the caller must see.
    fn disk_manifest(&self, name: &str) -> Result<Option<ExtensionManifest>, RuntimeError> {
        let discovery = match discover(&self.inner.config.extensions_dir, &self.inner.loaders) {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!(error = %e, "Extension directory scan failed, using catalog only");
                return Ok(None);
            }
        };
        if let Some(found) = discovery.extensions.into_iter().find(|d| d.name == name) {
            return Ok(Some(found.manifest));
        }
        if let Some((_, error)) = discovery.errors.into_iter().find(|(n, _)| n == name) {
            return Err(error.into());
        }
        Ok(None)
    }

    /// The load sequence proper. The caller holds the in-flight slot
    /// and has verified the name is not resident.
    async fn load_candidate(
        &self,
        candidate: Candidate,
        overrides: Map<String, Value>,
    ) -> Result<(), RuntimeError> {
        let name = candidate.manifest.name.clone();
        let version = candidate.manifest.version.clone();

        // 1. Validate; hard failures abort before anything registers
        let warnings =
            match validate_manifest(&candidate.manifest, true, &self.inner.config.known_hooks) {
                Ok(warnings) => warnings,
                Err(e) => return Err(self.fail_load(&name, e.into())),
            };
        for warning in &warnings {
            warn!(extension = %name, "{warning}");
        }

        // 2. Every declared dependency must already be loaded
        let missing = {
            let state = self.inner.state.lock().unwrap();
            candidate
                .manifest
                .dependencies
                .iter()
                .find(|d| !state.entries.contains_key(*d))
                .cloned()
        };
        if let Some(dependency) = missing {
            return Err(self.fail_load(
                &name,
                RuntimeError::MissingDependency {
                    name: name.clone(),
                    dependency,
                },
            ));
        }

        // 3. Effective config: defaults under caller overrides
        let mut config = candidate.manifest.default_config.clone();
        for (key, value) in overrides {
            config.insert(key, value);
        }
        if let Some(schema) = &candidate.manifest.config_schema {
            for warning in schema_mismatches(&name, schema, &config) {
                warn!(extension = %name, "{warning}");
            }
        }

        // 4. Fresh instance plus its context
        let mut instance = (candidate.factory)();
        let storage = self.inner.storage.scope(&name);
        let services: Arc<dyn HostServices> = Arc::new(ServicesBridge {
            inner: Arc::downgrade(&self.inner),
        });
        let mut context = ExtensionContext::new(name.clone(), config, Arc::new(storage), services);

        // 5. Run the entry point under the load timeout
        match tokio::time::timeout(self.inner.config.load_timeout, instance.load(&mut context))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(self.fail_load(
                    &name,
                    RuntimeError::Entry {
                        name: name.clone(),
                        source: e,
                    },
                ));
            }
            Err(_) => {
                return Err(self.fail_load(
                    &name,
                    RuntimeError::Timeout {
                        name: name.clone(),
                        timeout: self.inner.config.load_timeout,
                    },
                ));
            }
        }

        // 6. Commit buffered registrations; a conflict with another
        //    extension fails the load with nothing committed
        let pending = context.take_pending();
        if let Err(e) = self.commit_registrations(&name, pending, true).await {
            return Err(self.fail_load(&name, e));
        }

        // 7. Insert the runtime record
        {
            let mut state = self.inner.state.lock().unwrap();
            state.entries.insert(
                name.clone(),
                ExtensionEntry {
                    config: context.config().clone(),
                    manifest: candidate.manifest,
                    active: true,
                    loaded_at: Utc::now(),
                    error_count: 0,
                    cell: Arc::new(tokio::sync::Mutex::new(ExtensionCell { instance, context })),
                },
            );
            state.load_order.push(name.clone());
            state.failures.remove(&name);
        }

        info!(extension = %name, version = %version, "Extension loaded");
        self.inner.emit(RuntimeEvent::Loaded {
            name: name.clone(),
            version: version.clone(),
        });

        // 8. Announce through the hook pipeline
        self.inner
            .run_hook("extension:load", json!({ "name": name, "version": version }))
            .await;

        Ok(())
    }

    /// Remove a resident extension. The caller holds the in-flight
    /// slot.
    async fn unload_resident(&self, name: &str) -> Result<(), RuntimeError> {
        // The record goes first so listings drop the name immediately
        let cell = {
            let mut state = self.inner.state.lock().unwrap();
            let entry = state
                .entries
                .remove(name)
                .ok_or_else(|| RuntimeError::NotFound {
                    name: name.to_string(),
                })?;
            state.load_order.retain(|n| n != name);
            state.failures.remove(name);
            entry.cell
        };

        {
            let mut cell = cell.lock().await;
            let ExtensionCell { instance, context } = &mut *cell;
            match tokio::time::timeout(self.inner.config.unload_timeout, instance.unload(context))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(extension = %name, error = %e, "Extension unload returned error");
                }
                Err(_) => {
                    warn!(extension = %name, "Extension unload timed out");
                }
            }
        }

        let hooks = self.inner.hooks.remove_owner(name);
        let (middleware, routes, commands) = self.inner.points.remove_owner(name).await;
        debug!(
            extension = %name,
            hooks,
            middleware,
            routes,
            commands,
            "Registrations removed"
        );

        info!(extension = %name, "Extension unloaded");
        self.inner.emit(RuntimeEvent::Unloaded {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Commit a drained pending buffer for an owner.
    ///
    /// `strict` makes cross-extension conflicts an error (load); lax
    /// mode logs and skips the conflicting items (toggle).
    async fn commit_registrations(
        &self,
        owner: &str,
        pending: PendingRegistrations,
        strict: bool,
    ) -> Result<(), RuntimeError> {
        let PendingRegistrations {
            hooks,
            hook_removals,
            middleware,
            mut routes,
            mut commands,
            config_updates,
        } = pending;

        if strict {
            for registration in &routes {
                if let Some(existing) = self.inner.points.check_route_conflict(&registration.spec)
                {
                    return Err(RuntimeError::RouteConflict {
                        route: registration.spec.to_string(),
                        existing,
                        requested: owner.to_string(),
                    });
                }
            }
            for registration in &commands {
                if let Some(existing) = self
                    .inner
                    .points
                    .check_command_conflict(&registration.spec.name)
                {
                    return Err(RuntimeError::CommandConflict {
                        command: registration.spec.name.clone(),
                        existing,
                        requested: owner.to_string(),
                    });
                }
            }
        } else {
            routes.retain(|registration| {
                match self.inner.points.check_route_conflict(&registration.spec) {
                    Some(existing) => {
                        warn!(
                            extension = %owner,
                            route = %registration.spec,
                            existing = %existing,
                            "Route already registered, skipping"
                        );
                        false
                    }
                    None => true,
                }
            });
            commands.retain(|registration| {
                match self
                    .inner
                    .points
                    .check_command_conflict(&registration.spec.name)
                {
                    Some(existing) => {
                        warn!(
                            extension = %owner,
                            command = %registration.spec.name,
                            existing = %existing,
                            "Command already registered, skipping"
                        );
                        false
                    }
                    None => true,
                }
            });
        }

        self.inner
            .points
            .commit(owner, middleware, routes, commands)
            .await;
        for registration in hooks {
            self.inner.hooks.add_registration(owner, registration);
        }
        for (hook, id) in hook_removals {
            self.inner.hooks.remove(&hook, id);
        }

        if !config_updates.is_empty() {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(entry) = state.entries.get_mut(owner) {
                if let Some(schema) = entry.manifest.config_schema.clone() {
                    for warning in schema_mismatches(owner, &schema, &config_updates) {
                        warn!(extension = %owner, "{warning}");
                    }
                }
                for (key, value) in config_updates {
                    entry.config.insert(key, value);
                }
            }
        }

        Ok(())
    }

    /// Record a load failure, emit the error event, and hand the error
    /// back for propagation
    fn fail_load(&self, name: &str, error: RuntimeError) -> RuntimeError {
        error!(extension = %name, error = %error, "Failed to load extension");
        {
            let mut state = self.inner.state.lock().unwrap();
            let record = state
                .failures
                .entry(name.to_string())
                .or_insert_with(|| FailureRecord {
                    error: String::new(),
                    count: 0,
                    at: Utc::now(),
                });
            record.error = error.to_string();
            record.count += 1;
            record.at = Utc::now();
        }
        self.inner.emit(RuntimeEvent::Failed {
            name: name.to_string(),
            error: error.to_string(),
        });
        error
    }

    async fn load_with_retry(&self, name: &str) -> Result<(), RuntimeError> {
        let retry = self.inner.config.retry.clone();
        let mut attempt = 1u32;
        loop {
            match self.load(name).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retry.max_attempts => {
                    let backoff = retry.backoff * attempt;
                    warn!(
                        extension = %name,
                        error = %e,
                        attempt,
                        backoff = ?backoff,
                        "Load failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// RAII slot in the in-flight set
struct OperationGuard {
    inner: Arc<HostInner>,
    name: String,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.inner
            .state
            .lock()
            .unwrap()
            .in_flight
            .remove(&self.name);
    }
}

/// [`HostServices`] implementation handed to extension contexts.
///
/// Holds the host weakly so a context kept alive by an extension does
/// not keep the whole runtime alive.
struct ServicesBridge {
    inner: Weak<HostInner>,
}

#[async_trait]
impl HostServices for ServicesBridge {
    fn extension(&self, name: &str) -> Option<ExtensionInfo> {
        let inner = self.inner.upgrade()?;
        let state = inner.state.lock().unwrap();
        state
            .entries
            .get(name)
            .map(|entry| entry_info(name, entry, &state.load_order))
    }

    fn extensions(&self) -> Vec<ExtensionInfo> {
        let Some(inner) = self.inner.upgrade() else {
            return Vec::new();
        };
        let state = inner.state.lock().unwrap();
        snapshot_infos(&state)
    }

    async fn run_hook(&self, hook: &str, payload: Value) -> Value {
        let Some(inner) = self.inner.upgrade() else {
            return payload;
        };
        inner.run_hook(hook, payload).await
    }
}

fn entry_info(name: &str, entry: &ExtensionEntry, order: &[String]) -> ExtensionInfo {
    ExtensionInfo {
        name: name.to_string(),
        version: entry.manifest.version.clone(),
        description: entry.manifest.description.clone(),
        author: entry.manifest.author.clone(),
        kind: entry.manifest.kind.clone(),
        state: if entry.active {
            ExtensionState::Active
        } else {
            ExtensionState::Inactive
        },
        load_order: order.iter().position(|n| n == name),
        error_count: entry.error_count,
        loaded_at: Some(entry.loaded_at),
    }
}

fn snapshot_infos(state: &RegistryState) -> Vec<ExtensionInfo> {
    state
        .load_order
        .iter()
        .filter_map(|name| {
            state
                .entries
                .get(name)
                .map(|entry| entry_info(name, entry, &state.load_order))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_extension_api::ExtensionError;
    use tempfile::tempdir;

    struct Quiet(&'static str);

    #[async_trait]
    impl Extension for Quiet {
        fn manifest(&self) -> ExtensionManifest {
            ExtensionManifest::new(self.0, "0.1.0")
        }

        async fn load(&mut self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
            Ok(())
        }
    }

    fn quiet_descriptor(name: &'static str) -> ExtensionDescriptor {
        ExtensionDescriptor::new(ExtensionManifest::new(name, "0.1.0"), move || Quiet(name))
    }

    fn test_host(root: &Path) -> ExtensionHost {
        ExtensionHost::new(HostConfig::rooted_at(root))
    }

    #[test]
    fn test_new_host_is_empty() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());

        assert_eq!(host.count(), 0);
        assert!(host.list().is_empty());
        assert_eq!(host.check_health().status, HealthStatus::Healthy);
        assert_eq!(host.stats().loaded, 0);
    }

    #[tokio::test]
    async fn test_load_then_unload() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(quiet_descriptor("probe")).unwrap();

        host.load("probe").await.unwrap();
        assert!(host.is_loaded("probe"));
        assert_eq!(host.state_of("probe"), Some(ExtensionState::Active));
        assert_eq!(host.list().len(), 1);

        host.unload("probe").await.unwrap();
        assert!(!host.is_loaded("probe"));
        assert_eq!(host.state_of("probe"), None);
    }

    #[tokio::test]
    async fn test_load_unknown_name() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());

        let err = host.load("ghost").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unknown { name } if name == "ghost"));
    }

    #[tokio::test]
    async fn test_double_load_rejected() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(quiet_descriptor("probe")).unwrap();

        host.load("probe").await.unwrap();
        let err = host.load("probe").await.unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyLoaded { .. }));
    }

    #[tokio::test]
    async fn test_unload_missing_extension() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());

        let err = host.unload("ghost").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_toggle_flips_flag() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(quiet_descriptor("probe")).unwrap();
        host.load("probe").await.unwrap();

        assert!(!host.toggle("probe", None).await.unwrap());
        assert_eq!(host.state_of("probe"), Some(ExtensionState::Inactive));

        assert!(host.toggle("probe", None).await.unwrap());
        assert_eq!(host.state_of("probe"), Some(ExtensionState::Active));
    }

    #[tokio::test]
    async fn test_toggle_to_current_state_is_noop() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(quiet_descriptor("probe")).unwrap();
        host.load("probe").await.unwrap();

        let mut events = host.subscribe();
        assert!(host.toggle("probe", Some(true)).await.unwrap());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backup_of_empty_host() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());

        let document = host.backup();
        assert!(document.load_order.is_empty());
        assert!(document.extensions.is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_recorded_in_health() {
        struct Failing;

        #[async_trait]
        impl Extension for Failing {
            fn manifest(&self) -> ExtensionManifest {
                ExtensionManifest::new("failing", "0.1.0")
            }

            async fn load(&mut self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
                Err(ExtensionError::custom("nope"))
            }
        }

        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(ExtensionDescriptor::new(
            ExtensionManifest::new("failing", "0.1.0"),
            || Failing,
        ))
        .unwrap();

        let err = host.load("failing").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Entry { .. }));
        assert!(!host.is_loaded("failing"));
        assert_eq!(host.state_of("failing"), Some(ExtensionState::Error));

        let health = host.check_health();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.failures.contains_key("failing"));

        // Unrelated loads leave the record standing
        host.register(quiet_descriptor("other")).unwrap();
        host.load("other").await.unwrap();
        assert!(host.check_health().failures.contains_key("failing"));
    }

    #[tokio::test]
    async fn test_list_keeps_load_order() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(quiet_descriptor("first")).unwrap();
        host.register(quiet_descriptor("second")).unwrap();

        host.load("second").await.unwrap();
        host.load("first").await.unwrap();

        let names: Vec<String> = host.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(host.info("first").unwrap().load_order, Some(1));
    }

    #[tokio::test]
    async fn test_shutdown_unloads_everything() {
        let dir = tempdir().unwrap();
        let host = test_host(dir.path());
        host.register(quiet_descriptor("a")).unwrap();
        host.register(quiet_descriptor("b")).unwrap();
        host.load("a").await.unwrap();
        host.load("b").await.unwrap();

        host.shutdown().await;
        assert_eq!(host.count(), 0);
    }

    #[test]
    fn test_load_report_success_helper() {
        let mut report = LoadReport::default();
        assert!(report.all_succeeded());
        report.failed.insert("x".into(), "broke".into());
        assert!(!report.all_succeeded());
    }
}

//! ExtensionContext - an extension's interface to the arbor runtime

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::command::{CommandHandler, CommandRegistration, CommandSpec};
use crate::error::ExtensionError;
use crate::hook::{DEFAULT_HOOK_PRIORITY, HookCallback, HookId, HookRegistration};
use crate::host::{ExtensionInfo, HostServices, NullHost};
use crate::http::{HttpMethod, Middleware, RouteHandler, RouteRegistration, RouteSpec};
use crate::storage::{ExtensionStore, MemoryStore};

/// Registrations buffered during a lifecycle call.
///
/// Nothing an extension registers takes effect while its lifecycle
/// method is still running: the host drains this buffer and commits it
/// only after the method returns `Ok`. A failed load therefore leaves
/// no residue in the hook bus or the extension point registry.
#[derive(Default)]
pub struct PendingRegistrations {
    /// Hook callbacks to add
    pub hooks: Vec<HookRegistration>,
    /// Hook callbacks to remove, by hook name and id
    pub hook_removals: Vec<(String, HookId)>,
    /// Middleware to append, in registration order
    pub middleware: Vec<Middleware>,
    /// Routes to register
    pub routes: Vec<RouteRegistration>,
    /// Commands to register
    pub commands: Vec<CommandRegistration>,
    /// Config keys to shallow-merge into the live record
    pub config_updates: Map<String, Value>,
}

impl std::fmt::Debug for PendingRegistrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRegistrations")
            .field("hooks", &self.hooks)
            .field("hook_removals", &self.hook_removals)
            .field("middleware", &self.middleware.len())
            .field("routes", &self.routes)
            .field("commands", &self.commands)
            .field("config_updates", &self.config_updates)
            .finish()
    }
}

impl PendingRegistrations {
    /// Whether nothing has been buffered
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
            && self.hook_removals.is_empty()
            && self.middleware.is_empty()
            && self.routes.is_empty()
            && self.commands.is_empty()
            && self.config_updates.is_empty()
    }
}

/// An extension's interface to the runtime.
///
/// Passed `&mut` to lifecycle methods. Provides:
/// - hook registration and removal (buffered, committed on success)
/// - route, command, and middleware registration (buffered)
/// - effective configuration and buffered config updates
/// - live namespaced storage
/// - peer inspection and hook emission through the host
/// - logging tagged with the extension name
pub struct ExtensionContext {
    extension_name: String,
    config: Map<String, Value>,
    pending: PendingRegistrations,
    storage: Arc<dyn ExtensionStore>,
    host: Arc<dyn HostServices>,
}

impl ExtensionContext {
    /// Create a context wired to a live host
    pub fn new(
        extension_name: impl Into<String>,
        config: Map<String, Value>,
        storage: Arc<dyn ExtensionStore>,
        host: Arc<dyn HostServices>,
    ) -> Self {
        Self {
            extension_name: extension_name.into(),
            config,
            pending: PendingRegistrations::default(),
            storage,
            host,
        }
    }

    /// Create a context with no host behind it: in-memory storage, no
    /// peers, hooks echo their payload. For extension unit tests.
    pub fn detached(extension_name: impl Into<String>) -> Self {
        Self::new(
            extension_name,
            Map::new(),
            Arc::new(MemoryStore::new()),
            Arc::new(NullHost),
        )
    }

    /// The extension's name
    pub fn extension_name(&self) -> &str {
        &self.extension_name
    }

    // ─── Configuration ───────────────────────────────────────────────

    /// The effective configuration (defaults merged with overrides)
    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Read a single configuration value
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Read a configuration value, deserialized
    ///
    /// # Example
    /// ```ignore
    /// let window: Option<u32> = ctx.config_get("window_minutes");
    /// ```
    pub fn config_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Buffer a shallow config update (incoming keys win).
    ///
    /// Applied to the live record when the lifecycle call succeeds;
    /// also visible immediately through [`config`](Self::config).
    pub fn update_config(&mut self, values: Map<String, Value>) {
        for (key, value) in values {
            self.config.insert(key.clone(), value.clone());
            self.pending.config_updates.insert(key, value);
        }
    }

    // ─── Hook Registration ───────────────────────────────────────────

    /// Register a hook callback with the default priority.
    ///
    /// Returns the id to use with [`remove_hook`](Self::remove_hook).
    pub fn hook(&mut self, name: impl Into<String>, callback: HookCallback) -> HookId {
        self.hook_with_priority(name, callback, DEFAULT_HOOK_PRIORITY)
    }

    /// Register a hook callback with an explicit priority.
    ///
    /// Higher priority runs earlier; callbacks with equal priority run
    /// in registration order.
    pub fn hook_with_priority(
        &mut self,
        name: impl Into<String>,
        callback: HookCallback,
        priority: i32,
    ) -> HookId {
        let id = HookId::next();
        self.pending.hooks.push(HookRegistration {
            hook: name.into(),
            id,
            priority,
            callback,
        });
        id
    }

    /// Remove a hook callback registered earlier.
    ///
    /// Callbacks still pending in this context are dropped outright;
    /// already-committed callbacks are removed when this lifecycle call
    /// commits.
    pub fn remove_hook(&mut self, name: impl Into<String>, id: HookId) {
        let before = self.pending.hooks.len();
        self.pending.hooks.retain(|reg| reg.id != id);
        if self.pending.hooks.len() == before {
            self.pending.hook_removals.push((name.into(), id));
        }
    }

    // ─── Extension Points ────────────────────────────────────────────

    /// Append middleware to the host's middleware chain
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.pending.middleware.push(middleware);
    }

    /// Register an HTTP route.
    ///
    /// Returns an error if the same method and path are already pending
    /// within this context. Conflicts with other extensions surface
    /// when the host commits.
    pub fn add_route(
        &mut self,
        method: HttpMethod,
        path: impl Into<String>,
        handler: RouteHandler,
    ) -> Result<(), ExtensionError> {
        let spec = RouteSpec {
            method,
            path: path.into(),
        };
        if self.pending.routes.iter().any(|r| r.spec == spec) {
            return Err(ExtensionError::DuplicateRoute(spec.to_string()));
        }
        self.pending.routes.push(RouteRegistration { spec, handler });
        Ok(())
    }

    /// Register a CLI command by name.
    ///
    /// Returns an error if the name is already pending within this
    /// context.
    pub fn add_command(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: CommandHandler,
    ) -> Result<(), ExtensionError> {
        self.add_command_spec(CommandSpec::new(name, description), handler)
    }

    /// Register a CLI command with a full spec (argument help, etc.)
    pub fn add_command_spec(
        &mut self,
        spec: CommandSpec,
        handler: CommandHandler,
    ) -> Result<(), ExtensionError> {
        if self.pending.commands.iter().any(|c| c.spec.name == spec.name) {
            return Err(ExtensionError::DuplicateCommand(spec.name));
        }
        self.pending.commands.push(CommandRegistration { spec, handler });
        Ok(())
    }

    // ─── Storage ─────────────────────────────────────────────────────

    /// The extension's namespaced persistent store.
    ///
    /// Live, not buffered: writes land immediately and survive unload.
    /// The handle is cloneable into hook callbacks.
    pub fn storage(&self) -> Arc<dyn ExtensionStore> {
        Arc::clone(&self.storage)
    }

    // ─── Host Services ───────────────────────────────────────────────

    /// Look up a peer extension by name
    pub fn extension(&self, name: &str) -> Option<ExtensionInfo> {
        self.host.extension(name)
    }

    /// Snapshot all loaded extensions
    pub fn extensions(&self) -> Vec<ExtensionInfo> {
        self.host.extensions()
    }

    /// Execute a named hook pipeline, returning the final payload
    pub async fn emit(&self, hook: &str, payload: Value) -> Value {
        self.host.run_hook(hook, payload).await
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message (tagged with the extension name)
    pub fn log_info(&self, message: &str) {
        tracing::info!(extension = %self.extension_name, "{}", message);
    }

    /// Log a warning message
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(extension = %self.extension_name, "{}", message);
    }

    /// Log an error message
    pub fn log_error(&self, message: &str) {
        tracing::error!(extension = %self.extension_name, "{}", message);
    }

    /// Log a debug message
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(extension = %self.extension_name, "{}", message);
    }

    // ─── Host Plumbing ───────────────────────────────────────────────

    /// Buffered registrations (used by the host for validation)
    pub fn pending(&self) -> &PendingRegistrations {
        &self.pending
    }

    /// Drain buffered registrations (used by the host after a
    /// lifecycle call succeeds)
    pub fn take_pending(&mut self) -> PendingRegistrations {
        std::mem::take(&mut self.pending)
    }
}

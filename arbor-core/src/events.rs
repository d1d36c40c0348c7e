//! Runtime observability events
//!
//! The host broadcasts a [`RuntimeEvent`] at every lifecycle transition.
//! These are host-to-observer notifications, distinct from the hook
//! pipelines extensions register callbacks on: the `extension:load`
//! *hook* runs through the hook bus, the `extension:loaded` *event*
//! lands here.

use serde::{Deserialize, Serialize};

/// Broadcast channel capacity for runtime events
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the host as extensions move through their lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// An extension finished loading
    Loaded { name: String, version: String },
    /// An extension was unloaded
    Unloaded { name: String },
    /// A lifecycle operation failed
    Failed { name: String, error: String },
    /// An extension's active flag was set
    Activated { name: String },
    /// An extension's active flag was cleared
    Deactivated { name: String },
    /// A hook callback errored or timed out
    HookError {
        hook: String,
        owner: String,
        error: String,
    },
    /// The watcher reloaded an extension after a file change
    HotReload { name: String },
}

impl RuntimeEvent {
    /// Wire name of the event, e.g. `extension:loaded`
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeEvent::Loaded { .. } => "extension:loaded",
            RuntimeEvent::Unloaded { .. } => "extension:unloaded",
            RuntimeEvent::Failed { .. } => "extension:error",
            RuntimeEvent::Activated { .. } => "extension:activated",
            RuntimeEvent::Deactivated { .. } => "extension:deactivated",
            RuntimeEvent::HookError { .. } => "hook:error",
            RuntimeEvent::HotReload { .. } => "dev:hotreload",
        }
    }

    /// The extension this event concerns, if any
    pub fn extension(&self) -> Option<&str> {
        match self {
            RuntimeEvent::Loaded { name, .. }
            | RuntimeEvent::Unloaded { name }
            | RuntimeEvent::Failed { name, .. }
            | RuntimeEvent::Activated { name }
            | RuntimeEvent::Deactivated { name }
            | RuntimeEvent::HotReload { name } => Some(name),
            RuntimeEvent::HookError { owner, .. } => Some(owner),
        }
    }
}

//! Hook callback types for the runtime's hook bus

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::error::ExtensionError;

/// Default priority for hook callbacks. Higher runs earlier.
pub const DEFAULT_HOOK_PRIORITY: i32 = 10;

/// Result of a single hook callback.
///
/// `Ok(Some(value))` replaces the payload for downstream callbacks,
/// `Ok(None)` passes the current payload through unchanged.
pub type HookResult = Result<Option<Value>, ExtensionError>;

/// Boxed future returned by hook callbacks
pub type HookFuture = Pin<Box<dyn Future<Output = HookResult> + Send>>;

/// A hook callback: receives the current payload, may transform it
pub type HookCallback = Arc<dyn Fn(Value) -> HookFuture + Send + Sync>;

/// Identifier for a registered hook callback.
///
/// Minted from a process-wide counter so ids are unique across hosts
/// and stable for the lifetime of the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl HookId {
    /// Mint the next unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A hook callback together with its registration metadata
#[derive(Clone)]
pub struct HookRegistration {
    /// Hook name the callback is attached to
    pub hook: String,
    /// Callback identifier (for later removal)
    pub id: HookId,
    /// Execution priority, higher runs earlier
    pub priority: i32,
    /// The callback itself
    pub callback: HookCallback,
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("hook", &self.hook)
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Wrap an async closure as a [`HookCallback`].
///
/// # Example
///
/// ```
/// use arbor_extension_api::hook_fn;
///
/// let callback = hook_fn(|payload| async move { Ok(Some(payload)) });
/// ```
pub fn hook_fn<F, Fut>(f: F) -> HookCallback
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

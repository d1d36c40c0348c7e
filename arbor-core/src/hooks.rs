//! Hook bus - named, priority-ordered callback pipelines
//!
//! Callbacks attached to a hook form a transform chain: each receives
//! the current payload and may replace it for the callbacks after it.
//! Execution is sequential, bounded per callback by a timeout, and
//! isolated: a failing callback is skipped over, never fatal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use arbor_extension_api::{HookCallback, HookId, HookRegistration};

/// One callback failure surfaced by [`HookBus::execute`]
#[derive(Debug, Clone)]
pub struct HookFailure {
    /// Hook being executed
    pub hook: String,
    /// Extension that owns the failing callback
    pub owner: String,
    /// Error message (or timeout description)
    pub error: String,
    /// Whether the failure was a timeout
    pub timed_out: bool,
}

struct HookEntry {
    id: HookId,
    owner: String,
    priority: i32,
    seq: u64,
    callback: HookCallback,
}

#[derive(Default)]
struct BusState {
    hooks: HashMap<String, Vec<HookEntry>>,
    next_seq: u64,
}

/// Named callback pipelines with priority ordering and error isolation.
///
/// All methods take `&self`; registration mutates under a short-lived
/// lock and execution runs over a snapshot, so callbacks may register
/// or remove hooks themselves (changes apply to the next execution).
pub struct HookBus {
    state: Mutex<BusState>,
    timeout: Duration,
}

impl HookBus {
    /// Create a bus with the given per-callback timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            timeout,
        }
    }

    /// Register a callback, minting a fresh id.
    ///
    /// Higher priority runs earlier; equal priorities run in
    /// registration order.
    pub fn add(&self, hook: &str, owner: &str, priority: i32, callback: HookCallback) -> HookId {
        let id = HookId::next();
        self.insert(hook, owner, priority, id, callback);
        id
    }

    /// Register a callback carrying a pre-minted id (context commits)
    pub fn add_registration(&self, owner: &str, registration: HookRegistration) {
        self.insert(
            &registration.hook,
            owner,
            registration.priority,
            registration.id,
            registration.callback,
        );
    }

    fn insert(&self, hook: &str, owner: &str, priority: i32, id: HookId, callback: HookCallback) {
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .hooks
            .entry(hook.to_string())
            .or_default()
            .push(HookEntry {
                id,
                owner: owner.to_string(),
                priority,
                seq,
                callback,
            });
    }

    /// Remove a single callback, returning whether it was present
    pub fn remove(&self, hook: &str, id: HookId) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(entries) = state.hooks.get_mut(hook) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        let now_empty = entries.is_empty();
        if now_empty {
            state.hooks.remove(hook);
        }
        removed
    }

    /// Remove every callback owned by an extension, across all hooks
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut state = self.state.lock().unwrap();
        let mut removed = 0;
        state.hooks.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.owner != owner);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// Execute a hook's callback chain over an initial payload.
    ///
    /// The callback list is snapshotted up front: registrations made
    /// while executing apply next time. Each callback runs under the
    /// bus timeout; an error or timeout is recorded, the payload is
    /// left as it was, and the chain continues. Never fails - an
    /// unknown hook returns the payload untouched.
    pub async fn execute(&self, hook: &str, initial: Value) -> (Value, Vec<HookFailure>) {
        let snapshot: Vec<(HookId, String, HookCallback)> = {
            let state = self.state.lock().unwrap();
            let Some(entries) = state.hooks.get(hook) else {
                return (initial, Vec::new());
            };
            let mut ordered: Vec<&HookEntry> = entries.iter().collect();
            ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
            ordered
                .into_iter()
                .map(|e| (e.id, e.owner.clone(), Arc::clone(&e.callback)))
                .collect()
        };

        let mut value = initial;
        let mut failures = Vec::new();

        for (id, owner, callback) in snapshot {
            match tokio::time::timeout(self.timeout, callback(value.clone())).await {
                Ok(Ok(Some(next))) => value = next,
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        hook = %hook,
                        extension = %owner,
                        callback = %id,
                        error = %e,
                        "Hook callback failed"
                    );
                    failures.push(HookFailure {
                        hook: hook.to_string(),
                        owner,
                        error: e.to_string(),
                        timed_out: false,
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        hook = %hook,
                        extension = %owner,
                        callback = %id,
                        timeout = ?self.timeout,
                        "Hook callback timed out"
                    );
                    failures.push(HookFailure {
                        hook: hook.to_string(),
                        owner,
                        error: format!("timed out after {:?}", self.timeout),
                        timed_out: true,
                    });
                }
            }
        }

        (value, failures)
    }

    /// Total registered callbacks across all hooks
    pub fn callback_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.hooks.values().map(Vec::len).sum()
    }

    /// Registered callback count per hook name
    pub fn counts_by_hook(&self) -> HashMap<String, usize> {
        let state = self.state.lock().unwrap();
        state
            .hooks
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len()))
            .collect()
    }

    /// Number of callbacks owned by an extension
    pub fn owner_callback_count(&self, owner: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .hooks
            .values()
            .flat_map(|entries| entries.iter())
            .filter(|e| e.owner == owner)
            .count()
    }
}

//! Namespaced persistent storage for extensions

use std::sync::Mutex;

use serde_json::{Map, Value};

/// Key-value storage scoped to a single extension.
///
/// The runtime hands each extension a store namespaced by the extension
/// name; one extension can never see another's keys. Every method is
/// infallible by contract: backend failures degrade to empty reads or
/// dropped writes with a logged warning, so storage problems cannot
/// crash extension code.
pub trait ExtensionStore: Send + Sync {
    /// Read a single value
    fn get(&self, key: &str) -> Option<Value>;

    /// Read the whole record
    fn get_all(&self) -> Map<String, Value>;

    /// Write a single value
    fn set(&self, key: &str, value: Value);

    /// Shallow-merge values into the record (incoming keys win)
    fn merge(&self, values: Map<String, Value>);

    /// Delete a key, returning whether it existed
    fn delete(&self, key: &str) -> bool;

    /// Remove the whole record
    fn clear(&self);

    /// All keys currently present
    fn keys(&self) -> Vec<String>;
}

/// In-memory [`ExtensionStore`] for tests and host-less extension code.
///
/// Extension authors can unit-test storage interactions without a
/// running host or a scratch directory.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtensionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn get_all(&self) -> Map<String, Value> {
        self.values.lock().unwrap().clone()
    }

    fn set(&self, key: &str, value: Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }

    fn merge(&self, values: Map<String, Value>) {
        let mut guard = self.values.lock().unwrap();
        for (key, value) in values {
            guard.insert(key, value);
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.values.lock().unwrap().remove(key).is_some()
    }

    fn clear(&self) {
        self.values.lock().unwrap().clear();
    }

    fn keys(&self) -> Vec<String> {
        self.values.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_trait_is_object_safe() {
        fn _takes_boxed_store(_: Box<dyn ExtensionStore>) {}
    }

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("count"), None);

        store.set("count", json!(3));
        assert_eq!(store.get("count"), Some(json!(3)));
    }

    #[test]
    fn test_memory_store_merge_overwrites() {
        let store = MemoryStore::new();
        store.set("a", json!(1));
        store.set("b", json!(2));

        let mut incoming = Map::new();
        incoming.insert("b".into(), json!(20));
        incoming.insert("c".into(), json!(30));
        store.merge(incoming);

        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(store.get("b"), Some(json!(20)));
        assert_eq!(store.get("c"), Some(json!(30)));
    }

    #[test]
    fn test_memory_store_delete() {
        let store = MemoryStore::new();
        store.set("key", json!("value"));

        assert!(store.delete("key"));
        assert!(!store.delete("key"));
        assert_eq!(store.get("key"), None);
    }

    #[test]
    fn test_memory_store_clear() {
        let store = MemoryStore::new();
        store.set("a", json!(1));
        store.set("b", json!(2));

        store.clear();
        assert!(store.get_all().is_empty());
        assert!(store.keys().is_empty());
    }
}

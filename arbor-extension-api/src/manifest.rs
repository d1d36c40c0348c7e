//! Extension manifest - metadata describing an extension

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default load priority for extensions that do not declare one.
pub const DEFAULT_PRIORITY: i64 = 10;

/// Extension manifest containing metadata about the extension.
///
/// Manifests come from two places: the descriptor an extension registers
/// with, and optional manifest files on disk (TOML or JSON) that operators
/// can edit. All fields except `name` and `version` are optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionManifest {
    /// Extension name (unique identifier within a host)
    pub name: String,
    /// Extension version (strict semver)
    pub version: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Extension author
    pub author: Option<String>,
    /// Free-form category tag, e.g. "ui" or "service"
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Load-order hint: higher priority loads earlier among
    /// extensions with no dependency relationship
    pub priority: i64,
    /// Names of extensions that must be loaded before this one
    pub dependencies: Vec<String>,
    /// Names of extensions this one cooperates with if present.
    /// Never affect load order or loadability.
    pub peer_dependencies: Vec<String>,
    /// Hook names this extension intends to register callbacks for
    pub hooks: Vec<String>,
    /// Declared permissions (recorded, not enforced)
    pub permissions: Vec<String>,
    /// Default configuration values, overridable at load time
    pub default_config: Map<String, Value>,
    /// Advisory config shape: `{ "key": "string" | "number" | "boolean"
    /// | "array" | "object" }`. Mismatches warn, never block.
    pub config_schema: Option<Value>,
}

impl ExtensionManifest {
    /// Create a manifest with just a name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }
}

impl Default for ExtensionManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.1.0".to_string(),
            description: None,
            author: None,
            kind: None,
            priority: DEFAULT_PRIORITY,
            dependencies: Vec::new(),
            peer_dependencies: Vec::new(),
            hooks: Vec::new(),
            permissions: Vec::new(),
            default_config: Map::new(),
            config_schema: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults() {
        let manifest = ExtensionManifest::default();
        assert!(manifest.name.is_empty());
        assert_eq!(manifest.version, "0.1.0");
        assert_eq!(manifest.priority, DEFAULT_PRIORITY);
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.config_schema.is_none());
    }

    #[test]
    fn test_manifest_new() {
        let manifest = ExtensionManifest::new("analytics", "1.2.3");
        assert_eq!(manifest.name, "analytics");
        assert_eq!(manifest.version, "1.2.3");
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let manifest = ExtensionManifest {
            name: "ui-pack".into(),
            kind: Some("ui".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"type\":\"ui\""));
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let manifest: ExtensionManifest =
            serde_json::from_str(r#"{"name": "minimal", "version": "0.2.0"}"#).unwrap();
        assert_eq!(manifest.name, "minimal");
        assert_eq!(manifest.version, "0.2.0");
        assert_eq!(manifest.priority, DEFAULT_PRIORITY);
        assert!(manifest.hooks.is_empty());
    }

    #[test]
    fn test_deserialize_full() {
        let manifest: ExtensionManifest = serde_json::from_str(
            r#"{
                "name": "feature",
                "version": "1.0.0",
                "type": "service",
                "priority": 20,
                "dependencies": ["base"],
                "peer_dependencies": ["theme"],
                "hooks": ["request:start"],
                "permissions": ["storage"],
                "default_config": {"enabled": true},
                "config_schema": {"enabled": "boolean"}
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.kind.as_deref(), Some("service"));
        assert_eq!(manifest.priority, 20);
        assert_eq!(manifest.dependencies, vec!["base"]);
        assert_eq!(manifest.peer_dependencies, vec!["theme"]);
        assert_eq!(
            manifest.default_config.get("enabled"),
            Some(&serde_json::Value::Bool(true))
        );
    }
}

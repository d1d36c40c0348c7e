//! Error types for the arbor runtime

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use arbor_extension_api::ExtensionError;

/// Hard manifest validation failures.
///
/// Validation also produces warnings (missing metadata, unknown hooks,
/// schema mismatches); those are returned alongside success and never
/// abort a load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Manifest has no name
    #[error("Extension name is empty")]
    EmptyName,

    /// Version is not valid semver
    #[error("Invalid version '{version}' for extension '{name}': {reason}")]
    InvalidVersion {
        name: String,
        version: String,
        reason: String,
    },

    /// No registered descriptor supplies an entry point
    #[error("Extension '{name}' has no entry point; register a descriptor for it")]
    MissingEntry { name: String },

    /// Manifest file could not be parsed
    #[error("Malformed manifest at {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Storage backend failures.
///
/// Never surfaced to extensions: the scoped store logs these and
/// degrades to empty reads or dropped writes.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Filesystem error reading or writing a record
    #[error("Storage IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record exists but is not valid JSON
    #[error("Corrupt storage record at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors returned by host lifecycle operations
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Manifest validation failed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A declared dependency is not loaded
    #[error("Extension '{name}' requires '{dependency}' which is not loaded")]
    MissingDependency { name: String, dependency: String },

    /// A lifecycle call exceeded its timeout
    #[error("Extension '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The extension's own code returned an error
    #[error("Extension '{name}' failed: {source}")]
    Entry {
        name: String,
        #[source]
        source: ExtensionError,
    },

    /// Load rejected: the name is already resident
    #[error("Extension '{name}' is already loaded")]
    AlreadyLoaded { name: String },

    /// Another lifecycle operation holds this name
    #[error("Extension '{name}' has an operation in progress")]
    Busy { name: String },

    /// The name is not resident
    #[error("Extension '{name}' is not loaded")]
    NotFound { name: String },

    /// No descriptor and no manifest file for this name
    #[error("Extension '{name}' is not registered and no manifest was found on disk")]
    Unknown { name: String },

    /// A descriptor with this name already exists in the catalog
    #[error("Descriptor '{name}' is already registered")]
    DuplicateDescriptor { name: String },

    /// Command name collides with another extension's registration
    #[error("Command '{command}' already registered by '{existing}' (wanted by '{requested}')")]
    CommandConflict {
        command: String,
        existing: String,
        requested: String,
    },

    /// Route collides with another extension's registration
    #[error("Route '{route}' already registered by '{existing}' (wanted by '{requested}')")]
    RouteConflict {
        route: String,
        existing: String,
        requested: String,
    },

    /// Storage backend failure during backup or restore
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidVersion {
            name: "broken".into(),
            version: "not-semver".into(),
            reason: "unexpected character".into(),
        };
        assert!(err.to_string().contains("not-semver"));
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_missing_dependency_display() {
        let err = RuntimeError::MissingDependency {
            name: "feature".into(),
            dependency: "base".into(),
        };
        assert_eq!(
            err.to_string(),
            "Extension 'feature' requires 'base' which is not loaded"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = RuntimeError::Timeout {
            name: "slow".into(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("slow"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_validation_error_converts() {
        let err: RuntimeError = ValidationError::EmptyName.into();
        assert!(matches!(err, RuntimeError::Validation(_)));
    }

    #[test]
    fn test_entry_error_preserves_source() {
        let err = RuntimeError::Entry {
            name: "broken".into(),
            source: ExtensionError::custom("init failed"),
        };
        assert!(err.to_string().contains("broken"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_conflict_display() {
        let err = RuntimeError::RouteConflict {
            route: "GET /stats".into(),
            existing: "analytics".into(),
            requested: "metrics".into(),
        };
        assert!(err.to_string().contains("GET /stats"));
        assert!(err.to_string().contains("analytics"));
        assert!(err.to_string().contains("metrics"));
    }
}

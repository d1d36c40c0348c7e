//! Extension descriptors - static registration entries

use std::sync::Arc;

use crate::Extension;
use crate::manifest::ExtensionManifest;

/// Factory producing a fresh extension instance.
///
/// Called once per load; reload gets a brand-new instance.
pub type ExtensionFactory = Arc<dyn Fn() -> Box<dyn Extension> + Send + Sync>;

/// A registerable extension: manifest plus entry point.
///
/// Extensions are compiled into the host binary and registered with the
/// runtime through descriptors; there is no dynamic library loading.
/// Manifest files on disk can still override descriptor metadata, but
/// the entry point always comes from here.
#[derive(Clone)]
pub struct ExtensionDescriptor {
    /// Metadata for validation and dependency resolution
    pub manifest: ExtensionManifest,
    /// Factory invoked at load time
    pub entry: ExtensionFactory,
}

impl ExtensionDescriptor {
    /// Create a descriptor from a manifest and a constructor function
    pub fn new<E, F>(manifest: ExtensionManifest, entry: F) -> Self
    where
        E: Extension + 'static,
        F: Fn() -> E + Send + Sync + 'static,
    {
        Self {
            manifest,
            entry: Arc::new(move || Box::new(entry())),
        }
    }

    /// The extension's name
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Build a fresh instance
    pub fn instantiate(&self) -> Box<dyn Extension> {
        (self.entry)()
    }
}

impl std::fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

//! Descriptor catalog - compiled-in extension registrations
//!
//! Extensions are compiled into the host and announced through
//! [`ExtensionDescriptor`]s. The catalog is the authoritative source of
//! entry points; disk manifests discovered later can override metadata
//! but never supply code.

use std::collections::HashMap;

use arbor_extension_api::ExtensionDescriptor;

use crate::error::RuntimeError;

/// Insertion-ordered set of descriptors, unique by extension name
#[derive(Default)]
pub struct DescriptorCatalog {
    descriptors: Vec<ExtensionDescriptor>,
    index: HashMap<String, usize>,
}

impl DescriptorCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Names are unique; registering a second
    /// descriptor under an existing name is rejected.
    pub fn register(&mut self, descriptor: ExtensionDescriptor) -> Result<(), RuntimeError> {
        let name = descriptor.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RuntimeError::DuplicateDescriptor { name });
        }
        self.index.insert(name, self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Look up a descriptor by name
    pub fn get(&self, name: &str) -> Option<&ExtensionDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Whether a descriptor with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionDescriptor> {
        self.descriptors.iter()
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

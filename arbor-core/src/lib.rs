//! arbor-core: the arbor extension runtime
//!
//! This crate provides the host side of the arbor extension system:
//!
//! - **Lifecycle** - [`ExtensionHost`] loads, unloads, reloads, and toggles extensions
//! - **Discovery** - [`discover()`](discover::discover) scans a directory for manifest files
//! - **Resolution** - [`resolve_load_order`] orders candidates by dependencies and priority
//! - **Hooks** - [`HookBus`] runs prioritized callback pipelines over JSON payloads
//! - **Extension points** - [`ExtensionPointRegistry`] tracks routes, commands, and middleware
//! - **Storage** - [`StorageProvider`] gives each extension a persistent key-value namespace
//! - **Hot reload** - [`ExtensionWatcher`] reloads loaded extensions when their files change
//!
//! Extensions themselves are written against the `arbor-extension-api`
//! crate and registered with the host as descriptors.
//!
//! # Quick Start
//!
//! ```no_run
//! use arbor_core::{ExtensionHost, HostConfig};
//!
//! # async fn example(descriptor: arbor_extension_api::ExtensionDescriptor)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let host = ExtensionHost::new(HostConfig::rooted_at("/var/lib/myapp"));
//! host.register(descriptor)?;
//!
//! // Load everything registered or discovered on disk, dependency-ordered
//! let report = host.load_all().await;
//! for name in &report.loaded {
//!     println!("loaded {name}");
//! }
//!
//! // Run a hook pipeline over a payload
//! let value = host
//!     .run_hook("request:start", serde_json::json!({"path": "/"}))
//!     .await;
//! println!("pipeline produced {value}");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    ExtensionHost                    │
//! │  ┌───────────┐  ┌────────────────────┐  ┌────────┐  │
//! │  │  HookBus  │  │ ExtensionPoint     │  │Storage │  │
//! │  │           │  │ Registry           │  │Provider│  │
//! │  └───────────┘  └────────────────────┘  └────────┘  │
//! │  ┌───────────────────────┐  ┌────────────────────┐  │
//! │  │   DescriptorCatalog   │  │  manifest files    │  │
//! │  │   (compiled-in)       │  │  (discovered)      │  │
//! │  └───────────────────────┘  └────────────────────┘  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod discover;
pub mod error;
pub mod events;
pub mod hooks;
pub mod host;
pub mod points;
pub mod resolve;
pub mod storage;
pub mod validate;
pub mod watch;

// Re-export key types for convenience
pub use catalog::DescriptorCatalog;
pub use config::{HostConfig, RetryConfig, default_root};
pub use discover::{
    DiscoveredExtension, Discovery, JsonManifestLoader, ManifestLoader, TomlManifestLoader,
    default_loaders,
};
pub use error::{RuntimeError, StorageError, ValidationError};
pub use events::RuntimeEvent;
pub use hooks::{HookBus, HookFailure};
pub use host::{
    BackupDocument, BackupEntry, ExtensionHost, FailureRecord, HealthReport, HealthStatus,
    HostBuilder, HostStats, LoadReport, RestoreReport,
};
pub use points::{CommandSink, ExtensionPointRegistry, ServingLayer};
pub use resolve::{Resolution, resolve_load_order};
pub use storage::{ScopedStore, StorageProvider};
pub use validate::validate_manifest;
pub use watch::ExtensionWatcher;

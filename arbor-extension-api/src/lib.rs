//! arbor-extension-api - Extension API for the arbor runtime
//!
//! This crate provides the traits and types needed to write extensions for
//! an arbor host. Extensions are compiled into the host binary, registered
//! through descriptors, and contribute behavior through hooks, routes,
//! commands, and middleware.
//!
//! # Example
//!
//! ```
//! use arbor_extension_api::{
//!     Extension, ExtensionContext, ExtensionDescriptor, ExtensionError,
//!     ExtensionManifest, hook_fn,
//! };
//! use async_trait::async_trait;
//!
//! #[derive(Default)]
//! pub struct MyExtension;
//!
//! #[async_trait]
//! impl Extension for MyExtension {
//!     fn manifest(&self) -> ExtensionManifest {
//!         ExtensionManifest {
//!             name: "my-extension".to_string(),
//!             version: "0.1.0".to_string(),
//!             description: Some("My custom extension".to_string()),
//!             ..Default::default()
//!         }
//!     }
//!
//!     async fn load(&mut self, ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
//!         ctx.hook("request:start", hook_fn(|payload| async move { Ok(Some(payload)) }));
//!         ctx.log_info("Extension loaded!");
//!         Ok(())
//!     }
//! }
//!
//! pub fn descriptor() -> ExtensionDescriptor {
//!     ExtensionDescriptor::new(MyExtension.manifest(), MyExtension::default)
//! }
//! ```

pub mod command;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod hook;
pub mod host;
pub mod http;
pub mod manifest;
pub mod storage;

pub use command::{
    ArgSpec, CommandArgs, CommandHandler, CommandOutput, CommandRegistration, CommandSpec,
    command_fn,
};
pub use context::{ExtensionContext, PendingRegistrations};
pub use descriptor::{ExtensionDescriptor, ExtensionFactory};
pub use error::ExtensionError;
pub use hook::{
    DEFAULT_HOOK_PRIORITY, HookCallback, HookId, HookRegistration, HookResult, hook_fn,
};
pub use host::{ExtensionInfo, ExtensionState, HostServices, NullHost};
pub use http::{
    HttpMethod, Middleware, MiddlewareAction, RouteHandler, RouteRegistration, RouteRequest,
    RouteResponse, RouteSpec, middleware_fn, route_fn,
};
pub use manifest::{DEFAULT_PRIORITY, ExtensionManifest};
pub use storage::{ExtensionStore, MemoryStore};

use async_trait::async_trait;

/// The core extension trait - implement this to create an arbor extension.
///
/// Only `manifest` and `load` are required; the other lifecycle methods
/// have default no-op implementations, so extensions only override the
/// ones they care about.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Return extension metadata
    fn manifest(&self) -> ExtensionManifest;

    /// Called when the extension is loaded. Register hooks, routes,
    /// commands, and middleware here.
    async fn load(&mut self, ctx: &mut ExtensionContext) -> Result<(), ExtensionError>;

    // ─── Optional Lifecycle Methods (default no-ops) ─────────────────

    /// Called when the extension is unloaded. Clean up external
    /// resources here; registrations are removed by the host.
    async fn unload(&mut self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Called when the extension is toggled from inactive to active
    async fn activate(&mut self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
        Ok(())
    }

    /// Called when the extension is toggled from active to inactive
    async fn deactivate(&mut self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_trait_is_object_safe() {
        // This compiles only if Extension is object-safe
        fn _takes_boxed_extension(_: Box<dyn Extension>) {}
    }

    #[tokio::test]
    async fn test_default_lifecycle_methods_are_no_ops() {
        struct Bare;

        #[async_trait]
        impl Extension for Bare {
            fn manifest(&self) -> ExtensionManifest {
                ExtensionManifest::new("bare", "0.1.0")
            }

            async fn load(&mut self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
                Ok(())
            }
        }

        let mut ext = Bare;
        let mut ctx = ExtensionContext::detached("bare");
        assert!(ext.unload(&mut ctx).await.is_ok());
        assert!(ext.activate(&mut ctx).await.is_ok());
        assert!(ext.deactivate(&mut ctx).await.is_ok());
    }
}

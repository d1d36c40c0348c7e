//! Extension point registry - middleware, routes, and commands
//!
//! Extensions contribute routes, commands, and middleware through their
//! context; the host commits them here after a successful load. Every
//! entry is tagged with its owner so unload can strip an extension's
//! contributions in one call. Committed entries are forwarded to
//! optional host collaborators (a serving layer for routes/middleware,
//! a command sink for CLI commands); without collaborators the registry
//! records and serves lookups only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use arbor_extension_api::{
    CommandHandler, CommandRegistration, CommandSpec, HttpMethod, Middleware, RouteHandler,
    RouteRegistration, RouteSpec,
};

/// Host collaborator receiving committed routes and middleware
#[async_trait]
pub trait ServingLayer: Send + Sync {
    /// A route was committed
    async fn route_added(&self, owner: &str, registration: RouteRegistration);

    /// Middleware was committed
    async fn middleware_added(&self, owner: &str, middleware: Middleware);

    /// An extension was unloaded; its routes are gone
    async fn owner_removed(&self, owner: &str, routes: Vec<RouteSpec>);
}

/// Host collaborator receiving committed CLI commands
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// A command was committed
    async fn command_added(&self, owner: &str, registration: CommandRegistration);

    /// An extension was unloaded; its commands are gone
    async fn owner_removed(&self, owner: &str, commands: Vec<String>);
}

struct OwnedRoute {
    owner: String,
    registration: RouteRegistration,
    matcher: PathMatcher,
}

struct OwnedCommand {
    owner: String,
    registration: CommandRegistration,
}

struct OwnedMiddleware {
    owner: String,
    middleware: Middleware,
}

/// Simple path matcher supporting :param patterns
struct PathMatcher {
    segments: Vec<PathSegment>,
}

enum PathSegment {
    Literal(String),
    Param(String),
}

impl PathMatcher {
    fn new(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    PathSegment::Param(name.to_string())
                } else {
                    PathSegment::Literal(s.to_string())
                }
            })
            .collect();

        Self { segments }
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if path_parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();

        for (segment, part) in self.segments.iter().zip(path_parts.iter()) {
            match segment {
                PathSegment::Literal(expected) => {
                    if expected != *part {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }

        Some(params)
    }
}

#[derive(Default)]
struct PointState {
    middleware: Vec<OwnedMiddleware>,
    routes: Vec<OwnedRoute>,
    commands: Vec<OwnedCommand>,
}

/// Owner-tagged registry of extension contributions
pub struct ExtensionPointRegistry {
    state: Mutex<PointState>,
    serving: Option<Arc<dyn ServingLayer>>,
    command_sink: Option<Arc<dyn CommandSink>>,
}

impl ExtensionPointRegistry {
    /// Create a registry with optional collaborators
    pub fn new(
        serving: Option<Arc<dyn ServingLayer>>,
        command_sink: Option<Arc<dyn CommandSink>>,
    ) -> Self {
        Self {
            state: Mutex::new(PointState::default()),
            serving,
            command_sink,
        }
    }

    /// Check whether a route would collide with another owner's.
    ///
    /// Routes share one global path space; the name of the owning
    /// extension comes back on conflict. Re-registration by the same
    /// owner also conflicts.
    pub fn check_route_conflict(&self, spec: &RouteSpec) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .routes
            .iter()
            .find(|r| r.registration.spec == *spec)
            .map(|r| r.owner.clone())
    }

    /// Check whether a command name is already taken
    pub fn check_command_conflict(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .commands
            .iter()
            .find(|c| c.registration.spec.name == name)
            .map(|c| c.owner.clone())
    }

    /// Commit an extension's contributions and forward them to the
    /// collaborators. Conflicts must have been checked beforehand.
    pub async fn commit(
        &self,
        owner: &str,
        middleware: Vec<Middleware>,
        routes: Vec<RouteRegistration>,
        commands: Vec<CommandRegistration>,
    ) {
        {
            let mut state = self.state.lock().unwrap();
            for mw in &middleware {
                state.middleware.push(OwnedMiddleware {
                    owner: owner.to_string(),
                    middleware: Arc::clone(mw),
                });
            }
            for registration in &routes {
                state.routes.push(OwnedRoute {
                    owner: owner.to_string(),
                    matcher: PathMatcher::new(&registration.spec.path),
                    registration: registration.clone(),
                });
            }
            for registration in &commands {
                state.commands.push(OwnedCommand {
                    owner: owner.to_string(),
                    registration: registration.clone(),
                });
            }
        }

        if let Some(serving) = &self.serving {
            for mw in middleware {
                serving.middleware_added(owner, mw).await;
            }
            for registration in routes {
                serving.route_added(owner, registration).await;
            }
        }
        if let Some(sink) = &self.command_sink {
            for registration in commands {
                sink.command_added(owner, registration).await;
            }
        }
    }

    /// Remove everything an extension registered, notifying the
    /// collaborators. Returns `(middleware, routes, commands)` counts.
    pub async fn remove_owner(&self, owner: &str) -> (usize, usize, usize) {
        let (removed_routes, removed_commands, removed_middleware) = {
            let mut state = self.state.lock().unwrap();

            let mut routes = Vec::new();
            state.routes.retain(|r| {
                if r.owner == owner {
                    routes.push(r.registration.spec.clone());
                    false
                } else {
                    true
                }
            });

            let mut commands = Vec::new();
            state.commands.retain(|c| {
                if c.owner == owner {
                    commands.push(c.registration.spec.name.clone());
                    false
                } else {
                    true
                }
            });

            let before = state.middleware.len();
            state.middleware.retain(|m| m.owner != owner);
            (routes, commands, before - state.middleware.len())
        };

        if let Some(serving) = &self.serving
            && !removed_routes.is_empty()
        {
            serving.owner_removed(owner, removed_routes.clone()).await;
        }
        if let Some(sink) = &self.command_sink
            && !removed_commands.is_empty()
        {
            sink.owner_removed(owner, removed_commands.clone()).await;
        }

        (
            removed_middleware,
            removed_routes.len(),
            removed_commands.len(),
        )
    }

    /// Find a route matching a concrete path, extracting :param values
    pub fn find_route(
        &self,
        method: HttpMethod,
        path: &str,
    ) -> Option<(RouteHandler, HashMap<String, String>)> {
        let state = self.state.lock().unwrap();
        for route in &state.routes {
            if route.registration.spec.method == method
                && let Some(params) = route.matcher.match_path(path)
            {
                return Some((Arc::clone(&route.registration.handler), params));
            }
        }
        None
    }

    /// Look up a command handler by name
    pub fn find_command(&self, name: &str) -> Option<CommandHandler> {
        let state = self.state.lock().unwrap();
        state
            .commands
            .iter()
            .find(|c| c.registration.spec.name == name)
            .map(|c| Arc::clone(&c.registration.handler))
    }

    /// Snapshot of the middleware chain, in commit order
    pub fn middleware_chain(&self) -> Vec<Middleware> {
        let state = self.state.lock().unwrap();
        state
            .middleware
            .iter()
            .map(|m| Arc::clone(&m.middleware))
            .collect()
    }

    /// All registered routes as `(owner, spec)` pairs
    pub fn routes(&self) -> Vec<(String, RouteSpec)> {
        let state = self.state.lock().unwrap();
        state
            .routes
            .iter()
            .map(|r| (r.owner.clone(), r.registration.spec.clone()))
            .collect()
    }

    /// All registered commands as `(owner, spec)` pairs
    pub fn commands(&self) -> Vec<(String, CommandSpec)> {
        let state = self.state.lock().unwrap();
        state
            .commands
            .iter()
            .map(|c| (c.owner.clone(), c.registration.spec.clone()))
            .collect()
    }

    /// Count of registered middleware
    pub fn middleware_count(&self) -> usize {
        self.state.lock().unwrap().middleware.len()
    }
}

impl Default for ExtensionPointRegistry {
    fn default() -> Self {
        Self::new(None, None)
    }
}

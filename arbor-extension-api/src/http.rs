//! HTTP types for extension route and middleware registration

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ExtensionError;

/// HTTP method for route registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Uppercase wire name, e.g. `GET`
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

/// Specification for an HTTP route
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteSpec {
    /// HTTP method
    pub method: HttpMethod,
    /// Path pattern, e.g. "/stats" or "/events/:id"
    pub path: String,
}

impl std::fmt::Display for RouteSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method.as_str(), self.path)
    }
}

/// Incoming HTTP request passed to extension handlers
#[derive(Debug, Default)]
pub struct RouteRequest {
    /// Path parameters extracted from the route pattern (e.g. ":id" -> "123")
    pub params: HashMap<String, String>,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request body as bytes
    pub body: Vec<u8>,
    /// Request headers
    pub headers: HashMap<String, String>,
}

/// HTTP response from an extension handler
#[derive(Debug)]
pub struct RouteResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
    /// Content-Type header
    pub content_type: String,
}

impl RouteResponse {
    /// Create a JSON response
    pub fn json<T: Serialize>(status: u16, data: &T) -> Result<Self, ExtensionError> {
        Ok(Self {
            status,
            body: serde_json::to_vec(data).map_err(|e| ExtensionError::Json(e.to_string()))?,
            content_type: "application/json".to_string(),
        })
    }

    /// Create a plain text response
    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            body: text.into().into_bytes(),
            content_type: "text/plain".to_string(),
        }
    }

    /// Create an empty response with status code
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: vec![],
            content_type: "application/json".to_string(),
        }
    }
}

/// Boxed future returned by route handlers
pub type RouteFuture = Pin<Box<dyn Future<Output = Result<RouteResponse, ExtensionError>> + Send>>;

/// Async handler invoked when a registered route matches
pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> RouteFuture + Send + Sync>;

/// Wrap an async closure as a [`RouteHandler`]
pub fn route_fn<F, Fut>(f: F) -> RouteHandler
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RouteResponse, ExtensionError>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// A route spec together with its handler
#[derive(Clone)]
pub struct RouteRegistration {
    /// Method and path pattern
    pub spec: RouteSpec,
    /// Handler invoked on match
    pub handler: RouteHandler,
}

impl std::fmt::Debug for RouteRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistration")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Outcome of a middleware invocation
#[derive(Debug)]
pub enum MiddlewareAction {
    /// Pass the (possibly modified) request to the next stage
    Continue(RouteRequest),
    /// Short-circuit with a response
    Respond(RouteResponse),
}

/// Boxed future returned by middleware
pub type MiddlewareFuture = Pin<Box<dyn Future<Output = MiddlewareAction> + Send>>;

/// Async middleware applied before route handlers
pub type Middleware = Arc<dyn Fn(RouteRequest) -> MiddlewareFuture + Send + Sync>;

/// Wrap an async closure as [`Middleware`]
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareAction> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_as_str() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }

    #[test]
    fn test_route_spec_display() {
        let spec = RouteSpec {
            method: HttpMethod::Post,
            path: "/events".into(),
        };
        assert_eq!(spec.to_string(), "POST /events");
    }

    #[test]
    fn test_route_request_params() {
        let request = RouteRequest {
            params: [("id".into(), "123".into())].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(request.params.get("id"), Some(&"123".to_string()));
    }

    #[test]
    fn test_route_response_json() {
        #[derive(Serialize)]
        struct Data {
            value: i32,
        }

        let resp = RouteResponse::json(200, &Data { value: 42 }).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "application/json");
        assert!(String::from_utf8_lossy(&resp.body).contains("42"));
    }

    #[tokio::test]
    async fn test_route_fn_invokes_handler() {
        let handler = route_fn(|_req| async move { Ok(RouteResponse::text(200, "ok")) });
        let resp = handler(RouteRequest::default()).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"ok");
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let mw = middleware_fn(|req: RouteRequest| async move {
            if req.headers.contains_key("authorization") {
                MiddlewareAction::Continue(req)
            } else {
                MiddlewareAction::Respond(RouteResponse::empty(401))
            }
        });

        match mw(RouteRequest::default()).await {
            MiddlewareAction::Respond(resp) => assert_eq!(resp.status, 401),
            MiddlewareAction::Continue(_) => panic!("expected short-circuit"),
        }
    }
}

pub mod health;
pub mod whoami;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::Method,
    response::{IntoResponse, Response},
};

use crate::error::{ApiError, GatewayError};
use crate::pipeline::RequestContext;

pub use health::health;
pub use whoami::WhoAmI;

/// A route handler. Only ever called with an authenticated context.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, context: RequestContext, request: Request) -> Result<Response, GatewayError>;
}

struct Route {
    method: Method,
    path: String,
    handler: Arc<dyn Handler>,
}

/// Exact `(method, path)` routing for the authenticated API.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn route(mut self, method: Method, path: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.routes.push(Route {
            method,
            path: path.into(),
            handler,
        });
        self
    }
}

#[async_trait]
impl Handler for RouteTable {
    async fn handle(&self, context: RequestContext, request: Request) -> Result<Response, GatewayError> {
        let path = request.uri().path().trim_end_matches('/').to_string();
        let mut path_known = false;

        for route in &self.routes {
            if route.path.trim_end_matches('/') != path {
                continue;
            }
            path_known = true;
            if route.method == *request.method() {
                return route.handler.handle(context, request).await;
            }
        }

        if path_known {
            Ok(ApiError::MethodNotAllowed.into_response())
        } else {
            Ok(ApiError::NotFound.into_response())
        }
    }
}

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use edge_gateway::{
    auth::HttpIdentityBackend,
    backend::ClientRole,
    error::GatewayError,
    handlers::Handler,
    pipeline::RequestContext,
    server,
};
use serde_json::Value;

use common::{config, request, send, spawn_identity, USER_ID, VALID_TOKEN};

/// Captures the context each call received.
#[derive(Default)]
struct Inspect {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, ClientRole, String)>>,
}

#[async_trait]
impl Handler for Inspect {
    async fn handle(&self, context: RequestContext, _request: Request) -> Result<Response, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let client = context.client;
        self.seen.lock().unwrap().push((
            context.principal.id,
            client.role(),
            client.base_url().to_string(),
        ));
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn handle(&self, _context: RequestContext, _request: Request) -> Result<Response, GatewayError> {
        Err(GatewayError::internal("relation \"app.todos\" does not exist"))
    }
}

struct Panicking;

#[async_trait]
impl Handler for Panicking {
    async fn handle(&self, _context: RequestContext, _request: Request) -> Result<Response, GatewayError> {
        panic!("handler bug");
    }
}

fn identity(backend: &str) -> Arc<HttpIdentityBackend> {
    let config = config(backend, &[]);
    Arc::new(HttpIdentityBackend::new(reqwest::Client::new(), &config.backend))
}

#[tokio::test]
async fn handler_gets_context_scoped_to_caller() -> Result<()> {
    let (backend, _) = spawn_identity().await?;
    let handler = Arc::new(Inspect::default());
    let app = server::build_with(&config(&backend, &[]), identity(&backend), handler.clone())?;

    let reply = send(app, request("POST", "/api/anything", None, Some(VALID_TOKEN))).await?;

    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.has_cors_headers());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    let seen = handler.seen.lock().unwrap();
    assert_eq!(seen[0].0, USER_ID);
    assert_eq!(seen[0].1, ClientRole::User);
    assert!(seen[0].2.starts_with(&backend));
    Ok(())
}

#[tokio::test]
async fn handler_never_runs_for_unauthenticated_requests() -> Result<()> {
    let (backend, _) = spawn_identity().await?;
    let handler = Arc::new(Inspect::default());
    let config = config(&backend, &[]);

    for token in [None, Some("forged"), Some("broken"), Some("no-user")] {
        let app = server::build_with(&config, identity(&backend), handler.clone())?;
        let reply = send(app, request("POST", "/api/anything", None, token)).await?;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "token {token:?}");
    }

    let app = server::build_with(&config, identity(&backend), handler.clone())?;
    let reply = send(app, request("OPTIONS", "/api/anything", None, None)).await?;
    assert_eq!(reply.status, StatusCode::OK);

    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn handler_error_is_a_generic_500() -> Result<()> {
    let (backend, _) = spawn_identity().await?;
    let app = server::build_with(&config(&backend, &[]), identity(&backend), Arc::new(Failing))?;

    let reply = send(app, request("POST", "/api/todos", None, Some(VALID_TOKEN))).await?;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "Internal Server Error");
    assert!(!reply.body.contains("relation"));
    assert!(reply.has_cors_headers());
    Ok(())
}

#[tokio::test]
async fn handler_panic_is_a_generic_500() -> Result<()> {
    let (backend, _) = spawn_identity().await?;
    let app = server::build_with(&config(&backend, &[]), identity(&backend), Arc::new(Panicking))?;

    let reply = send(app, request("POST", "/api/todos", None, Some(VALID_TOKEN))).await?;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, "Internal Server Error");
    Ok(())
}

#[tokio::test]
async fn health_is_public() -> Result<()> {
    let (backend, _) = spawn_identity().await?;
    let app = server::build(&config(&backend, &[]))?;

    let reply = send(app, request("GET", "/health", None, None)).await?;

    assert_eq!(reply.status, StatusCode::OK);
    let body: Value = serde_json::from_str(&reply.body)?;
    assert_eq!(body["status"], "ok");
    assert!(reply.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    Ok(())
}

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    response::Response,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{HttpIdentityBackend, IdentityBackend};
use crate::backend::ClientFactory;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::handlers::{self, Handler, RouteTable, WhoAmI};
use crate::pipeline::Pipeline;

/// Routes served behind the authenticated pipeline.
pub fn routes() -> RouteTable {
    RouteTable::new()
        .route(Method::POST, "/api/whoami", Arc::new(WhoAmI))
        .route(Method::GET, "/api/whoami", Arc::new(WhoAmI))
}

/// Assemble the gateway from configuration, talking to the real identity backend.
pub fn build(config: &AppConfig) -> Result<Router, GatewayError> {
    let http = http_client(config)?;
    let identity: Arc<dyn IdentityBackend> =
        Arc::new(HttpIdentityBackend::new(http.clone(), &config.backend));

    Ok(assemble(config, http, identity, Arc::new(routes())))
}

/// Variant of [`build`] with a caller-supplied identity backend and handler.
pub fn build_with(
    config: &AppConfig,
    identity: Arc<dyn IdentityBackend>,
    handler: Arc<dyn Handler>,
) -> Result<Router, GatewayError> {
    let http = http_client(config)?;
    Ok(assemble(config, http, identity, handler))
}

// One connection pool for identity checks and scoped clients. The overall
// verification deadline is enforced by the auth gate.
fn http_client(config: &AppConfig) -> Result<reqwest::Client, GatewayError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(config.auth.timeout)
        .build()?)
}

fn assemble(
    config: &AppConfig,
    http: reqwest::Client,
    identity: Arc<dyn IdentityBackend>,
    handler: Arc<dyn Handler>,
) -> Router {
    let clients = ClientFactory::new(http, &config.backend);
    app(Pipeline::standard(config, identity, clients, handler))
}

/// Route every request through the pipeline, except `GET /health`.
pub fn app(pipeline: Pipeline) -> Router {
    tracing::info!("Gateway pipeline: {}", pipeline.stage_names().join(" -> "));

    Router::new()
        // Other methods on /health (preflight included) still go through the pipeline.
        .route("/health", get(handlers::health).fallback(dispatch))
        .fallback(dispatch)
        .with_state(Arc::new(pipeline))
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(pipeline): State<Arc<Pipeline>>, request: Request) -> Response {
    pipeline.dispatch(request).await
}

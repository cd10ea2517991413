// Request pipeline: an ordered list of guarded stages driven by one loop.

pub mod exchange;
pub mod guard;
pub mod stages;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use tracing::Instrument;

use crate::auth::{AuthGate, IdentityBackend};
use crate::backend::ClientFactory;
use crate::config::AppConfig;
use crate::cors::CorsPolicy;
use crate::error::GatewayError;
use crate::handlers::Handler;

pub use exchange::{Exchange, RequestContext};
pub use guard::{wrap, Guarded};
pub use stages::{AuthStage, CorsStage, HandlerStage};

/// Where a request is in its trip through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    CorsEvaluated,
    PreflightTerminated,
    OriginRejected,
    Authenticating,
    AuthRejected,
    Authenticated,
    Handled,
    Responded,
}

/// What a stage wants the dispatcher to do next.
pub enum Flow {
    Continue,
    Terminate(Response),
}

#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logging
    fn name(&self) -> &'static str;

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError>;
}

/// Ordered chain of guarded stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage. Every stage is registered behind the failure wrapper.
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        tracing::debug!("Registered pipeline stage '{}'", stage.name());
        self.stages.push(Box::new(wrap(stage)));
        self
    }

    /// The gateway chain: CORS, then authentication and context binding,
    /// then the route handler.
    pub fn standard(
        config: &AppConfig,
        identity: Arc<dyn IdentityBackend>,
        clients: ClientFactory,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self::new()
            .stage(CorsStage::new(CorsPolicy::from_config(&config.cors)))
            .stage(AuthStage::new(AuthGate::new(identity, config.auth.timeout), clients))
            .stage(HandlerStage::new(handler))
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one request through the chain and produce its single response.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut exchange = Exchange::new(request);
        let span = tracing::info_span!(
            "request",
            id = %exchange.request_id(),
            method = %exchange.method(),
            path = %exchange.uri().path(),
        );

        self.drive(&mut exchange).instrument(span).await;
        exchange.into_response()
    }

    pub(crate) async fn drive(&self, exchange: &mut Exchange) {
        for stage in &self.stages {
            let flow = match stage.run(exchange).await {
                Ok(flow) => flow,
                Err(error) => guard::contain(stage.name(), exchange, error),
            };

            if let Flow::Terminate(response) = flow {
                exchange.respond(response);
            }
            if exchange.has_responded() {
                break;
            }
        }

        if !exchange.has_responded() {
            tracing::error!("Pipeline finished without producing a response");
        }
        exchange.enter(Phase::Responded);
    }
}

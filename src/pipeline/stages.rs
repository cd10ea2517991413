use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};

use super::{Exchange, Flow, Phase, RequestContext, Stage};
use crate::auth::{gate::log_auth_failure, AuthGate};
use crate::backend::ClientFactory;
use crate::cors::{CorsPolicy, OriginVerdict};
use crate::error::{ApiError, GatewayError};
use crate::handlers::Handler;

/// Computes the CORS headers and answers preflight requests.
pub struct CorsStage {
    policy: CorsPolicy,
}

impl CorsStage {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let decision = self
            .policy
            .evaluate(exchange.method(), exchange.headers().get(header::ORIGIN));
        exchange.add_response_headers(decision.headers);
        exchange.enter(Phase::CorsEvaluated);

        if decision.preflight {
            exchange.enter(Phase::PreflightTerminated);
            return Ok(Flow::Terminate(StatusCode::OK.into_response()));
        }

        if decision.verdict == OriginVerdict::Denied && self.policy.enforces_origin() {
            tracing::warn!(
                origin = ?exchange.headers().get(header::ORIGIN),
                "Rejecting request from disallowed origin"
            );
            exchange.enter(Phase::OriginRejected);
            return Ok(Flow::Terminate(ApiError::Forbidden.into_response()));
        }

        Ok(Flow::Continue)
    }
}

/// Authenticates the caller and binds the request context.
pub struct AuthStage {
    gate: AuthGate,
    clients: ClientFactory,
}

impl AuthStage {
    pub fn new(gate: AuthGate, clients: ClientFactory) -> Self {
        Self { gate, clients }
    }
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        exchange.enter(Phase::Authenticating);

        // Request bodies are not Sync; keep no borrow of the exchange across the await.
        let headers = exchange.headers().clone();
        match self.gate.authenticate(&headers).await {
            Ok((credential, principal)) => {
                let context =
                    RequestContext::bind(exchange.request_id(), principal, &credential, &self.clients);
                exchange.bind(context);
                exchange.enter(Phase::Authenticated);
                Ok(Flow::Continue)
            }
            Err(error) => {
                log_auth_failure(&error);
                exchange.enter(Phase::AuthRejected);
                Ok(Flow::Terminate(ApiError::Unauthorized.into_response()))
            }
        }
    }
}

/// Hands the authenticated request to the route handler.
pub struct HandlerStage {
    handler: Arc<dyn Handler>,
}

impl HandlerStage {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Stage for HandlerStage {
    fn name(&self) -> &'static str {
        "handler"
    }

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let context = exchange.take_context().ok_or(GatewayError::MissingContext)?;
        let request = exchange.take_request()?;

        let response = self.handler.handle(context, request).await?;
        exchange.enter(Phase::Handled);
        Ok(Flow::Terminate(response))
    }
}

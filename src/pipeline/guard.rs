use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use axum::response::IntoResponse;
use futures::FutureExt;

use super::{Exchange, Flow, Stage};
use crate::error::{ApiError, GatewayError};

/// Failure wrapper around a pipeline stage.
///
/// Errors and panics escaping the inner stage are logged and turned into a
/// generic 500, unless the exchange already holds a response, in which case
/// they are only logged. A guarded stage never returns `Err`.
pub struct Guarded<S> {
    inner: S,
}

impl<S: Stage> Guarded<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

pub fn wrap<S: Stage>(stage: S) -> Guarded<S> {
    Guarded::new(stage)
}

#[async_trait]
impl<S: Stage> Stage for Guarded<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, GatewayError> {
        let outcome = AssertUnwindSafe(self.inner.run(exchange)).catch_unwind().await;

        let error = match outcome {
            Ok(Ok(flow)) => return Ok(flow),
            Ok(Err(error)) => error,
            Err(payload) => GatewayError::Panic(panic_message(payload)),
        };

        Ok(contain(self.name(), exchange, error))
    }
}

/// Log a stage failure and decide the flow that replaces it.
pub(crate) fn contain(stage: &'static str, exchange: &Exchange, error: GatewayError) -> Flow {
    tracing::error!(
        stage,
        request_id = %exchange.request_id(),
        phase = ?exchange.phase(),
        "Pipeline stage failed: {}",
        error
    );

    if exchange.has_responded() {
        // The response is already out; nothing left to send.
        return Flow::Continue;
    }
    Flow::Terminate(ApiError::InternalServerError.into_response())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// handlers/whoami.rs - POST /api/whoami handler

use async_trait::async_trait;
use axum::{
    extract::Request,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use super::Handler;
use crate::error::GatewayError;
use crate::pipeline::RequestContext;

/// Echoes the authenticated principal back to the caller.
pub struct WhoAmI;

#[async_trait]
impl Handler for WhoAmI {
    async fn handle(&self, context: RequestContext, _request: Request) -> Result<Response, GatewayError> {
        let principal = &context.principal;
        Ok(Json(json!({
            "request_id": context.request_id,
            "user": {
                "id": principal.id,
                "aud": principal.aud,
                "role": principal.role,
                "email": principal.email,
                "phone": principal.phone,
            }
        }))
        .into_response())
    }
}

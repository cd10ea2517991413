use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use super::Phase;
use crate::auth::{Credential, Principal};
use crate::backend::{BackendClient, ClientFactory};
use crate::error::{ApiError, GatewayError};

/// Authenticated state handed to the route handler.
///
/// Built once per request after the auth gate succeeds and never shared
/// with any other request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub principal: Principal,
    /// Backend client scoped to the caller's own credential.
    pub client: BackendClient,
}

impl RequestContext {
    pub fn bind(
        request_id: Uuid,
        principal: Principal,
        credential: &Credential,
        clients: &ClientFactory,
    ) -> Self {
        Self {
            request_id,
            principal,
            client: clients.scoped(credential),
        }
    }
}

/// One request's trip through the pipeline.
///
/// Holds the inbound request, the headers every outgoing response must carry,
/// the bound context, the phases visited so far, and the single response slot.
pub struct Exchange {
    request_id: Uuid,
    request: Request,
    request_taken: bool,
    response_headers: HeaderMap,
    context: Option<RequestContext>,
    phases: Vec<Phase>,
    response: Option<Response>,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request,
            request_taken: false,
            response_headers: HeaderMap::new(),
            context: None,
            phases: vec![Phase::Received],
            response: None,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Move the request (and its body) out for the route handler.
    pub fn take_request(&mut self) -> Result<Request, GatewayError> {
        if self.request_taken {
            return Err(GatewayError::BodyConsumed);
        }
        self.request_taken = true;
        Ok(std::mem::take(&mut self.request))
    }

    /// Headers applied to whatever response eventually leaves the pipeline.
    pub fn add_response_headers(&mut self, headers: HeaderMap) {
        self.response_headers.extend(headers);
    }

    pub fn bind(&mut self, context: RequestContext) {
        self.context = Some(context);
    }

    pub fn take_context(&mut self) -> Option<RequestContext> {
        self.context.take()
    }

    pub fn phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Received)
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn enter(&mut self, phase: Phase) {
        tracing::trace!(request_id = %self.request_id, "{:?} -> {:?}", self.phase(), phase);
        self.phases.push(phase);
    }

    pub fn has_responded(&self) -> bool {
        self.response.is_some()
    }

    /// Fill the response slot. Returns `false`, dropping `response`, if the
    /// slot was already filled.
    pub fn respond(&mut self, response: Response) -> bool {
        if self.response.is_some() {
            tracing::warn!(
                request_id = %self.request_id,
                status = %response.status(),
                "Response already sent, discarding second response"
            );
            return false;
        }
        self.response = Some(response);
        true
    }

    /// The terminal response with the accumulated headers applied. Headers
    /// the response already sets take precedence, except `Vary`, whose
    /// tokens are merged.
    pub fn into_response(self) -> Response {
        let mut response = self
            .response
            .unwrap_or_else(|| ApiError::InternalServerError.into_response());

        let headers = response.headers_mut();
        for (name, value) in self.response_headers.iter() {
            if name == header::VARY {
                merge_vary(headers, value);
            } else if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        response
    }
}

fn vary_tokens(value: &HeaderValue) -> impl Iterator<Item = &str> {
    value
        .to_str()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Add the tokens of `extra` to the response's `Vary` header, skipping any
/// already listed. `Vary: *` already covers everything.
fn merge_vary(headers: &mut HeaderMap, extra: &HeaderValue) {
    let mut tokens: Vec<String> = headers
        .get_all(header::VARY)
        .iter()
        .flat_map(vary_tokens)
        .map(str::to_string)
        .collect();
    if tokens.iter().any(|t| t == "*") {
        return;
    }

    let before = tokens.len();
    for token in vary_tokens(extra) {
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            tokens.push(token.to_string());
        }
    }
    if tokens.len() == before {
        return;
    }

    match HeaderValue::from_str(&tokens.join(", ")) {
        Ok(merged) => {
            headers.insert(header::VARY, merged);
        }
        Err(_) => tracing::warn!("Could not merge Vary header, keeping the response's own value"),
    }
}

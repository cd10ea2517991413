pub mod gate;
pub mod identity;

use std::fmt;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use gate::AuthGate;
pub use identity::{HttpIdentityBackend, IdentityBackend, IdentityError};

/// Bearer token presented by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Extract the bearer credential from the Authorization header.
    ///
    /// A missing header is `Ok(None)`; a header that is present but not a
    /// usable bearer token is an error.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, AuthError> {
        let auth_header = match headers.get(header::AUTHORIZATION) {
            Some(value) => value,
            None => return Ok(None),
        };

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::Malformed("Authorization header is not valid ASCII".to_string()))?;

        let (scheme, token) = auth_str
            .trim()
            .split_once(' ')
            .ok_or_else(|| AuthError::Malformed("Authorization header must use Bearer token format".to_string()))?;

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::Malformed(
                "Authorization header must use Bearer token format".to_string(),
            ));
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Malformed("Empty bearer token".to_string()));
        }
        if token.contains(char::is_whitespace) {
            return Err(AuthError::Malformed("Bearer token contains whitespace".to_string()));
        }

        Ok(Some(Self::new(token)))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Header value forwarded to the backend on the caller's behalf.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("token", &"<redacted>").finish()
    }
}

/// Authenticated identity resolved from a credential. Lives for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Everything the identity backend returned for this user.
    #[serde(default)]
    pub claims: Value,
}

impl Principal {
    /// Build a principal from the backend's user object. `None` without an id.
    pub fn from_user(user: Value) -> Option<Self> {
        let field = |name: &str| user.get(name).and_then(Value::as_str).map(str::to_string);

        let id = field("id").filter(|id| !id.is_empty())?;
        Some(Self {
            id,
            aud: field("aud"),
            role: field("role"),
            email: field("email"),
            phone: field("phone"),
            claims: user,
        })
    }
}

/// The two ways authentication can fail, as far as callers and operators care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidCredential,
    BackendFailure,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorKind::InvalidCredential => f.write_str("InvalidCredential"),
            AuthErrorKind::BackendFailure => f.write_str("BackendFailure"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredential,

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("credential rejected by identity backend: {0}")]
    Rejected(String),

    #[error("identity backend returned no user for the credential")]
    NoPrincipal,

    #[error("identity backend failure: {0}")]
    Backend(String),

    #[error("identity backend did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MissingCredential
            | AuthError::Malformed(_)
            | AuthError::Rejected(_)
            | AuthError::NoPrincipal => AuthErrorKind::InvalidCredential,
            AuthError::Backend(_) | AuthError::Timeout(_) => AuthErrorKind::BackendFailure,
        }
    }
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(msg) => AuthError::Rejected(msg),
            other => AuthError::Backend(other.to_string()),
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tokio::time::timeout;

use super::{AuthError, AuthErrorKind, Credential, IdentityBackend, Principal};

/// Resolves the caller's principal and fails closed on any doubt.
#[derive(Clone)]
pub struct AuthGate {
    identity: Arc<dyn IdentityBackend>,
    timeout: Duration,
}

impl AuthGate {
    pub fn new(identity: Arc<dyn IdentityBackend>, timeout: Duration) -> Self {
        Self { identity, timeout }
    }

    /// Authenticate a request from its headers.
    ///
    /// A missing credential is refused without consulting the backend. Otherwise
    /// the backend is asked exactly once, bounded by the gate's timeout.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<(Credential, Principal), AuthError> {
        let credential = Credential::from_headers(headers)?.ok_or(AuthError::MissingCredential)?;

        let principal = match timeout(self.timeout, self.identity.verify_session(&credential)).await {
            Ok(Ok(Some(principal))) => principal,
            Ok(Ok(None)) => return Err(AuthError::NoPrincipal),
            Ok(Err(error)) => return Err(error.into()),
            Err(_elapsed) => return Err(AuthError::Timeout(self.timeout)),
        };

        tracing::debug!("Authenticated principal {}", principal.id);
        Ok((credential, principal))
    }
}

/// Write an auth failure to the operational log at the level its kind calls for.
pub fn log_auth_failure(error: &AuthError) {
    match error.kind() {
        AuthErrorKind::InvalidCredential => {
            tracing::warn!(kind = %error.kind(), "Authentication failed: {}", error);
        }
        AuthErrorKind::BackendFailure => {
            tracing::error!(kind = %error.kind(), "Authentication failed: {}", error);
        }
    }
}

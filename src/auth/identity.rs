use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::{Credential, Principal};
use crate::config::BackendConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The backend looked at the credential and refused it.
    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("identity backend returned status {0}")]
    Status(u16),

    #[error("identity backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity backend sent an unreadable body: {0}")]
    Decode(String),
}

/// Session verification service consulted by the auth gate.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Resolve the principal behind a credential.
    ///
    /// `Ok(None)` means the backend answered but had no user for it.
    async fn verify_session(&self, credential: &Credential) -> Result<Option<Principal>, IdentityError>;
}

/// Identity backend reached over HTTP at `{base}/auth/v1/user`.
#[derive(Debug, Clone)]
pub struct HttpIdentityBackend {
    http: reqwest::Client,
    user_url: Url,
    api_key: String,
}

impl HttpIdentityBackend {
    pub fn new(http: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            http,
            user_url: user_endpoint(&config.url),
            api_key: config.anon_key.clone(),
        }
    }
}

fn user_endpoint(base: &Url) -> Url {
    let mut url = base.clone();
    let path = format!("{}/auth/v1/user", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url
}

#[async_trait]
impl IdentityBackend for HttpIdentityBackend {
    async fn verify_session(&self, credential: &Credential) -> Result<Option<Principal>, IdentityError> {
        let response = self
            .http
            .get(self.user_url.clone())
            .header("apikey", &self.api_key)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(IdentityError::Rejected(rejection_message(&body)))
            }
            status if status.is_success() => {
                let user: Value = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::Decode(e.to_string()))?;
                Ok(Principal::from_user(user))
            }
            status => Err(IdentityError::Status(status.as_u16())),
        }
    }
}

// Error bodies look like {"code":401,"msg":"invalid JWT"}; fall back to the raw text.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "message", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_endpoint_respects_base_path() {
        let url = user_endpoint(&Url::parse("https://proj.supabase.co").unwrap());
        assert_eq!(url.as_str(), "https://proj.supabase.co/auth/v1/user");

        let url = user_endpoint(&Url::parse("http://kong:8000/gateway/?x=1").unwrap());
        assert_eq!(url.as_str(), "http://kong:8000/gateway/auth/v1/user");
    }

    #[test]
    fn rejection_message_prefers_json_fields() {
        assert_eq!(
            rejection_message(r#"{"code":401,"msg":"invalid JWT: token is expired"}"#),
            "invalid JWT: token is expired"
        );
        assert_eq!(rejection_message(r#"{"error":"bad_jwt"}"#), "bad_jwt");
        assert_eq!(rejection_message(" nope \n"), "nope");
    }
}

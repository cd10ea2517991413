//! Clients for the hosted database/storage backend.
//!
//! Request handling only ever gets a client scoped to the caller's own
//! credential. The administrative client is built from the service role key
//! and is reserved for internal jobs.

use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::auth::Credential;
use crate::config::BackendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    /// Acts with the privileges of the caller's credential.
    User,
    /// Acts with the service role key; bypasses row level security.
    Admin,
}

/// A backend handle bound to one set of privileges.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    authorization: String,
    role: ClientRole,
}

impl BackendClient {
    pub fn role(&self) -> ClientRole {
        self.role
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start a request against `path` (relative to the base URL) with this
    /// client's `apikey` and `Authorization` headers applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);

        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
    }
}

/// Hands out scoped or administrative clients sharing one connection pool.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    service_role_key: String,
}

impl ClientFactory {
    pub fn new(http: reqwest::Client, config: &BackendConfig) -> Self {
        Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
        }
    }

    pub fn scoped(&self, credential: &Credential) -> BackendClient {
        BackendClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: self.anon_key.clone(),
            authorization: credential.bearer(),
            role: ClientRole::User,
        }
    }

    pub fn admin(&self) -> BackendClient {
        BackendClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: self.service_role_key.clone(),
            authorization: format!("Bearer {}", self.service_role_key),
            role: ClientRole::Admin,
        }
    }
}

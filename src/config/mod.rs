use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::cors::AllowedMethods;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} has an invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Raw origin patterns, compiled once by the CORS stage.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: AllowedMethods,
    /// Allow-Origin value sent when the request origin is not approved.
    pub fallback_origin: String,
    /// Reject requests from a present-but-denied origin with 403.
    pub enforce_origin: bool,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: String,
    pub service_role_key: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Upper bound on a single identity backend verification call.
    pub timeout: Duration,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let raw_url = lookup("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            name: "SUPABASE_URL",
            source,
        })?;

        let backend = BackendConfig {
            url,
            anon_key: lookup("SUPABASE_ANON_KEY").unwrap_or_default(),
            service_role_key: lookup("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
        };

        let mut config = Self {
            environment,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            cors: CorsConfig {
                allowed_origins: vec!["*".to_string()],
                allowed_methods: AllowedMethods::default(),
                fallback_origin: backend.url.origin().ascii_serialization(),
                enforce_origin: true,
            },
            backend,
            auth: AuthConfig {
                timeout: Duration::from_secs(5),
            },
        };

        config.apply_overrides(&lookup)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse_value("PORT", &v)?;
        }

        // CORS overrides
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("ALLOWED_METHODS") {
            self.cors.allowed_methods = v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "ALLOWED_METHODS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("CORS_FALLBACK_ORIGIN") {
            self.cors.fallback_origin = v;
        }
        if let Some(v) = lookup("CORS_ENFORCE_ORIGIN") {
            self.cors.enforce_origin = parse_value("CORS_ENFORCE_ORIGIN", &v)?;
        }

        // Auth overrides
        if let Some(v) = lookup("AUTH_TIMEOUT_MS") {
            let millis: u64 = parse_value("AUTH_TIMEOUT_MS", &v)?;
            // A zero deadline would time out every verification.
            if millis == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "AUTH_TIMEOUT_MS",
                    value: v,
                });
            }
            self.auth.timeout = Duration::from_millis(millis);
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn parse_value<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

use std::fmt;
use std::str::FromStr;

use axum::http::{header, HeaderMap, HeaderValue, Method};
use thiserror::Error;

use super::origin::OriginMatcher;
use super::ALLOWED_HEADERS;
use crate::config::CorsConfig;

#[derive(Debug, Error)]
#[error("unsupported HTTP method '{0}'")]
pub struct UnsupportedMethod(pub String);

/// Ordered, de-duplicated set of methods echoed in `Access-Control-Allow-Methods`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMethods(Vec<Method>);

impl AllowedMethods {
    pub fn new<I: IntoIterator<Item = Method>>(methods: I) -> Self {
        let mut unique: Vec<Method> = Vec::new();
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }
        Self(unique)
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }
}

impl Default for AllowedMethods {
    fn default() -> Self {
        Self::new([Method::POST, Method::OPTIONS])
    }
}

impl FromStr for AllowedMethods {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut methods = Vec::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let method = match token.to_ascii_uppercase().as_str() {
                "GET" => Method::GET,
                "HEAD" => Method::HEAD,
                "POST" => Method::POST,
                "PUT" => Method::PUT,
                "PATCH" => Method::PATCH,
                "DELETE" => Method::DELETE,
                "OPTIONS" => Method::OPTIONS,
                _ => return Err(UnsupportedMethod(token.to_string())),
            };
            methods.push(method);
        }
        Ok(Self::new(methods))
    }
}

impl fmt::Display for AllowedMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

/// How the request's `Origin` header fared against the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginVerdict {
    Allowed,
    Denied,
    Absent,
}

/// Result of evaluating one request against the CORS policy.
#[derive(Debug, Clone)]
pub struct CorsDecision {
    pub headers: HeaderMap,
    pub preflight: bool,
    pub verdict: OriginVerdict,
}

impl CorsDecision {
    pub fn allow_origin(&self) -> Option<&HeaderValue> {
        self.headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    }
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    matcher: OriginMatcher,
    fallback_origin: HeaderValue,
    allowed_methods: HeaderValue,
    enforce_origin: bool,
}

impl CorsPolicy {
    pub fn new(
        matcher: OriginMatcher,
        fallback_origin: &str,
        allowed_methods: &AllowedMethods,
        enforce_origin: bool,
    ) -> Self {
        // Config strings can carry control characters; such a value can't be a header.
        let fallback_origin = HeaderValue::from_str(fallback_origin).unwrap_or_else(|_| {
            tracing::warn!("Fallback origin '{}' is not a valid header value, using 'null'", fallback_origin);
            HeaderValue::from_static("null")
        });
        let allowed_methods = HeaderValue::from_str(&allowed_methods.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static(""));

        Self {
            matcher,
            fallback_origin,
            allowed_methods,
            enforce_origin,
        }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(
            OriginMatcher::compile(&config.allowed_origins),
            &config.fallback_origin,
            &config.allowed_methods,
            config.enforce_origin,
        )
    }

    pub fn enforces_origin(&self) -> bool {
        self.enforce_origin
    }

    pub fn evaluate(&self, method: &Method, origin: Option<&HeaderValue>) -> CorsDecision {
        let verdict = match origin {
            None => {
                if self.matcher.is_allowed(None) {
                    OriginVerdict::Allowed
                } else {
                    OriginVerdict::Absent
                }
            }
            Some(value) => match value.to_str() {
                Ok(origin) if self.matcher.is_allowed(Some(origin)) => OriginVerdict::Allowed,
                _ => OriginVerdict::Denied,
            },
        };

        let mut headers = HeaderMap::with_capacity(5);
        // Reflect only an approved origin that was actually sent.
        let allow_origin = match (verdict, origin) {
            (OriginVerdict::Allowed, Some(value)) => value.clone(),
            _ => self.fallback_origin.clone(),
        };
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        // Reflected or fallback, the value depends on the request's Origin.
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allowed_methods.clone());

        CorsDecision {
            headers,
            preflight: *method == Method::OPTIONS,
            verdict,
        }
    }
}

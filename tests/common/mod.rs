#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::Layer;

use edge_gateway::config::AppConfig;

pub const VALID_TOKEN: &str = "valid-token";
pub const USER_ID: &str = "8d0fd2b3-9ca7-4d9e-a95f-9e13dded323e";
pub const ANON_KEY: &str = "anon-key";

/// Stand-in for the hosted identity service's `GET /auth/v1/user`.
///
/// Token behaviour:
/// - `valid-token`: 200 with a user object
/// - `no-user`: 200 with an empty object
/// - `broken`: 500
/// - `slow`: answers after three seconds
/// - anything else: 401
#[derive(Default)]
pub struct IdentityStub {
    calls: AtomicUsize,
    last_headers: Mutex<Option<HeaderMap>>,
}

impl IdentityStub {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        self.last_headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|h| h.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

async fn user_endpoint(State(stub): State<Arc<IdentityStub>>, headers: HeaderMap) -> Response {
    stub.calls.fetch_add(1, Ordering::SeqCst);
    *stub.last_headers.lock().unwrap() = Some(headers.clone());

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    match token {
        VALID_TOKEN => Json(json!({
            "id": USER_ID,
            "aud": "authenticated",
            "role": "authenticated",
            "email": "ada@example.com",
            "created_at": "2025-01-01T00:00:00Z"
        }))
        .into_response(),
        "no-user" => Json(json!({})).into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "id": USER_ID })).into_response()
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": 401, "msg": "invalid JWT: unable to parse or verify signature" })),
        )
            .into_response(),
    }
}

/// Serve the identity stub on an ephemeral port; returns its base URL.
pub async fn spawn_identity() -> Result<(String, Arc<IdentityStub>)> {
    let stub = Arc::new(IdentityStub::default());
    let app = Router::new()
        .route("/auth/v1/user", get(user_endpoint))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind identity stub")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{}", addr), stub))
}

/// Gateway configuration pointed at `backend_url`, with extra overrides.
pub fn config(backend_url: &str, overrides: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("SUPABASE_URL".into(), backend_url.to_string());
    vars.insert("SUPABASE_ANON_KEY".into(), ANON_KEY.to_string());
    vars.insert("SUPABASE_SERVICE_ROLE_KEY".into(), "service-role-key".to_string());
    vars.insert("AUTH_TIMEOUT_MS".into(), "500".to_string());
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    AppConfig::from_source(|name| vars.get(name).cloned()).expect("valid test config")
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn has_cors_headers(&self) -> bool {
        [
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            header::ACCESS_CONTROL_ALLOW_METHODS,
        ]
        .into_iter()
        .all(|name| self.headers.contains_key(name))
    }
}

pub async fn send(app: Router, request: Request<Body>) -> Result<Reply> {
    let response = app.oneshot(request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await?;

    Ok(Reply {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec())?,
    })
}

pub fn request(method: &str, path: &str, origin: Option<&str>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("valid request")
}

/// One captured log event: its level and its fields rendered as text.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

struct FieldRecorder<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldRecorder<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

/// Layer that keeps every event emitted while it is installed.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<LoggedEvent>>>,
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldRecorder(&mut fields));
        self.events.lock().unwrap().push(LoggedEvent {
            level: *event.metadata().level(),
            fields,
        });
    }
}

impl LogCapture {
    /// Capture events on this thread until the guard drops. `#[tokio::test]`
    /// runs on a single thread, so the gateway's events land here.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    /// Events carrying `field` with the given rendered value.
    pub fn with_field(&self, field: &str, value: &str) -> Vec<LoggedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.fields.get(field).map(String::as_str) == Some(value))
            .cloned()
            .collect()
    }
}

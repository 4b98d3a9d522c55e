//! HTTP API gateway for Ritualcraft.
//!
//! Exposes a health check and the v1 API: tool runs, response
//! normalization, prompt template admin, and per-user session slots.
//!
//! Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use ritualcraft_config::AppConfig;
use ritualcraft_core::error::StoreError;
use ritualcraft_core::session::SessionStore;
use ritualcraft_core::template::TemplateStore;
use ritualcraft_pipeline::{Catalog, ToolRunner};
use ritualcraft_store::{
    InMemorySessionStore, InMemoryTemplateStore, SqliteTemplateStore, load_seed_file, seed_store,
};

pub use api_v1::{ApiV1State, Caller, SharedApiState};

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS restricted to same-origin
/// - Request body size limit (`gateway.max_body_bytes`)
/// - In-memory rate limiting (`gateway.rate_limit_per_minute` per client)
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(3600));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(state.gateway.max_body_bytes));

    let per_minute = state.gateway.rate_limit_per_minute;
    if per_minute > 0 {
        let limiter = Arc::new(RateLimiter::new(per_minute as usize, Duration::from_secs(60)));
        router = router.layer(middleware::from_fn(move |req, next| {
            let limiter = limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }));
    }

    router
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Open the configured template store and apply the seed file, if any.
pub async fn open_template_store(config: &AppConfig) -> Result<Arc<dyn TemplateStore>, StoreError> {
    let store: Arc<dyn TemplateStore> = match config.templates.backend.as_str() {
        "sqlite" => {
            let path = config.templates.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
            let url = format!("sqlite://{}", path.display());
            Arc::new(SqliteTemplateStore::new(&url).await?)
        }
        _ => Arc::new(InMemoryTemplateStore::new()),
    };

    if let Some(seed) = &config.templates.seed_file {
        seed_from(store.as_ref(), seed).await?;
    }
    Ok(store)
}

async fn seed_from(store: &dyn TemplateStore, path: &Path) -> Result<usize, StoreError> {
    let templates = load_seed_file(path)?;
    seed_store(store, templates).await
}

/// Wire the tool runner from config: provider, template store, session
/// store, and catalog (built-ins plus configured tools).
pub async fn build_runner(config: &AppConfig) -> Result<ToolRunner, Box<dyn std::error::Error>> {
    let providers = ritualcraft_providers::build_from_config(config);
    let provider = providers.default().ok_or_else(|| {
        format!(
            "No provider '{}' configured; set an API key or add a [providers] entry",
            providers.default_name()
        )
    })?;

    let templates = open_template_store(config).await?;

    let sessions = Arc::new(InMemorySessionStore::new());
    spawn_session_sweeper(sessions.clone());

    Ok(ToolRunner::new(
        Catalog::with_overrides(&config.tools),
        templates,
        sessions as Arc<dyn SessionStore>,
        provider,
    )
    .with_default_model(config.default_model.clone())
    .with_timeout(Duration::from_secs(config.completion.timeout_secs))
    .with_session_ttl(Duration::from_secs(config.sessions.ttl_minutes.saturating_mul(60))))
}

/// Periodically drop expired session entries so idle users don't pin memory.
fn spawn_session_sweeper(sessions: Arc<InMemorySessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                debug!(purged, "Purged expired session entries");
            }
        }
    });
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let runner = build_runner(&config).await?;
    info!(
        provider = runner.provider_name(),
        tools = runner.catalog().len(),
        backend = runner.templates().name(),
        "Tool runner ready"
    );
    if config.gateway.tokens.is_empty() {
        warn!("No gateway tokens configured; every request runs as 'anonymous'");
    }

    let state = Arc::new(ApiV1State {
        runner: Arc::new(runner),
        gateway: config.gateway.clone(),
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting with v1 API");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Rate Limiter ---

/// Simple in-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key (bearer token or `anonymous`).
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Check if the client is within rate limits. Returns `true` if allowed.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

/// Rate limiting middleware. The client key is the Authorization header, or
/// `anonymous` without one. `/health` is exempt.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let client_key = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(20).collect::<String>(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    tools: usize,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tools: state.runner.catalog().len(),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Resolves `Authorization: Bearer <token>` to a user id through
/// `gateway.tokens` and attaches it as a [`Caller`] extension. With no
/// tokens configured every request is the `anonymous` caller.
async fn auth_middleware(
    State(state): State<SharedApiState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    let tokens = &state.gateway.tokens;

    let caller = if tokens.is_empty() {
        Caller::anonymous()
    } else {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match token.and_then(|t| tokens.get(t)) {
            Some(user) => Caller(user.clone()),
            None => {
                warn!("Unauthorized request to /v1 API: missing or invalid bearer token");
                return Err(StatusCode::UNAUTHORIZED);
            }
        }
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

use axum::{
    Json, Router,
    extract::State,
    middleware,
    routing::{get, post, put},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::auth::{PasswordPolicy, TokenManager};
use crate::config::Config;
use crate::db::Store;
use crate::email::Mailer;
use crate::services::{
    AuthService, EmailVerificationService, PasswordResetService, SeaOrmAuthService,
    SecurityService,
};

pub mod auth;
mod context;
mod error;
mod logging;
mod reset;
mod security;
mod types;
pub mod validation;
mod verification;

pub use error::ApiError;
pub use types::{ApiResponse, MessageResponse};

/// How many journal entries the live stream buffers per subscriber before
/// it starts reporting lag.
const EVENT_BUS_CAPACITY: usize = 256;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub tokens: Arc<TokenManager>,
    pub policy: PasswordPolicy,
    pub auth_service: Arc<dyn AuthService>,
    pub verification: Arc<EmailVerificationService>,
    pub reset: Arc<PasswordResetService>,
    pub journal: Arc<SecurityService>,
    pub start_time: std::time::Instant,
}

/// Wire every service against one store and one mailer.
#[must_use]
pub fn create_app_state(config: Config, store: Store, mailer: Arc<dyn Mailer>) -> Arc<AppState> {
    let tokens = Arc::new(TokenManager::new(
        &config.jwt.access_secret,
        &config.jwt.refresh_secret,
        config.jwt.access_token_duration,
        config.jwt.refresh_token_duration,
    ));

    let policy = PasswordPolicy {
        min_length: config.validation.min_password_length,
        require_uppercase: config.validation.require_password_uppercase,
        require_lowercase: config.validation.require_password_lowercase,
        require_number: config.validation.require_password_number,
        require_special: config.validation.require_password_special,
        memory_cost_kib: config.security.argon2_memory_cost_kib,
        time_cost: config.security.argon2_time_cost,
        parallelism: config.security.argon2_parallelism,
    };

    let (events_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
    let journal = Arc::new(SecurityService::new(store.clone(), events_tx));

    let verification = Arc::new(EmailVerificationService::new(
        store.clone(),
        mailer.clone(),
        journal.clone(),
    ));

    let reset = Arc::new(PasswordResetService::new(
        store.clone(),
        mailer.clone(),
        policy.clone(),
        journal.clone(),
        config.security.password_reset_rate_limit,
        config.security.security_notifications_enabled,
    ));

    let auth_service: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        tokens.clone(),
        policy.clone(),
        journal.clone(),
        verification.clone(),
        mailer,
        config.security.clone(),
    ));

    Arc::new(AppState {
        config,
        store,
        tokens,
        policy,
        auth_service,
        verification,
        reset,
        journal,
        start_time: std::time::Instant::now(),
    })
}

/// Full router with the interceptor chain layered outermost-first:
/// metadata extraction, per-request validation (in handlers), bearer
/// authentication, then request logging closest to the handler.
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/verify-email", post(verification::verify))
        .route("/auth/password-reset/request", post(reset::request))
        .route("/auth/password-reset/verify", get(reset::verify))
        .route("/auth/password-reset/reset", post(reset::reset))
        .route("/health", get(health))
        .route_layer(middleware::from_fn(logging::track_requests));

    let protected = create_protected_router(state.clone());

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(context::extract_client_info))
        .with_state(state)
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route(
            "/security/events/{id}/resolve",
            post(security::resolve_event),
        )
        .route(
            "/security/accounts/{id}/unlock",
            post(security::unlock_account),
        )
        .route("/security/events/stream", get(security::event_stream))
        .route("/security/stats", get(security::stats))
        .route_layer(middleware::from_fn(context::require_admin));

    Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::get_me))
        .route("/auth/profile", put(auth::update_profile))
        .route("/auth/password", put(auth::change_password))
        .route("/auth/verification/send", post(verification::send))
        .route("/auth/verification/resend", post(verification::resend))
        .route("/auth/verification/status", get(verification::status))
        .route("/auth/password-reset/status", get(reset::status))
        .route("/security/events", get(security::list_events))
        .merge(admin)
        .route_layer(middleware::from_fn(logging::track_requests))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: &'static str,
    uptime_secs: u64,
    version: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthStatus>> {
    let database = if state.store.ping().await.is_ok() {
        "up"
    } else {
        "down"
    };

    Json(ApiResponse::success(HealthStatus {
        status: "serving",
        database,
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

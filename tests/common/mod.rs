#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use taskmaster::api::{self, AppState};
use taskmaster::config::Config;
use taskmaster::db::Store;
use taskmaster::email::{CaptureMailer, Mailer};

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<CaptureMailer>,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let mut config = Config::default();
    // Minimal hashing cost so the suite stays fast
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    configure(&mut config);

    // A single connection keeps every query on the same in-memory database
    let store = Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to open in-memory store");

    let mailer = Arc::new(CaptureMailer::new());
    let state = api::create_app_state(config, store, mailer.clone() as Arc<dyn Mailer>);
    let app = api::router(state.clone());

    TestApp { app, state, mailer }
}

pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    (status, value)
}

/// Register an account and return the response body's `data` object.
pub async fn register(
    app: &Router,
    email: &str,
    username: &str,
    password: &str,
    send_verification: bool,
) -> serde_json::Value {
    let (status, body) = send_json(
        app,
        "POST",
        "/auth/register",
        None,
        Some(serde_json::json!({
            "email": email,
            "username": username,
            "password": password,
            "send_verification": send_verification,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "register failed: {body}");
    body["data"].clone()
}

pub async fn login(
    app: &Router,
    identifier: &str,
    password: &str,
) -> (StatusCode, serde_json::Value) {
    send_json(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({
            "identifier": identifier,
            "password": password,
        })),
    )
    .await
}

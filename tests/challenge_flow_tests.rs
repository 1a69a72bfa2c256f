//! Email-verification and password-reset flows: token capture through the
//! mail port, single-use consumption, rate limits, and cleanup.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use common::{login, register, send_json, spawn_app};
use taskmaster::db::EventFilter;
use taskmaster::email::SentEmailKind;
use taskmaster::entities::accounts;
use taskmaster::security::EventKind;

const PASSWORD: &str = "Pw0rd!aa";

async fn backdate_reset_issue(state: &taskmaster::api::AppState, email: &str, minutes: i64) {
    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq(email))
        .one(&state.store.conn)
        .await
        .unwrap()
        .unwrap();

    let expires_at = account.password_reset_expires_at.unwrap() - Duration::minutes(minutes);
    let mut active: accounts::ActiveModel = account.into();
    active.password_reset_expires_at = Set(Some(expires_at));
    active.update(&state.store.conn).await.unwrap();
}

#[tokio::test]
async fn verification_token_is_single_use() {
    let test = spawn_app().await;

    register(&test.app, "alice@e.com", "alice", PASSWORD, true).await;

    let token = test
        .mailer
        .last_token(SentEmailKind::Verification)
        .expect("verification mail captured");
    assert_eq!(token.len(), 64);

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verify-email",
        None,
        Some(serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Second consumption of the same token
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verify-email",
        None,
        Some(serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // GetMe reflects the verified state
    let (_, body) = login(&test.app, "alice@e.com", PASSWORD).await;
    let access = body["data"]["access_token"].as_str().unwrap().to_string();
    let (status, body) = send_json(&test.app, "GET", "/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["account"]["email_verified"], true);
    assert_eq!(body["data"]["verification"]["email_verified"], true);

    // Welcome mail went out after verification
    assert!(test.mailer.sent().iter().any(|m| m.kind == SentEmailKind::Welcome));

    // Verifying an already-verified account is a precondition failure
    let (_, body) = login(&test.app, "alice@e.com", PASSWORD).await;
    let access = body["data"]["access_token"].as_str().unwrap().to_string();
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verification/send",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn expired_verification_token_is_refused() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, true).await;
    let token = test.mailer.last_token(SentEmailKind::Verification).unwrap();

    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: accounts::ActiveModel = account.into();
    active.email_verification_expires_at = Set(Some(Utc::now() - Duration::hours(1)));
    active.update(&test.state.store.conn).await.unwrap();

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verify-email",
        None,
        Some(serde_json::json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn verification_resend_is_rate_limited() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, true).await;

    let (_, body) = login(&test.app, "alice@e.com", PASSWORD).await;
    let access = body["data"]["access_token"].as_str().unwrap().to_string();

    // Status reflects the pending challenge
    let (status, body) = send_json(
        &test.app,
        "GET",
        "/auth/verification/status",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email_verified"], false);
    assert_eq!(body["data"]["attempts"], 1);
    assert_eq!(body["data"]["can_resend"], false);

    // Resend inside the window is refused
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verification/resend",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Pretend the first send happened two hours ago
    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    let expires_at = account.email_verification_expires_at.unwrap() - Duration::hours(2);
    let mut active: accounts::ActiveModel = account.into();
    active.email_verification_expires_at = Set(Some(expires_at));
    active.update(&test.state.store.conn).await.unwrap();

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verification/resend",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        test.mailer
            .sent()
            .iter()
            .filter(|m| m.kind == SentEmailKind::Verification)
            .count(),
        2
    );
}

#[tokio::test]
async fn password_reset_invalidates_sessions() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;

    let (_, body) = login(&test.app, "alice@e.com", PASSWORD).await;
    let r1 = body["data"]["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let token = test
        .mailer
        .last_token(SentEmailKind::PasswordReset)
        .expect("reset mail captured");

    // The token checks out and the email comes back masked
    let (status, body) = send_json(
        &test.app,
        "GET",
        &format!("/auth/password-reset/verify?token={token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_valid"], true);
    assert_eq!(body["data"]["email"], "a***e@e.com");

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/reset",
        None,
        Some(serde_json::json!({ "token": token, "new_password": "NewPw0rd!" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Every pre-reset session is dead
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/refresh",
        None,
        Some(serde_json::json!({ "refresh_token": r1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&test.app, "alice@e.com", "NewPw0rd!").await;
    assert_eq!(status, StatusCode::OK);

    // Counters and lockout are clean after the reset
    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.password_reset_attempts, 0);
    assert!(account.password_reset_token.is_none());
    assert!(account.locked_until.is_none());
    assert_eq!(account.failed_login_attempts, 0);

    // The consumed token cannot be replayed
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/reset",
        None,
        Some(serde_json::json!({ "token": token, "new_password": "OtherPw0rd!" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_request_never_reveals_account_existence() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;
    let sent_before = test.mailer.count();

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "nobody@nowhere.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // No mail went out
    assert_eq!(test.mailer.count(), sent_before);

    // But the attempt is journaled
    let (events, _) = test
        .state
        .journal
        .query(&EventFilter {
            kind: Some(EventKind::SuspiciousActivity),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(
        events[0]
            .description
            .as_deref()
            .unwrap()
            .contains("nobody@nowhere.com")
    );
}

#[tokio::test]
async fn reset_request_rate_limits_per_address() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A second request inside the 15-minute window is refused
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Outside the window a fresh token is issued
    backdate_reset_issue(&test.state, "alice@e.com", 20).await;
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        test.mailer
            .sent()
            .iter()
            .filter(|m| m.kind == SentEmailKind::PasswordReset)
            .count(),
        2
    );
}

#[tokio::test]
async fn reset_attempt_cap_resets_after_a_day() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;

    // Exhaust the daily budget directly in the store
    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: accounts::ActiveModel = account.into();
    active.password_reset_attempts = Set(5);
    active.password_reset_expires_at = Set(Some(Utc::now() + chrono::Duration::minutes(30)));
    active.update(&test.state.store.conn).await.unwrap();

    // Backdate the issue out of the rate-limit window but inside the day
    backdate_reset_issue(&test.state, "alice@e.com", 60).await;
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A day later the counter self-resets
    backdate_reset_issue(&test.state, "alice@e.com", 25 * 60).await;
    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.password_reset_attempts, 1);
}

#[tokio::test]
async fn reset_status_reflects_pending_request() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;
    let (_, body) = login(&test.app, "alice@e.com", PASSWORD).await;
    let access = body["data"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = send_json(
        &test.app,
        "GET",
        "/auth/password-reset/status",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attempts"], 0);
    assert_eq!(body["data"]["has_active_request"], false);
    assert_eq!(body["data"]["can_request"], true);

    send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;

    let (status, body) = send_json(
        &test.app,
        "GET",
        "/auth/password-reset/status",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attempts"], 1);
    assert_eq!(body["data"]["has_active_request"], true);
    assert_eq!(body["data"]["can_request"], false);
}

#[tokio::test]
async fn expired_reset_token_is_refused() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;

    send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;
    let token = test.mailer.last_token(SentEmailKind::PasswordReset).unwrap();

    // Push the expiry into the past
    backdate_reset_issue(&test.state, "alice@e.com", 2 * 60).await;

    let (status, _) = send_json(
        &test.app,
        "GET",
        &format!("/auth/password-reset/verify?token={token}"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/password-reset/reset",
        None,
        Some(serde_json::json!({ "token": token, "new_password": "NewPw0rd!" })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn verification_attempt_cap_is_enforced() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, false).await;
    let (_, body) = login(&test.app, "alice@e.com", PASSWORD).await;
    let access = body["data"]["access_token"].as_str().unwrap().to_string();

    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: accounts::ActiveModel = account.into();
    active.email_verification_attempts = Set(5);
    active.update(&test.state.store.conn).await.unwrap();

    let (status, _) = send_json(
        &test.app,
        "POST",
        "/auth/verification/send",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (_, body) = send_json(
        &test.app,
        "GET",
        "/auth/verification/status",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(body["data"]["can_resend"], false);
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let test = spawn_app().await;
    register(&test.app, "alice@e.com", "alice", PASSWORD, true).await;
    send_json(
        &test.app,
        "POST",
        "/auth/password-reset/request",
        None,
        Some(serde_json::json!({ "email": "alice@e.com" })),
    )
    .await;

    // Expire both challenges
    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    let mut active: accounts::ActiveModel = account.into();
    active.email_verification_expires_at = Set(Some(Utc::now() - Duration::hours(1)));
    active.password_reset_expires_at = Set(Some(Utc::now() - Duration::hours(1)));
    active.update(&test.state.store.conn).await.unwrap();

    let cleared = test.state.verification.cleanup_expired().await.unwrap();
    assert_eq!(cleared, 1);
    let cleared = test.state.reset.cleanup_expired().await.unwrap();
    assert_eq!(cleared, 1);

    // Second run finds nothing left to do
    assert_eq!(test.state.verification.cleanup_expired().await.unwrap(), 0);
    assert_eq!(test.state.reset.cleanup_expired().await.unwrap(), 0);

    let account = accounts::Entity::find()
        .filter(accounts::Column::Email.eq("alice@e.com"))
        .one(&test.state.store.conn)
        .await
        .unwrap()
        .unwrap();
    assert!(account.email_verification_token.is_none());
    assert!(account.password_reset_token.is_none());
}

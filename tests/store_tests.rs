//! Repository-level tests for the conditional updates the credential
//! flows rely on: single-use token consumption, bulk expiry sweeps, and
//! journal filtering.

use chrono::{Duration, Utc};

use taskmaster::db::{EventFilter, NewAccount, NewSecurityEvent, Store};
use taskmaster::security::{EventKind, Severity};

async fn store() -> Store {
    Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to open in-memory store")
}

async fn seed_account(store: &Store, email: &str, username: &str) -> taskmaster::entities::accounts::Model {
    store
        .accounts()
        .insert(NewAccount {
            email: email.to_string(),
            username: username.to_string(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$AAAAAAAAAAA".to_string(),
            first_name: String::new(),
            last_name: String::new(),
        })
        .await
        .unwrap()
}

fn event(kind: EventKind, severity: Severity, account_id: Option<&str>) -> NewSecurityEvent {
    NewSecurityEvent {
        account_id: account_id.map(str::to_string),
        kind,
        severity,
        ip_address: None,
        user_agent: None,
        description: None,
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn verification_token_consumption_is_conditional() {
    let store = store().await;
    let account = seed_account(&store, "alice@e.com", "alice").await;

    let expires_at = Utc::now() + Duration::hours(24);
    store
        .accounts()
        .set_verification_token(account, "token-a", expires_at, 1)
        .await
        .unwrap();

    assert!(store.accounts().consume_verification_token("token-a").await.unwrap());

    // The token is gone; a second consumption affects nothing
    assert!(!store.accounts().consume_verification_token("token-a").await.unwrap());

    let account = store
        .accounts()
        .find_unverified_by_verification_token("token-a")
        .await
        .unwrap();
    assert!(account.is_none());
}

#[tokio::test]
async fn password_reset_application_is_single_use() {
    let store = store().await;
    let account = seed_account(&store, "alice@e.com", "alice").await;
    let account_id = account.id.clone();

    let expires_at = Utc::now() + Duration::hours(1);
    store
        .accounts()
        .set_reset_token(account, "reset-a", expires_at, 1)
        .await
        .unwrap();

    assert!(store.accounts().apply_password_reset("reset-a", "new-digest").await.unwrap());
    assert!(!store.accounts().apply_password_reset("reset-a", "other-digest").await.unwrap());

    let account = store.accounts().get(&account_id).await.unwrap().unwrap();
    assert_eq!(account.password_hash, "new-digest");
    assert_eq!(account.password_reset_attempts, 0);
    assert!(account.password_reset_token.is_none());
    assert!(account.refresh_token.is_none());
    assert!(account.password_changed_at.is_some());
    assert!(account.password_reset_at.is_some());
}

#[tokio::test]
async fn expiry_sweeps_only_touch_expired_tokens() {
    let store = store().await;
    let expired = seed_account(&store, "old@e.com", "old").await;
    let fresh = seed_account(&store, "new@e.com", "new").await;

    store
        .accounts()
        .set_verification_token(expired, "expired-token", Utc::now() - Duration::hours(1), 1)
        .await
        .unwrap();
    store
        .accounts()
        .set_verification_token(fresh, "fresh-token", Utc::now() + Duration::hours(1), 1)
        .await
        .unwrap();

    assert_eq!(
        store.accounts().cleanup_expired_verification_tokens().await.unwrap(),
        1
    );
    assert_eq!(
        store.accounts().cleanup_expired_verification_tokens().await.unwrap(),
        0
    );

    // The fresh token survived the sweep
    assert!(
        store
            .accounts()
            .find_unverified_by_verification_token("fresh-token")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn journal_filters_compose() {
    let store = store().await;
    let alice = seed_account(&store, "alice@e.com", "alice").await;
    let bob = seed_account(&store, "bob@e.com", "bob").await;

    let events = store.security_events();
    events
        .append(event(EventKind::LoginFailed, Severity::Medium, Some(&alice.id)))
        .await
        .unwrap();
    events
        .append(event(EventKind::AccountLocked, Severity::High, Some(&alice.id)))
        .await
        .unwrap();
    events
        .append(event(EventKind::LoginSuccess, Severity::Low, Some(&bob.id)))
        .await
        .unwrap();
    events
        .append(event(EventKind::SuspiciousActivity, Severity::Medium, None))
        .await
        .unwrap();

    // Account scope
    let (rows, total) = events
        .query(&EventFilter {
            account_id: Some(alice.id.clone()),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows.len(), 2);

    // Account + kind
    let (rows, total) = events
        .query(&EventFilter {
            account_id: Some(alice.id.clone()),
            kind: Some(EventKind::AccountLocked),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].severity, "high");

    // Severity scope crosses accounts
    let (_, total) = events
        .query(&EventFilter {
            severity: Some(Severity::Medium),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);

    // Time range excludes everything when it ends in the past
    let (rows, total) = events
        .query(&EventFilter {
            to: Some(Utc::now() - Duration::hours(1)),
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(rows.is_empty());

    // Pagination: limit applies, total does not shrink
    let (rows, total) = events
        .query(&EventFilter {
            limit: 2,
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 4);
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn resolving_flips_only_the_flag() {
    let store = store().await;
    let alice = seed_account(&store, "alice@e.com", "alice").await;

    let stored = store
        .security_events()
        .append(event(EventKind::SecurityAlert, Severity::Critical, Some(&alice.id)))
        .await
        .unwrap();

    assert!(store.security_events().resolve(&stored.id).await.unwrap());
    assert!(!store.security_events().resolve("missing-id").await.unwrap());

    let (rows, _) = store
        .security_events()
        .query(&EventFilter {
            only_unresolved: true,
            ..EventFilter::default()
        })
        .await
        .unwrap();
    assert!(rows.is_empty());

    // The resolved entry is otherwise untouched
    let (rows, _) = store
        .security_events()
        .query(&EventFilter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type, "security_alert");
    assert!(rows[0].resolved);
}

#[tokio::test]
async fn journal_stats_aggregate_by_scope() {
    let store = store().await;
    let alice = seed_account(&store, "alice@e.com", "alice").await;

    let events = store.security_events();
    events
        .append(event(EventKind::LoginFailed, Severity::Medium, Some(&alice.id)))
        .await
        .unwrap();
    events
        .append(event(EventKind::AccountLocked, Severity::High, Some(&alice.id)))
        .await
        .unwrap();
    let alert = events
        .append(event(EventKind::SecurityAlert, Severity::Critical, None))
        .await
        .unwrap();
    events.resolve(&alert.id).await.unwrap();

    let (total, unresolved, high) = events.stats(None).await.unwrap();
    assert_eq!(total, 3);
    assert_eq!(unresolved, 2);
    assert_eq!(high, 2);

    let (total, unresolved, high) = events.stats(Some(&alice.id)).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(unresolved, 2);
    assert_eq!(high, 1);
}

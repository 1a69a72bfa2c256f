//! Journal queries, event resolution, admin unlock, and the live event
//! stream.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::warn;

use super::types::MessageResponse;
use super::validation::{clamp_page_size, parse_page_token, require_uuid};
use super::{ApiError, ApiResponse, AppState};
use crate::security::{CallerIdentity, ClientInfo};
use crate::services::auth_service::{EventQuery, SecurityEventPage};

#[derive(Deserialize, Default)]
pub struct EventsQuery {
    pub account_id: Option<String>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub only_unresolved: bool,
    #[serde(default)]
    pub page_size: i64,
    pub page_token: Option<String>,
}

/// GET /security/events
///
/// Non-admin callers are scoped to their own trail inside the service.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ApiResponse<SecurityEventPage>>, ApiError> {
    if let Some(account_id) = &query.account_id {
        require_uuid(account_id, "account ID")?;
    }
    let page_size = clamp_page_size(query.page_size)?;
    let offset = parse_page_token(query.page_token.as_deref())?;

    let page = state
        .auth_service
        .get_security_events(
            &caller,
            EventQuery {
                account_id: query.account_id,
                event_type: query.event_type,
                severity: query.severity,
                from: query.from,
                to: query.to,
                only_unresolved: query.only_unresolved,
                page_size,
                offset,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// POST /security/events/{id}/resolve (admin)
pub async fn resolve_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_uuid(&event_id, "event ID")?;

    let resolved = state
        .journal
        .resolve(&event_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    if !resolved {
        return Err(ApiError::NotFound("security event not found".to_string()));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "event resolved",
    ))))
}

/// POST /security/accounts/{id}/unlock (admin)
pub async fn unlock_account(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    Extension(client): Extension<ClientInfo>,
    Path(account_id): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_uuid(&account_id, "account ID")?;

    state
        .auth_service
        .unlock_account(&caller, &account_id, &client)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "account unlocked",
    ))))
}

/// GET /security/stats (admin)
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ApiResponse<crate::services::security_service::JournalStats>>, ApiError> {
    if let Some(account_id) = &query.account_id {
        require_uuid(account_id, "account ID")?;
    }

    let stats = state
        .journal
        .stats(query.account_id.as_deref())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ApiResponse::success(stats)))
}

#[derive(Deserialize, Default)]
pub struct StatsQuery {
    pub account_id: Option<String>,
}

/// GET /security/events/stream (admin)
///
/// Server-streaming flavor of the journal: emits each stored event as it
/// is appended, until the client disconnects.
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.journal.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some((Ok(Event::default().data(json)), rx)),
                Err(e) => {
                    warn!(error = %e, "Failed to serialize SSE event, skipping");
                    Some((
                        Ok(Event::default()
                            .event("error")
                            .data("Event serialization failed")),
                        rx,
                    ))
                }
            },
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!("Event stream client lagged by {count} messages");
                Some((
                    Ok(Event::default().event("warning").data("Missed some events")),
                    rx,
                ))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

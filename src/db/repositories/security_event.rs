use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::entities::{prelude::SecurityEvents, security_events};
use crate::security::{EventKind, Severity};

/// Field set for appending one journal entry.
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub account_id: Option<String>,
    pub kind: EventKind,
    pub severity: Severity,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}

/// Query filter for the journal. All fields combine conjunctively.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub account_id: Option<String>,
    pub kind: Option<EventKind>,
    pub severity: Option<Severity>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub only_unresolved: bool,
    pub offset: u64,
    pub limit: u64,
}

pub struct SecurityEventRepository {
    conn: DatabaseConnection,
}

impl SecurityEventRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn append(&self, event: NewSecurityEvent) -> Result<security_events::Model> {
        let model = security_events::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            account_id: Set(event.account_id),
            event_type: Set(event.kind.as_str().to_string()),
            severity: Set(event.severity.as_str().to_string()),
            ip_address: Set(event.ip_address),
            user_agent: Set(event.user_agent),
            description: Set(event.description),
            metadata: Set(event.metadata),
            resolved: Set(false),
            created_at: Set(Utc::now()),
        };

        model
            .insert(&self.conn)
            .await
            .context("Failed to append security event")
    }

    /// Newest-first page of matching events plus the unpaginated total.
    pub async fn query(
        &self,
        filter: &EventFilter,
    ) -> Result<(Vec<security_events::Model>, u64)> {
        let mut query = SecurityEvents::find();

        if let Some(account_id) = &filter.account_id {
            query = query.filter(security_events::Column::AccountId.eq(account_id));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(security_events::Column::EventType.eq(kind.as_str()));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(security_events::Column::Severity.eq(severity.as_str()));
        }
        if let Some(from) = filter.from {
            query = query.filter(security_events::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(security_events::Column::CreatedAt.lte(to));
        }
        if filter.only_unresolved {
            query = query.filter(security_events::Column::Resolved.eq(false));
        }

        let total = query
            .clone()
            .count(&self.conn)
            .await
            .context("Failed to count security events")?;

        let mut query = query.order_by_desc(security_events::Column::CreatedAt);
        if filter.offset > 0 {
            query = query.offset(filter.offset);
        }
        if filter.limit > 0 {
            query = query.limit(filter.limit);
        }

        let events = query
            .all(&self.conn)
            .await
            .context("Failed to query security events")?;

        Ok((events, total))
    }

    /// Aggregate counts for monitoring dashboards: total entries,
    /// unresolved entries, and high-or-critical entries, optionally
    /// scoped to one account.
    pub async fn stats(&self, account_id: Option<&str>) -> Result<(u64, u64, u64)> {
        let base = match account_id {
            Some(id) => SecurityEvents::find().filter(security_events::Column::AccountId.eq(id)),
            None => SecurityEvents::find(),
        };

        let total = base
            .clone()
            .count(&self.conn)
            .await
            .context("Failed to count security events")?;

        let unresolved = base
            .clone()
            .filter(security_events::Column::Resolved.eq(false))
            .count(&self.conn)
            .await
            .context("Failed to count unresolved security events")?;

        let high_severity = base
            .filter(
                security_events::Column::Severity
                    .is_in([Severity::High.as_str(), Severity::Critical.as_str()]),
            )
            .count(&self.conn)
            .await
            .context("Failed to count high severity security events")?;

        Ok((total, unresolved, high_severity))
    }

    /// Flip the resolved flag. Returns false when the event does not exist.
    pub async fn resolve(&self, event_id: &str) -> Result<bool> {
        let result = SecurityEvents::update_many()
            .col_expr(security_events::Column::Resolved, Expr::value(true))
            .filter(security_events::Column::Id.eq(event_id))
            .exec(&self.conn)
            .await
            .context("Failed to resolve security event")?;

        Ok(result.rows_affected > 0)
    }
}

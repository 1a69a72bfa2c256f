use crate::entities::prelude::*;
use crate::entities::{accounts, security_events};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Accounts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(SecurityEvents)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Login path: lookup by identifier restricted to active accounts
        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_email_active")
                    .table(Accounts)
                    .col(accounts::Column::Email)
                    .col(accounts::Column::IsActive)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_role_active")
                    .table(Accounts)
                    .col(accounts::Column::Role)
                    .col(accounts::Column::IsActive)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Lockout sweeps
        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_locked_until")
                    .table(Accounts)
                    .col(accounts::Column::LockedUntil)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_accounts_created_at")
                    .table(Accounts)
                    .col(accounts::Column::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_account_type_created")
                    .table(SecurityEvents)
                    .col(security_events::Column::AccountId)
                    .col(security_events::Column::EventType)
                    .col(security_events::Column::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Unresolved-event scans by severity
        manager
            .create_index(
                Index::create()
                    .name("idx_events_resolved_severity_created")
                    .table(SecurityEvents)
                    .col(security_events::Column::Resolved)
                    .col(security_events::Column::Severity)
                    .col(security_events::Column::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_created_at")
                    .table(SecurityEvents)
                    .col(security_events::Column::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SecurityEvents).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts).to_owned())
            .await?;

        Ok(())
    }
}

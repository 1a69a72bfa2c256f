use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Case-folded email address
    #[sea_orm(unique)]
    pub email: String,

    /// Case-folded username (3-50 chars, alphanumeric plus `_` and `-`)
    #[sea_orm(unique)]
    pub username: String,

    /// Argon2id password digest. Never serialized, never logged.
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    /// One of "user", "manager", "admin" (see `security::Role`)
    pub role: String,

    pub is_active: bool,

    pub email_verified: bool,

    #[sea_orm(unique)]
    pub email_verification_token: Option<String>,

    pub email_verification_expires_at: Option<DateTimeUtc>,

    pub email_verification_attempts: i32,

    #[sea_orm(unique)]
    pub password_reset_token: Option<String>,

    pub password_reset_expires_at: Option<DateTimeUtc>,

    pub password_reset_at: Option<DateTimeUtc>,

    pub password_reset_attempts: i32,

    pub password_changed_at: Option<DateTimeUtc>,

    pub failed_login_attempts: i32,

    /// In the future => account is locked and logins are refused
    pub locked_until: Option<DateTimeUtc>,

    /// Currently valid refresh token; cleared to revoke all sessions
    pub refresh_token: Option<String>,

    pub refresh_token_expires_at: Option<DateTimeUtc>,

    pub last_login: Option<DateTimeUtc>,

    pub last_login_ip: Option<String>,

    pub preferences: Json,

    pub email_notifications_enabled: bool,

    pub security_notifications_enabled: bool,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::security_events::Entity")]
    SecurityEvents,
}

impl Related<super::security_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SecurityEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub use super::accounts::Entity as Accounts;
pub use super::security_events::Entity as SecurityEvents;

//! Environment-driven configuration with development defaults.
//!
//! Every knob reads from an environment variable and falls back to a
//! default safe for local development. `validate()` refuses to start a
//! production deployment that still carries development credentials.

use anyhow::{Result, bail};
use chrono::Duration;
use std::env;
use std::str::FromStr;

const DEV_ACCESS_SECRET: &str = "dev-access-secret-change-in-production";
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret-change-in-production";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub security: SecurityConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub environment: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_duration: Duration,
    pub refresh_token_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_address: String,
    pub from_name: String,
    pub base_url: String,
    pub app_name: String,
    pub support_email: String,
    /// Capture mail instead of dispatching it
    pub testing_mode: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub max_login_attempts: i32,
    pub lockout_duration: Duration,
    pub password_reset_rate_limit: Duration,
    pub require_email_verification: bool,
    pub session_timeout: Duration,
    pub security_notifications_enabled: bool,
    pub argon2_memory_cost_kib: u32,
    pub argon2_time_cost: u32,
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub min_password_length: usize,
    pub require_password_uppercase: bool,
    pub require_password_lowercase: bool,
    pub require_password_number: bool,
    pub require_password_special: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 50051,
                environment: "development".to_string(),
                base_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                name: "taskmaster".to_string(),
                ssl_mode: "disable".to_string(),
                max_connections: 25,
                min_connections: 5,
            },
            jwt: JwtConfig {
                access_secret: DEV_ACCESS_SECRET.to_string(),
                refresh_secret: DEV_REFRESH_SECRET.to_string(),
                access_token_duration: Duration::minutes(15),
                refresh_token_duration: Duration::days(7),
            },
            email: EmailConfig {
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_username: String::new(),
                smtp_password: String::new(),
                from_address: "noreply@taskmaster.app".to_string(),
                from_name: "TaskMaster".to_string(),
                base_url: "http://localhost:3000".to_string(),
                app_name: "TaskMaster".to_string(),
                support_email: "support@taskmaster.app".to_string(),
                testing_mode: false,
            },
            security: SecurityConfig {
                max_login_attempts: 5,
                lockout_duration: Duration::minutes(15),
                password_reset_rate_limit: Duration::minutes(15),
                require_email_verification: false,
                session_timeout: Duration::days(30),
                security_notifications_enabled: true,
                argon2_memory_cost_kib: 19 * 1024,
                argon2_time_cost: 2,
                argon2_parallelism: 1,
            },
            validation: ValidationConfig {
                min_password_length: 8,
                require_password_uppercase: true,
                require_password_lowercase: true,
                require_password_number: true,
                require_password_special: true,
            },
        }
    }
}

impl Config {
    /// Build the configuration from the environment, falling back to
    /// defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        env_parse("GRPC_PORT", &mut cfg.server.port);
        env_str("ENVIRONMENT", &mut cfg.server.environment);
        env_str("BASE_URL", &mut cfg.server.base_url);

        env_str("DB_HOST", &mut cfg.database.host);
        env_parse("DB_PORT", &mut cfg.database.port);
        env_str("DB_USER", &mut cfg.database.user);
        env_str("DB_PASSWORD", &mut cfg.database.password);
        env_str("DB_NAME", &mut cfg.database.name);
        env_str("DB_SSL_MODE", &mut cfg.database.ssl_mode);
        env_parse("DB_MAX_CONNECTIONS", &mut cfg.database.max_connections);
        env_parse("DB_MIN_CONNECTIONS", &mut cfg.database.min_connections);

        env_str("JWT_ACCESS_SECRET", &mut cfg.jwt.access_secret);
        env_str("JWT_REFRESH_SECRET", &mut cfg.jwt.refresh_secret);
        env_duration(
            "JWT_ACCESS_TOKEN_DURATION",
            &mut cfg.jwt.access_token_duration,
        );
        env_duration(
            "JWT_REFRESH_TOKEN_DURATION",
            &mut cfg.jwt.refresh_token_duration,
        );

        env_str("SMTP_HOST", &mut cfg.email.smtp_host);
        env_parse("SMTP_PORT", &mut cfg.email.smtp_port);
        env_str("SMTP_USERNAME", &mut cfg.email.smtp_username);
        env_str("SMTP_PASSWORD", &mut cfg.email.smtp_password);
        env_str("EMAIL_FROM_ADDRESS", &mut cfg.email.from_address);
        env_str("EMAIL_FROM_NAME", &mut cfg.email.from_name);
        env_str("EMAIL_BASE_URL", &mut cfg.email.base_url);
        env_str("APP_NAME", &mut cfg.email.app_name);
        env_str("SUPPORT_EMAIL", &mut cfg.email.support_email);
        env_bool("EMAIL_TESTING_MODE", &mut cfg.email.testing_mode);

        env_parse("MAX_LOGIN_ATTEMPTS", &mut cfg.security.max_login_attempts);
        env_duration(
            "ACCOUNT_LOCKOUT_DURATION",
            &mut cfg.security.lockout_duration,
        );
        env_duration(
            "PASSWORD_RESET_RATE_LIMIT",
            &mut cfg.security.password_reset_rate_limit,
        );
        env_bool(
            "REQUIRE_EMAIL_VERIFICATION",
            &mut cfg.security.require_email_verification,
        );
        env_duration("SESSION_TIMEOUT", &mut cfg.security.session_timeout);
        env_bool(
            "SECURITY_NOTIFICATIONS_ENABLED",
            &mut cfg.security.security_notifications_enabled,
        );
        env_parse(
            "ARGON2_MEMORY_COST_KIB",
            &mut cfg.security.argon2_memory_cost_kib,
        );
        env_parse("ARGON2_TIME_COST", &mut cfg.security.argon2_time_cost);
        env_parse("ARGON2_PARALLELISM", &mut cfg.security.argon2_parallelism);

        env_parse(
            "MIN_PASSWORD_LENGTH",
            &mut cfg.validation.min_password_length,
        );
        env_bool(
            "REQUIRE_PASSWORD_UPPERCASE",
            &mut cfg.validation.require_password_uppercase,
        );
        env_bool(
            "REQUIRE_PASSWORD_LOWERCASE",
            &mut cfg.validation.require_password_lowercase,
        );
        env_bool(
            "REQUIRE_PASSWORD_NUMBER",
            &mut cfg.validation.require_password_number,
        );
        env_bool(
            "REQUIRE_PASSWORD_SPECIAL",
            &mut cfg.validation.require_password_special,
        );

        cfg
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }

    /// Refuse configurations that are unsafe to run.
    pub fn validate(&self) -> Result<()> {
        if self.validation.min_password_length < 6 {
            bail!("MIN_PASSWORD_LENGTH must be at least 6");
        }
        if self.security.max_login_attempts < 1 {
            bail!("MAX_LOGIN_ATTEMPTS must be at least 1");
        }
        if self.security.lockout_duration < Duration::minutes(1) {
            bail!("ACCOUNT_LOCKOUT_DURATION must be at least 1 minute");
        }

        if self.is_production() {
            if self.jwt.access_secret == DEV_ACCESS_SECRET
                || self.jwt.refresh_secret == DEV_REFRESH_SECRET
            {
                bail!("JWT secrets must be changed from their development defaults in production");
            }
            if self.jwt.access_secret.len() < 32 || self.jwt.refresh_secret.len() < 32 {
                bail!("JWT secrets must be at least 32 characters in production");
            }
            if !self.email.testing_mode
                && (self.email.smtp_username.is_empty() || self.email.smtp_password.is_empty())
            {
                bail!("SMTP credentials are required in production");
            }
            if self.database.ssl_mode == "disable" {
                bail!("database TLS is required in production (set DB_SSL_MODE)");
            }
        }

        Ok(())
    }
}

fn env_str(key: &str, target: &mut String) {
    if let Ok(value) = env::var(key)
        && !value.is_empty()
    {
        *target = value;
    }
}

fn env_parse<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = env::var(key)
        && let Ok(parsed) = value.parse()
    {
        *target = parsed;
    }
}

fn env_bool(key: &str, target: &mut bool) {
    if let Ok(value) = env::var(key) {
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => {}
        }
    }
}

fn env_duration(key: &str, target: &mut Duration) {
    if let Ok(value) = env::var(key)
        && let Some(parsed) = parse_duration(&value)
    {
        *target = parsed;
    }
}

/// Parse suffixed duration strings ("90s", "15m", "24h", "30d"). Bare
/// numbers are taken as seconds.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (number, unit) = match value.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };

    let amount: i64 = number.trim().parse().ok()?;
    match unit {
        "s" | "sec" | "secs" => Some(Duration::seconds(amount)),
        "m" | "min" | "mins" => Some(Duration::minutes(amount)),
        "h" | "hr" | "hrs" => Some(Duration::hours(amount)),
        "d" | "day" | "days" => Some(Duration::days(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing_handles_common_suffixes() {
        assert_eq!(parse_duration("90s"), Some(Duration::seconds(90)));
        assert_eq!(parse_duration("15m"), Some(Duration::minutes(15)));
        assert_eq!(parse_duration("24h"), Some(Duration::hours(24)));
        assert_eq!(parse_duration("30d"), Some(Duration::days(30)));
        assert_eq!(parse_duration("45"), Some(Duration::seconds(45)));
        assert_eq!(parse_duration("15w"), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn production_rejects_dev_secrets() {
        let mut cfg = Config::default();
        cfg.server.environment = "production".to_string();
        assert!(cfg.validate().is_err());

        cfg.jwt.access_secret = "a-real-production-secret-of-32-chars!".to_string();
        cfg.jwt.refresh_secret = "another-production-secret-of-32-chars".to_string();
        cfg.database.ssl_mode = "require".to_string();
        cfg.email.testing_mode = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn weak_limits_are_rejected() {
        let mut cfg = Config::default();
        cfg.validation.min_password_length = 4;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.security.max_login_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.security.lockout_duration = Duration::seconds(30);
        assert!(cfg.validate().is_err());
    }
}

//! Identifier format rules shared by registration and request validation.

use regex::Regex;
use std::sync::OnceLock;

pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MAX_NAME_LENGTH: usize = 100;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("Invalid regex")
    })
}

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_\-]+$").expect("Invalid regex"))
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err("email address too long".to_string());
    }
    if !email_regex().is_match(email) {
        return Err("invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.len() < MIN_USERNAME_LENGTH {
        return Err(format!(
            "username must be at least {MIN_USERNAME_LENGTH} characters"
        ));
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(format!(
            "username must not exceed {MAX_USERNAME_LENGTH} characters"
        ));
    }
    if !username_regex().is_match(username) {
        return Err(
            "username can only contain letters, numbers, underscore, and hyphen".to_string(),
        );
    }
    Ok(())
}

/// First/last names: letters, spaces, hyphens, and apostrophes only.
pub fn validate_display_name(name: &str, field: &str) -> Result<(), String> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("{field} cannot exceed {MAX_NAME_LENGTH} characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '\'')
    {
        return Err(format!(
            "{field} can only contain letters, spaces, hyphens, and apostrophes"
        ));
    }
    Ok(())
}

/// Canonical form used for storage and lookups.
#[must_use]
pub fn case_fold(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_emails() {
        assert!(validate_email("alice@e.com").is_ok());
        assert!(validate_email("a.b+tag@sub.domain.org").is_ok());
    }

    #[test]
    fn rejects_bad_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("alice@e").is_err());
        assert!(validate_email("a@b c.com").is_err());
        let long = format!("{}@e.com", "a".repeat(255));
        assert!(validate_email(&long).is_err());
    }

    #[test]
    fn username_charset_and_length() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a_b-c9").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username("al.ice").is_err());
    }

    #[test]
    fn display_names_allow_apostrophes() {
        assert!(validate_display_name("Mary-Jane O'Neil", "first name").is_ok());
        assert!(validate_display_name("", "first name").is_ok());
        assert!(validate_display_name("x9", "first name").is_err());
        assert!(validate_display_name(&"a".repeat(101), "first name").is_err());
    }

    #[test]
    fn case_folding_trims_and_lowercases() {
        assert_eq!(case_fold("  Alice@E.COM "), "alice@e.com");
    }
}

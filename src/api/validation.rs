//! Per-request validation rules applied before any service call.

use super::ApiError;
use crate::auth::validate::{
    MAX_EMAIL_LENGTH, validate_display_name, validate_email, validate_username,
};

pub const MIN_TOKEN_LENGTH: usize = 32;
pub const MAX_TOKEN_LENGTH: usize = 128;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

pub fn require_valid_email(email: &str) -> Result<(), ApiError> {
    validate_email(email).map_err(ApiError::validation)
}

pub fn require_valid_username(username: &str) -> Result<(), ApiError> {
    validate_username(username).map_err(ApiError::validation)
}

pub fn require_valid_display_name(name: &str, field: &str) -> Result<(), ApiError> {
    validate_display_name(name, field).map_err(ApiError::validation)
}

/// Login identifier: non-empty, bounded by the email length cap.
pub fn require_login_identifier(identifier: &str) -> Result<(), ApiError> {
    if identifier.is_empty() {
        return Err(ApiError::validation("identifier is required"));
    }
    if identifier.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::validation(format!(
            "identifier cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn require_non_empty(value: &str, field: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Challenge tokens are 64-char hex in practice; accept a bounded range so
/// the rule survives token-length changes.
pub fn require_challenge_token(token: &str) -> Result<(), ApiError> {
    if token.len() < MIN_TOKEN_LENGTH || token.len() > MAX_TOKEN_LENGTH {
        return Err(ApiError::validation("invalid token format"));
    }
    Ok(())
}

/// All entity ids are 36-character UUID strings.
pub fn require_uuid(id: &str, field: &str) -> Result<(), ApiError> {
    if id.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    if id.len() != 36 {
        return Err(ApiError::validation(format!("invalid {field} format")));
    }
    Ok(())
}

/// Clamp a requested page size into [1, MAX], treating 0 as "use default".
/// Negative sizes are rejected.
pub fn clamp_page_size(page_size: i64) -> Result<u64, ApiError> {
    if page_size < 0 {
        return Err(ApiError::validation("page size cannot be negative"));
    }
    if page_size == 0 {
        return Ok(DEFAULT_PAGE_SIZE);
    }
    Ok((page_size as u64).min(MAX_PAGE_SIZE))
}

/// Page tokens are the stringified offset of the next page.
pub fn parse_page_token(token: Option<&str>) -> Result<u64, ApiError> {
    match token {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse()
            .map_err(|_| ApiError::validation("invalid page token")),
    }
}

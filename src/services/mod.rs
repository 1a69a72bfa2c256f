//! Domain services for the authentication core.

pub mod auth_service;
pub mod auth_service_impl;
pub mod reset_service;
pub mod security_service;
pub mod verification_service;

pub use auth_service::{
    AccountInfo, AuthError, AuthService, EventQuery, LoginOutcome, LoginSuccess, ProfileUpdate,
    RegisterRequest, RegisterResult, SecurityEventPage,
};
pub use auth_service_impl::SeaOrmAuthService;
pub use reset_service::{PasswordResetService, ResetStatus, ResetTokenInfo};
pub use security_service::{JournalStats, LogEventRequest, SecurityService};
pub use verification_service::{EmailVerificationService, VerificationStatus};

/// Random 32-byte hex challenge token (64 characters), used for both
/// email verification and password reset.
#[must_use]
pub(crate) fn generate_challenge_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::generate_challenge_token;

    #[test]
    fn challenge_tokens_are_64_hex_chars_and_unique() {
        let a = generate_challenge_token();
        let b = generate_challenge_token();

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}

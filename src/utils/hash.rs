// src/utils/hash.rs

use std::borrow::Cow;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use validator::{ValidationError, ValidationErrors};

use crate::error::AppError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Passwords rejected outright regardless of length.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "admin123", "letmein1", "welcome1",
    "abc12345", "football", "baseball", "sunshine", "princess", "11111111",
    "00000000", "passw0rd", "trustno1", "superman", "starwars", "whatever",
];

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .to_string();

    Ok(password_hash)
}

/// Returns false for a wrong password. Only a corrupt stored hash is an error.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Checks a new password against the account rules.
///
/// Errors are reported on `field` so the client can highlight the input.
pub fn check_password_strength(
    field: &'static str,
    password: &str,
    username: &str,
) -> Result<(), ValidationErrors> {
    let mut problems = Vec::new();
    let lowered = password.to_lowercase();
    let user = username.trim().to_lowercase();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push((
            "password_too_short",
            "This password is too short. It must contain at least 8 characters.",
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push(("password_entirely_numeric", "This password is entirely numeric."));
    }
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push(("password_too_common", "This password is too common."));
    }
    if user.len() >= 3 && (lowered.contains(&user) || user.contains(&lowered)) {
        problems.push((
            "password_too_similar",
            "The password is too similar to the username.",
        ));
    }

    if problems.is_empty() {
        return Ok(());
    }

    let mut errors = ValidationErrors::new();
    for (code, message) in problems {
        errors.add(
            field,
            ValidationError::new(code).with_message(Cow::Borrowed(message)),
        );
    }
    Err(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(result: Result<(), ValidationErrors>) -> Vec<String> {
        match result {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .field_errors()
                .get("password1")
                .map(|errs| errs.iter().map(|e| e.code.to_string()).collect())
                .unwrap_or_default(),
        }
    }

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash).unwrap());
        assert!(!verify_password("wrong horse battery", &hash).unwrap());
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[test]
    fn strong_password_passes() {
        assert!(codes(check_password_strength("password1", "Tr1cky-Kestrel", "asha")).is_empty());
    }

    #[test]
    fn weak_passwords_report_each_rule() {
        assert_eq!(
            codes(check_password_strength("password1", "1234", "asha")),
            vec!["password_too_short", "password_entirely_numeric"]
        );
        assert_eq!(
            codes(check_password_strength("password1", "Password", "asha")),
            vec!["password_too_common"]
        );
        assert_eq!(
            codes(check_password_strength("password1", "kestrel2024!", "kestrel")),
            vec!["password_too_similar"]
        );
    }
}

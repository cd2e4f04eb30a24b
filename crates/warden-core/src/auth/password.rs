use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::{FieldError, WardenError};

/// Reject a password shorter than `min` characters, reporting it under `field`.
pub fn check_length(field: &str, password: &str, min: u64) -> Result<(), WardenError> {
    if (password.chars().count() as u64) < min {
        return Err(WardenError::validation_fields(vec![FieldError::with_code(
            field,
            format!("must be at least {} characters", min),
            "length",
        )]));
    }
    Ok(())
}

/// Hash a plaintext password using Argon2.
pub fn hash_password(password: &str) -> Result<String, WardenError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WardenError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a plaintext password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, WardenError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| WardenError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// [`hash_password`] on the blocking pool.
pub async fn hash_password_async(password: String) -> Result<String, WardenError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| WardenError::Internal(format!("Hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_async(password: String, hash: String) -> Result<bool, WardenError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| WardenError::Internal(format!("Verification task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_characters() {
        assert!(check_length("password", "ééééé", 5).is_ok());
        let err = check_length("new_password", "short", 8).unwrap_err();
        match err {
            WardenError::ValidationErrors(fields) => {
                assert_eq!(fields[0].field, "new_password");
                assert_eq!(fields[0].message, "must be at least 8 characters");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("pw123456").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("pw123456", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_password("pw", "not-a-hash").is_err());
    }
}

//! Account password handling: policy checks and Argon2id hashing
//!
//! Registration runs `check_password_rules` before hashing; login only
//! verifies, so legacy accounts keep working if the rules tighten later.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::CalmaError;

/// Minimum accepted password length for new accounts
const MIN_PASSWORD_LEN: usize = 8;

/// Validate a candidate account password against the signup rules
pub fn check_password_rules(password: &str) -> Result<(), CalmaError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(CalmaError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    Ok(())
}

/// Hash an account password with Argon2id.
/// The PHC-formatted result embeds the salt and parameters.
pub fn hash_password(password: &str) -> Result<String, CalmaError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CalmaError::Auth(format!("Failed to hash password: {e}")))
}

/// Verify a login password against the stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CalmaError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| CalmaError::Auth(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).unwrap();

        // Hash should be in PHC format
        assert!(hash.starts_with("$argon2"));

        // Correct password should verify
        assert!(verify_password(password, &hash).unwrap());

        // Wrong password should not verify
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn test_different_salts() {
        let password = "same-password";
        let hash1 = hash_password(password).unwrap();
        let hash2 = hash_password(password).unwrap();

        // Same password should produce different hashes (different salts)
        assert_ne!(hash1, hash2);

        // Both should verify
        assert!(verify_password(password, &hash1).unwrap());
        assert!(verify_password(password, &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "not-a-valid-hash");
        assert!(result.is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(check_password_rules("corto").is_err());
        assert!(check_password_rules("1234567").is_err());
        assert!(check_password_rules("12345678").is_ok());
        assert!(check_password_rules("una contraseña larga").is_ok());
    }
}

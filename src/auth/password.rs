//! Argon2id password verifiers.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;
use rand::Rng;

/// Verifier checked when no user matches, so an unknown login identifier costs
/// the same Argon2 work as a wrong password.
static DUMMY_VERIFIER: Lazy<String> =
    Lazy::new(|| hash_password("no-such-user-placeholder").unwrap_or_default());

/// Default-parameter verifier that no submitted password is expected to match.
pub fn dummy_verifier() -> &'static str {
    &DUMMY_VERIFIER
}

/// Hash a plaintext password into an Argon2id PHC string using default parameters.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    hash_password_with(&Argon2::default(), password)
}

/// Hash with an explicit Argon2 instance (lets tests use cheap parameters).
pub fn hash_password_with(
    argon2: &Argon2<'_>,
    password: &str,
) -> Result<String, argon2::password_hash::Error> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;

    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Check a plaintext password against a stored PHC string.
///
/// A malformed verifier counts as a mismatch. Parameters are read from the
/// PHC string itself.
pub fn verify_password(password: &str, verifier: &str) -> bool {
    match PasswordHash::new(verifier) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use argon2::{Algorithm, Params, Version};

    /// Low-cost Argon2 for tests.
    pub(crate) fn cheap_argon2() -> Argon2<'static> {
        let params = Params::new(1024, 1, 1, None).unwrap();
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password_with(&cheap_argon2(), "secret12").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret12", &hash));
        assert!(!verify_password("secret13", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let argon2 = cheap_argon2();
        let a = hash_password_with(&argon2, "secret12").unwrap();
        let b = hash_password_with(&argon2, "secret12").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_verifier() {
        assert!(!verify_password("secret12", "not-a-phc-string"));
        assert!(!verify_password("secret12", ""));
    }

    #[test]
    fn test_dummy_verifier_is_real_hash() {
        let verifier = dummy_verifier();
        assert!(PasswordHash::new(verifier).is_ok());
        assert!(verifier.starts_with("$argon2id$"));
        assert!(!verify_password("secret12", verifier));
        assert!(!verify_password("", verifier));
        // Computed once
        assert_eq!(dummy_verifier().as_ptr(), verifier.as_ptr());
    }

    #[test]
    fn test_default_params_hash() {
        let hash = hash_password("secret12").unwrap();
        assert!(verify_password("secret12", &hash));
    }
}

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// True when `value` is an Argon2 PHC string rather than a raw password.
pub fn is_password_hash(value: &str) -> bool {
    value.starts_with("$argon2") && PasswordHash::new(value).is_ok()
}

/// Hashes `value` unless it is already a stored hash, so re-saving a record never double-hashes.
pub fn ensure_hashed(value: &str) -> anyhow::Result<String> {
    if is_password_hash(value) {
        return Ok(value.to_string());
    }
    hash_password(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("Passw0rd").expect("hashing should succeed");
        assert!(!verify_password("passw0rd", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("Passw0rd").unwrap();
        let b = hash_password("Passw0rd").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn ensure_hashed_leaves_existing_hash_alone() {
        let hash = hash_password("Passw0rd").unwrap();
        assert!(is_password_hash(&hash));
        assert_eq!(ensure_hashed(&hash).unwrap(), hash);
    }

    #[test]
    fn ensure_hashed_hashes_raw_values() {
        assert!(!is_password_hash("Passw0rd"));
        let stored = ensure_hashed("Passw0rd").unwrap();
        assert!(is_password_hash(&stored));
        assert!(verify_password("Passw0rd", &stored).unwrap());
    }
}

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a plaintext password so it never ends up in logs.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// PHC-format Argon2id hash string.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Hash with Argon2id and a fresh random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Constant-time verification against a stored hash. A malformed
/// stored hash is an error, not a mismatch.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_produces_argon2_phc_string() {
        let password = Password::new("correct horse battery".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn verify_accepts_matching_password() {
        let password = Password::new("correct horse battery".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");
        assert!(verify_password(&password, &hash).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = Password::new("correct horse battery".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");
        let wrong = Password::new("incorrect donkey".to_string());
        assert!(!verify_password(&wrong, &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let password = Password::new("anything".to_string());
        let bad = PasswordHashString::new("not-a-phc-string".to_string());
        assert!(verify_password(&password, &bad).is_err());
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let password = Password::new("hunter2".to_string());
        assert!(!format!("{:?}", password).contains("hunter2"));
    }
}

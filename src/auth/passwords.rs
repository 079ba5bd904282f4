use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;
pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 256;

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    /// Hash checked against when the email is unknown, so both paths cost the same.
    dummy_hash: String,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(19 * 1024); // 19 MiB
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build()?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, "club-api-placeholder-password")?;
        Ok(Self { argon2, dummy_hash })
    }

    /// Enforce length bounds on a password chosen at signup.
    pub fn validate_new_password(password: &str) -> AuthResult<()> {
        let len = password.chars().count();
        if len < MIN_PASSWORD_LEN {
            return Err(AuthError::BadRequest(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if len > MAX_PASSWORD_LEN {
            return Err(AuthError::BadRequest(format!(
                "Password must be at most {MAX_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        hash_with(&self.argon2, password)
    }

    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Burn one verification for an unknown account. Always reports no match.
    pub fn verify_against_dummy(&self, password: &str) -> bool {
        let _ = self.verify_password(password, &self.dummy_hash);
        false
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;
    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies_passwords() {
        let service = PasswordService::new().expect("password service");
        let hash = service.hash_password("super-secret").expect("hash generation");
        assert!(service.verify_password("super-secret", &hash).expect("verify succeeds"));
        assert!(!service.verify_password("wrong-password", &hash).expect("verify runs"));
        assert!(!service.verify_against_dummy("super-secret"));
    }

    #[test]
    fn rejects_malformed_hashes() {
        let service = PasswordService::new().expect("password service");
        assert!(service.verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn enforces_password_length() {
        assert!(PasswordService::validate_new_password("short").is_err());
        assert!(PasswordService::validate_new_password("long-enough").is_ok());
        assert!(PasswordService::validate_new_password(&"x".repeat(300)).is_err());
    }
}

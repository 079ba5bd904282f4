use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const GENERATED_SECRET_LEN: usize = 64;
const DEFAULT_RATE_LIMIT_CAPACITY: NonZeroUsize = NonZeroUsize::new(10_000).unwrap();

/// Raw HMAC key bytes. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(Arc<[u8]>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Arc::from(bytes.into()))
    }

    fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret(<{} bytes>)", self.0.len())
    }
}

/// Where the refresh signing key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    /// Random bytes generated at startup; refresh tokens die with the process.
    Generated,
}

impl SecretSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretSource::Environment => "environment",
            SecretSource::Generated => "generated",
        }
    }
}

/// Authentication configuration, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub legacy_token_ttl_secs: i64,
    pub leeway_secs: u64,
    pub accept_legacy_tokens: bool,
    pub rate_limit_capacity: NonZeroUsize,
    pub access_secret: SigningSecret,
    pub refresh_secret: SigningSecret,
    pub refresh_secret_source: SecretSource,
}

impl AuthConfig {
    pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
    pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
    pub const DEFAULT_LEGACY_TTL_SECS: i64 = 7 * 24 * 60 * 60;
    /// Expired means expired unless an operator opts into clock-skew slack.
    pub const DEFAULT_LEEWAY_SECS: u64 = 0;

    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let access_secret = non_empty("CLUB_JWT_SECRET")
            .map(SigningSecret::new)
            .ok_or_else(|| AuthError::Config("CLUB_JWT_SECRET is required".into()))?;

        let (refresh_secret, refresh_secret_source) = match non_empty("CLUB_JWT_REFRESH_SECRET") {
            Some(secret) => (SigningSecret::new(secret), SecretSource::Environment),
            None => {
                log::warn!(
                    "CLUB_JWT_REFRESH_SECRET not set; generated an in-memory refresh key, \
                     refresh tokens will not survive a restart"
                );
                (SigningSecret::generate(), SecretSource::Generated)
            }
        };

        let issuer = non_empty("CLUB_JWT_ISSUER").unwrap_or_else(|| "club-api".into());
        let audience = non_empty("CLUB_JWT_AUDIENCE").unwrap_or_else(|| "club-members".into());
        let access_token_ttl_secs = parse_positive(&lookup, "CLUB_ACCESS_TOKEN_TTL_SECS")?
            .unwrap_or(Self::DEFAULT_ACCESS_TTL_SECS);
        let refresh_token_ttl_secs = parse_positive(&lookup, "CLUB_REFRESH_TOKEN_TTL_SECS")?
            .unwrap_or(Self::DEFAULT_REFRESH_TTL_SECS);
        let legacy_token_ttl_secs = parse_positive(&lookup, "CLUB_LEGACY_TOKEN_TTL_SECS")?
            .unwrap_or(Self::DEFAULT_LEGACY_TTL_SECS);
        let leeway_secs = lookup("CLUB_JWT_LEEWAY_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(Self::DEFAULT_LEEWAY_SECS);
        let accept_legacy_tokens = lookup("CLUB_ACCEPT_LEGACY_TOKENS")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(true);
        let rate_limit_capacity = lookup("CLUB_RATE_LIMIT_CAPACITY")
            .and_then(|v| v.parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
            .unwrap_or(DEFAULT_RATE_LIMIT_CAPACITY);

        if access_token_ttl_secs >= refresh_token_ttl_secs {
            return Err(AuthError::Config(
                "access token lifetime must be shorter than refresh token lifetime".into(),
            ));
        }

        Ok(Self {
            issuer,
            audience,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            legacy_token_ttl_secs,
            leeway_secs,
            accept_legacy_tokens,
            rate_limit_capacity,
            access_secret,
            refresh_secret,
            refresh_secret_source,
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> AuthResult<Option<i64>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(value) if value > 0 => Ok(Some(value)),
            _ => Err(AuthError::Config(format!(
                "{key} must be a positive number of seconds, got '{raw}'"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_access_secret_is_fatal() {
        let err = AuthConfig::from_lookup(lookup_from(&[])).expect_err("must fail");
        assert!(matches!(err, AuthError::Config(_)));

        let err = AuthConfig::from_lookup(lookup_from(&[("CLUB_JWT_SECRET", "  ")]))
            .expect_err("blank secret must fail");
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config =
            AuthConfig::from_lookup(lookup_from(&[("CLUB_JWT_SECRET", "s3cret")])).expect("config");

        assert_eq!(config.access_secret.as_bytes(), b"s3cret");
        assert_eq!(config.issuer, "club-api");
        assert_eq!(config.audience, "club-members");
        assert_eq!(config.access_token_ttl_secs, 900);
        assert_eq!(config.refresh_token_ttl_secs, 604_800);
        assert_eq!(config.legacy_token_ttl_secs, 604_800);
        assert!(config.accept_legacy_tokens);
        assert_eq!(config.leeway_secs, 0);
        assert_eq!(config.refresh_secret_source, SecretSource::Generated);
        assert_eq!(config.refresh_secret.as_bytes().len(), GENERATED_SECRET_LEN);
    }

    #[test]
    fn generated_refresh_secret_is_stable_for_the_config_lifetime() {
        let config =
            AuthConfig::from_lookup(lookup_from(&[("CLUB_JWT_SECRET", "s3cret")])).expect("config");
        let copy = config.clone();
        assert_eq!(config.refresh_secret, copy.refresh_secret);
        assert_eq!(config.access_secret, copy.access_secret);

        // A rebuilt config stands in for a process restart.
        let restarted =
            AuthConfig::from_lookup(lookup_from(&[("CLUB_JWT_SECRET", "s3cret")])).expect("config");
        assert_ne!(config.refresh_secret, restarted.refresh_secret);
        assert_eq!(config.access_secret, restarted.access_secret);
    }

    #[test]
    fn reads_overrides() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            ("CLUB_JWT_SECRET", "a"),
            ("CLUB_JWT_REFRESH_SECRET", "b"),
            ("CLUB_JWT_ISSUER", "https://club.test"),
            ("CLUB_ACCESS_TOKEN_TTL_SECS", "60"),
            ("CLUB_ACCEPT_LEGACY_TOKENS", "false"),
            ("CLUB_RATE_LIMIT_CAPACITY", "16"),
        ]))
        .expect("config");

        assert_eq!(config.refresh_secret.as_bytes(), b"b");
        assert_eq!(config.refresh_secret_source, SecretSource::Environment);
        assert_eq!(config.issuer, "https://club.test");
        assert_eq!(config.access_token_ttl_secs, 60);
        assert!(!config.accept_legacy_tokens);
        assert_eq!(config.rate_limit_capacity.get(), 16);
    }

    #[test]
    fn rejects_bad_lifetimes() {
        let err = AuthConfig::from_lookup(lookup_from(&[
            ("CLUB_JWT_SECRET", "a"),
            ("CLUB_ACCESS_TOKEN_TTL_SECS", "-5"),
        ]))
        .expect_err("negative ttl");
        assert!(matches!(err, AuthError::Config(_)));

        let err = AuthConfig::from_lookup(lookup_from(&[
            ("CLUB_JWT_SECRET", "a"),
            ("CLUB_ACCESS_TOKEN_TTL_SECS", "700000"),
        ]))
        .expect_err("access outlives refresh");
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let secret = SigningSecret::new("do-not-print");
        assert!(!format!("{secret:?}").contains("do-not-print"));
    }
}

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::claims::{IdentityClaims, Token, TokenClaims, TokenType};
use crate::auth::responses::TokenPair;
use crate::auth::{AuthConfig, AuthError, AuthResult};

pub const BEARER_SCHEME: &str = "Bearer";

pub type Verification = Result<Token, VerifyError>;

/// Why a token failed verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("token expired")]
    Expired,
    #[error("expected a {expected} token, found {}", type_label(.found))]
    WrongType {
        expected: TokenType,
        found: Option<TokenType>,
    },
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl VerifyError {
    pub fn is_expired(&self) -> bool {
        matches!(self, VerifyError::Expired)
    }
}

fn type_label(found: &Option<TokenType>) -> &'static str {
    found.map(|t| t.as_str()).unwrap_or("untyped")
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            _ => VerifyError::Invalid(err.to_string()),
        }
    }
}

impl From<VerifyError> for AuthError {
    fn from(err: VerifyError) -> Self {
        if err.is_expired() {
            AuthError::TokenExpired
        } else {
            AuthError::InvalidToken
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtMetadata {
    pub algorithm: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub legacy_token_ttl_secs: i64,
    pub accept_legacy_tokens: bool,
}

/// Sole authority for minting and checking signed tokens.
///
/// Access and legacy tokens are signed with the access secret, refresh tokens
/// with the refresh secret, all HS256.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    structured_validation: Validation,
    legacy_validation: Validation,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    legacy_token_ttl: Duration,
    accept_legacy_tokens: bool,
}

impl TokenService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let access_secret = config.access_secret.as_bytes();
        let refresh_secret = config.refresh_secret.as_bytes();
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AuthError::Config("signing secrets must not be empty".into()));
        }

        let mut structured_validation = Validation::new(Algorithm::HS256);
        structured_validation.set_audience(&[config.audience.as_str()]);
        structured_validation.set_issuer(&[config.issuer.as_str()]);
        structured_validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        structured_validation.leeway = config.leeway_secs;

        let mut legacy_validation = Validation::new(Algorithm::HS256);
        legacy_validation.validate_aud = false;
        legacy_validation.set_required_spec_claims(&["exp"]);
        legacy_validation.leeway = config.leeway_secs;

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            structured_validation,
            legacy_validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
            legacy_token_ttl: Duration::seconds(config.legacy_token_ttl_secs),
            accept_legacy_tokens: config.accept_legacy_tokens,
        })
    }

    pub fn issue_access_token(&self, identity: &IdentityClaims) -> AuthResult<String> {
        self.issue_access_token_at(identity, Utc::now())
    }

    fn issue_access_token_at(
        &self,
        identity: &IdentityClaims,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        require_subject(&identity.user_id)?;
        let claims = TokenClaims {
            sub: identity.user_id.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            is_admin: identity.is_admin,
            token_type: Some(TokenType::Access),
            iat: now.timestamp(),
            exp: (now + self.access_token_ttl).timestamp(),
            iss: Some(self.issuer.clone()),
            aud: Some(self.audience.clone().into()),
            jti: Some(Uuid::new_v4().to_string()),
        };
        sign(&claims, &self.access_encoding)
    }

    /// Refresh tokens carry the subject only.
    pub fn issue_refresh_token(&self, user_id: &str) -> AuthResult<String> {
        self.issue_refresh_token_at(user_id, Utc::now())
    }

    fn issue_refresh_token_at(&self, user_id: &str, now: DateTime<Utc>) -> AuthResult<String> {
        require_subject(user_id)?;
        let claims = TokenClaims {
            sub: user_id.to_string(),
            email: None,
            role: None,
            is_admin: None,
            token_type: Some(TokenType::Refresh),
            iat: now.timestamp(),
            exp: (now + self.refresh_token_ttl).timestamp(),
            iss: Some(self.issuer.clone()),
            aud: Some(self.audience.clone().into()),
            jti: Some(Uuid::new_v4().to_string()),
        };
        sign(&claims, &self.refresh_encoding)
    }

    pub fn issue_token_pair(&self, identity: &IdentityClaims) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(identity)?,
            refresh_token: self.issue_refresh_token(&identity.user_id)?,
            expires_in: self.access_token_ttl.num_seconds(),
            token_type: BEARER_SCHEME.to_string(),
        })
    }

    /// Untyped token without issuer or audience, for callers predating the typed scheme.
    pub fn issue_legacy_token(&self, identity: &IdentityClaims) -> AuthResult<String> {
        self.issue_legacy_token_at(identity, Utc::now())
    }

    fn issue_legacy_token_at(
        &self,
        identity: &IdentityClaims,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        require_subject(&identity.user_id)?;
        let claims = TokenClaims {
            sub: identity.user_id.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            is_admin: identity.is_admin,
            token_type: None,
            iat: now.timestamp(),
            exp: (now + self.legacy_token_ttl).timestamp(),
            iss: None,
            aud: None,
            jti: None,
        };
        sign(&claims, &self.access_encoding)
    }

    pub fn verify_access_token(&self, token: &str) -> Verification {
        let claims =
            decode::<TokenClaims>(token, &self.access_decoding, &self.structured_validation)?
                .claims;
        match claims.token_type {
            None | Some(TokenType::Access) => Ok(Token::Access(claims)),
            found => Err(VerifyError::WrongType {
                expected: TokenType::Access,
                found,
            }),
        }
    }

    pub fn verify_refresh_token(&self, token: &str) -> Verification {
        let claims =
            decode::<TokenClaims>(token, &self.refresh_decoding, &self.structured_validation)?
                .claims;
        match claims.token_type {
            Some(TokenType::Refresh) => Ok(Token::Refresh(claims)),
            found => Err(VerifyError::WrongType {
                expected: TokenType::Refresh,
                found,
            }),
        }
    }

    /// General entry point for request authentication: the typed access check
    /// first, then the legacy check when that fails and legacy tokens are
    /// accepted.
    pub fn verify_token(&self, token: &str) -> Verification {
        match self.verify_access_token(token) {
            Ok(verified) => Ok(verified),
            Err(err) if !self.accept_legacy_tokens => Err(err),
            Err(err) => {
                log::debug!("access verification failed ({err}); trying legacy form");
                self.verify_legacy_token(token)
            }
        }
    }

    fn verify_legacy_token(&self, token: &str) -> Verification {
        let claims =
            decode::<TokenClaims>(token, &self.access_decoding, &self.legacy_validation)?.claims;
        match claims.token_type {
            None => Ok(Token::Legacy(claims)),
            Some(TokenType::Access) => Ok(Token::Access(claims)),
            found @ Some(TokenType::Refresh) => Err(VerifyError::WrongType {
                expected: TokenType::Access,
                found,
            }),
        }
    }

    /// Exchange a refresh token for a new access token carrying only the subject.
    ///
    /// Failure means the caller has to log in again.
    pub fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<String> {
        let verified = self.verify_refresh_token(refresh_token).map_err(|err| {
            log::debug!("refresh token rejected: {err}");
            AuthError::InvalidRefreshToken
        })?;
        self.issue_access_token(&IdentityClaims::subject(verified.subject()))
    }

    pub fn access_token_ttl_secs(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    pub fn metadata(&self) -> JwtMetadata {
        JwtMetadata {
            algorithm: "HS256".to_string(),
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            access_token_ttl_secs: self.access_token_ttl.num_seconds(),
            refresh_token_ttl_secs: self.refresh_token_ttl.num_seconds(),
            legacy_token_ttl_secs: self.legacy_token_ttl.num_seconds(),
            accept_legacy_tokens: self.accept_legacy_tokens,
        }
    }
}

fn sign(claims: &TokenClaims, key: &EncodingKey) -> AuthResult<String> {
    Ok(encode(&Header::new(Algorithm::HS256), claims, key)?)
}

fn require_subject(user_id: &str) -> AuthResult<()> {
    if user_id.trim().is_empty() {
        return Err(AuthError::BadRequest("token subject is required".into()));
    }
    Ok(())
}

/// Parse the payload without checking the signature. Diagnostics only; never
/// use the result to make an authorization decision.
pub fn decode_unverified(token: &str) -> Option<serde_json::Value> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<serde_json::Value>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

pub fn token_expiration(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_unverified(token)?.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Unknown expiry counts as expired.
pub fn is_token_expired(token: &str) -> bool {
    token_expiration(token).is_none_or(|exp| exp <= Utc::now())
}

/// Pull the token out of an `Authorization: Bearer <token>` value.
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.split_once(' ')?;
    if scheme != BEARER_SCHEME || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}

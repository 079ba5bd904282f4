use std::convert::Infallible;
use std::time::Duration;

use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{
    Object, SecurityRequirement, SecurityScheme, SecuritySchemeData,
};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::auth::claims::Token;
use crate::auth::jwt::extract_token_from_header;
use crate::auth::{AuthError, AuthResult, AuthState};
use crate::models::User;

const BEARER_SECURITY_NAME: &str = "BearerAuth";

/// Identity context for an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
    pub decoded: Token,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.has_admin_access()
    }
}

/// Admin check over an identity that authentication should already have produced.
pub fn require_admin(identity: Option<&AuthUser>) -> AuthResult<()> {
    match identity {
        None => Err(AuthError::NoUser),
        Some(identity) if identity.is_admin() => Ok(()),
        Some(_) => Err(AuthError::InsufficientPermissions),
    }
}

/// Authentication result, computed at most once per request.
struct CachedIdentity(AuthResult<AuthUser>);

/// The error a guard rejected the request with; the catchers render it.
pub(crate) struct RecordedFailure(pub(crate) Option<AuthError>);

/// Bearer token, then signature and claims, then user lookup. Each step runs
/// only after the previous one succeeded.
async fn authenticate(request: &Request<'_>) -> AuthResult<AuthUser> {
    let header = request.headers().get_one("Authorization");
    let token = extract_token_from_header(header).ok_or(AuthError::NoToken)?;

    let state = auth_state(request).await?;
    let decoded = state.token_service.verify_token(token)?;

    let user = state
        .users
        .find_by_id(decoded.subject())
        .await?
        .ok_or(AuthError::UserNotFound)?;

    Ok(AuthUser {
        user,
        token: token.to_string(),
        decoded,
    })
}

async fn identity_outcome<'r>(request: &'r Request<'_>) -> &'r AuthResult<AuthUser> {
    &request
        .local_cache_async(async { CachedIdentity(authenticate(request).await) })
        .await
        .0
}

/// User id resolved earlier in this request, if any guard authenticated it.
/// Never triggers authentication itself.
pub fn authenticated_subject<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    request
        .local_cache(|| CachedIdentity(Err(AuthError::NoToken)))
        .0
        .as_ref()
        .ok()
        .map(AuthUser::id)
}

async fn auth_state<'r>(request: &'r Request<'_>) -> AuthResult<&'r AuthState> {
    request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .map(|state| state.inner())
        .ok_or_else(|| AuthError::Config("AuthState missing from managed state".into()))
}

fn reject<T>(request: &Request<'_>, err: AuthError) -> Outcome<T, AuthError> {
    log::debug!("auth guard failed for {}: {}", request.uri(), err.code());
    request.local_cache(|| RecordedFailure(Some(err.clone())));
    Outcome::Error((err.status(), err))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match identity_outcome(request).await {
            Ok(identity) => Outcome::Success(identity.clone()),
            Err(err) => reject(request, err.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireAdmin {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = match AuthUser::from_request(request).await {
            Outcome::Success(identity) => identity,
            Outcome::Error(err) => return Outcome::Error(err),
            Outcome::Forward(_) => return reject(request, AuthError::NoUser),
        };

        if let Err(err) = require_admin(Some(&identity)) {
            return reject(request, err);
        }
        Outcome::Success(RequireAdmin(identity))
    }
}

/// Identity when the caller presented a usable token, `None` otherwise.
/// Never rejects the request.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AuthUser>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionalUser {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = match identity_outcome(request).await {
            Ok(identity) => Some(identity.clone()),
            Err(err) => {
                log::debug!("continuing anonymously: {}", err.code());
                None
            }
        };
        Outcome::Success(OptionalUser(identity))
    }
}

/// Sliding-window limit of `MAX_REQUESTS` per `WINDOW_MS`, keyed by the
/// resolved user id or, for anonymous callers, the client address.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit<const MAX_REQUESTS: usize, const WINDOW_MS: u64>;

#[rocket::async_trait]
impl<'r, const MAX_REQUESTS: usize, const WINDOW_MS: u64> FromRequest<'r>
    for RateLimit<MAX_REQUESTS, WINDOW_MS>
{
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let state = match auth_state(request).await {
            Ok(state) => state,
            Err(err) => return reject(request, err),
        };

        let key = rate_limit_key(request).await;
        let window = Duration::from_millis(WINDOW_MS);
        match state.rate_limiter.check(&key, MAX_REQUESTS, window) {
            Ok(()) => Outcome::Success(RateLimit),
            Err(retry_after_secs) => {
                log::info!("rate limit exceeded for {key}, retry in {retry_after_secs}s");
                reject(request, AuthError::RateLimited { retry_after_secs })
            }
        }
    }
}

/// One process-wide key per caller, shared by every rate-limited route.
async fn rate_limit_key(request: &Request<'_>) -> String {
    match identity_outcome(request).await {
        Ok(identity) => format!("user:{}", identity.id()),
        Err(_) => match request.client_ip() {
            Some(ip) => format!("ip:{ip}"),
            None => "anonymous".to_string(),
        },
    }
}

fn bearer_security() -> RequestHeaderInput {
    let scheme = SecurityScheme {
        description: Some("Access token issued by /auth/login or /auth/signup.".to_string()),
        data: SecuritySchemeData::Http {
            scheme: "bearer".to_string(),
            bearer_format: Some("JWT".to_string()),
        },
        extensions: Object::default(),
    };
    let mut requirement = SecurityRequirement::new();
    requirement.insert(BEARER_SECURITY_NAME.to_string(), Vec::new());
    RequestHeaderInput::Security(BEARER_SECURITY_NAME.to_string(), scheme, requirement)
}

impl<'r> OpenApiFromRequest<'r> for AuthUser {
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security())
    }
}

impl<'r> OpenApiFromRequest<'r> for RequireAdmin {
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(bearer_security())
    }
}

impl<'r> OpenApiFromRequest<'r> for OptionalUser {
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'r, const MAX_REQUESTS: usize, const WINDOW_MS: u64> OpenApiFromRequest<'r>
    for RateLimit<MAX_REQUESTS, WINDOW_MS>
{
    fn from_request_input(
        _generator: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{TokenClaims, TokenType};
    use chrono::Utc;

    fn identity(role: &str, is_admin: bool) -> AuthUser {
        AuthUser {
            user: User {
                id: "u1".into(),
                email: "a@b.com".into(),
                name: None,
                role: role.into(),
                is_admin,
                created_at: Utc::now(),
            },
            token: "token".into(),
            decoded: Token::Access(TokenClaims {
                sub: "u1".into(),
                email: None,
                role: None,
                is_admin: None,
                token_type: Some(TokenType::Access),
                iat: 0,
                exp: 0,
                iss: None,
                aud: None,
                jti: None,
            }),
        }
    }

    #[test]
    fn admin_gate_requires_an_identity() {
        assert_eq!(require_admin(None), Err(AuthError::NoUser));
    }

    #[test]
    fn admin_gate_checks_role_and_flag() {
        assert_eq!(
            require_admin(Some(&identity("user", false))),
            Err(AuthError::InsufficientPermissions)
        );
        assert_eq!(require_admin(Some(&identity("admin", false))), Ok(()));
        assert_eq!(require_admin(Some(&identity("user", true))), Ok(()));
    }
}

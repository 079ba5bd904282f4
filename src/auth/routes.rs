use chrono::{DateTime, Utc};
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;

use crate::auth::claims::IdentityClaims;
use crate::auth::guards::{AuthUser, OptionalUser, RateLimit, RequireAdmin};
use crate::auth::jwt::BEARER_SCHEME;
use crate::auth::responses::{
    LoginRequest, MeResponse, RefreshRequest, RefreshResponse, SessionResponse, SessionStatus,
    SignupRequest, SigningKeyMetadata,
};
use crate::auth::{AuthError, AuthState, PasswordService};
use crate::models::{NewUser, normalize_email};

/// Ten attempts per caller per fifteen minutes.
pub type CredentialRateLimit = RateLimit<10, 900_000>;

type AuthRouteResult<T> = Result<Json<T>, AuthError>;

#[openapi(tag = "Auth")]
#[post("/auth/signup", data = "<payload>")]
pub async fn signup(
    state: &State<AuthState>,
    _limit: CredentialRateLimit,
    payload: Json<SignupRequest>,
) -> AuthRouteResult<SessionResponse> {
    let payload = payload.into_inner();
    let email = normalize_email(&payload.email);
    if !is_plausible_email(&email) {
        return Err(AuthError::BadRequest("A valid email address is required".into()));
    }
    PasswordService::validate_new_password(&payload.password)?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let password_hash = state.password_service.hash_password(&payload.password)?;
    let user = state
        .users
        .insert(NewUser::member(email, name, password_hash))
        .await?;

    let tokens = state
        .token_service
        .issue_token_pair(&IdentityClaims::from(&user))?;
    log::info!("registered user {}", user.id);

    Ok(Json(SessionResponse { user, tokens }))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login(
    state: &State<AuthState>,
    _limit: CredentialRateLimit,
    payload: Json<LoginRequest>,
) -> AuthRouteResult<SessionResponse> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::BadRequest("Email and password are required".into()));
    }

    let Some(credentials) = state.users.find_credentials_by_email(&email).await? else {
        state.password_service.verify_against_dummy(&payload.password);
        return Err(AuthError::InvalidCredentials);
    };

    let verified = state
        .password_service
        .verify_password(&payload.password, &credentials.password_hash)?;
    if !verified {
        log::debug!("password mismatch for user {}", credentials.user.id);
        return Err(AuthError::InvalidCredentials);
    }

    let user = credentials.user;
    let tokens = state
        .token_service
        .issue_token_pair(&IdentityClaims::from(&user))?;

    Ok(Json(SessionResponse { user, tokens }))
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    payload: Json<RefreshRequest>,
) -> AuthRouteResult<RefreshResponse> {
    let access_token = state
        .token_service
        .refresh_access_token(payload.refresh_token.trim())?;

    Ok(Json(RefreshResponse {
        access_token,
        expires_in: state.token_service.access_token_ttl_secs(),
        token_type: BEARER_SCHEME.to_string(),
    }))
}

#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(identity: AuthUser) -> AuthRouteResult<MeResponse> {
    let expires_at = DateTime::<Utc>::from_timestamp(identity.decoded.claims().exp, 0);
    Ok(Json(MeResponse {
        token_kind: identity.decoded.kind().to_string(),
        user: identity.user,
        expires_at,
    }))
}

#[openapi(tag = "Auth")]
#[get("/auth/session")]
pub async fn session(identity: OptionalUser) -> Json<SessionStatus> {
    let user = identity.0.map(|identity| identity.user);
    Json(SessionStatus {
        authenticated: user.is_some(),
        user,
    })
}

#[openapi(tag = "Auth")]
#[get("/auth/keys")]
pub async fn signing_keys(
    state: &State<AuthState>,
    _admin: RequireAdmin,
) -> AuthRouteResult<SigningKeyMetadata> {
    let meta = state.token_service.metadata();
    Ok(Json(SigningKeyMetadata {
        algorithm: meta.algorithm,
        issuer: meta.issuer,
        audience: meta.audience,
        access_token_ttl_secs: meta.access_token_ttl_secs,
        refresh_token_ttl_secs: meta.refresh_token_ttl_secs,
        legacy_token_ttl_secs: meta.legacy_token_ttl_secs,
        accept_legacy_tokens: meta.accept_legacy_tokens,
        refresh_secret_source: state.config.refresh_secret_source.as_str().to_string(),
    }))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

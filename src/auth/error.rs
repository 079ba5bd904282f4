use std::io::Cursor;

use rocket::http::{ContentType, Header, Status};
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::response::OpenApiResponderInner;
use thiserror::Error;

use crate::auth::responses::AuthErrorResponse;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("No token provided")]
    NoToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Refresh token is invalid or expired; please log in again")]
    InvalidRefreshToken,
    #[error("User not found")]
    UserNotFound,
    #[error("Authentication required")]
    NoUser,
    #[error("Admin access required")]
    InsufficientPermissions,
    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("{0}")]
    BadRequest(String),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("user store error: {0}")]
    Store(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::NoToken
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::InvalidRefreshToken
            | AuthError::UserNotFound
            | AuthError::NoUser
            | AuthError::InvalidCredentials => Status::Unauthorized,
            AuthError::InsufficientPermissions => Status::Forbidden,
            AuthError::RateLimited { .. } => Status::TooManyRequests,
            AuthError::EmailTaken => Status::Conflict,
            AuthError::BadRequest(_) => Status::BadRequest,
            AuthError::Config(_)
            | AuthError::Signing(_)
            | AuthError::PasswordHash(_)
            | AuthError::Store(_) => Status::InternalServerError,
        }
    }

    /// Stable machine-readable code so clients can branch without matching messages.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "CONFIG_ERROR",
            AuthError::NoToken => "NO_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::NoUser => "NO_USER",
            AuthError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::BadRequest(_) => "BAD_REQUEST",
            AuthError::Signing(_) => "TOKEN_SIGNING_FAILED",
            AuthError::PasswordHash(_) => "PASSWORD_HASH_FAILED",
            AuthError::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AuthError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn to_response_body(&self) -> AuthErrorResponse {
        // Server-side faults keep their details in the log, not the response.
        let message = if self.status() == Status::InternalServerError {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        AuthErrorResponse {
            message,
            error: self.code().to_string(),
            retry_after: self.retry_after_secs(),
        }
    }
}

impl<'r> Responder<'r, 'static> for AuthError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            log::error!("{} {}: {}", request.method(), request.uri(), self);
        } else {
            log::debug!("{} {} rejected: {}", request.method(), request.uri(), self.code());
        }

        let json = serde_json::to_string(&self.to_response_body()).unwrap_or_else(|_| {
            r#"{"message":"Failed to serialize error","error":"INTERNAL_ERROR"}"#.to_string()
        });

        let mut builder = Response::build();
        builder
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json));
        if let Some(secs) = self.retry_after_secs() {
            builder.header(Header::new("Retry-After", secs.to_string()));
        }
        builder.ok()
    }
}

impl OpenApiResponderInner for AuthError {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Malformed request body"),
            ("401", "Missing, invalid or expired credentials"),
            ("403", "Authenticated caller lacks the required role"),
            ("409", "Conflicting account"),
            ("429", "Rate limit exceeded; see `retryAfter`"),
            ("500", "Internal server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::Signing(err.to_string())
    }
}

impl From<rocket_db_pools::sqlx::Error> for AuthError {
    fn from(err: rocket_db_pools::sqlx::Error) -> Self {
        AuthError::Store(err.to_string())
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

//! JSON bodies for requests rejected by the auth guards.

use rocket::{Catcher, Request, catch, catchers};

use crate::auth::AuthError;
use crate::auth::guards::RecordedFailure;

fn recorded_or(request: &Request<'_>, fallback: AuthError) -> AuthError {
    request
        .local_cache(|| RecordedFailure(None))
        .0
        .clone()
        .unwrap_or(fallback)
}

#[catch(401)]
pub fn unauthorized(request: &Request<'_>) -> AuthError {
    recorded_or(request, AuthError::NoToken)
}

#[catch(403)]
pub fn forbidden(request: &Request<'_>) -> AuthError {
    recorded_or(request, AuthError::InsufficientPermissions)
}

#[catch(429)]
pub fn too_many_requests(request: &Request<'_>) -> AuthError {
    recorded_or(request, AuthError::RateLimited { retry_after_secs: 1 })
}

#[catch(500)]
pub fn internal_error(request: &Request<'_>) -> AuthError {
    recorded_or(request, AuthError::Store("unhandled server error".into()))
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized, forbidden, too_many_requests, internal_error]
}

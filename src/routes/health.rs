//! Liveness endpoint used by readiness checks and tests.

use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

use crate::auth::AuthState;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `environment` or `generated`. Generated refresh secrets do not survive a restart.
    pub refresh_secret_source: String,
    pub legacy_tokens: bool,
}

#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(state: &State<AuthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        refresh_secret_source: state.config.refresh_secret_source.as_str().to_string(),
        legacy_tokens: state.config.accept_legacy_tokens,
    })
}

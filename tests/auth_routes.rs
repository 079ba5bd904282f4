use std::sync::Arc;

use chrono::Utc;
use club_api::api_routes;
use club_api::auth::responses::{
    AuthErrorResponse, MeResponse, RefreshResponse, SessionResponse, SessionStatus,
    SigningKeyMetadata,
};
use club_api::auth::{AuthState, IdentityClaims, MemoryUserStore, UserStore};
use club_api::models::{User, UserCredentials};
use club_api::test_support::{TestRocketBuilder, test_auth_config};
use rocket::http::{ContentType, Header, Status};
use rocket::local::blocking::Client;
use serde_json::json;

struct Harness {
    client: Client,
    state: AuthState,
    users: Arc<MemoryUserStore>,
}

fn harness() -> Harness {
    let users = Arc::new(MemoryUserStore::new());
    let store: Arc<dyn UserStore> = users.clone();
    let state = AuthState::new(test_auth_config(), store).expect("auth state");
    let client = TestRocketBuilder::new()
        .with_auth_state(state.clone())
        .mount_api_routes(api_routes())
        .blocking_client();
    Harness { client, state, users }
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

fn signup(client: &Client, email: &str, password: &str) -> (Status, serde_json::Value) {
    let response = client
        .post("/api/auth/signup")
        .header(ContentType::JSON)
        .body(json!({ "email": email, "password": password, "name": "Ada" }).to_string())
        .dispatch();
    let status = response.status();
    (status, response.into_json().expect("JSON body"))
}

#[test]
fn signup_returns_user_and_token_pair() {
    let h = harness();
    let (status, body) = signup(&h.client, " Ada@Club.org ", "correct horse");
    assert_eq!(status, Status::Ok);

    let session: SessionResponse = serde_json::from_value(body).expect("session response");
    assert_eq!(session.user.email, "ada@club.org");
    assert_eq!(session.user.name.as_deref(), Some("Ada"));
    assert_eq!(session.user.role, "user");
    assert_eq!(session.tokens.token_type, "Bearer");
    assert_eq!(session.tokens.expires_in, 900);
    assert_eq!(h.users.len(), 1);

    let verified = h
        .state
        .token_service
        .verify_access_token(&session.tokens.access_token)
        .expect("access token verifies");
    assert_eq!(verified.subject(), session.user.id);
}

#[test]
fn signup_rejects_duplicates_and_weak_input() {
    let h = harness();
    assert_eq!(signup(&h.client, "ada@club.org", "correct horse").0, Status::Ok);

    let (status, body) = signup(&h.client, "ADA@club.org", "another password");
    assert_eq!(status, Status::Conflict);
    assert_eq!(body["error"], "EMAIL_TAKEN");

    let (status, body) = signup(&h.client, "bob@club.org", "short");
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (status, _) = signup(&h.client, "not-an-email", "correct horse");
    assert_eq!(status, Status::BadRequest);
}

#[test]
fn login_checks_credentials() {
    let h = harness();
    signup(&h.client, "ada@club.org", "correct horse");

    let login = |email: &str, password: &str| {
        h.client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
    };

    let response = login("ada@club.org", "correct horse");
    assert_eq!(response.status(), Status::Ok);
    let session: SessionResponse = response.into_json().expect("session response");
    assert_eq!(session.user.email, "ada@club.org");

    for (email, password) in [("ada@club.org", "wrong horse"), ("nobody@club.org", "whatever!")] {
        let response = login(email, password);
        assert_eq!(response.status(), Status::Unauthorized);
        let body: AuthErrorResponse = response.into_json().expect("error body");
        assert_eq!(body.error, "INVALID_CREDENTIALS");
    }
}

#[test]
fn login_is_rate_limited() {
    let h = harness();
    let attempt = || {
        h.client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": "", "password": "" }).to_string())
            .dispatch()
    };

    for _ in 0..10 {
        assert_eq!(attempt().status(), Status::BadRequest);
    }

    let response = attempt();
    assert_eq!(response.status(), Status::TooManyRequests);
    assert!(response.headers().get_one("Retry-After").is_some());
    let body: AuthErrorResponse = response.into_json().expect("error body");
    assert_eq!(body.error, "RATE_LIMITED");
    assert!(body.retry_after.is_some_and(|secs| secs > 0));
}

#[test]
fn refresh_exchanges_only_refresh_tokens() {
    let h = harness();
    let (_, body) = signup(&h.client, "ada@club.org", "correct horse");
    let session: SessionResponse = serde_json::from_value(body).expect("session response");

    let refresh = |token: &str| {
        h.client
            .post("/api/auth/refresh")
            .header(ContentType::JSON)
            .body(json!({ "refreshToken": token }).to_string())
            .dispatch()
    };

    let response = refresh(&session.tokens.refresh_token);
    assert_eq!(response.status(), Status::Ok);
    let refreshed: RefreshResponse = response.into_json().expect("refresh response");
    assert_eq!(refreshed.token_type, "Bearer");

    let response = h
        .client
        .get("/api/auth/me")
        .header(bearer(&refreshed.access_token))
        .dispatch();
    assert_eq!(response.status(), Status::Ok);
    let me: MeResponse = response.into_json().expect("me response");
    assert_eq!(me.user.id, session.user.id);
    assert_eq!(me.token_kind, "access");
    assert!(me.expires_at.is_some_and(|at| at > Utc::now()));

    let response = refresh(&session.tokens.access_token);
    assert_eq!(response.status(), Status::Unauthorized);
    let body: AuthErrorResponse = response.into_json().expect("error body");
    assert_eq!(body.error, "INVALID_REFRESH_TOKEN");
}

#[test]
fn session_reports_anonymous_and_authenticated_callers() {
    let h = harness();

    let status: SessionStatus = h
        .client
        .get("/api/auth/session")
        .dispatch()
        .into_json()
        .expect("session status");
    assert!(!status.authenticated);
    assert!(status.user.is_none());

    let (_, body) = signup(&h.client, "ada@club.org", "correct horse");
    let session: SessionResponse = serde_json::from_value(body).expect("session response");
    let status: SessionStatus = h
        .client
        .get("/api/auth/session")
        .header(bearer(&session.tokens.access_token))
        .dispatch()
        .into_json()
        .expect("session status");
    assert!(status.authenticated);
    assert_eq!(status.user.map(|user| user.id), Some(session.user.id));
}

#[test]
fn signing_keys_require_admin() {
    let h = harness();
    h.users.upsert(UserCredentials {
        user: User {
            id: "admin-1".into(),
            email: "boss@club.org".into(),
            name: None,
            role: "user".into(),
            is_admin: true,
            created_at: Utc::now(),
        },
        password_hash: "unused".into(),
    });
    let (_, body) = signup(&h.client, "ada@club.org", "correct horse");
    let member: SessionResponse = serde_json::from_value(body).expect("session response");

    let response = h
        .client
        .get("/api/auth/keys")
        .header(bearer(&member.tokens.access_token))
        .dispatch();
    assert_eq!(response.status(), Status::Forbidden);

    let admin_token = h
        .state
        .token_service
        .issue_access_token(&IdentityClaims::subject("admin-1"))
        .expect("admin token");
    let response = h.client.get("/api/auth/keys").header(bearer(&admin_token)).dispatch();
    assert_eq!(response.status(), Status::Ok);
    let keys: SigningKeyMetadata = response.into_json().expect("key metadata");
    assert_eq!(keys.algorithm, "HS256");
    assert_eq!(keys.issuer, "club-api");
    assert_eq!(keys.audience, "club-members");
    assert_eq!(keys.refresh_secret_source, "environment");
    assert!(keys.accept_legacy_tokens);
}

#[test]
fn malformed_bodies_get_json_errors() {
    let h = harness();
    let response = h
        .client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(r#"{"email": 42}"#)
        .dispatch();
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: serde_json::Value = response.into_json().expect("JSON body");
    assert_eq!(body["error"], "UNPROCESSABLE_ENTITY");
}

#[test]
fn openapi_document_declares_bearer_auth() {
    let h = harness();
    let response = h.client.get("/api/openapi.json").dispatch();
    assert_eq!(response.status(), Status::Ok);
    let doc: serde_json::Value = response.into_json().expect("openapi document");
    assert_eq!(
        doc["components"]["securitySchemes"]["BearerAuth"]["scheme"],
        "bearer"
    );
}

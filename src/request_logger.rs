use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

use crate::auth::guards::authenticated_subject;

/// Logs one line per request with status, timing and, when a guard resolved
/// one, the caller's user id.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let elapsed_ms = request.local_cache(Instant::now).elapsed().as_secs_f64() * 1000.0;
        let status = response.status().code;

        match authenticated_subject(request) {
            Some(user_id) => log::info!(
                "{} {} -> {} ({:.2}ms) user={}",
                request.method(),
                request.uri(),
                status,
                elapsed_ms,
                user_id
            ),
            None => log::info!(
                "{} {} -> {} ({:.2}ms)",
                request.method(),
                request.uri(),
                status,
                elapsed_ms
            ),
        }
    }
}

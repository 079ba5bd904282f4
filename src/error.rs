//! Errors and catchers for failures that happen outside the auth layer.

use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::{Catcher, Request, Response, catch, catchers};
use serde::Serialize;
use std::io::Cursor;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    UnprocessableEntity(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::UnprocessableEntity(_) => Status::UnprocessableEntity,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let error = self.code();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::UnprocessableEntity(msg) => msg,
        };
        log::debug!("{} {} -> {}: {}", request.method(), request.uri(), status.code, message);

        let json = serde_json::to_string(&ErrorResponse { error, message }).unwrap_or_else(|_| {
            r#"{"error":"SERIALIZATION_ERROR","message":"Failed to serialize error"}"#.to_string()
        });

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

#[catch(400)]
pub fn bad_request() -> ApiError {
    ApiError::BadRequest("Malformed request".into())
}

#[catch(404)]
pub fn not_found(request: &Request<'_>) -> ApiError {
    ApiError::NotFound(format!("No route for {} {}", request.method(), request.uri().path()))
}

#[catch(422)]
pub fn unprocessable_entity() -> ApiError {
    ApiError::UnprocessableEntity("Request body is missing fields or has the wrong shape".into())
}

pub fn catchers() -> Vec<Catcher> {
    catchers![bad_request, not_found, unprocessable_entity]
}

use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy for the API. Client mistakes map to 4xx, store trouble
/// maps to 503, everything carries a JSON `{"error": ...}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unrecognized period token")]
    InvalidPeriod,
    #[error("months must be between 1 and 24")]
    InvalidBucketCount,
    #[error("data store unavailable")]
    StoreUnavailable,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("missing or invalid access token")]
    Unauthorized,
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self {
            ApiError::InvalidPeriod
            | ApiError::InvalidBucketCount
            | ApiError::BadRequest(_)
            | ApiError::EmailTaken => Status::BadRequest,
            ApiError::InvalidCredentials | ApiError::Unauthorized => Status::Unauthorized,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::StoreUnavailable => Status::ServiceUnavailable,
            ApiError::Internal => Status::InternalServerError,
        }
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(err: r2d2::Error) -> ApiError {
        log::error!("connection pool error: {err}");
        ApiError::StoreUnavailable
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> ApiError {
        // A constraint violation is the client's fault (e.g. two concurrent
        // registrations racing past the duplicate-email check), not an
        // unavailable store.
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation {
                log::warn!("constraint violation: {err}");
                return ApiError::BadRequest("conflicts with an existing record".to_string());
            }
        }
        log::error!("sqlite error: {err}");
        ApiError::StoreUnavailable
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let body = json!({ "error": self.to_string() }).to_string();
        Response::build()
            .status(self.status())
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

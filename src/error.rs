// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Where the client should go after a failure on the exam pages.
pub const EXAM_INSTRUCTIONS_PATH: &str = "/api/exam/instructions";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const STUDENT_DASHBOARD_PATH: &str = "/api/student/dashboard";
pub const STAFF_DASHBOARD_PATH: &str = "/api/staff/dashboard";
pub const HOME_PATH: &str = "/api";

/// Landing page for a signed-in user.
pub fn dashboard_path(is_staff: bool) -> &'static str {
    if is_staff {
        STAFF_DASHBOARD_PATH
    } else {
        STUDENT_DASHBOARD_PATH
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 400 Bad Request, with per-field messages
    Validation(ValidationErrors),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 404 for records owned by someone else; the client is sent back to its own dashboard
    NotOwned,

    // 409 Conflict (e.g., duplicate username)
    Conflict(String),

    // 429 Too Many Requests
    RateLimited,

    // Exam lifecycle failures, all recovered on the instructions page
    InvalidSubject,
    NoActiveExam,
    InvalidToken,
    ExamExpired,

    // 503; carries the submitted form so the client can resubmit it
    InferenceUnavailable(serde_json::Value),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code
/// and, where the flow expects one, a `redirect` hint.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut extra = None;
        let (status, error_message, redirect) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                    None,
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Validation(errors) => {
                extra = Some(("fields", json!(errors)));
                (
                    StatusCode::BAD_REQUEST,
                    "Please correct the highlighted fields.".to_string(),
                    None,
                )
            }
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg, Some(LOGIN_PATH)),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, Some(LOGIN_PATH)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::NotOwned => (
                StatusCode::NOT_FOUND,
                "Record not found".to_string(),
                Some(STUDENT_DASHBOARD_PATH),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please wait a few minutes and try again.".to_string(),
                None,
            ),
            AppError::InvalidSubject => (
                StatusCode::BAD_REQUEST,
                "Please choose a valid exam subject.".to_string(),
                Some(EXAM_INSTRUCTIONS_PATH),
            ),
            AppError::NoActiveExam => (
                StatusCode::CONFLICT,
                "No active exam. Start an exam from the instructions page.".to_string(),
                Some(EXAM_INSTRUCTIONS_PATH),
            ),
            AppError::InvalidToken => (
                StatusCode::BAD_REQUEST,
                "This exam submission is not valid for your current session.".to_string(),
                Some(EXAM_INSTRUCTIONS_PATH),
            ),
            AppError::ExamExpired => (
                StatusCode::GONE,
                "Time is up. This exam has expired.".to_string(),
                Some(EXAM_INSTRUCTIONS_PATH),
            ),
            AppError::InferenceUnavailable(input) => {
                extra = Some(("input", input));
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The prediction service is temporarily unavailable. Please try again."
                        .to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": error_message,
        });
        if let Some(redirect) = redirect {
            body["redirect"] = json!(redirect);
        }
        if let Some((key, value)) = extra {
            body[key] = value;
        }

        (status, Json(body)).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

/// Returns true when a database error is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

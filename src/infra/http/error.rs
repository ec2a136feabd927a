use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::cache::EngineError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
}

/// JSON error response: `{"error": "<public message>"}` plus an [`ErrorReport`]
/// for the response logger.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        message: &'static str,
        error: &dyn std::error::Error,
    ) -> Self {
        Self {
            status,
            message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn not_found(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(source, StatusCode::NOT_FOUND, "not found", detail)
    }

    pub fn insert_failed(source: &'static str, error: &dyn std::error::Error) -> Self {
        Self::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "insert failed",
            error,
        )
    }

    /// Map an engine failure onto the public error surface.
    pub fn from_engine(source: &'static str, error: EngineError) -> Self {
        match &error {
            EngineError::NotFound => Self::not_found(source, error.to_string()),
            EngineError::Invalid(_) | EngineError::InsertRejected(_) => {
                Self::insert_failed(source, &error)
            }
            EngineError::Backing(_) => Self::from_error(
                source,
                StatusCode::BAD_GATEWAY,
                "backing store unavailable",
                &error,
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(ApiErrorBody {
                error: self.message,
            }),
        )
            .into_response();
        self.report.attach(&mut response);
        response
    }
}

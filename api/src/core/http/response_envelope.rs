use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Body of every response.
///
/// `{"success": true, "data": ..., "request_id": ...}` on success,
/// `{"success": false, "error": {"code", "message", "retryable"}}` otherwise.
#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    /// Stable, machine-readable code such as `UPSTREAM_UNAVAILABLE`.
    code: &'static str,
    message: String,
    retryable: bool,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            request_id: None,
        }
    }

    /// Echoes the caller's `X-Request-Id`; `-` means none was sent.
    pub fn request_id(mut self, id: &str) -> Self {
        if id != "-" {
            self.request_id = Some(id.to_string());
        }
        self
    }

    pub fn respond(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl Envelope<()> {
    pub fn failure(code: &'static str, message: String, retryable: bool) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code,
                message,
                retryable,
            }),
            request_id: None,
        }
    }
}

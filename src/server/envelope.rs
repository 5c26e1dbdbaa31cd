//! Uniform response envelope.
//!
//! Every reply produced by the server goes through [`send`]: the server
//! identification header is always present, JSON bodies are pretty-printed
//! with a JSON content type, and error bodies always carry exactly the
//! `code` and `message` keys.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::ApiError;

/// Value of the `Server` header attached to every response.
pub const SERVER_NAME: &str = "Norbye Public Images Repo";

/// Content type of JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Error body. The two keys are part of the wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }
}

/// Build a complete response from a status and an optional JSON body.
///
/// Without a body the response is empty and carries no content type.
pub fn send(status: StatusCode, body: Option<Value>) -> Response {
    let Some(body) = body else {
        return bare(status);
    };

    match serde_json::to_vec_pretty(&body) {
        Ok(bytes) => with_server_header(
            Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE),
        )
        .body(Body::from(bytes))
        .unwrap_or_else(|_| bare(StatusCode::INTERNAL_SERVER_ERROR)),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            bare(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Serialize any value as the JSON body of a response.
pub fn send_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_value(body) {
        Ok(value) => send(status, Some(value)),
        Err(e) => ApiError::InternalError(format!("Failed to encode response: {}", e))
            .into_response(),
    }
}

/// A response carrying only the status line and the server header.
pub fn bare(status: StatusCode) -> Response {
    let mut response = status.into_response();
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    response
}

/// Raw bytes with the given content type, used for image files and icons.
pub fn send_bytes(content_type: &str, bytes: impl Into<Body>) -> Response {
    with_server_header(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type),
    )
    .body(bytes.into())
    .unwrap_or_else(|_| bare(StatusCode::INTERNAL_SERVER_ERROR))
}

fn with_server_header(builder: http::response::Builder) -> http::response::Builder {
    builder.header(header::SERVER, SERVER_NAME)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        match serde_json::to_value(body) {
            Ok(value) => send(self.status(), Some(value)),
            Err(_) => bare(self.status()),
        }
    }
}

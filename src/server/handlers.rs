//! Shared state, query parsing and the auxiliary endpoints.
//!
//! # Endpoints
//!
//! - `GET /ping` - Liveness check
//! - `GET /channels` - List configured image channels
//!
//! Everything below `/images` goes through [`super::dispatch`].

use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use url::form_urlencoded;

use crate::config::ServerContext;
use crate::error::ApiError;
use crate::store::ImageOperations;

use super::envelope;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<O: ImageOperations> {
    /// Read-only server settings
    pub context: Arc<ServerContext>,

    /// Storage operations requests are dispatched to
    pub operations: Arc<O>,
}

impl<O: ImageOperations> AppState<O> {
    pub fn new(context: ServerContext, operations: O) -> Self {
        Self {
            context: Arc::new(context),
            operations: Arc::new(operations),
        }
    }
}

impl<O: ImageOperations> Clone for AppState<O> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            operations: Arc::clone(&self.operations),
        }
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Ordered multi-map of query parameters.
///
/// Repeated keys keep every value in the order they appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    /// Parse a raw `application/x-www-form-urlencoded` query string.
    ///
    /// A `%` that is not followed by two hex digits is rejected.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if !has_valid_escapes(raw) {
            return Err(ApiError::InternalError("Failed to parse query".to_string()));
        }

        Ok(Self(
            form_urlencoded::parse(raw.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        ))
    }

    /// First value of `key`, if present.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `key` in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.first(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn has_valid_escapes(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = i + 2 < bytes.len()
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

// =============================================================================
// Response Types
// =============================================================================

/// Ping response.
#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ping: String,
    pub version: String,
    pub imgapi: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle ping requests.
///
/// # Endpoint
///
/// `GET /ping`
///
/// # Response
///
/// ```json
/// {
///   "ping": "pong",
///   "version": "0.1.0",
///   "imgapi": true
/// }
/// ```
pub async fn ping_handler() -> Response {
    envelope::send_json(
        StatusCode::OK,
        &PingResponse {
            ping: "pong".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            imgapi: true,
        },
    )
}

/// Handle channel list requests.
///
/// # Endpoint
///
/// `GET /channels`
///
/// Returns the configured channels as a JSON array.
pub async fn channels_handler<O: ImageOperations>(State(state): State<AppState<O>>) -> Response {
    envelope::send_json(StatusCode::OK, &state.context.channels())
}

/// Reply for paths outside the API surface.
pub async fn fallback_handler(uri: Uri) -> Response {
    ApiError::ResourceNotFound(format!("{} does not exist", uri.path())).into_response()
}

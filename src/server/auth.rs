//! HTTP Basic authentication against the configured user database.
//!
//! Credentials are optional: a request without an `Authorization` header is
//! anonymous and may only read. A request that does present credentials is
//! rejected outright when they do not match, whatever the method.
//!
//! # Matching Rules
//!
//! The user database is an ordered list. The scan stops at the first entry
//! whose name equals the supplied username, and only that entry's password
//! is considered. Duplicate names further down the list are never reached.
//!
//! ```rust
//! use imgapi::config::UserEntry;
//! use imgapi::server::auth::{authenticate, Credentials};
//!
//! let users = vec![UserEntry::new("a", "1"), UserEntry::new("a", "2")];
//! let result = authenticate(Some(&Credentials::new("a", "1")), &users).unwrap();
//! assert!(result.authenticated);
//! assert!(authenticate(Some(&Credentials::new("a", "2")), &users).is_err());
//! ```

use std::fmt;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::UserEntry;
use crate::error::AuthError;

// =============================================================================
// Types
// =============================================================================

/// Username and password presented with a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of a successful authentication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Whether the request carried credentials at all
    pub attempted: bool,

    /// Whether the credentials matched a configured user
    pub authenticated: bool,

    /// The authenticated user, empty for anonymous requests
    pub username: String,
}

impl AuthResult {
    /// Result for a request without credentials.
    pub fn anonymous() -> Self {
        Self {
            attempted: false,
            authenticated: false,
            username: String::new(),
        }
    }

    fn user(username: &str) -> Self {
        Self {
            attempted: true,
            authenticated: true,
            username: username.to_string(),
        }
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Extract Basic credentials from the request headers.
    ///
    /// A missing or malformed `Authorization` header yields `None`, which
    /// makes the request anonymous.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
        Self::from_header_value(value)
    }

    /// Parse a `Basic <base64(user:password)>` header value.
    pub fn from_header_value(value: &str) -> Option<Self> {
        const SCHEME: &str = "basic ";

        if value.len() < SCHEME.len() || !value[..SCHEME.len()].eq_ignore_ascii_case(SCHEME) {
            return None;
        }

        let decoded = general_purpose::STANDARD
            .decode(value[SCHEME.len()..].trim())
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(Self::new(username, password))
    }

    /// Encode as an `Authorization` header value.
    pub fn to_header_value(&self) -> String {
        let token = general_purpose::STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Classify the caller against the ordered user database.
///
/// # Errors
///
/// - [`AuthError::UnknownAccount`] when no entry carries the username
/// - [`AuthError::WrongPassword`] when the first entry with that name has a
///   different password
pub fn authenticate(
    credentials: Option<&Credentials>,
    userdb: &[UserEntry],
) -> Result<AuthResult, AuthError> {
    let Some(credentials) = credentials else {
        return Ok(AuthResult::anonymous());
    };

    let Some(entry) = userdb.iter().find(|e| e.name == credentials.username) else {
        warn!(username = %credentials.username, "User {} does not exist", credentials.username);
        return Err(AuthError::UnknownAccount {
            username: credentials.username.clone(),
        });
    };

    if !bool::from(entry.password.as_bytes().ct_eq(credentials.password.as_bytes())) {
        warn!(
            username = %credentials.username,
            "Invalid username password combo for {}", credentials.username
        );
        return Err(AuthError::WrongPassword {
            username: credentials.username.clone(),
        });
    }

    Ok(AuthResult::user(&credentials.username))
}

// =============================================================================
// Axum Extractor
// =============================================================================

/// Axum extractor for optional Basic credentials.
///
/// Never rejects; verification happens in the dispatcher so that failures
/// are reported through the response envelope.
#[derive(Debug, Clone)]
pub struct BasicAuth(pub Option<Credentials>);

impl<S> FromRequestParts<S> for BasicAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(BasicAuth(Credentials::from_headers(&parts.headers)))
    }
}

// =============================================================================
// Tests
// =============================================================================

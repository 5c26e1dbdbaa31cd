use http::StatusCode;
use thiserror::Error;

/// Errors reported to API clients.
///
/// Every variant maps to one symbolic error code of the wire protocol. The
/// payload is the human readable message sent alongside the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Malformed URL, missing/invalid action or bad query
    #[error("{0}")]
    InvalidParameter(String),

    /// The UUID or sub-resource does not resolve to a stored resource
    #[error("{0}")]
    ResourceNotFound(String),

    /// Unexpected filesystem or query-parsing failure
    #[error("{0}")]
    InternalError(String),

    /// Credentials supplied but incorrect
    #[error("{0}")]
    Unauthorized(String),

    /// Supplied username is not present in the configured user list
    #[error("{0}")]
    AccountDoesNotExist(String),

    /// Recognized but unimplemented feature
    #[error("{0}")]
    InsufficientServerVersion(String),
}

impl ApiError {
    /// The symbolic error code carried in the `code` field of error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidParameter(_) => "InvalidParameter",
            ApiError::ResourceNotFound(_) => "ResourceNotFound",
            ApiError::InternalError(_) => "InternalError",
            ApiError::Unauthorized(_) => "UnauthorizedError",
            ApiError::AccountDoesNotExist(_) => "AccountDoesNotExist",
            ApiError::InsufficientServerVersion(_) => "InsufficientServerVersion",
        }
    }

    /// The HTTP status sent with this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParameter(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::AccountDoesNotExist(_) => StatusCode::FORBIDDEN,
            ApiError::InsufficientServerVersion(_) => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// The human readable message.
    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidParameter(m)
            | ApiError::ResourceNotFound(m)
            | ApiError::InternalError(m)
            | ApiError::Unauthorized(m)
            | ApiError::AccountDoesNotExist(m)
            | ApiError::InsufficientServerVersion(m) => m,
        }
    }
}

/// The path does not address an image resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid url")]
pub struct InvalidUrl;

/// Authentication failures raised before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No configured user carries this name
    #[error("User {username} does not exist")]
    UnknownAccount { username: String },

    /// The user exists but the password does not match
    #[error("Invalid username/password combination")]
    WrongPassword { username: String },
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UnknownAccount { .. } => ApiError::AccountDoesNotExist(err.to_string()),
            AuthError::WrongPassword { .. } => ApiError::Unauthorized(err.to_string()),
        }
    }
}

/// Errors raised while loading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected layout
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

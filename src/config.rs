//! Configuration management for the image server.
//!
//! Settings come from three places, highest priority first:
//! - Command-line arguments via clap
//! - Environment variables with the `IMGAPI_` prefix
//! - An optional JSON configuration file (`--config`)
//!
//! The user database and channel list can only be provided through the
//! configuration file:
//!
//! ```json
//! {
//!   "datadir": "/var/lib/imgapi",
//!   "port": 8080,
//!   "userdb": [
//!     { "name": "admin", "password": "secret" }
//!   ],
//!   "channels": [
//!     { "name": "release", "description": "Released images", "default": true }
//!   ]
//! }
//! ```
//!
//! Once resolved, the settings are frozen into a [`ServerContext`] that is
//! shared read-only by every request handler.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default data directory.
pub const DEFAULT_DATADIR: &str = "./data";

// =============================================================================
// CLI Arguments
// =============================================================================

/// imgapi - a public image repository server.
#[derive(Parser, Debug, Clone)]
#[command(name = "imgapi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Validate the configuration and inspect the data directory.
    Check(CheckConfig),
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Path to a JSON configuration file.
    #[arg(short, long, env = "IMGAPI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the image manifests and files.
    #[arg(long, env = "IMGAPI_DATADIR")]
    pub datadir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IMGAPI_HOST")]
    pub host: String,

    /// Port to listen on (overrides the configuration file).
    #[arg(short, long, env = "IMGAPI_PORT")]
    pub port: Option<u16>,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IMGAPI_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// List every image found in the data directory.
    #[arg(long, default_value_t = false)]
    pub list_images: bool,
}

// =============================================================================
// Configuration File
// =============================================================================

/// A single entry of the user database.
///
/// Passwords are compared as configured (plaintext).
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
}

impl UserEntry {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEntry")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An image channel advertised by `GET /channels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

/// Layout of the JSON configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub datadir: Option<PathBuf>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub userdb: Vec<UserEntry>,

    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl FileConfig {
    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

// =============================================================================
// Server Context
// =============================================================================

/// Read-only settings consulted while serving requests.
///
/// Built once at startup and never mutated afterwards, so it can be shared
/// across concurrent requests without synchronization.
#[derive(Debug, Clone)]
pub struct ServerContext {
    datadir: PathBuf,
    userdb: Vec<UserEntry>,
    channels: Vec<Channel>,
}

impl ServerContext {
    /// Create a context with an empty user database and no channels.
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            userdb: Vec::new(),
            channels: Vec::new(),
        }
    }

    /// Set the ordered user database.
    pub fn with_users(mut self, userdb: Vec<UserEntry>) -> Self {
        self.userdb = userdb;
        self
    }

    /// Set the advertised channels.
    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    pub fn userdb(&self) -> &[UserEntry] {
        &self.userdb
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The filesystem location backing the image `uuid`.
    pub fn image_path(&self, uuid: &str) -> PathBuf {
        self.datadir.join(uuid)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Fully resolved settings for a server run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub port: u16,
    pub context: ServerContext,
}

impl SourceArgs {
    /// Merge the configuration file (if any) with the command-line values.
    pub fn resolve(&self, port: Option<u16>) -> Result<ResolvedConfig, ConfigError> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let datadir = self
            .datadir
            .clone()
            .or(file.datadir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATADIR));
        let port = port.or(file.port).unwrap_or(DEFAULT_PORT);

        let resolved = ResolvedConfig {
            port,
            context: ServerContext::new(datadir)
                .with_users(file.userdb)
                .with_channels(file.channels),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

impl ResolvedConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be greater than 0".to_string()));
        }

        if self.context.datadir().as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "data directory is required. Set --datadir or IMGAPI_DATADIR".to_string(),
            ));
        }

        if self.context.userdb().iter().any(|u| u.name.is_empty()) {
            return Err(ConfigError::Invalid(
                "userdb entries must have a non-empty name".to_string(),
            ));
        }

        Ok(())
    }
}

impl ServeConfig {
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.source.resolve(self.port)
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self, port: u16) -> String {
        format!("{}:{}", self.host, port)
    }
}

impl CheckConfig {
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.source.resolve(None)
    }
}

// =============================================================================
// Tests
// =============================================================================

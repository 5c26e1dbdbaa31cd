//! # imgapi
//!
//! A small public image repository server speaking a subset of the IMGAPI
//! REST protocol.
//!
//! Images are identified by UUID and consist of a JSON manifest, an image
//! file and an optional icon, all stored below a configured data directory.
//!
//! ## Architecture
//!
//! - [`server`] - Axum-based HTTP layer: authentication, URL parsing,
//!   method/action dispatch and the response envelope
//! - [`store`] - The operations the dispatcher calls into, with a
//!   filesystem-backed implementation
//! - [`config`] - CLI, configuration file and the shared server context
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use imgapi::{create_router, FsImageStore, RouterConfig, ServerContext, UserEntry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let context = ServerContext::new("/var/lib/imgapi")
//!         .with_users(vec![UserEntry::new("admin", "secret")]);
//!     let router = create_router(context, FsImageStore::new(), RouterConfig::default());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{
    Channel, CheckConfig, Cli, Command, ResolvedConfig, ServeConfig, ServerContext, UserEntry,
};
pub use error::{ApiError, AuthError, ConfigError, InvalidUrl};
pub use server::{
    authenticate, create_router, dispatch, resolve_action, Action, AppState, AuthResult,
    Credentials, ImageRequest, ParsedResource, QueryParams, RouterConfig, SubResource,
};
pub use store::{FsImageStore, ImageManifest, ImageOperations, ImageState, OperationRequest};

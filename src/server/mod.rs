//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        GET | POST | PUT | DELETE  /images[/{uuid}[/{tag}]]      │
//! │                                                                 │
//! │  ┌──────────┐  ┌──────────┐  ┌────────────┐  ┌───────────────┐  │
//! │  │   auth   │  │ resource │  │  dispatch  │  │   envelope    │  │
//! │  │ (Basic)  │  │ (parser) │  │ (routing)  │  │  (responses)  │  │
//! │  └──────────┘  └──────────┘  └────────────┘  └───────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod dispatch;
pub mod envelope;
pub mod handlers;
pub mod resource;
pub mod routes;

pub use auth::{authenticate, AuthResult, BasicAuth, Credentials};
pub use dispatch::{dispatch, images_handler, resolve_action, Action, ImageRequest};
pub use envelope::{ErrorBody, SERVER_NAME};
pub use handlers::{channels_handler, ping_handler, AppState, PingResponse, QueryParams};
pub use resource::{ParsedResource, SubResource};
pub use routes::{create_router, RouterConfig};

//! Router configuration for the image server.
//!
//! # Route Structure
//!
//! ```text
//! /ping                       - Liveness check (public)
//! /channels                   - Channel list (public)
//! /images, /images/...        - Image API (GET public, mutations need Basic auth)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use imgapi::config::ServerContext;
//! use imgapi::server::routes::{create_router, RouterConfig};
//! use imgapi::store::FsImageStore;
//!
//! let context = ServerContext::new("/var/lib/imgapi");
//! let router = create_router(context, FsImageStore::new(), RouterConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    routing::{any, get},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::dispatch::images_handler;
use super::handlers::{channels_handler, fallback_handler, ping_handler, AppState};
use crate::config::ServerContext;
use crate::store::ImageOperations;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router<O>(context: ServerContext, operations: O, config: RouterConfig) -> Router
where
    O: ImageOperations + 'static,
{
    let app_state = AppState::new(context, operations);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/ping", get(ping_handler))
        .route("/channels", get(channels_handler::<O>))
        .route("/images", any(images_handler::<O>))
        .route("/images/", any(images_handler::<O>))
        .route("/images/{*rest}", any(images_handler::<O>))
        .fallback(fallback_handler)
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

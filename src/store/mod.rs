//! Image storage behind the dispatcher.
//!
//! The dispatcher never touches manifests or image files itself. Once a
//! request has been routed it calls exactly one method of
//! [`ImageOperations`], handing over the resolved filesystem target and the
//! parsed request. The implementation owns the full response.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │       Method Dispatcher      │
//! └──────────────┬───────────────┘
//!                │ OperationRequest { target, params, headers, body }
//!                ▼
//! ┌──────────────────────────────┐
//! │   ImageOperations (trait)    │
//! └──────────────┬───────────────┘
//!                ▼
//! ┌──────────────────────────────┐
//! │  FsImageStore                │
//! │  {datadir}/{uuid}/manifest.json
//! │  {datadir}/{uuid}/file       │
//! │  {datadir}/{uuid}/icon       │
//! └──────────────────────────────┘
//! ```

mod fs;
mod manifest;

use std::path::PathBuf;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;

use crate::server::QueryParams;

pub use fs::{FsImageStore, FILE_NAME, ICON_NAME, MANIFEST_NAME};
pub use manifest::{
    Compression, ImageFile, ImageManifest, ImageState, ListFilter, IMMUTABLE_FIELDS,
    MANIFEST_VERSION,
};

/// Everything an operation needs from the inbound request.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// The data directory for collection operations, otherwise
    /// `{datadir}/{uuid}`
    pub target: PathBuf,

    /// Parsed query parameters
    pub params: QueryParams,

    /// Request headers
    pub headers: HeaderMap,

    /// Request body
    pub body: Bytes,
}

impl OperationRequest {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            params: QueryParams::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The resource operations the dispatcher routes to.
///
/// Each method produces its own complete response (through the response
/// envelope), success or failure.
#[async_trait]
pub trait ImageOperations: Send + Sync {
    /// `GET /images`, target is the data directory.
    async fn list_images(&self, request: OperationRequest) -> Response;

    /// `GET /images/{uuid}`
    async fn get_image(&self, request: OperationRequest) -> Response;

    /// `GET /images/{uuid}/icon`
    async fn get_image_icon(&self, request: OperationRequest) -> Response;

    /// `GET /images/{uuid}/file`
    async fn get_image_file(&self, request: OperationRequest) -> Response;

    /// `DELETE /images/{uuid}`, removes the manifest and the backing file.
    async fn delete_image(&self, request: OperationRequest) -> Response;

    /// `DELETE /images/{uuid}/icon`
    async fn delete_image_icon(&self, request: OperationRequest) -> Response;

    /// `POST /images`, target is the data directory.
    async fn create_image(&self, request: OperationRequest) -> Response;

    /// `POST /images/{uuid}/icon`
    async fn add_image_icon(&self, request: OperationRequest) -> Response;

    /// `PUT /images/{uuid}/file`
    async fn add_image_file(&self, request: OperationRequest) -> Response;

    /// `POST /images/{uuid}?action=activate`
    async fn activate_image(&self, request: OperationRequest) -> Response;

    /// `POST /images/{uuid}?action=update`
    async fn update_image(&self, request: OperationRequest) -> Response;

    /// `POST /images/{uuid}?action=disable`
    async fn disable_image(&self, request: OperationRequest) -> Response;

    /// `POST /images/{uuid}?action=enable`
    async fn enable_image(&self, request: OperationRequest) -> Response;
}

//! Filesystem-backed image store.
//!
//! Each image lives in its own directory below the data directory:
//!
//! ```text
//! {datadir}/{uuid}/manifest.json
//! {datadir}/{uuid}/file
//! {datadir}/{uuid}/icon
//! ```
//!
//! Manifests are rewritten through a temporary file followed by a rename so
//! readers never observe a half-written manifest. No locking is performed;
//! concurrent writers to the same image race and the last rename wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::envelope;

use super::manifest::{Compression, ImageFile, ImageManifest, ListFilter};
use super::{ImageOperations, OperationRequest};

/// Name of the manifest inside an image directory.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Name of the image file inside an image directory.
pub const FILE_NAME: &str = "file";

/// Name of the icon inside an image directory.
pub const ICON_NAME: &str = "icon";

const FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Stores images as plain files under the data directory.
#[derive(Debug, Clone, Default)]
pub struct FsImageStore;

impl FsImageStore {
    pub fn new() -> Self {
        Self
    }

    /// Load every readable manifest below `datadir`.
    ///
    /// Directories that are not named after a UUID, or that lack a readable
    /// manifest, are skipped. A missing data directory yields no images.
    pub async fn load_all(&self, datadir: &Path) -> Result<Vec<ImageManifest>, ApiError> {
        let mut entries = match tokio::fs::read_dir(datadir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(internal(datadir, "list", e)),
        };

        let mut manifests = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(internal(datadir, "list", e)),
            };

            let path = entry.path();
            if image_uuid(&path).is_err() {
                continue;
            }

            match read_manifest(&path).await {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        manifests.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.uuid.cmp(&b.uuid))
        });
        Ok(manifests)
    }

    async fn list(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let filter = ListFilter::from_params(&request.params)?;
        let images: Vec<ImageManifest> = self
            .load_all(&request.target)
            .await?
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();

        Ok(envelope::send_json(StatusCode::OK, &images))
    }

    async fn create(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let manifest = ImageManifest::from_create_body(&request.body, Uuid::new_v4())?;
        let dir = request.target.join(manifest.uuid.to_string());

        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ApiError::InvalidParameter(format!(
                    "Image {} already exists",
                    manifest.uuid
                )))
            }
            Err(e) => return Err(internal(&dir, "create", e)),
        }

        write_manifest(&dir, &manifest).await?;
        info!(uuid = %manifest.uuid, name = %manifest.name, "Created image");

        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn get(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let manifest = read_manifest(&request.target).await?;
        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn get_file(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let manifest = read_manifest(&request.target).await?;
        if manifest.files.is_empty() {
            return Err(ApiError::ResourceNotFound(format!(
                "Image {} has no file",
                manifest.uuid
            )));
        }

        let bytes = read_blob(&request.target, FILE_NAME).await?;
        Ok(envelope::send_bytes(FILE_CONTENT_TYPE, bytes))
    }

    async fn get_icon(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let manifest = read_manifest(&request.target).await?;
        if !manifest.icon {
            return Err(ApiError::ResourceNotFound(format!(
                "Image {} has no icon",
                manifest.uuid
            )));
        }

        let bytes = read_blob(&request.target, ICON_NAME).await?;
        let content_type = manifest
            .icon_content_type
            .as_deref()
            .unwrap_or(FILE_CONTENT_TYPE);
        Ok(envelope::send_bytes(content_type, bytes))
    }

    async fn delete(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let uuid = image_uuid(&request.target)?;

        match tokio::fs::remove_dir_all(&request.target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(uuid)),
            Err(e) => return Err(internal(&request.target, "delete", e)),
        }

        info!(uuid = %uuid, "Deleted image");
        Ok(envelope::send(StatusCode::NO_CONTENT, None))
    }

    async fn delete_icon(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let mut manifest = read_manifest(&request.target).await?;
        if !manifest.icon {
            return Err(ApiError::ResourceNotFound(format!(
                "Image {} has no icon",
                manifest.uuid
            )));
        }

        remove_blob(&request.target, ICON_NAME).await?;
        manifest.icon = false;
        manifest.icon_content_type = None;
        write_manifest(&request.target, &manifest).await?;

        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn add_icon(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let mut manifest = read_manifest(&request.target).await?;
        if request.body.is_empty() {
            return Err(ApiError::InvalidParameter("Icon body is empty".to_string()));
        }

        let content_type = request
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FILE_CONTENT_TYPE)
            .to_string();

        write_blob(&request.target, ICON_NAME, &request.body).await?;
        manifest.icon = true;
        manifest.icon_content_type = Some(content_type);
        write_manifest(&request.target, &manifest).await?;

        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn add_file(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let mut manifest = read_manifest(&request.target).await?;
        if manifest.activated {
            return Err(ApiError::InvalidParameter(format!(
                "Image {} is activated, its file cannot be replaced",
                manifest.uuid
            )));
        }

        let compression = match request.params.first("compression") {
            None => Compression::None,
            Some(value) => Compression::from_param(value).ok_or_else(|| {
                ApiError::InvalidParameter(format!("Invalid compression \"{}\"", value))
            })?,
        };

        write_blob(&request.target, FILE_NAME, &request.body).await?;
        manifest.files = vec![ImageFile {
            sha256: hex::encode(Sha256::digest(&request.body)),
            size: request.body.len() as u64,
            compression,
        }];
        write_manifest(&request.target, &manifest).await?;

        info!(uuid = %manifest.uuid, size = request.body.len(), "Stored image file");
        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn activate(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let mut manifest = read_manifest(&request.target).await?;
        manifest.activate(Utc::now())?;
        write_manifest(&request.target, &manifest).await?;

        info!(uuid = %manifest.uuid, "Activated image");
        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn update(&self, request: OperationRequest) -> Result<Response, ApiError> {
        let mut manifest = read_manifest(&request.target).await?;
        manifest.apply_update(&request.body)?;
        write_manifest(&request.target, &manifest).await?;

        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }

    async fn set_disabled(
        &self,
        request: OperationRequest,
        disabled: bool,
    ) -> Result<Response, ApiError> {
        let mut manifest = read_manifest(&request.target).await?;
        manifest.set_disabled(disabled);
        write_manifest(&request.target, &manifest).await?;

        Ok(envelope::send_json(StatusCode::OK, &manifest))
    }
}

fn respond(result: Result<Response, ApiError>) -> Response {
    result.unwrap_or_else(IntoResponse::into_response)
}

#[async_trait]
impl ImageOperations for FsImageStore {
    async fn list_images(&self, request: OperationRequest) -> Response {
        respond(self.list(request).await)
    }

    async fn get_image(&self, request: OperationRequest) -> Response {
        respond(self.get(request).await)
    }

    async fn get_image_icon(&self, request: OperationRequest) -> Response {
        respond(self.get_icon(request).await)
    }

    async fn get_image_file(&self, request: OperationRequest) -> Response {
        respond(self.get_file(request).await)
    }

    async fn delete_image(&self, request: OperationRequest) -> Response {
        respond(self.delete(request).await)
    }

    async fn delete_image_icon(&self, request: OperationRequest) -> Response {
        respond(self.delete_icon(request).await)
    }

    async fn create_image(&self, request: OperationRequest) -> Response {
        respond(self.create(request).await)
    }

    async fn add_image_icon(&self, request: OperationRequest) -> Response {
        respond(self.add_icon(request).await)
    }

    async fn add_image_file(&self, request: OperationRequest) -> Response {
        respond(self.add_file(request).await)
    }

    async fn activate_image(&self, request: OperationRequest) -> Response {
        respond(self.activate(request).await)
    }

    async fn update_image(&self, request: OperationRequest) -> Response {
        respond(self.update(request).await)
    }

    async fn disable_image(&self, request: OperationRequest) -> Response {
        respond(self.set_disabled(request, true).await)
    }

    async fn enable_image(&self, request: OperationRequest) -> Response {
        respond(self.set_disabled(request, false).await)
    }
}

// =============================================================================
// Filesystem Helpers
// =============================================================================

/// The UUID an image directory is named after.
///
/// Looks at the raw last segment of the path. `Path::file_name` and
/// `Path::components` drop a trailing `.`, which would make `{datadir}/.`
/// resolve to the data directory itself.
fn image_uuid(dir: &Path) -> Result<Uuid, ApiError> {
    dir.to_str()
        .and_then(|raw| raw.rsplit(std::path::is_separator).next())
        .and_then(|name| Uuid::parse_str(name).ok())
        .ok_or_else(|| {
            ApiError::ResourceNotFound(format!("{} is not an image", dir.display()))
        })
}

fn not_found(uuid: Uuid) -> ApiError {
    ApiError::ResourceNotFound(format!("Image {} does not exist", uuid))
}

fn internal(path: &Path, op: &str, err: std::io::Error) -> ApiError {
    error!(path = %path.display(), "Failed to {} {}: {}", op, path.display(), err);
    ApiError::InternalError(format!("Failed to {} {}: {}", op, path.display(), err))
}

async fn read_manifest(dir: &Path) -> Result<ImageManifest, ApiError> {
    let uuid = image_uuid(dir)?;
    let path = dir.join(MANIFEST_NAME);

    let raw = match tokio::fs::read(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(uuid)),
        Err(e) => return Err(internal(&path, "read", e)),
    };

    serde_json::from_slice(&raw).map_err(|e| {
        error!(path = %path.display(), "Corrupt manifest: {}", e);
        ApiError::InternalError(format!("Corrupt manifest for image {}", uuid))
    })
}

async fn write_manifest(dir: &Path, manifest: &ImageManifest) -> Result<(), ApiError> {
    let raw = serde_json::to_vec_pretty(manifest)
        .map_err(|e| ApiError::InternalError(format!("Failed to encode manifest: {}", e)))?;

    let tmp: PathBuf = dir.join(format!("{}.tmp", MANIFEST_NAME));
    let path = dir.join(MANIFEST_NAME);

    tokio::fs::write(&tmp, raw)
        .await
        .map_err(|e| internal(&tmp, "write", e))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|e| internal(&path, "replace", e))
}

async fn read_blob(dir: &Path, name: &str) -> Result<Vec<u8>, ApiError> {
    let path = dir.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ApiError::ResourceNotFound(format!(
            "{} does not exist",
            name
        ))),
        Err(e) => Err(internal(&path, "read", e)),
    }
}

async fn write_blob(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), ApiError> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| internal(&path, "write", e))
}

async fn remove_blob(dir: &Path, name: &str) -> Result<(), ApiError> {
    let path = dir.join(name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(internal(&path, "remove", e)),
    }
}

//! Image manifest model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::QueryParams;

/// Manifest format version written by this server.
pub const MANIFEST_VERSION: u32 = 2;

/// Fields clients may neither set on creation (except `uuid`) nor update.
pub const IMMUTABLE_FIELDS: &[&str] = &[
    "v",
    "uuid",
    "state",
    "activated",
    "disabled",
    "published_at",
    "files",
    "icon",
    "icon_content_type",
];

/// Lifecycle state of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Unactivated,
    Active,
    Disabled,
}

impl ImageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageState::Unactivated => "unactivated",
            ImageState::Active => "active",
            ImageState::Disabled => "disabled",
        }
    }
}

/// Compression of an uploaded image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    /// Parse the `compression` query parameter.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Compression::None),
            "gzip" => Some(Compression::Gzip),
            "bzip2" => Some(Compression::Bzip2),
            "xz" => Some(Compression::Xz),
            _ => None,
        }
    }
}

/// Metadata of the uploaded image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    /// Hex-encoded SHA-256 of the file contents
    pub sha256: String,

    /// Size in bytes
    pub size: u64,

    #[serde(default)]
    pub compression: Compression,
}

/// The stored description of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageManifest {
    pub v: u32,
    pub uuid: Uuid,
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    pub state: ImageState,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub activated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub files: Vec<ImageFile>,

    #[serde(default)]
    pub icon: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_content_type: Option<String>,

    /// Client supplied fields without special meaning, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageManifest {
    /// Build a new, unactivated manifest from a `CreateImage` request body.
    ///
    /// `uuid` is used when the body does not supply one.
    pub fn from_create_body(body: &[u8], uuid: Uuid) -> Result<Self, ApiError> {
        let mut fields = parse_object(body)?;

        let uuid = match fields.remove("uuid") {
            Some(Value::String(s)) => Uuid::parse_str(&s)
                .map_err(|_| ApiError::InvalidParameter(format!("Invalid uuid \"{}\"", s)))?,
            Some(other) => {
                return Err(ApiError::InvalidParameter(format!(
                    "Invalid uuid {}",
                    other
                )))
            }
            None => uuid,
        };

        reject_immutable(&fields)?;

        let mut object = Map::new();
        object.insert("v".to_string(), Value::from(MANIFEST_VERSION));
        object.insert("uuid".to_string(), Value::String(uuid.to_string()));
        object.insert(
            "state".to_string(),
            Value::String(ImageState::Unactivated.as_str().to_string()),
        );
        object.extend(fields);

        if !matches!(object.get("name"), Some(Value::String(s)) if !s.is_empty()) {
            return Err(ApiError::InvalidParameter(
                "name is required and must be a non-empty string".to_string(),
            ));
        }
        if !matches!(object.get("version"), Some(Value::String(s)) if !s.is_empty()) {
            return Err(ApiError::InvalidParameter(
                "version is required and must be a non-empty string".to_string(),
            ));
        }

        serde_json::from_value(Value::Object(object))
            .map_err(|e| ApiError::InvalidParameter(format!("Invalid manifest: {}", e)))
    }

    /// Merge the fields of an `UpdateImage` request body into the manifest.
    pub fn apply_update(&mut self, body: &[u8]) -> Result<(), ApiError> {
        let fields = parse_object(body)?;
        reject_immutable(&fields)?;

        let mut object = match serde_json::to_value(&*self) {
            Ok(Value::Object(object)) => object,
            _ => {
                return Err(ApiError::InternalError(
                    "Failed to encode manifest".to_string(),
                ))
            }
        };

        for (key, value) in fields {
            object.insert(key, value);
        }

        let updated: ImageManifest = serde_json::from_value(Value::Object(object))
            .map_err(|e| ApiError::InvalidParameter(format!("Invalid manifest: {}", e)))?;

        if updated.name.is_empty() || updated.version.is_empty() {
            return Err(ApiError::InvalidParameter(
                "name and version must be non-empty".to_string(),
            ));
        }

        *self = updated;
        Ok(())
    }

    /// Mark the image as activated and published at `now`.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), ApiError> {
        if self.activated {
            return Err(ApiError::InvalidParameter(format!(
                "Image {} is already activated",
                self.uuid
            )));
        }
        if self.files.is_empty() {
            return Err(ApiError::InvalidParameter(format!(
                "Image {} has no file",
                self.uuid
            )));
        }

        self.activated = true;
        self.published_at = Some(now);
        self.refresh_state();
        Ok(())
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        self.state = if self.disabled {
            ImageState::Disabled
        } else if self.activated {
            ImageState::Active
        } else {
            ImageState::Unactivated
        };
    }
}

/// Filters accepted by `GET /images`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub name: Option<String>,
    pub version: Option<String>,
    pub os: Option<String>,
    pub image_type: Option<String>,
    pub state: Option<ImageState>,
}

impl ListFilter {
    /// Build the filter from query parameters.
    ///
    /// `state=all` (or no `state`) disables state filtering.
    pub fn from_params(params: &QueryParams) -> Result<Self, ApiError> {
        let state = match params.first("state") {
            None | Some("all") => None,
            Some("active") => Some(ImageState::Active),
            Some("disabled") => Some(ImageState::Disabled),
            Some("unactivated") => Some(ImageState::Unactivated),
            Some(other) => {
                return Err(ApiError::InvalidParameter(format!(
                    "Invalid state \"{}\"",
                    other
                )))
            }
        };

        Ok(Self {
            name: params.first("name").map(str::to_string),
            version: params.first("version").map(str::to_string),
            os: params.first("os").map(str::to_string),
            image_type: params.first("type").map(str::to_string),
            state,
        })
    }

    pub fn matches(&self, manifest: &ImageManifest) -> bool {
        fn field_matches(wanted: &Option<String>, actual: Option<&str>) -> bool {
            wanted.as_deref().map_or(true, |w| actual == Some(w))
        }

        field_matches(&self.name, Some(&manifest.name))
            && field_matches(&self.version, Some(&manifest.version))
            && field_matches(&self.os, manifest.os.as_deref())
            && field_matches(&self.image_type, manifest.image_type.as_deref())
            && self.state.map_or(true, |s| s == manifest.state)
    }
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ApiError::InvalidParameter(
            "Request body must be a JSON object".to_string(),
        )),
        Err(e) => Err(ApiError::InvalidParameter(format!(
            "Failed to parse request body: {}",
            e
        ))),
    }
}

fn reject_immutable(fields: &Map<String, Value>) -> Result<(), ApiError> {
    match fields.keys().find(|k| IMMUTABLE_FIELDS.contains(&k.as_str())) {
        Some(key) => Err(ApiError::InvalidParameter(format!(
            "Field \"{}\" cannot be set",
            key
        ))),
        None => Ok(()),
    }
}

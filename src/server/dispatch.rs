//! Request dispatch for everything below `/images`.
//!
//! Each request runs through the same fixed sequence and stops at the first
//! failure, producing exactly one response:
//!
//! ```text
//! authenticate ─► parse query ─► branch on method
//!                                 │
//!        GET ─────────────────────┤ (anonymous allowed)
//!        DELETE / POST / PUT ─────┤ (401 without body unless authenticated)
//!                                 ▼
//!                        parse /images/{uuid}{tag}
//!                                 ▼
//!                  POST with no tag: resolve ?action=
//!                                 ▼
//!                        ImageOperations method
//! ```
//!
//! # Routes
//!
//! | Method | Path                               | Operation                   |
//! |--------|------------------------------------|-----------------------------|
//! | GET    | `/images`                          | list_images                 |
//! | GET    | `/images/{uuid}`                   | get_image                   |
//! | GET    | `/images/{uuid}/icon`              | get_image_icon              |
//! | GET    | `/images/{uuid}/file`              | get_image_file              |
//! | DELETE | `/images/{uuid}`                   | delete_image                |
//! | DELETE | `/images/{uuid}/icon`              | delete_image_icon           |
//! | POST   | `/images`                          | create_image                |
//! | POST   | `/images/{uuid}/icon`              | add_image_icon              |
//! | POST   | `/images/{uuid}/acl`               | not implemented             |
//! | POST   | `/images/{uuid}?action=...`        | see [`Action`]              |
//! | PUT    | `/images/{uuid}/file`              | add_image_file              |

use std::io::ErrorKind;
use std::path::PathBuf;

use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::debug;

use crate::config::ServerContext;
use crate::error::ApiError;
use crate::store::{ImageOperations, OperationRequest};

use super::auth::{authenticate, BasicAuth, Credentials};
use super::envelope;
use super::handlers::{AppState, QueryParams};
use super::resource::{self, SubResource, IMAGES_COLLECTION};

// =============================================================================
// Actions
// =============================================================================

/// Named operations selected by `POST /images/{uuid}?action=<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Activate,
    Update,
    Disable,
    Enable,
    Export,
    CopyRemote,
    ImportRemote,
    Import,
    ChannelAdd,
}

impl Action {
    /// Every action, in protocol order.
    pub const ALL: [Action; 9] = [
        Action::Activate,
        Action::Update,
        Action::Disable,
        Action::Enable,
        Action::Export,
        Action::CopyRemote,
        Action::ImportRemote,
        Action::Import,
        Action::ChannelAdd,
    ];

    /// The wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Activate => "activate",
            Action::Update => "update",
            Action::Disable => "disable",
            Action::Enable => "enable",
            Action::Export => "export",
            Action::CopyRemote => "copy-remote",
            Action::ImportRemote => "import-remote",
            Action::Import => "import",
            Action::ChannelAdd => "channel-add",
        }
    }

    /// Look up an action by its exact, case-sensitive wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

/// Pick the action named by the first `action` query parameter.
pub fn resolve_action(params: &QueryParams) -> Result<Action, ApiError> {
    let name = params.first("action").ok_or_else(|| {
        ApiError::InvalidParameter("action parameter not specified".to_string())
    })?;

    Action::from_name(name)
        .ok_or_else(|| ApiError::InvalidParameter(format!("Invalid action \"{}\"", name)))
}

// =============================================================================
// Request
// =============================================================================

/// The parts of an inbound request the dispatcher looks at.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub method: Method,
    pub uri: Uri,
    pub credentials: Option<Credentials>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Axum handler for `/images` and everything below it.
pub async fn images_handler<O: ImageOperations + 'static>(
    State(state): State<AppState<O>>,
    method: Method,
    uri: Uri,
    BasicAuth(credentials): BasicAuth,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = ImageRequest {
        method,
        uri,
        credentials,
        headers,
        body,
    };
    dispatch(&state.context, state.operations.as_ref(), request).await
}

/// Route one request to its operation.
pub async fn dispatch<O>(context: &ServerContext, operations: &O, request: ImageRequest) -> Response
where
    O: ImageOperations + ?Sized,
{
    let auth = match authenticate(request.credentials.as_ref(), context.userdb()) {
        Ok(auth) => auth,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let params = match QueryParams::parse(request.uri.query().unwrap_or("")) {
        Ok(params) => params,
        Err(e) => return e.into_response(),
    };

    let path = match urlencoding::decode(request.uri.path()) {
        Ok(path) => path.into_owned(),
        Err(_) => {
            return ApiError::InvalidParameter("Failed to decode URL".to_string()).into_response()
        }
    };

    debug!(
        method = %request.method,
        path = %path,
        user = %auth.username,
        "Dispatching image request"
    );

    let routed = Routed {
        context,
        operations,
        path,
        params,
        headers: request.headers,
        body: request.body,
    };

    let method = request.method;
    let result = if method == Method::GET {
        routed.get().await
    } else if method == Method::DELETE || method == Method::POST || method == Method::PUT {
        if !auth.authenticated {
            return envelope::send(StatusCode::UNAUTHORIZED, None);
        }
        match method {
            Method::DELETE => routed.delete().await,
            Method::POST => routed.post().await,
            _ => routed.put().await,
        }
    } else {
        return envelope::send(StatusCode::METHOD_NOT_ALLOWED, None);
    };

    result.unwrap_or_else(IntoResponse::into_response)
}

/// A request that passed authentication, ready for method routing.
struct Routed<'a, O: ?Sized> {
    context: &'a ServerContext,
    operations: &'a O,
    path: String,
    params: QueryParams,
    headers: HeaderMap,
    body: Bytes,
}

impl<'a, O: ImageOperations + ?Sized> Routed<'a, O> {
    fn into_request(self, target: PathBuf) -> OperationRequest {
        OperationRequest {
            target,
            params: self.params,
            headers: self.headers,
            body: self.body,
        }
    }

    fn parse(&self, message: &str) -> Result<resource::ParsedResource, ApiError> {
        resource::parse(&self.path).map_err(|_| ApiError::InvalidParameter(message.to_string()))
    }

    async fn get(self) -> Result<Response, ApiError> {
        let operations = self.operations;

        if self.path == IMAGES_COLLECTION {
            let target = self.context.datadir().to_path_buf();
            return Ok(operations.list_images(self.into_request(target)).await);
        }

        let resource = self.parse("Invalid url")?;
        let target = self.context.image_path(&resource.uuid);

        // An existing path is reported as missing. Clients depend on this
        // exact behaviour, so it must not be flipped.
        if tokio::fs::metadata(&target).await.is_ok() {
            return Err(ApiError::ResourceNotFound(format!(
                "Failed to locate {}",
                target.display()
            )));
        }

        let response = match resource.subresource() {
            SubResource::Manifest => operations.get_image(self.into_request(target)).await,
            SubResource::Icon => operations.get_image_icon(self.into_request(target)).await,
            SubResource::File => operations.get_image_file(self.into_request(target)).await,
            SubResource::Acl | SubResource::Other(_) => {
                return Err(ApiError::ResourceNotFound(
                    "Requested resource does not exist".to_string(),
                ))
            }
        };
        Ok(response)
    }

    async fn delete(self) -> Result<Response, ApiError> {
        let operations = self.operations;
        let resource = self.parse("Failed to decode URL")?;
        let target = self.context.image_path(&resource.uuid);

        let response = match resource.subresource() {
            SubResource::Manifest => operations.delete_image(self.into_request(target)).await,
            SubResource::Icon => operations.delete_image_icon(self.into_request(target)).await,
            SubResource::File | SubResource::Acl | SubResource::Other(_) => {
                return Err(ApiError::ResourceNotFound(
                    "Resource does not exist".to_string(),
                ))
            }
        };
        Ok(response)
    }

    async fn post(self) -> Result<Response, ApiError> {
        let operations = self.operations;

        if self.path == IMAGES_COLLECTION {
            let target = self.context.datadir().to_path_buf();
            return Ok(operations.create_image(self.into_request(target)).await);
        }

        let resource = self.parse("Failed to decode URL")?;
        let target = self.context.image_path(&resource.uuid);

        if let Err(e) = tokio::fs::metadata(&target).await {
            return Err(if e.kind() == ErrorKind::NotFound {
                ApiError::ResourceNotFound("Failed to locate resource".to_string())
            } else {
                ApiError::InternalError(format!("Failed to locate resource {}", e))
            });
        }

        let response = match resource.subresource() {
            SubResource::Icon => operations.add_image_icon(self.into_request(target)).await,
            SubResource::Acl => {
                return Err(ApiError::InsufficientServerVersion(
                    "acl is not implemented".to_string(),
                ))
            }
            SubResource::Manifest => {
                let action = resolve_action(&self.params)?;
                let request = self.into_request(target);
                match action {
                    Action::Activate => operations.activate_image(request).await,
                    Action::Update => operations.update_image(request).await,
                    Action::Disable => operations.disable_image(request).await,
                    Action::Enable => operations.enable_image(request).await,
                    Action::Export
                    | Action::CopyRemote
                    | Action::ImportRemote
                    | Action::Import
                    | Action::ChannelAdd => {
                        return Err(ApiError::InsufficientServerVersion(format!(
                            "action=\"{}\" is not implemented",
                            action.as_str()
                        )))
                    }
                }
            }
            SubResource::File | SubResource::Other(_) => {
                return Err(ApiError::ResourceNotFound(
                    "Invalid URL specified".to_string(),
                ))
            }
        };
        Ok(response)
    }

    async fn put(self) -> Result<Response, ApiError> {
        let resource = match resource::parse(&self.path) {
            Ok(resource) if resource.subresource() == SubResource::File => resource,
            _ => return Err(ApiError::InvalidParameter("Failed to decode URL".to_string())),
        };

        let operations = self.operations;
        let target = self.context.image_path(&resource.uuid);
        Ok(operations.add_image_file(self.into_request(target)).await)
    }
}

// =============================================================================
// Tests
// =============================================================================

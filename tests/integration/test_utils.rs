//! Test utilities for integration tests.
//!
//! Provides a recording implementation of [`ImageOperations`] and helpers
//! for sending requests through the router.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use imgapi::server::envelope;
use imgapi::{
    create_router, Channel, Credentials, ImageOperations, OperationRequest, RouterConfig,
    ServerContext, UserEntry,
};

pub const IMAGE_UUID: &str = "2b9a5e16-0e0b-4a7c-8f5a-1d3c9e7b6a42";

// =============================================================================
// Recording Operations
// =============================================================================

/// Records every operation call and answers with `{"operation": <name>}`.
#[derive(Clone, Default)]
pub struct RecordingOperations {
    calls: Arc<Mutex<Vec<(&'static str, OperationRequest)>>>,
}

impl RecordingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    pub fn last_request(&self) -> Option<OperationRequest> {
        self.calls.lock().unwrap().last().map(|(_, r)| r.clone())
    }

    fn record(&self, name: &'static str, request: OperationRequest) -> Response {
        self.calls.lock().unwrap().push((name, request));
        envelope::send(StatusCode::OK, Some(json!({ "operation": name })))
    }
}

#[async_trait]
impl ImageOperations for RecordingOperations {
    async fn list_images(&self, request: OperationRequest) -> Response {
        self.record("list_images", request)
    }

    async fn get_image(&self, request: OperationRequest) -> Response {
        self.record("get_image", request)
    }

    async fn get_image_icon(&self, request: OperationRequest) -> Response {
        self.record("get_image_icon", request)
    }

    async fn get_image_file(&self, request: OperationRequest) -> Response {
        self.record("get_image_file", request)
    }

    async fn delete_image(&self, request: OperationRequest) -> Response {
        self.record("delete_image", request)
    }

    async fn delete_image_icon(&self, request: OperationRequest) -> Response {
        self.record("delete_image_icon", request)
    }

    async fn create_image(&self, request: OperationRequest) -> Response {
        self.record("create_image", request)
    }

    async fn add_image_icon(&self, request: OperationRequest) -> Response {
        self.record("add_image_icon", request)
    }

    async fn add_image_file(&self, request: OperationRequest) -> Response {
        self.record("add_image_file", request)
    }

    async fn activate_image(&self, request: OperationRequest) -> Response {
        self.record("activate_image", request)
    }

    async fn update_image(&self, request: OperationRequest) -> Response {
        self.record("update_image", request)
    }

    async fn disable_image(&self, request: OperationRequest) -> Response {
        self.record("disable_image", request)
    }

    async fn enable_image(&self, request: OperationRequest) -> Response {
        self.record("enable_image", request)
    }
}

// =============================================================================
// Test Server
// =============================================================================

pub fn test_users() -> Vec<UserEntry> {
    vec![
        UserEntry::new("admin", "secret"),
        UserEntry::new("a", "1"),
        UserEntry::new("a", "2"),
    ]
}

pub fn admin() -> Option<Credentials> {
    Some(Credentials::new("admin", "secret"))
}

/// A router over a temporary data directory.
pub struct TestServer<O> {
    pub datadir: TempDir,
    pub operations: O,
    pub router: Router,
}

impl TestServer<RecordingOperations> {
    pub fn recording() -> Self {
        Self::with_operations(RecordingOperations::new())
    }
}

impl<O: ImageOperations + Clone + 'static> TestServer<O> {
    pub fn with_operations(operations: O) -> Self {
        let datadir = tempfile::tempdir().unwrap();
        let context = ServerContext::new(datadir.path())
            .with_users(test_users())
            .with_channels(vec![Channel {
                name: "release".to_string(),
                description: "Released images".to_string(),
                default: true,
            }]);
        let router = create_router(
            context,
            operations.clone(),
            RouterConfig::default().with_tracing(false),
        );

        Self {
            datadir,
            operations,
            router,
        }
    }

    pub fn datadir(&self) -> &Path {
        self.datadir.path()
    }

    /// Create `{datadir}/{uuid}` so the path exists on disk.
    pub fn create_image_dir(&self, uuid: &str) {
        std::fs::create_dir(self.datadir().join(uuid)).unwrap();
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        credentials: Option<Credentials>,
        body: impl Into<Body>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(credentials) = credentials {
            builder = builder.header(header::AUTHORIZATION, credentials.to_header_value());
        }
        let request = builder.body(body.into()).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        TestResponse::from_response(response).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None, Body::empty()).await
    }
}

// =============================================================================
// Responses
// =============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// Assert an error envelope with the given code and return its message.
    pub fn assert_error(&self, code: &str) -> String {
        let body = self.json();
        let object = body.as_object().expect("error body must be an object");
        assert_eq!(object.len(), 2, "error body must carry exactly code and message");
        assert_eq!(object["code"], code, "unexpected body {}", body);
        object["message"].as_str().unwrap().to_string()
    }
}

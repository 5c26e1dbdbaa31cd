//! Dispatch integration tests.
//!
//! Tests verify:
//! - Each method/path/action reaches exactly the expected operation
//! - Routing failures produce the documented error codes
//! - Operations receive the resolved filesystem target and parameters

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use tower::ServiceExt;

use imgapi::server::SERVER_NAME;
use imgapi::{create_router, RouterConfig, ServerContext};

use super::test_utils::{
    admin, test_users, RecordingOperations, TestResponse, TestServer, IMAGE_UUID,
};

// =============================================================================
// GET
// =============================================================================

#[tokio::test]
async fn test_anonymous_list_reaches_list_operation() {
    let server = TestServer::recording();

    let response = server.get("/images").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["operation"], "list_images");
    assert_eq!(server.operations.calls(), ["list_images"]);

    let request = server.operations.last_request().unwrap();
    assert_eq!(request.target, server.datadir());
}

#[tokio::test]
async fn test_list_receives_query_parameters() {
    let server = TestServer::recording();

    server.get("/images?name=base&state=all").await;
    let request = server.operations.last_request().unwrap();
    assert_eq!(request.params.first("name"), Some("base"));
    assert_eq!(request.params.first("state"), Some("all"));
}

#[tokio::test]
async fn test_get_subresources_of_absent_path() {
    let server = TestServer::recording();

    for (uri, operation) in [
        (format!("/images/{}", IMAGE_UUID), "get_image"),
        (format!("/images/{}/icon", IMAGE_UUID), "get_image_icon"),
        (format!("/images/{}/file", IMAGE_UUID), "get_image_file"),
    ] {
        let response = server.get(&uri).await;
        assert_eq!(response.status, StatusCode::OK, "uri {}", uri);
        assert_eq!(response.json()["operation"], operation);

        let request = server.operations.last_request().unwrap();
        assert_eq!(request.target, server.datadir().join(IMAGE_UUID));
    }

    assert_eq!(
        server.operations.calls(),
        ["get_image", "get_image_icon", "get_image_file"]
    );
}

#[tokio::test]
async fn test_get_existing_path_is_not_found() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    for uri in [
        format!("/images/{}", IMAGE_UUID),
        format!("/images/{}/file", IMAGE_UUID),
        format!("/images/{}/icon", IMAGE_UUID),
    ] {
        let response = server.get(&uri).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        response.assert_error("ResourceNotFound");
    }

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_get_unknown_subresource_is_not_found() {
    let server = TestServer::recording();

    for tag in ["acl", "bogus", "file/extra"] {
        let response = server.get(&format!("/images/{}/{}", IMAGE_UUID, tag)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let message = response.assert_error("ResourceNotFound");
        assert_eq!(message, "Requested resource does not exist");
    }

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_get_with_empty_uuid_is_invalid_parameter() {
    let server = TestServer::recording();

    let response = server.get("/images/").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    response.assert_error("InvalidParameter");
    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_percent_encoded_path_is_decoded() {
    let server = TestServer::recording();

    server.get("/images/my%20image").await;
    let request = server.operations.last_request().unwrap();
    assert_eq!(request.target, server.datadir().join("my image"));
}

// =============================================================================
// DELETE
// =============================================================================

#[tokio::test]
async fn test_delete_routes() {
    let server = TestServer::recording();

    let response = server
        .send(
            Method::DELETE,
            &format!("/images/{}", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(response.json()["operation"], "delete_image");

    let response = server
        .send(
            Method::DELETE,
            &format!("/images/{}/icon", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(response.json()["operation"], "delete_image_icon");

    assert_eq!(server.operations.calls(), ["delete_image", "delete_image_icon"]);
}

#[tokio::test]
async fn test_delete_acl_is_not_found() {
    let server = TestServer::recording();

    for tag in ["acl", "file", "other"] {
        let response = server
            .send(
                Method::DELETE,
                &format!("/images/{}/{}", IMAGE_UUID, tag),
                admin(),
                Body::empty(),
            )
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        response.assert_error("ResourceNotFound");
    }

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_delete_collection_is_invalid_parameter() {
    let server = TestServer::recording();

    let response = server
        .send(Method::DELETE, "/images", admin(), Body::empty())
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.assert_error("InvalidParameter"), "Failed to decode URL");
}

// =============================================================================
// POST
// =============================================================================

#[tokio::test]
async fn test_post_collection_creates_image() {
    let server = TestServer::recording();

    let response = server
        .send(Method::POST, "/images", admin(), r#"{"name": "base"}"#)
        .await;
    assert_eq!(response.json()["operation"], "create_image");

    let request = server.operations.last_request().unwrap();
    assert_eq!(request.target, server.datadir());
    assert_eq!(&request.body[..], br#"{"name": "base"}"#);
}

#[tokio::test]
async fn test_post_activate_dispatches_once() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    let response = server
        .send(
            Method::POST,
            &format!("/images/{}?action=activate", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(server.operations.calls(), ["activate_image"]);

    let request = server.operations.last_request().unwrap();
    assert_eq!(request.target, server.datadir().join(IMAGE_UUID));
}

#[tokio::test]
async fn test_post_implemented_actions() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    for action in ["activate", "update", "disable", "enable"] {
        server
            .send(
                Method::POST,
                &format!("/images/{}?action={}", IMAGE_UUID, action),
                admin(),
                Body::empty(),
            )
            .await;
    }

    assert_eq!(
        server.operations.calls(),
        ["activate_image", "update_image", "disable_image", "enable_image"]
    );
}

#[tokio::test]
async fn test_post_first_action_value_wins() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    server
        .send(
            Method::POST,
            &format!("/images/{}?action=disable&action=enable", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(server.operations.calls(), ["disable_image"]);
}

#[tokio::test]
async fn test_post_unimplemented_actions() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    for action in ["export", "copy-remote", "import-remote", "import", "channel-add"] {
        let response = server
            .send(
                Method::POST,
                &format!("/images/{}?action={}", IMAGE_UUID, action),
                admin(),
                Body::empty(),
            )
            .await;
        assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
        let message = response.assert_error("InsufficientServerVersion");
        assert!(message.contains(action), "message {:?}", message);
    }

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_post_unknown_action() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    let response = server
        .send(
            Method::POST,
            &format!("/images/{}?action=bogus", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let message = response.assert_error("InvalidParameter");
    assert!(message.contains("bogus"));

    // Matching is case-sensitive
    let response = server
        .send(
            Method::POST,
            &format!("/images/{}?action=Activate", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    response.assert_error("InvalidParameter");

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_post_missing_action() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    let response = server
        .send(
            Method::POST,
            &format!("/images/{}", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(
        response.assert_error("InvalidParameter"),
        "action parameter not specified"
    );
}

#[tokio::test]
async fn test_post_to_absent_image_is_not_found() {
    let server = TestServer::recording();

    for uri in [
        format!("/images/{}?action=activate", IMAGE_UUID),
        format!("/images/{}/icon", IMAGE_UUID),
        format!("/images/{}/acl", IMAGE_UUID),
    ] {
        let response = server.send(Method::POST, &uri, admin(), Body::empty()).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.assert_error("ResourceNotFound"),
            "Failed to locate resource"
        );
    }

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_post_lookup_failure_is_internal_error() {
    // A data directory that is a regular file makes every lookup below it
    // fail with something other than "not found"
    let datafile = tempfile::NamedTempFile::new().unwrap();
    let operations = RecordingOperations::new();
    let router = create_router(
        ServerContext::new(datafile.path()).with_users(test_users()),
        operations.clone(),
        RouterConfig::default().with_tracing(false),
    );

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/images/{}?action=activate", IMAGE_UUID))
        .header(header::AUTHORIZATION, admin().unwrap().to_header_value())
        .body(Body::empty())
        .unwrap();
    let response = TestResponse::from_response(router.oneshot(request).await.unwrap()).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = response.assert_error("InternalError");
    assert!(message.starts_with("Failed to locate resource"), "message {:?}", message);
    assert!(operations.calls().is_empty());
}

#[tokio::test]
async fn test_post_subresources() {
    let server = TestServer::recording();
    server.create_image_dir(IMAGE_UUID);

    let response = server
        .send(
            Method::POST,
            &format!("/images/{}/icon", IMAGE_UUID),
            admin(),
            vec![1u8, 2, 3],
        )
        .await;
    assert_eq!(response.json()["operation"], "add_image_icon");

    let response = server
        .send(
            Method::POST,
            &format!("/images/{}/acl?action=add", IMAGE_UUID),
            admin(),
            Body::empty(),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        response.assert_error("InsufficientServerVersion"),
        "acl is not implemented"
    );

    for tag in ["file", "other"] {
        let response = server
            .send(
                Method::POST,
                &format!("/images/{}/{}", IMAGE_UUID, tag),
                admin(),
                Body::empty(),
            )
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        response.assert_error("ResourceNotFound");
    }

    assert_eq!(server.operations.calls(), ["add_image_icon"]);
}

// =============================================================================
// PUT
// =============================================================================

#[tokio::test]
async fn test_put_file_dispatches_add_file() {
    let server = TestServer::recording();

    let response = server
        .send(
            Method::PUT,
            &format!("/images/{}/file?compression=gzip", IMAGE_UUID),
            admin(),
            "payload",
        )
        .await;
    assert_eq!(response.json()["operation"], "add_image_file");

    let request = server.operations.last_request().unwrap();
    assert_eq!(request.target, server.datadir().join(IMAGE_UUID));
    assert_eq!(request.params.first("compression"), Some("gzip"));
    assert_eq!(&request.body[..], b"payload");
}

#[tokio::test]
async fn test_put_wrong_subresource_is_invalid_parameter() {
    let server = TestServer::recording();

    for uri in [
        format!("/images/{}/icon", IMAGE_UUID),
        format!("/images/{}", IMAGE_UUID),
        format!("/images/{}/file/extra", IMAGE_UUID),
        "/images".to_string(),
    ] {
        let response = server.send(Method::PUT, &uri, admin(), "x").await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY, "uri {}", uri);
        response.assert_error("InvalidParameter");
    }

    assert!(server.operations.calls().is_empty());
}

// =============================================================================
// Envelope and Misc
// =============================================================================

#[tokio::test]
async fn test_malformed_query_is_internal_error() {
    let server = TestServer::recording();

    let response = server.get("/images?name=%zz").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.assert_error("InternalError"), "Failed to parse query");
    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_unsupported_method() {
    let server = TestServer::recording();

    let response = server
        .send(Method::PATCH, "/images", admin(), Body::empty())
        .await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(response.body.is_empty());
    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_error_responses_carry_server_header_and_json() {
    let server = TestServer::recording();

    let response = server.get("/images/").await;
    assert_eq!(response.headers.get(header::SERVER).unwrap(), SERVER_NAME);
    assert_eq!(
        response.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/json; charset=utf-8"
    );
    // Indented
    assert!(std::str::from_utf8(&response.body).unwrap().contains("\n  "));
}

#[tokio::test]
async fn test_ping_and_channels() {
    let server = TestServer::recording();

    let response = server.get("/ping").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["ping"], "pong");

    let response = server.get("/channels").await;
    assert_eq!(response.status, StatusCode::OK);
    let channels = response.json();
    assert_eq!(channels[0]["name"], "release");
    assert_eq!(channels[0]["default"], true);

    assert!(server.operations.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_path_uses_envelope() {
    let server = TestServer::recording();

    let response = server.get("/nothing/here").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    response.assert_error("ResourceNotFound");
}

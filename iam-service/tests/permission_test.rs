mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{profile, TestApp, TENANT_HEADER};
use iam_service::services::MockIdentityProvider;
use serde_json::json;

fn app() -> TestApp {
    TestApp::spawn(
        MockIdentityProvider::new()
            .with_profile("alice", profile("ext-alice", Some("alice@example.com"), None))
            .with_profile("bob", profile("ext-bob", None, Some("+1666"))),
    )
}

fn doc_read() -> serde_json::Value {
    json!({"namespace": "document", "relation": "read", "object": "doc:42"})
}

#[tokio::test]
async fn denied_check_returns_reason() {
    let app = app();

    let (status, body) = app.check("alice", doc_read()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"allowed": false, "reason": "Permission denied by policy"})
    );
}

#[tokio::test]
async fn created_tuple_allows_check_without_reason() {
    let app = app();

    let (status, body) = app.create_tuple("alice", doc_read()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Relation tuple created successfully");

    let (status, body) = app.check("alice", doc_read()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"allowed": true}));
}

#[tokio::test]
async fn repeated_create_is_idempotent() {
    let app = app();

    for _ in 0..2 {
        let (status, _) = app.create_tuple("alice", doc_read()).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app.check("alice", doc_read()).await;
        assert_eq!(body["allowed"], true);
    }

    assert_eq!(app.engine.tuples().len(), 1);
}

#[tokio::test]
async fn tuples_are_scoped_to_the_caller_and_tenant() {
    let app = app();
    app.create_tuple("alice", doc_read()).await;

    let (_, body) = app.check("bob", doc_read()).await;
    assert_eq!(body["allowed"], false);

    let tuples = app.engine.tuples();
    assert_eq!(tuples.len(), 1);
    let tuple = &tuples[0];
    let tenant_prefix = format!("{}/", app.tenant.tenant_id);
    assert_eq!(tuple.object, format!("{}doc:42", tenant_prefix));
    assert!(tuple.subject_id.starts_with(&tenant_prefix));
}

#[tokio::test]
async fn empty_object_is_rejected_before_the_engine() {
    // Arrange
    let app = app();

    // Act
    let (status, body) = app
        .create_tuple(
            "alice",
            json!({"namespace": "document", "relation": "read", "object": ""}),
        )
        .await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MSG_INVALID_PAYLOAD");
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn every_empty_field_is_rejected_on_check() {
    let app = app();

    for field in ["namespace", "relation", "object"] {
        let mut payload = doc_read();
        payload[field] = json!("");

        let (status, body) = app.check("alice", payload).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "empty {}", field);
        assert_eq!(body["code"], "MSG_INVALID_PAYLOAD");
    }

    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_invalid_payload() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/permissions/check")
        .header(TENANT_HEADER, app.tenant.tenant_id.to_string())
        .header(header::AUTHORIZATION, "Bearer alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"namespace\": \"document\""))
        .unwrap();

    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MSG_INVALID_PAYLOAD");
    assert_eq!(body["message"], "Invalid request payload");
    assert!(body["details"].is_string());
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn missing_field_is_invalid_payload() {
    let app = app();

    let (status, body) = app
        .create_tuple("alice", json!({"namespace": "document", "relation": "read"}))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MSG_INVALID_PAYLOAD");
}

#[tokio::test]
async fn engine_failure_on_check_is_reported() {
    let app = app();
    app.engine.set_unavailable(true);

    let (status, body) = app.check("alice", doc_read()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "MSG_PERMISSION_CHECK_FAILED");
    assert_eq!(body["message"], "failed to check permission");
}

#[tokio::test]
async fn engine_failure_on_create_is_reported() {
    let app = app();
    app.engine.set_unavailable(true);

    let (status, body) = app.create_tuple("alice", doc_read()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "MSG_RELATION_TUPLE_CREATE_FAILED");
    assert_eq!(body["message"], "failed to create relation tuple");
}

#[tokio::test]
async fn delete_revokes_a_granted_tuple() {
    let app = app();
    app.create_tuple("alice", doc_read()).await;

    let (status, body) = app
        .send(app.request(
            Method::DELETE,
            "/api/v1/permissions/relation-tuples",
            Some("Bearer alice"),
            Some(doc_read()),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Relation tuple deleted successfully");

    let (_, body) = app.check("alice", doc_read()).await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn engine_failure_on_delete_is_reported() {
    let app = app();
    app.engine.set_unavailable(true);

    let (status, body) = app
        .send(app.request(
            Method::DELETE,
            "/api/v1/permissions/relation-tuples",
            Some("Bearer alice"),
            Some(doc_read()),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "MSG_RELATION_TUPLE_DELETE_FAILED");
}

/// Common test utilities for Smart Student integration tests
///
/// This file contains shared functions for all integration tests: building
/// the application over a fresh database, sending requests through the
/// router, and creating the roster records most tests start from.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use smart_student::{create_app, db::init_pool, run_migrations, AppState};
use std::sync::Arc;
use tower::ServiceExt;

/// Creates a test application over its own in-memory SQLite database
///
/// Every pooled connection must see the same database, so the database is a
/// uniquely named shared-cache memory file rather than plain `:memory:`.
pub fn create_test_app() -> Router {
    let database_url = format!("file:it_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
    let pool = init_pool(&database_url).expect("Failed to create pool");

    let mut conn = pool.get().expect("Failed to get connection");
    run_migrations(&mut conn).expect("Failed to run migrations");
    drop(conn);

    create_app(AppState::new(Arc::new(pool)))
}

/// Sends a request with an optional JSON body and decodes the JSON reply
///
/// An empty reply body (e.g. 204) decodes as `Value::Null`.
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Sends a request with a plain text body and returns the reply as text
///
/// Also returns the reply's content type, empty when absent.
pub async fn send_text(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
}

/// Creates a course and returns its JSON
pub async fn create_course(app: &Router, name: &str) -> Value {
    let (status, course) = send(app, "POST", "/courses", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK, "creating course {}: {}", name, course);
    course
}

/// Creates a section in a course and returns its JSON
pub async fn create_section(app: &Router, course_id: &str, name: &str) -> Value {
    let uri = format!("/courses/{}/sections", course_id);
    let (status, section) = send(app, "POST", &uri, Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK, "creating section {}: {}", name, section);
    section
}

/// Creates a user with the given role and returns its JSON
pub async fn create_user(app: &Router, username: &str, role: &str) -> Value {
    let body = json!({
        "username": username,
        "password": "secret",
        "role": role,
        "display_name": format!("User {}", username),
    });
    let (status, user) = send(app, "POST", "/users", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "creating user {}: {}", username, user);
    user
}

/// Assigns a student to a course-section and returns the assignment JSON
pub async fn assign(app: &Router, student_id: &str, course_id: &str, section_id: &str) -> Value {
    let body = json!({
        "student_id": student_id,
        "course_id": course_id,
        "section_id": section_id,
    });
    let (status, assignment) = send(app, "POST", "/assignments", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "assigning {}: {}", student_id, assignment);
    assignment
}

/// Returns the `id` field of a JSON record
pub fn id(value: &Value) -> String {
    value["id"].as_str().expect("record has no id").to_string()
}

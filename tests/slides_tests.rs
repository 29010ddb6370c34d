/// Integration tests for slides and image search without provider keys
///
/// No test here reaches the network: without a Gemini key the slides come
/// from templates, and without image keys every image is a placeholder URL.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use smart_student::images::FALLBACK_IMAGE_BASE;

#[tokio::test]
async fn test_generate_slides_without_key_uses_templates() {
    let app = create_test_app();

    let body = json!({ "topic": "Revolución Francesa", "subject": "Historia", "slideCount": 6 });
    let (status, response) = send(&app, "POST", "/slides/generate", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["source"], "mock");
    assert_eq!(response["generated"], true);
    let slides = response["slides"].as_array().unwrap();
    assert_eq!(slides.len(), 6);
    assert_eq!(slides[0]["title"], "Revolución Francesa: Contexto histórico");
    for slide in slides {
        assert!(slide["image_url"].as_str().unwrap().starts_with(FALLBACK_IMAGE_BASE));
        assert_eq!(slide["content"].as_array().unwrap().len(), 4);
    }
}

#[tokio::test]
async fn test_generate_slides_in_english() {
    let app = create_test_app();

    let body = json!({ "topic": "Fractions", "subject": "Matemáticas", "slide_count": 1, "language": "en" });
    let (status, response) = send(&app, "POST", "/slides/generate", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["slides"][0]["title"], "Fractions: Definition");
}

#[tokio::test]
async fn test_generate_slides_rejects_bad_requests() {
    let app = create_test_app();

    for body in [
        json!({ "topic": "Volcanes", "subject": "Ciencias", "slideCount": 0 }),
        json!({ "topic": "Volcanes", "subject": "Ciencias", "slideCount": 31 }),
        json!({ "topic": "", "subject": "Ciencias", "slideCount": 3 }),
        json!({ "topic": "Volcanes", "subject": " ", "slideCount": 3 }),
    ] {
        let (status, response) = send(&app, "POST", "/slides/generate", Some(body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {}", body);
        assert!(response["error"].is_string());
    }
}

#[tokio::test]
async fn test_image_search_without_keys_returns_distinct_placeholders() {
    let app = create_test_app();

    let (status, response) = send(&app, "GET", "/images/search?topic=Volcanes&subject=Ciencias&n=4", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["count"], 4);
    let urls: Vec<&str> = response["urls"].as_array().unwrap().iter().map(|u| u.as_str().unwrap()).collect();
    assert_eq!(urls.len(), 4);
    let mut distinct = urls.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 4);
    assert!(urls.iter().all(|u| u.contains("volcanes")));
}

#[tokio::test]
async fn test_image_search_clamps_count_and_requires_topic() {
    let app = create_test_app();

    let (status, response) = send(&app, "GET", "/images/search?topic=Volcanes&n=99&ai=gemini", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["count"], 30);

    let (status, _) = send(&app, "GET", "/images/search?subject=Ciencias", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

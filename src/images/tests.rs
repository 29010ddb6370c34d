use super::*;
use axum::{Json, Router, http::StatusCode, routing::get};
use serde_json::json;

fn keys(pexels: Option<&str>, unsplash: Option<&str>, cse: Option<(&str, &str)>) -> ImageKeys {
    ImageKeys {
        pexels_api_key: pexels.map(str::to_string),
        unsplash_access_key: unsplash.map(str::to_string),
        google_cse_id: cse.map(|(id, _)| id.to_string()),
        google_api_key: cse.map(|(_, key)| key.to_string()),
    }
}

/// Serves Pexels (always failing), Unsplash and Google CSE search endpoints
async fn mock_providers() -> String {
    let app = Router::new()
        .route(
            "/v1/search",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "down"}))) }),
        )
        .route(
            "/search/photos",
            get(|| async {
                Json(json!({"results": [{"urls": {"regular": "https://images.example/unsplash.jpg"}}]}))
            }),
        )
        .route(
            "/customsearch/v1",
            get(|| async { Json(json!({"items": [{"link": "https://images.example/google.jpg"}]})) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn pointed_at(search: ImageSearch, base_url: &str) -> ImageSearch {
    ImageProvider::ALL
        .into_iter()
        .fold(search, |search, provider| search.with_base_url(provider, base_url))
}

#[test]
fn test_build_image_keywords_strips_accents_and_appends_extras() {
    assert_eq!(
        build_image_keywords(&["Fotosíntesis", "Ciencias Naturales"]),
        "fotosintesis, ciencias, naturales, education, learning, classroom, illustration"
    );
    assert_eq!(
        build_image_keywords(&["¿Qué es el Learning?", ""]),
        "que, es, el, learning, education, classroom, illustration"
    );
}

#[test]
fn test_build_image_keywords_keeps_ten_words() {
    let keywords = build_image_keywords(&["uno dos tres cuatro cinco seis siete ocho nueve diez once doce"]);
    assert!(keywords.starts_with("uno, dos"));
    assert!(!keywords.contains("once"));
    assert!(keywords.ends_with("illustration"));
}

#[test]
fn test_fallback_image_url_is_distinct_per_index() {
    let first = fallback_image_url("volcano, lava", 0);
    let second = fallback_image_url("volcano, lava", 1);

    assert!(first.starts_with(FALLBACK_IMAGE_BASE), "{}", first);
    assert!(first.contains("volcano"));
    assert!(first.ends_with("sig=1"));
    assert!(second.ends_with("sig=2"));
}

#[test]
fn test_configured_providers_need_their_keys() {
    assert!(ImageKeys::default().configured().is_empty());
    assert_eq!(
        keys(Some("p"), Some("  "), Some(("cx", "k"))).configured(),
        vec![ImageProvider::Pexels, ImageProvider::GoogleCse]
    );
    let half_google = ImageKeys { google_cse_id: Some("cx".to_string()), ..Default::default() };
    assert!(half_google.configured().is_empty());
}

#[tokio::test]
async fn test_find_image_without_keys_uses_fallback() {
    let search = ImageSearch::new(ImageKeys::default());

    let urls = search.find_images(vec!["a".to_string(), "b".to_string(), "c".to_string()]).await;

    assert_eq!(urls.len(), 3);
    for (index, url) in urls.iter().enumerate() {
        assert_eq!(url, &fallback_image_url(["a", "b", "c"][index], index));
    }
}

#[tokio::test]
async fn test_failing_provider_is_skipped_for_the_next() {
    let base_url = mock_providers().await;
    let search = pointed_at(ImageSearch::new(keys(Some("p"), Some("u"), Some(("cx", "k")))), &base_url);

    assert_eq!(search.find_image("volcano", 0).await, "https://images.example/unsplash.jpg");
}

#[tokio::test]
async fn test_google_custom_search_is_last() {
    let base_url = mock_providers().await;
    let search = pointed_at(ImageSearch::new(keys(Some("p"), None, Some(("cx", "k")))), &base_url);

    assert_eq!(search.find_image("volcano", 3).await, "https://images.example/google.jpg");
}

#[tokio::test]
async fn test_search_images_clamps_the_count() {
    let search = ImageSearch::new(ImageKeys::default());
    let query = |n: Option<usize>| ImageSearchQuery {
        topic: "Volcanes".to_string(),
        subject: "Ciencias".to_string(),
        n,
        ai: None,
    };

    let three = search_images(&search, None, &query(Some(3))).await;
    assert_eq!(three.count, 3);
    assert_eq!(three.urls.len(), 3);
    assert_ne!(three.urls[0], three.urls[1]);
    assert!(three.urls[0].contains("volcanes"));

    assert_eq!(search_images(&search, None, &query(Some(0))).await.count, 1);
    assert_eq!(search_images(&search, None, &query(Some(500))).await.count, MAX_IMAGES);
    assert_eq!(search_images(&search, None, &query(None)).await.count, MAX_IMAGES);
}

#[tokio::test]
async fn test_search_images_ignores_ai_without_client() {
    let search = ImageSearch::new(ImageKeys::default());
    let query = ImageSearchQuery {
        topic: "Volcanes".to_string(),
        subject: String::new(),
        n: Some(2),
        ai: Some("gemini".to_string()),
    };

    let response = search_images(&search, None, &query).await;

    assert_eq!(response.count, 2);
    assert_eq!(response.topic, "Volcanes");
}

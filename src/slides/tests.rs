use super::*;
use crate::images::{FALLBACK_IMAGE_BASE, ImageKeys};
use crate::ocr::DEFAULT_GEMINI_MODEL;
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn request(subject: &str, slide_count: u32) -> SlidesRequest {
    SlidesRequest {
        topic: "Fotosíntesis".to_string(),
        subject: subject.to_string(),
        slide_count,
        language: SlideLanguage::Es,
    }
}

/// Serves `generateContent` with a fixed text, or 503 forever when `text` is `None`
async fn mock_gemini(text: Option<&'static str>) -> (GeminiClient, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));

    async fn handler(
        State((calls, text)): State<(Arc<AtomicU32>, Option<&'static str>)>,
    ) -> (StatusCode, Json<Value>) {
        calls.fetch_add(1, Ordering::SeqCst);
        match text {
            Some(text) => (
                StatusCode::OK,
                Json(json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})),
            ),
            None => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "overloaded"}))),
        }
    }

    let app = Router::new()
        .route("/v1beta/models/{model}", post(handler))
        .with_state((calls.clone(), text));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = GeminiClient::new("test-key".to_string(), DEFAULT_GEMINI_MODEL.to_string())
        .with_base_url(&format!("http://{}", addr))
        .with_retry_base_delay(Duration::from_millis(1));
    (client, calls)
}

#[test]
fn test_validate_checks_topic_subject_and_count() {
    assert!(request("Historia", 1).validate().is_ok());
    assert!(request("Historia", MAX_SLIDES).validate().is_ok());
    assert!(request("Historia", 0).validate().is_err());
    assert!(request("Historia", MAX_SLIDES + 1).validate().is_err());
    assert!(request("  ", 5).validate().is_err());

    let no_topic = SlidesRequest { topic: String::new(), ..request("Historia", 5) };
    assert_eq!(no_topic.validate(), Err("El tema es requerido".to_string()));
}

#[test]
fn test_request_accepts_camel_case_and_defaults_to_spanish() {
    let parsed: SlidesRequest =
        serde_json::from_value(json!({"topic": "Volcanes", "subject": "Ciencias", "slideCount": 4})).unwrap();

    assert_eq!(parsed.slide_count, 4);
    assert_eq!(parsed.language, SlideLanguage::Es);
}

#[test]
fn test_heuristic_slides_follow_the_subject_template() {
    let slides = heuristic_slides("Fracciones", "Matemáticas", 7, SlideLanguage::Es);

    assert_eq!(slides.len(), 7);
    assert_eq!(slides[0].title, "Fracciones: Definición");
    assert_eq!(slides[5].title, "Fracciones: Definición");
    assert_eq!(slides[0].content[0], "Explicación formal de Fracciones");
    assert!(slides.iter().all(|s| s.image_url.is_none() && s.image_search_query.is_some()));
}

#[test]
fn test_heuristic_slides_default_to_natural_sciences_and_speak_english() {
    let slides = heuristic_slides("Volcanoes", "Geografía", 2, SlideLanguage::En);

    assert_eq!(slides[0].title, "Volcanoes: Definition & context");
    assert_eq!(slides[1].content[2], "Real example or phenomenon related to Volcanoes");
}

#[test]
fn test_refine_replaces_only_generic_text() {
    let slides = vec![
        Slide {
            title: "Aspecto 1".to_string(),
            content: vec!["Punto clave 1".to_string(), String::new()],
            image_search_query: Some("war".to_string()),
            image_url: None,
        },
        Slide {
            title: "La toma de la Bastilla".to_string(),
            content: vec!["14 de julio de 1789".to_string(), "Punto clave 2".to_string()],
            image_search_query: None,
            image_url: None,
        },
    ];

    let refined = refine_generic_slides(slides, "Revolución Francesa", "Historia", SlideLanguage::Es);

    assert_eq!(refined[0].title, "Revolución Francesa: Contexto histórico");
    assert_eq!(refined[0].content[0], "Marco temporal y geográfico de Revolución Francesa");
    assert_eq!(refined[0].image_search_query.as_deref(), Some("war"));
    assert_eq!(refined[1].title, "La toma de la Bastilla");
    assert_eq!(refined[1].content[0], "14 de julio de 1789");
}

#[test]
fn test_parse_slides_reads_fenced_json() {
    let text = "```json\n{\"slides\": [{\"title\": \"Clorofila\", \"content\": [\"Pigmento verde\"], \"imageSearchQuery\": \"chlorophyll leaf\"}]}\n```";

    let slides = parse_slides(text).unwrap();

    assert_eq!(slides.len(), 1);
    assert_eq!(slides[0].image_search_query.as_deref(), Some("chlorophyll leaf"));
    assert_eq!(parse_slides("{\"slides\": []}"), None);
    assert_eq!(parse_slides("sin json"), None);
}

#[tokio::test]
async fn test_generate_without_key_uses_templates_and_fallback_images() {
    let images = ImageSearch::new(ImageKeys::default());

    let response = generate_slides(None, &images, &request("Ciencias Naturales", 3)).await;

    assert_eq!(response.source, SlidesSource::Mock);
    assert!(response.generated);
    assert_eq!(response.slides.len(), 3);
    for slide in &response.slides {
        assert!(slide.image_url.as_deref().unwrap().starts_with(FALLBACK_IMAGE_BASE));
    }
}

#[tokio::test]
async fn test_generate_uses_model_slides() {
    let (client, calls) = mock_gemini(Some(
        "{\"slides\": [{\"title\": \"Clorofila\", \"content\": [\"Pigmento que capta la luz\"], \"imageSearchQuery\": \"chlorophyll\"}, {\"title\": \"Slide 2\", \"content\": [\"Key point\"]}]}",
    ))
    .await;
    let images = ImageSearch::new(ImageKeys::default());

    let response = generate_slides(Some(&client), &images, &request("Ciencias Naturales", 2)).await;

    assert_eq!(response.source, SlidesSource::Ai);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.slides[0].title, "Clorofila");
    assert!(response.slides[0].image_url.as_deref().unwrap().contains("chlorophyll"));
    assert_eq!(response.slides[1].title, "Fotosíntesis: Características clave");
    assert_eq!(response.slides[1].content.len(), 4);
}

#[tokio::test]
async fn test_generate_falls_back_when_the_model_is_unavailable() {
    let (client, calls) = mock_gemini(None).await;
    let images = ImageSearch::new(ImageKeys::default());

    let response = generate_slides(Some(&client), &images, &request("Historia", 4)).await;

    assert_eq!(response.source, SlidesSource::MockFallback);
    assert_eq!(response.slides.len(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 3, "two retries after the first attempt");
}

#[tokio::test]
async fn test_generate_falls_back_on_unusable_reply() {
    let (client, _) = mock_gemini(Some("no puedo ayudar con eso")).await;
    let images = ImageSearch::new(ImageKeys::default());

    let response = generate_slides(Some(&client), &images, &request("Historia", 2)).await;

    assert_eq!(response.source, SlidesSource::MockFallback);
    assert_eq!(response.slides[0].title, "Fotosíntesis: Contexto histórico");
}

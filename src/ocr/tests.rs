use super::*;
use axum::{Json, Router, extract::State, http::StatusCode as AxumStatus, routing::post};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

const PIXEL: &str = "iVBORw0KGgo=";

fn request(image: &str) -> OcrRequest {
    OcrRequest {
        image_base64: image.to_string(),
        questions: vec![],
        page_number: Some(1),
        focus_question_nums: vec![],
        focus_development: false,
    }
}

/// Serves `generateContent`, failing with 503 for the first `failures` calls
async fn mock_gemini(failures: u32, reply_text: &'static str) -> (String, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));

    async fn handler(
        State((calls, failures, reply_text)): State<(Arc<AtomicU32>, u32, &'static str)>,
    ) -> (AxumStatus, Json<Value>) {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            return (AxumStatus::SERVICE_UNAVAILABLE, Json(json!({"error": "overloaded"})));
        }
        (
            AxumStatus::OK,
            Json(json!({"candidates": [{"content": {"parts": [{"text": reply_text}]}}]})),
        )
    }

    let app = Router::new()
        .route("/v1beta/models/{model}", post(handler))
        .with_state((calls.clone(), failures, reply_text));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), calls)
}

fn client(base_url: &str) -> GeminiClient {
    GeminiClient::new("test-key".to_string(), DEFAULT_GEMINI_MODEL.to_string())
        .with_base_url(base_url)
        .with_retry_base_delay(Duration::from_millis(1))
}

#[test]
fn test_clean_image_base64_strips_data_url() {
    let cleaned = clean_image_base64(&format!("data:image/png;base64,{}", PIXEL)).unwrap();
    assert_eq!(cleaned, PIXEL);
    assert_eq!(clean_image_base64(PIXEL).unwrap(), PIXEL);
}

#[test]
fn test_clean_image_base64_rejects_bad_payloads() {
    assert!(matches!(clean_image_base64("  "), Err(OcrError::MissingImage)));
    assert!(matches!(clean_image_base64("no es base64!"), Err(OcrError::InvalidImage(_))));
}

#[test]
fn test_build_prompt_describes_questions_and_focus() {
    let mut req = request(PIXEL);
    req.questions = vec![
        OcrQuestion { kind: QuestionKind::Tf, text: "La Tierra es plana".to_string(), options: vec![] },
        OcrQuestion {
            kind: QuestionKind::Mc,
            text: "¿Cuánto es 2+2?".to_string(),
            options: vec![
                QuestionOption::Text("3".to_string()),
                QuestionOption::Object { text: "4".to_string() },
            ],
        },
        OcrQuestion { kind: QuestionKind::Des, text: "Resuelve".to_string(), options: vec![] },
    ];
    req.focus_question_nums = vec![3];
    req.focus_development = true;

    let prompt = build_prompt(&req);

    assert!(prompt.contains("del 1 al 3"));
    assert!(prompt.contains("P1: [Verdadero/Falso]"));
    assert!(prompt.contains("A=3 | B=4"));
    assert!(prompt.contains("P3: [DESARROLLO"));
    assert!(prompt.contains("Analiza SOLO estas preguntas: 3."));
    assert!(prompt.contains("MODO DESARROLLO OBLIGATORIO"));
}

#[test]
fn test_build_prompt_without_structure() {
    let prompt = build_prompt(&request(PIXEL));
    assert!(prompt.contains("Estructura genérica"));
    assert!(!prompt.contains("RE-CHEQUEO"));
}

#[test]
fn test_parse_analysis_handles_fences_and_noise() {
    let fenced = "```json\n{\"answers\": []}\n```";
    assert_eq!(parse_analysis(fenced), Some(json!({"answers": []})));

    let noisy = "Aquí está el análisis: {\"questionsFound\": 2} espero que sirva";
    assert_eq!(parse_analysis(noisy), Some(json!({"questionsFound": 2})));

    assert_eq!(parse_analysis("sin json"), None);
}

#[test]
fn test_request_accepts_camel_case_fields() {
    let req: OcrRequest = serde_json::from_value(json!({
        "imageBase64": PIXEL,
        "pageNumber": 2,
        "focusQuestionNums": [1, 4],
        "questions": [{"type": "ms", "text": "x", "options": [{"text": "a"}, "b"]}, {"type": "raro"}]
    }))
    .unwrap();

    assert_eq!(req.page_number, Some(2));
    assert_eq!(req.focus_question_nums, vec![1, 4]);
    assert_eq!(req.questions[0].options[0].text(), "a");
    assert_eq!(req.questions[1].kind, QuestionKind::Other);
}

#[tokio::test]
async fn test_analyze_without_client_falls_back() {
    let response = analyze(None, &request(PIXEL)).await.unwrap();
    assert!(!response.success);
    assert!(response.fallback);
}

#[tokio::test]
async fn test_analyze_rejects_invalid_image_before_anything_else() {
    let result = analyze(None, &request("%%%")).await;
    assert!(matches!(result, Err(OcrError::InvalidImage(_))));
}

#[tokio::test]
async fn test_generate_retries_on_service_unavailable() {
    let (base_url, calls) = mock_gemini(2, "{\"answers\": [{\"q\": 1, \"val\": \"V\"}]}").await;

    let response = analyze(Some(&client(&base_url)), &request(PIXEL)).await.unwrap();

    assert!(response.success);
    assert_eq!(response.analysis.unwrap()["answers"][0]["val"], "V");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_generate_gives_up_after_max_retries() {
    let (base_url, calls) = mock_gemini(10, "{}").await;

    let result = client(&base_url).generate("prompt", PIXEL).await;

    assert!(matches!(result, Err(OcrError::Api { status, .. }) if status == StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(calls.load(Ordering::SeqCst), VISION_RETRIES + 1);
}

#[tokio::test]
async fn test_generate_json_retries_less_than_vision_requests() {
    let (base_url, calls) = mock_gemini(10, "{}").await;

    let result = client(&base_url).generate_json("prompt", 0.4, 256).await;

    assert!(matches!(result, Err(OcrError::Api { status, .. }) if status == StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(calls.load(Ordering::SeqCst), TEXT_RETRIES + 1);
}

#[tokio::test]
async fn test_generate_json_returns_reply_text() {
    let (base_url, calls) = mock_gemini(1, "{\"queries\": [\"volcano\"]}").await;

    let text = client(&base_url).generate_json("prompt", 0.6, 1024).await.unwrap();

    assert_eq!(parse_analysis(&text).unwrap()["queries"][0], "volcano");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unparseable_reply_returns_raw_text() {
    let (base_url, _) = mock_gemini(0, "no pude leer la hoja").await;

    let response = analyze(Some(&client(&base_url)), &request(PIXEL)).await.unwrap();

    assert!(!response.success);
    assert!(!response.fallback);
    assert_eq!(response.raw_response.as_deref(), Some("no pude leer la hoja"));
}

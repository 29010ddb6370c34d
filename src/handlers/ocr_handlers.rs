use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::errors::ApiError;
use crate::ocr::{self, GeminiClient, OcrRequest, OcrResponse};

/// Handler for analyzing a scanned answer sheet
///
/// This function handles POST requests to `/ocr/analyze`. Without a
/// configured Gemini key the response is a `fallback` and nothing is sent.
///
/// ### Arguments
///
/// * `gemini` - The Gemini client, if an API key is configured
/// * `payload` - The page image and the expected questions
///
/// ### Returns
///
/// The parsed analysis, or the raw model reply when it is not valid JSON
#[instrument(skip_all, fields(page = ?payload.page_number, questions = payload.questions.len()))]
pub async fn analyze_ocr_handler(
    // Extract the Gemini client from the application state
    State(gemini): State<Option<Arc<GeminiClient>>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<OcrRequest>,
) -> Result<Json<OcrResponse>, ApiError> {
    let response = ocr::analyze(gemini.as_deref(), &payload).await?;

    info!("Answer sheet analyzed: success={}, fallback={}", response.success, response.fallback);
    Ok(Json(response))
}

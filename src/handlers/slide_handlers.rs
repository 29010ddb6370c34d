use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use crate::errors::ApiError;
use crate::images::{self, ImageSearch, ImageSearchQuery, ImageSearchResponse};
use crate::ocr::GeminiClient;
use crate::slides::{self, SlidesRequest, SlidesResponse};

/// Handler for generating presentation slides
///
/// This function handles POST requests to `/slides/generate`. Without a
/// Gemini key, or when the model fails, the slides come from templates and
/// `source` says so.
///
/// ### Arguments
///
/// * `gemini` - The Gemini client, if an API key is configured
/// * `images` - The image providers used for each slide
/// * `payload` - Topic, subject, slide count and language
///
/// ### Returns
///
/// The slides, or 400 when the request is incomplete or asks for 0 or more
/// than 30 slides
#[instrument(skip_all, fields(topic = %payload.topic, count = payload.slide_count))]
pub async fn generate_slides_handler(
    State(gemini): State<Option<Arc<GeminiClient>>>,
    State(images): State<Arc<ImageSearch>>,
    Json(payload): Json<SlidesRequest>,
) -> Result<Json<SlidesResponse>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    Ok(Json(slides::generate_slides(gemini.as_deref(), &images, &payload).await))
}

/// Handler for `GET /images/search?topic=..&subject=..&n=..&ai=gemini`
#[instrument(skip_all, fields(topic = %query.topic))]
pub async fn search_images_handler(
    State(gemini): State<Option<Arc<GeminiClient>>>,
    State(images): State<Arc<ImageSearch>>,
    Query(query): Query<ImageSearchQuery>,
) -> Result<Json<ImageSearchResponse>, ApiError> {
    if query.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("topic is required".to_string()));
    }

    Ok(Json(images::search_images(&images, gemini.as_deref(), &query).await))
}

use axum::{extract::Query, Json};

use crate::dto::SubjectStyleQuery;
use crate::subjects::{self, SubjectStyle};

/// Handler for looking up how a subject is displayed
///
/// This function handles GET requests to `/subjects/style?name=`. Unknown
/// subjects get a derived abbreviation and the neutral colours.
pub async fn subject_style_handler(Query(query): Query<SubjectStyleQuery>) -> Json<SubjectStyle> {
    Json(subjects::subject_style(&query.name))
}

/// Handler for listing the subjects with a fixed style
///
/// This function handles GET requests to `/subjects`.
pub async fn list_subjects_handler() -> Json<Vec<SubjectStyle>> {
    Json(subjects::known_subjects())
}

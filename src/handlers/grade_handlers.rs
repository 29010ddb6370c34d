use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::by_year::{delete_by_year, YearlyRecords};
use crate::db::DbPool;
use crate::dto::{DeleteByYearDto, DeleteByYearQuery};
use crate::errors::ApiError;
use crate::models::{Grade, NewGrade};
use crate::repo::{self, GradeFilter};

/// Handler for recording a grade
///
/// This function handles POST requests to `/grades`. The grade needs a
/// student id or a RUT; a RUT that matches a user links the grade to them.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - The grade fields
///
/// ### Returns
///
/// The stored grade as JSON
#[instrument(skip(pool, payload))]
pub async fn create_grade_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<NewGrade>,
) -> Result<Json<Grade>, ApiError> {
    let grade = repo::create_grade(&pool, payload)
        .await
        .map_err(ApiError::from_repo)?;

    Ok(Json(grade))
}

/// Handler for listing grades
///
/// This function handles GET requests to `/grades`, filtered by any of
/// `year`, `student_id`, `course_id`, `section_id` and `subject`.
pub async fn list_grades_handler(
    State(pool): State<Arc<DbPool>>,
    Query(filter): Query<GradeFilter>,
) -> Result<Json<Vec<Grade>>, ApiError> {
    let grades = repo::list_grades(&pool, &filter).map_err(ApiError::from_repo)?;
    Ok(Json(grades))
}

/// Handler for deleting a school year of grades
///
/// This function handles POST and DELETE requests to
/// `/grades/by-year/{year}?doit=1&paged=&limit=&cursor=`.
#[instrument(skip(pool))]
pub async fn delete_grades_by_year_handler(
    State(pool): State<Arc<DbPool>>,
    Path(year): Path<i32>,
    Query(query): Query<DeleteByYearQuery>,
) -> Result<Json<DeleteByYearDto>, ApiError> {
    delete_by_year(&pool, YearlyRecords::Grades, year, query).await
}

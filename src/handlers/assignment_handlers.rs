use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::dto::AssignStudentDto;
use crate::errors::ApiError;
use crate::models::StudentAssignment;
use crate::repo::{self, AssignmentFilter};

/// Username recorded when a request does not say who made the assignment
const DEFAULT_ASSIGNER: &str = "admin";

/// Handler for listing student assignments
///
/// This function handles GET requests to `/assignments`, optionally filtered
/// by `student_id`, `course_id` and `section_id`.
pub async fn list_assignments_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    Query(filter): Query<AssignmentFilter>,
) -> Result<Json<Vec<StudentAssignment>>, ApiError> {
    let assignments = repo::list_assignments(&pool, &filter).map_err(ApiError::from_repo)?;
    Ok(Json(assignments))
}

/// Handler for placing a student in a course-section
///
/// This function handles POST requests to `/assignments`. Posting the same
/// assignment twice is harmless; posting another section of the same course
/// moves the student.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - The student, course and section ids
///
/// ### Returns
///
/// The student's current assignment for the course
#[instrument(skip(pool))]
pub async fn assign_student_handler(
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<AssignStudentDto>,
) -> Result<Json<StudentAssignment>, ApiError> {
    let created_by = payload.created_by.as_deref().unwrap_or(DEFAULT_ASSIGNER);

    let assignment = repo::assign_student_to_section(
        &pool,
        &payload.student_id,
        &payload.course_id,
        &payload.section_id,
        created_by,
    )
    .await
    .map_err(ApiError::from_repo)?;

    Ok(Json(assignment))
}

/// Handler for removing a student from a course
///
/// This function handles DELETE requests to `/assignments/{student_id}/{course_id}`.
#[instrument(skip(pool))]
pub async fn unassign_student_handler(
    State(pool): State<Arc<DbPool>>,
    Path((student_id, course_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    repo::unassign_student(&pool, &student_id, &course_id)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Unassigned student {} from course {}", student_id, course_id);
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::course_section::ResolvedCourseSection;
use crate::db::DbPool;
use crate::dto::{CreateNamedDto, SectionQuery};
use crate::errors::ApiError;
use crate::models::{Course, Section, User};
use crate::repo;

/// Handler for creating a new course
///
/// This function handles POST requests to `/courses`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - The request payload containing the course name
///
/// ### Returns
///
/// The newly created course as JSON
#[instrument(skip(pool))]
pub async fn create_course_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<CreateNamedDto>,
) -> Result<Json<Course>, ApiError> {
    let course = repo::create_course(&pool, payload.name)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Created course {} ({})", course.get_name(), course.get_id());
    Ok(Json(course))
}

/// Handler for listing all courses
///
/// This function handles GET requests to `/courses`.
///
/// ### Returns
///
/// All courses ordered by name
pub async fn list_courses_handler(
    State(pool): State<Arc<DbPool>>,
) -> Result<Json<Vec<Course>>, ApiError> {
    let courses = repo::list_courses(&pool).map_err(ApiError::from_repo)?;
    Ok(Json(courses))
}

/// Handler for retrieving a specific course
///
/// This function handles GET requests to `/courses/{id}`.
pub async fn get_course_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Course>, ApiError> {
    let course = repo::get_course(&pool, &id)
        .map_err(ApiError::from_repo)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {}", id)))?;

    Ok(Json(course))
}

/// Handler for deleting a course with its sections and assignments
///
/// This function handles DELETE requests to `/courses/{id}`.
#[instrument(skip(pool))]
pub async fn delete_course_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    repo::delete_course(&pool, &id)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Deleted course {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for creating a section in a course
///
/// This function handles POST requests to `/courses/{id}/sections`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `course_id` - The course the section belongs to, extracted from the URL path
/// * `payload` - The request payload containing the section name
///
/// ### Returns
///
/// The newly created section as JSON
#[instrument(skip(pool))]
pub async fn create_section_handler(
    State(pool): State<Arc<DbPool>>,
    Path(course_id): Path<String>,
    Json(payload): Json<CreateNamedDto>,
) -> Result<Json<Section>, ApiError> {
    let section = repo::create_section(&pool, &course_id, payload.name)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Created section {} in course {}", section.get_name(), course_id);
    Ok(Json(section))
}

/// Handler for listing the sections of one course
///
/// This function handles GET requests to `/courses/{id}/sections`.
pub async fn list_course_sections_handler(
    State(pool): State<Arc<DbPool>>,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<Section>>, ApiError> {
    repo::get_course(&pool, &course_id)
        .map_err(ApiError::from_repo)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {}", course_id)))?;

    let sections = repo::list_sections(&pool, Some(&course_id)).map_err(ApiError::from_repo)?;
    Ok(Json(sections))
}

/// Handler for listing sections
///
/// This function handles GET requests to `/sections`, optionally filtered
/// with `?course_id=`.
pub async fn list_sections_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<SectionQuery>,
) -> Result<Json<Vec<Section>>, ApiError> {
    let sections = repo::list_sections(&pool, query.course_id.as_deref()).map_err(ApiError::from_repo)?;
    Ok(Json(sections))
}

/// Handler for resolving a raw course reference
///
/// This function handles GET requests to `/course-sections/{raw}/resolve`.
/// The reference may be a combined course-section id or a bare course id.
///
/// ### Returns
///
/// The course, the section and the display name, or 404 when the reference
/// does not resolve
#[instrument(skip(pool))]
pub async fn resolve_course_section_handler(
    State(pool): State<Arc<DbPool>>,
    Path(raw): Path<String>,
) -> Result<Json<ResolvedCourseSection>, ApiError> {
    let resolved = repo::resolve_course_section(&pool, &raw)
        .map_err(ApiError::from_repo)?
        .ok_or_else(|| ApiError::NotFound(format!("Course-section {}", raw)))?;

    Ok(Json(resolved))
}

/// Handler for listing the students of a course-section
///
/// This function handles GET requests to
/// `/course-sections/{course_id}/{section_id}/students`.
pub async fn course_section_students_handler(
    State(pool): State<Arc<DbPool>>,
    Path((course_id, section_id)): Path<(String, String)>,
) -> Result<Json<Vec<User>>, ApiError> {
    let students = repo::get_students_for_course_section(&pool, &course_id, &section_id)
        .map_err(ApiError::from_repo)?;

    Ok(Json(students))
}

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
use crate::models::AttendanceRecord;
use crate::repo::{self, AttendanceFilter, NewAttendance};

/// Handler for recording attendance
///
/// This function handles POST requests to `/attendance`. A second record for
/// the same student and day replaces the first.
#[instrument(skip(pool, payload), fields(student_id = %payload.student_id, date = %payload.date))]
pub async fn record_attendance_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<NewAttendance>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let record = repo::record_attendance(&pool, payload)
        .await
        .map_err(ApiError::from_repo)?;

    Ok(Json(record))
}

/// Handler for listing attendance
///
/// This function handles GET requests to `/attendance`, filtered by any of
/// `year`, `student_id`, `course_id`, `section_id` and `date`.
pub async fn list_attendance_handler(
    State(pool): State<Arc<DbPool>>,
    Query(filter): Query<AttendanceFilter>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let records = repo::list_attendance(&pool, &filter).map_err(ApiError::from_repo)?;
    Ok(Json(records))
}

/// Handler for deleting a school year of attendance
///
/// This function handles POST and DELETE requests to
/// `/attendance/by-year/{year}?doit=1&paged=&limit=&cursor=`.
#[instrument(skip(pool))]
pub async fn delete_attendance_by_year_handler(
    State(pool): State<Arc<DbPool>>,
    Path(year): Path<i32>,
    Query(query): Query<DeleteByYearQuery>,
) -> Result<Json<DeleteByYearDto>, ApiError> {
    delete_by_year(&pool, YearlyRecords::Attendance, year, query).await
}

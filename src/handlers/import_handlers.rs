use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::csv_io::{self, CsvImportReport};
use crate::db::DbPool;
use crate::dto::{GenerateAttendanceDto, YearQuery};
use crate::errors::ApiError;
use crate::legacy::{self, ImportReport};

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Wraps CSV text in a response that browsers save as `filename`
fn csv_response(filename: &str, body: String) -> impl IntoResponse + use<> {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        body,
    )
}

fn year_suffix(year: Option<i32>) -> String {
    year.map(|y| format!("_{}", y)).unwrap_or_default()
}

/// Handler for importing a browser storage snapshot
///
/// This function handles POST requests to `/imports/legacy`. The body is a
/// JSON object keyed by the old `smart-student-*` storage keys. Records
/// whose id already exists are skipped, so the same snapshot can be posted
/// twice.
///
/// ### Returns
///
/// One report per recognised key
#[instrument(skip_all)]
pub async fn import_legacy_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(snapshot): Json<Value>,
) -> Result<Json<Vec<ImportReport>>, ApiError> {
    let reports = legacy::import_snapshot(&pool, &snapshot)
        .await
        .map_err(ApiError::from_repo)?;

    Ok(Json(reports))
}

/// Handler for importing users from CSV
///
/// This function handles POST requests to `/imports/users-csv`. The body is
/// the CSV text; bad lines are reported with their line number and the rest
/// are imported.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn import_users_csv_handler(
    State(pool): State<Arc<DbPool>>,
    body: String,
) -> Result<Json<CsvImportReport>, ApiError> {
    let report = csv_io::import_users_csv(&pool, &body)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Users CSV: {} imported, {} skipped, {} errors", report.imported, report.skipped, report.errors.len());
    Ok(Json(report))
}

/// Handler for importing grades from CSV
///
/// This function handles POST requests to `/imports/grades-csv`.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn import_grades_csv_handler(
    State(pool): State<Arc<DbPool>>,
    body: String,
) -> Result<Json<CsvImportReport>, ApiError> {
    let report = csv_io::import_grades_csv(&pool, &body)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Grades CSV: {} imported, {} skipped, {} errors", report.imported, report.skipped, report.errors.len());
    Ok(Json(report))
}

/// Handler for importing attendance from CSV
///
/// This function handles POST requests to `/imports/attendance-csv`.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn import_attendance_csv_handler(
    State(pool): State<Arc<DbPool>>,
    body: String,
) -> Result<Json<CsvImportReport>, ApiError> {
    let report = csv_io::import_attendance_csv(&pool, &body)
        .await
        .map_err(ApiError::from_repo)?;

    info!(
        "Attendance CSV: {} imported, {} skipped, {} errors",
        report.imported,
        report.skipped,
        report.errors.len()
    );
    Ok(Json(report))
}

/// Handler for exporting grades as CSV
///
/// This function handles GET requests to `/exports/grades.csv?year=`.
pub async fn export_grades_csv_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<YearQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let body = csv_io::export_grades_csv(&pool, query.year).map_err(ApiError::from_repo)?;
    Ok(csv_response(&format!("grades{}.csv", year_suffix(query.year)), body))
}

/// Handler for exporting attendance as CSV
///
/// This function handles GET requests to `/exports/attendance.csv?year=`.
pub async fn export_attendance_csv_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<YearQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let body = csv_io::export_attendance_csv(&pool, query.year).map_err(ApiError::from_repo)?;
    Ok(csv_response(&format!("attendance{}.csv", year_suffix(query.year)), body))
}

/// Handler for generating a school year of attendance
///
/// This function handles POST requests to `/generate/attendance`. The roster
/// is every assigned student; nothing is stored. Without a seed a random one
/// is drawn, so only seeded requests are repeatable.
#[instrument(skip(pool))]
pub async fn generate_attendance_handler(
    State(pool): State<Arc<DbPool>>,
    Json(payload): Json<GenerateAttendanceDto>,
) -> Result<impl IntoResponse, ApiError> {
    let seed = payload.seed.unwrap_or_else(rand::random);
    let body = csv_io::generate_attendance_csv(&pool, payload.year, seed).map_err(ApiError::from_repo)?;

    Ok(csv_response(&format!("attendance_{}_generated.csv", payload.year), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo;
    use crate::test_utils::setup_test_db;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use serde_json::json;

    async fn body_text(response: impl IntoResponse) -> (StatusCode, String, String) {
        let response = response.into_response();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_import_users_csv_handler_reports_bad_lines() {
        let pool = setup_test_db();
        let body = format!(
            "{}\nstudent,Ana Pérez,,,ana,1234,4to Básico,A,\nnobody,X,,,x,1,,,\n",
            csv_io::USERS_HEADER
        );

        let report = import_users_csv_handler(State(pool.clone()), body).await.unwrap().0;

        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].line, 3);
        assert!(repo::get_user_by_username(&pool, "ana").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_legacy_handler_rejects_non_object() {
        let pool = setup_test_db();

        let result = import_legacy_handler(State(pool.clone()), Json(json!(["not", "an", "object"]))).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_export_grades_csv_handler_sets_content_type() {
        let pool = setup_test_db();

        let response = export_grades_csv_handler(State(pool.clone()), Query(YearQuery { year: Some(2025) }))
            .await
            .unwrap();
        let (status, content_type, text) = body_text(response).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, CSV_CONTENT_TYPE);
        assert!(text.starts_with(csv_io::GRADES_HEADER));
    }

    #[tokio::test]
    async fn test_generate_attendance_handler_is_seeded() {
        let pool = setup_test_db();
        csv_io::import_users_csv(
            &pool,
            &format!("{}\nstudent,Ana Pérez,,,ana,1234,4to Básico,A,\n", csv_io::USERS_HEADER),
        )
        .await
        .unwrap();

        let dto = GenerateAttendanceDto { year: 2025, seed: Some(7) };
        let first = generate_attendance_handler(State(pool.clone()), Json(dto.clone())).await.unwrap();
        let second = generate_attendance_handler(State(pool.clone()), Json(dto)).await.unwrap();

        let (_, _, first) = body_text(first).await;
        let (_, _, second) = body_text(second).await;
        assert_eq!(first, second);
        assert!(first.lines().count() > 1);
    }

    #[tokio::test]
    async fn test_generate_attendance_handler_rejects_bad_year() {
        let pool = setup_test_db();

        let result =
            generate_attendance_handler(State(pool.clone()), Json(GenerateAttendanceDto { year: 300_000, seed: Some(1) }))
                .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}

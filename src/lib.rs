/// Smart Student: School Roster Service Library
///
/// This library keeps the roster of a school (users, courses, sections and
/// which section each student belongs to) and the records hanging off it:
/// tasks and their notifications, grades and attendance. It also carries the
/// one-off tooling the roster needs: imports from the old browser storage and
/// from CSV, CSV exports, synthetic attendance, repair commands and answer
/// sheet analysis.
///
/// ### Modules
///
/// - `db`: Database connection management
/// - `models`: Typed records stored in the database
/// - `repo`: Repository layer for database operations
/// - `course_section`, `rut`, `normalize`: Identifier grammars and name cleanup
/// - `csv_io`, `legacy`, `calendar`: Imports, exports and attendance generation
/// - `maintenance`: Repair commands for inconsistent rosters
/// - `ocr`: Answer sheet analysis through Gemini
/// - `slides`, `images`: Presentation slides and their images
/// - `handlers`: HTTP handlers for the web API
///
/// ### Web API
///
/// `create_app` builds the axum router; see its documentation for the routes.

/// Attendance calendar and synthetic attendance
pub mod calendar;

/// Configuration module
pub mod config;

/// Course-section id grammar and resolution
pub mod course_section;

/// CSV imports and exports
pub mod csv_io;

/// Database connection module
pub mod db;

/// Data transfer objects module
pub mod dto;

/// Error handling module
pub mod errors;

/// Web API handlers module
pub mod handlers;

/// Image search for slides
pub mod images;

/// Browser storage snapshot import
pub mod legacy;

/// Repair commands
pub mod maintenance;

/// Data models module
pub mod models;

/// Name normalization
pub mod normalize;

/// Answer sheet analysis
pub mod ocr;

/// Repository module for database operations
pub mod repo;

/// Chilean national id
pub mod rut;

/// Database schema module
pub mod schema;

/// Presentation slide generation
pub mod slides;

/// Subject display styles
pub mod subjects;

#[cfg(test)]
pub mod test_utils;

use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::*;
use crate::images::{ImageKeys, ImageSearch};
use crate::ocr::GeminiClient;

/// Shared state of the web API
///
/// Handlers extract the part they need: the pool as `State<Arc<DbPool>>`
/// the Gemini client as `State<Option<Arc<GeminiClient>>>` and the image
/// providers as `State<Arc<ImageSearch>>`.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<db::DbPool>,
    /// `None` when no API key is configured
    pub gemini: Option<Arc<GeminiClient>>,
    pub images: Arc<ImageSearch>,
}

impl AppState {
    /// State without a Gemini client or image keys; answer sheet analysis
    /// and slides fall back
    pub fn new(pool: Arc<db::DbPool>) -> Self {
        Self { pool, gemini: None, images: Arc::new(ImageSearch::new(ImageKeys::default())) }
    }

    pub fn with_images(mut self, images: ImageSearch) -> Self {
        self.images = Arc::new(images);
        self
    }

    pub fn with_gemini(mut self, gemini: Option<GeminiClient>) -> Self {
        self.gemini = gemini.map(Arc::new);
        self
    }
}

impl FromRef<AppState> for Arc<db::DbPool> {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Option<Arc<GeminiClient>> {
    fn from_ref(state: &AppState) -> Self {
        state.gemini.clone()
    }
}

impl FromRef<AppState> for Arc<ImageSearch> {
    fn from_ref(state: &AppState) -> Self {
        state.images.clone()
    }
}

/// Creates the application router with all routes
///
/// This function sets up the Axum router with all the API endpoints.
///
/// ### Arguments
///
/// * `state` - The database pool, the optional Gemini client and the image providers
///
/// ### Returns
///
/// An Axum Router configured with all API routes
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // Users and their notifications
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/{id}",
            get(get_user_handler).put(update_user_handler).delete(delete_user_handler),
        )
        .route("/users/{id}/notifications", get(list_user_notifications_handler))
        // Courses and sections
        .route("/courses", get(list_courses_handler).post(create_course_handler))
        .route("/courses/{id}", get(get_course_handler).delete(delete_course_handler))
        .route(
            "/courses/{id}/sections",
            get(list_course_sections_handler).post(create_section_handler),
        )
        .route("/sections", get(list_sections_handler))
        .route("/course-sections/{course}/resolve", get(resolve_course_section_handler))
        .route(
            "/course-sections/{course}/{section}/students",
            get(course_section_students_handler),
        )
        // Student assignments
        .route("/assignments", get(list_assignments_handler).post(assign_student_handler))
        .route(
            "/assignments/{student_id}/{course_id}",
            delete(unassign_student_handler),
        )
        // Tasks and notifications
        .route("/tasks", get(list_tasks_handler).post(create_task_handler))
        .route("/tasks/{id}", get(get_task_handler).delete(delete_task_handler))
        .route("/tasks/{id}/recipients", get(task_recipients_handler))
        .route("/tasks/{id}/students/{student_id}/assigned", get(task_assigned_handler))
        .route("/notifications/{id}/read", post(mark_notification_read_handler))
        // Grades and attendance
        .route("/grades", get(list_grades_handler).post(create_grade_handler))
        .route(
            "/grades/by-year/{year}",
            post(delete_grades_by_year_handler).delete(delete_grades_by_year_handler),
        )
        .route("/attendance", get(list_attendance_handler).post(record_attendance_handler))
        .route(
            "/attendance/by-year/{year}",
            post(delete_attendance_by_year_handler).delete(delete_attendance_by_year_handler),
        )
        // Imports, exports and generated data
        .route("/imports/legacy", post(import_legacy_handler))
        .route("/imports/users-csv", post(import_users_csv_handler))
        .route("/imports/grades-csv", post(import_grades_csv_handler))
        .route("/imports/attendance-csv", post(import_attendance_csv_handler))
        .route("/exports/grades.csv", get(export_grades_csv_handler))
        .route("/exports/attendance.csv", get(export_attendance_csv_handler))
        .route("/generate/attendance", post(generate_attendance_handler))
        // Maintenance
        .route("/maintenance", get(list_maintenance_commands_handler))
        .route("/maintenance/{command}", post(run_maintenance_handler))
        // Subjects
        .route("/subjects", get(list_subjects_handler))
        .route("/subjects/style", get(subject_style_handler))
        // Answer sheets
        .route("/ocr/analyze", post(analyze_ocr_handler))
        // Slides
        .route("/slides/generate", post(generate_slides_handler))
        .route("/images/search", get(search_images_handler))
        // Add the shared state to the application
        .with_state(state)
}

/// Runs the embedded migrations
///
/// This function applies all pending database migrations.
///
/// ### Arguments
///
/// * `conn` - A mutable reference to a SQLite connection
///
/// ### Errors
///
/// Returns an error if a migration fails to apply
pub fn run_migrations(
    conn: &mut diesel::SqliteConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    // Define the embedded migrations
    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    // Run all pending migrations
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

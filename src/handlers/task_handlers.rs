use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::dto::{AssignedDto, MarkReadDto, TaskQuery};
use crate::errors::ApiError;
use crate::models::{NewTask, Task, TaskNotification, User};
use crate::repo;

/// Handler for creating a task
///
/// This function handles POST requests to `/tasks`. The task's recipients
/// are resolved immediately and receive one `new_task` notification.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - The task fields
///
/// ### Returns
///
/// The newly created task as JSON
#[instrument(skip(pool, payload), fields(title = %payload.title))]
pub async fn create_task_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<NewTask>,
) -> Result<Json<Task>, ApiError> {
    let task = repo::create_task(&pool, payload)
        .await
        .map_err(ApiError::from_repo)?;

    Ok(Json(task))
}

/// Handler for listing tasks
///
/// This function handles GET requests to `/tasks`, optionally restricted to
/// one creator with `?created_by=`.
pub async fn list_tasks_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = repo::list_tasks(&pool, query.created_by.as_deref()).map_err(ApiError::from_repo)?;
    Ok(Json(tasks))
}

/// Handler for retrieving a specific task
///
/// This function handles GET requests to `/tasks/{id}`.
pub async fn get_task_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = load_task(&pool, &id)?;
    Ok(Json(task))
}

/// Handler for deleting a task and its notifications
///
/// This function handles DELETE requests to `/tasks/{id}`.
#[instrument(skip(pool))]
pub async fn delete_task_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    repo::delete_task(&pool, &id)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Deleted task {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for listing the students a task is addressed to
///
/// This function handles GET requests to `/tasks/{id}/recipients`.
/// Recipients are computed from the current assignments, so a student who
/// joined the section after the task was created is included.
pub async fn task_recipients_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<User>>, ApiError> {
    let task = load_task(&pool, &id)?;
    let recipients = repo::resolve_task_recipients(&pool, &task).map_err(ApiError::from_repo)?;
    Ok(Json(recipients))
}

/// Handler for checking whether a task is addressed to a student
///
/// This function handles GET requests to `/tasks/{id}/students/{student_id}/assigned`.
pub async fn task_assigned_handler(
    State(pool): State<Arc<DbPool>>,
    Path((task_id, student_id)): Path<(String, String)>,
) -> Result<Json<AssignedDto>, ApiError> {
    load_task(&pool, &task_id)?;
    let assigned = repo::is_student_assigned_to_task(&pool, &task_id, &student_id)
        .map_err(ApiError::from_repo)?;

    Ok(Json(AssignedDto { task_id, student_id, assigned }))
}

/// Handler for marking a notification as read by one recipient
///
/// This function handles POST requests to `/notifications/{id}/read`.
/// Marking it again changes nothing.
#[instrument(skip(pool))]
pub async fn mark_notification_read_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
    Json(payload): Json<MarkReadDto>,
) -> Result<Json<TaskNotification>, ApiError> {
    let notification = repo::mark_notification_read(&pool, &id, &payload.username)
        .await
        .map_err(ApiError::from_repo)?;

    Ok(Json(notification))
}

fn load_task(pool: &DbPool, id: &str) -> Result<Task, ApiError> {
    repo::get_task(pool, id)
        .map_err(ApiError::from_repo)?
        .ok_or_else(|| ApiError::NotFound(format!("Task {}", id)))
}

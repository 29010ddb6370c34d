use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Query;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::dto::{NotificationQuery, UserQuery};
use crate::errors::ApiError;
use crate::models::{NewUser, TaskNotification, User, UserUpdate};
use crate::repo;

/// Handler for creating a new user
///
/// This function handles POST requests to `/users`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `payload` - The request payload with the username, password, role and display name
///
/// ### Returns
///
/// The newly created user as JSON (without the password hash)
#[instrument(skip(pool, payload), fields(username = %payload.username))]
pub async fn create_user_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    // Extract and deserialize the JSON request body
    Json(payload): Json<NewUser>,
) -> Result<Json<User>, ApiError> {
    info!("Creating user");

    let user = repo::create_user(&pool, payload)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Created user with id {}", user.get_id());
    Ok(Json(user))
}

/// Handler for listing users
///
/// This function handles GET requests to `/users`. The `role` query
/// parameter may be repeated; without it every user is listed.
///
/// ### Returns
///
/// The matching users as JSON, grouped by role in the order requested and
/// ordered by username within each role
#[instrument(skip(pool))]
pub async fn list_users_handler(
    State(pool): State<Arc<DbPool>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    if query.role.is_empty() {
        let users = repo::list_users(&pool, None).map_err(ApiError::from_repo)?;
        return Ok(Json(users));
    }

    let mut roles = query.role;
    roles.dedup();

    let mut users = Vec::new();
    for role in roles {
        users.extend(repo::list_users(&pool, Some(role)).map_err(ApiError::from_repo)?);
    }
    Ok(Json(users))
}

/// Handler for retrieving a specific user
///
/// This function handles GET requests to `/users/{id}`.
///
/// ### Returns
///
/// The requested user as JSON, or 404 if there is no such user
#[instrument(skip(pool))]
pub async fn get_user_handler(
    State(pool): State<Arc<DbPool>>,
    // Extract the user ID from the URL path
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = repo::get_user(&pool, &id)
        .map_err(ApiError::from_repo)?
        .ok_or_else(|| ApiError::NotFound(format!("User {}", id)))?;

    Ok(Json(user))
}

/// Handler for updating a user
///
/// This function handles PUT requests to `/users/{id}`. Fields left out of
/// the body are not changed.
#[instrument(skip(pool, payload))]
pub async fn update_user_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = repo::update_user(&pool, &id, payload)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Updated user {}", id);
    Ok(Json(user))
}

/// Handler for deleting a user
///
/// This function handles DELETE requests to `/users/{id}`.
#[instrument(skip(pool))]
pub async fn delete_user_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    repo::delete_user(&pool, &id)
        .await
        .map_err(ApiError::from_repo)?;

    info!("Deleted user {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for listing the notifications addressed to a user
///
/// This function handles GET requests to `/users/{id}/notifications`.
/// The path accepts the user id or the username.
///
/// ### Returns
///
/// The user's notifications, newest first; with `unread_only=true` only the
/// ones the user has not read yet
#[instrument(skip(pool))]
pub async fn list_user_notifications_handler(
    State(pool): State<Arc<DbPool>>,
    Path(id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<TaskNotification>>, ApiError> {
    let user = match repo::get_user(&pool, &id).map_err(ApiError::from_repo)? {
        Some(user) => user,
        None => repo::get_user_by_username(&pool, &id)
            .map_err(ApiError::from_repo)?
            .ok_or_else(|| ApiError::NotFound(format!("User {}", id)))?,
    };

    let notifications = repo::list_notifications_for_user(&pool, &user.get_username(), query.unread_only)
        .map_err(ApiError::from_repo)?;

    Ok(Json(notifications))
}

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::dto::MaintenanceQuery;
use crate::errors::ApiError;
use crate::maintenance::{self, MaintenanceCommand, MaintenanceReport};

/// Handler for running a maintenance command
///
/// This function handles POST requests to `/maintenance/{command}`.
/// Commands run as a dry run unless the query says `dry_run=false`.
///
/// ### Arguments
///
/// * `pool` - The database connection pool
/// * `command` - The command name, e.g. `repair-active-courses`
/// * `query` - Whether to write the changes
///
/// ### Returns
///
/// The report of what was examined, changed and left for a person to decide
#[instrument(skip(pool))]
pub async fn run_maintenance_handler(
    // Extract the database pool from the application state
    State(pool): State<Arc<DbPool>>,
    Path(command): Path<String>,
    Query(query): Query<MaintenanceQuery>,
) -> Result<Json<MaintenanceReport>, ApiError> {
    let command: MaintenanceCommand = command.parse().map_err(ApiError::BadRequest)?;

    info!("Running {} (dry_run={})", command, query.dry_run);
    let report = maintenance::run(&pool, command, query.dry_run)
        .await
        .map_err(ApiError::from_repo)?;

    Ok(Json(report))
}

/// Handler for listing the maintenance commands
///
/// This function handles GET requests to `/maintenance`.
pub async fn list_maintenance_commands_handler() -> Json<Vec<MaintenanceCommand>> {
    Json(MaintenanceCommand::ALL.to_vec())
}

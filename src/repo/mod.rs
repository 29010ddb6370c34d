/// Repository module
///
/// This module provides the data access layer for the application.
/// It contains functions for interacting with the database: users, the
/// course/section reference data, student assignments, tasks and their
/// notifications, grades and attendance.
///
/// Call sites never touch tables directly; every read and write goes
/// through these functions, which validate their input before writing.

mod user_repo;
mod course_repo;
mod assignment_repo;
mod task_repo;
mod notification_repo;
mod grade_repo;
mod attendance_repo;

// Re-export all repository functions
pub use user_repo::*;
pub use course_repo::*;
pub use assignment_repo::*;
pub use task_repo::*;
pub use notification_repo::*;
pub use grade_repo::*;
pub use attendance_repo::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures the repository reports on purpose, as opposed to storage errors
///
/// These travel inside `anyhow::Error` and are recovered by the HTTP layer
/// with `downcast_ref` to choose a status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result of deleting one page of records for a school year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePage {
    pub year: i32,
    pub deleted: usize,
    /// True when records for the year remain after this page
    pub more: bool,
    /// Id of the last deleted record; pass it back to continue
    pub next_cursor: Option<String>,
}

/// Smallest and largest accepted page size for deletes by year
pub const DELETE_PAGE_MIN: i64 = 1;
pub const DELETE_PAGE_MAX: i64 = 2000;
pub const DELETE_PAGE_DEFAULT: i64 = 1000;

/// Clamps a requested page size into the accepted range
pub fn clamp_page_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DELETE_PAGE_DEFAULT)
        .clamp(DELETE_PAGE_MIN, DELETE_PAGE_MAX)
}

/// Returns true if the error is a UNIQUE constraint violation
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<diesel::result::Error>(),
        Some(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        ))
    )
}

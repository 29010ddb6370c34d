use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::UserRole;
use crate::repo::DeletePage;

/// Query parameters for listing users
///
/// `role` may be repeated (`?role=student&role=teacher`); no role lists everyone.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UserQuery {
    pub role: Vec<UserRole>,
}

/// Query parameters for a user's notifications
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationQuery {
    pub unread_only: bool,
}

/// Data transfer object for creating a course or a section
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateNamedDto {
    /// The course or section name
    pub name: String,
}

/// Query parameters for listing sections
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SectionQuery {
    pub course_id: Option<String>,
}

/// Data transfer object for assigning a student to a course-section
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssignStudentDto {
    pub student_id: String,
    pub course_id: String,
    pub section_id: String,

    /// Username of whoever makes the assignment, "admin" when absent
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Query parameters for listing tasks
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TaskQuery {
    pub created_by: Option<String>,
}

/// Whether a student is among a task's recipients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssignedDto {
    pub task_id: String,
    pub student_id: String,
    pub assigned: bool,
}

/// Data transfer object for marking a notification as read
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MarkReadDto {
    pub username: String,
}

/// Query parameters for deleting a year of grades or attendance
///
/// Nothing is deleted unless `doit=1`. With `paged=1` only one page of at
/// most `limit` records after `cursor` is deleted; otherwise pages are
/// deleted until none remain.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DeleteByYearQuery {
    pub doit: Option<String>,
    pub paged: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// Reads `1`, `true` and `yes` as true
fn flag(value: &Option<String>) -> bool {
    matches!(
        value.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

impl DeleteByYearQuery {
    pub fn confirmed(&self) -> bool {
        flag(&self.doit)
    }

    pub fn single_page(&self) -> bool {
        flag(&self.paged)
    }
}

impl fmt::Display for DeleteByYearQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeleteByYearQuery {{ doit: {}, paged: {}, limit: {:?}, cursor: {:?} }}",
            self.confirmed(),
            self.single_page(),
            self.limit,
            self.cursor
        )
    }
}

/// Result of a delete-by-year request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeleteByYearDto {
    pub year: i32,
    pub deleted: usize,
    /// Number of pages deleted in this request
    pub pages: usize,
    pub more: bool,
    pub next_cursor: Option<String>,
}

impl DeleteByYearDto {
    /// Starts an accumulator for `year` with nothing deleted
    pub fn empty(year: i32) -> Self {
        Self { year, deleted: 0, pages: 0, more: false, next_cursor: None }
    }

    /// Folds one deleted page into the totals
    pub fn add_page(&mut self, page: DeletePage) {
        self.deleted += page.deleted;
        self.pages += 1;
        self.more = page.more;
        self.next_cursor = page.next_cursor;
    }
}

/// Query parameter selecting a school year; no year means every year
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct YearQuery {
    pub year: Option<i32>,
}

/// Data transfer object for generating a year of attendance
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenerateAttendanceDto {
    pub year: i32,

    /// Random seed; the same seed and roster give the same file
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Query parameters for a maintenance command
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceQuery {
    /// Defaults to true: changes are only written when `dry_run=false`
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

impl Default for MaintenanceQuery {
    fn default() -> Self {
        Self { dry_run: default_dry_run() }
    }
}

/// Query parameters for the subject style lookup
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubjectStyleQuery {
    pub name: String,
}

//! Import of browser storage snapshots
//!
//! Earlier versions of the school app kept everything in the browser's
//! `localStorage`, one JSON array per key. A snapshot is a JSON object mapping
//! those keys to their values (either the array itself or the string the
//! browser stored). Each record is parsed into a typed legacy struct,
//! validated, and inserted with its original id. Records whose id already
//! exists are skipped, so importing the same snapshot twice is harmless.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::course_section::is_guid;
use crate::db::DbPool;
use crate::models::{
    ActivityType, AssignedTo, Course, Grade, NewGrade, NewTask, NotificationType, Section, StringMap,
    StudentAssignment, Task, TaskNotification, User, UserRole, is_valid_score,
};
use crate::normalize::collapse_whitespace;
use crate::repo;
use crate::rut::Rut;

pub const USERS_KEY: &str = "smart-student-users";
pub const COURSES_KEY: &str = "smart-student-courses";
pub const SECTIONS_KEY: &str = "smart-student-sections";
pub const ASSIGNMENTS_KEY: &str = "smart-student-student-assignments";
pub const TASKS_KEY: &str = "smart-student-tasks";
pub const NOTIFICATIONS_KEY: &str = "smart-student-task-notifications";
pub const GRADES_KEY_PREFIX: &str = "smart-student-test-grades-";

/// The storage keys the importer understands, in import order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LegacyKey {
    Users,
    Courses,
    Sections,
    Assignments,
    Tasks,
    Notifications,
    Grades(i32),
}

impl LegacyKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            USERS_KEY => Some(LegacyKey::Users),
            COURSES_KEY => Some(LegacyKey::Courses),
            SECTIONS_KEY => Some(LegacyKey::Sections),
            ASSIGNMENTS_KEY => Some(LegacyKey::Assignments),
            TASKS_KEY => Some(LegacyKey::Tasks),
            NOTIFICATIONS_KEY => Some(LegacyKey::Notifications),
            other => other
                .strip_prefix(GRADES_KEY_PREFIX)
                .and_then(|year| year.parse().ok())
                .map(LegacyKey::Grades),
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            LegacyKey::Users => USERS_KEY.to_string(),
            LegacyKey::Courses => COURSES_KEY.to_string(),
            LegacyKey::Sections => SECTIONS_KEY.to_string(),
            LegacyKey::Assignments => ASSIGNMENTS_KEY.to_string(),
            LegacyKey::Tasks => TASKS_KEY.to_string(),
            LegacyKey::Notifications => NOTIFICATIONS_KEY.to_string(),
            LegacyKey::Grades(year) => format!("{}{}", GRADES_KEY_PREFIX, year),
        }
    }
}

/// A record that was not imported, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Index of the record in the stored array
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

/// Outcome of importing one storage key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub key: String,
    pub imported: usize,
    pub skipped: usize,
    pub rejected: Vec<Rejection>,
}

impl ImportReport {
    fn new(key: String) -> Self {
        Self { key, imported: 0, skipped: 0, rejected: Vec::new() }
    }
}

/// Timestamps were stored either as epoch milliseconds or as ISO text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LegacyTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl LegacyTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LegacyTimestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            LegacyTimestamp::Fractional(ms) => DateTime::from_timestamp_millis(*ms as i64),
            LegacyTimestamp::Text(text) => {
                let text = text.trim();
                DateTime::parse_from_rfc3339(text)
                    .map(|d| d.with_timezone(&Utc))
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(text, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(12, 0, 0))
                            .map(|d| Utc.from_utc_datetime(&d))
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub role: String,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub rut: Option<String>,
    #[serde(default)]
    pub active_courses: Vec<String>,
    #[serde(default)]
    pub assigned_teachers: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCourse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySection {
    pub id: String,
    pub name: String,
    pub course_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyAssignment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub section_id: String,
    #[serde(default, alias = "assignedBy")]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<LegacyTimestamp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    /// Bare or combined course id
    #[serde(default)]
    pub course: String,
    #[serde(default, alias = "assignedBy", alias = "createdBy")]
    pub assigned_by_username: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub assigned_student_ids: Vec<String>,
    #[serde(default)]
    pub due_date: Option<LegacyTimestamp>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub task_id: String,
    #[serde(default)]
    pub target_usernames: Vec<String>,
    #[serde(default)]
    pub from_username: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub read_by: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyGrade {
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default, alias = "studentRut")]
    pub rut: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "title")]
    pub topic: String,
    #[serde(default)]
    pub activity_type: Option<String>,
    pub score: f64,
    #[serde(default)]
    pub graded_at: Option<LegacyTimestamp>,
}

/// Outcome of importing one record
enum Outcome {
    Imported,
    Skipped,
    Rejected(String),
}

fn reject(reason: impl Into<String>) -> Result<Outcome> {
    Ok(Outcome::Rejected(reason.into()))
}

/// Lower-cases a GUID, or returns None if it is not one
fn guid(value: &str) -> Option<String> {
    let value = value.trim();
    is_guid(value).then(|| value.to_ascii_lowercase())
}

/// Turns a stored value into its array of records
///
/// `localStorage` holds strings, so the value may be JSON text.
fn records_of(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(_) => Err("stored text is not a JSON array".to_string()),
            Err(e) => Err(format!("stored text is not JSON: {}", e)),
        },
        Value::Null => Ok(Vec::new()),
        _ => Err("value is not an array".to_string()),
    }
}

/// Imports a whole snapshot
///
/// Keys are processed in dependency order (users and reference data before
/// assignments, tasks before notifications). Unknown keys are ignored.
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `snapshot` - A JSON object keyed by storage key
///
/// ### Returns
///
/// One report per recognised key
///
/// ### Errors
///
/// Returns an error if the snapshot is not an object or the database fails.
/// Invalid records are reported, not raised.
#[instrument(skip_all)]
pub async fn import_snapshot(pool: &DbPool, snapshot: &Value) -> Result<Vec<ImportReport>> {
    let Some(entries) = snapshot.as_object() else {
        return Err(repo::RepoError::Invalid("snapshot must be a JSON object".to_string()).into());
    };

    let mut keys: Vec<(LegacyKey, &Value)> = Vec::new();
    for (key, value) in entries {
        match LegacyKey::parse(key) {
            Some(parsed) => keys.push((parsed, value)),
            None => warn!("Ignoring unknown storage key {}", key),
        }
    }
    keys.sort_by_key(|(key, _)| *key);

    let mut reports = Vec::with_capacity(keys.len());
    for (key, value) in keys {
        let report = import_key(pool, key, value).await?;
        info!(
            "Imported {}: {} imported, {} skipped, {} rejected",
            report.key,
            report.imported,
            report.skipped,
            report.rejected.len()
        );
        reports.push(report);
    }
    Ok(reports)
}

/// Imports the records stored under one key
pub async fn import_key(pool: &DbPool, key: LegacyKey, value: &Value) -> Result<ImportReport> {
    let mut report = ImportReport::new(key.as_key());
    let records = match records_of(value) {
        Ok(records) => records,
        Err(reason) => {
            report.rejected.push(Rejection { index: 0, id: None, reason });
            return Ok(report);
        }
    };

    for (index, record) in records.into_iter().enumerate() {
        let id = record.get("id").and_then(Value::as_str).map(str::to_string);
        let outcome = match key {
            LegacyKey::Users => with_parsed(record, |r| import_user(pool, r)).await?,
            LegacyKey::Courses => with_parsed(record, |r| import_course(pool, r)).await?,
            LegacyKey::Sections => with_parsed(record, |r| import_section(pool, r)).await?,
            LegacyKey::Assignments => with_parsed(record, |r| import_assignment(pool, r)).await?,
            LegacyKey::Tasks => with_parsed(record, |r| import_task(pool, r)).await?,
            LegacyKey::Notifications => with_parsed(record, |r| import_notification(pool, r)).await?,
            LegacyKey::Grades(year) => with_parsed(record, |r| import_grade(pool, r, year)).await?,
        };
        match outcome {
            Outcome::Imported => report.imported += 1,
            Outcome::Skipped => report.skipped += 1,
            Outcome::Rejected(reason) => report.rejected.push(Rejection { index, id, reason }),
        }
    }
    Ok(report)
}

/// Deserializes a record, turning a shape error into a rejection
async fn with_parsed<T, F, Fut>(record: Value, import: F) -> Result<Outcome>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<Outcome>>,
{
    match serde_json::from_value::<T>(record) {
        Ok(parsed) => import(parsed).await,
        Err(e) => reject(format!("malformed record: {}", e)),
    }
}

/// Maps an insert failure that is the record's fault to a rejection
fn conflict_or_err(err: anyhow::Error) -> Result<Outcome> {
    match err.downcast_ref::<repo::RepoError>() {
        Some(repo_err) => reject(repo_err.to_string()),
        None if repo::is_unique_violation(&err) => reject("conflicts with an existing record"),
        None => Err(err),
    }
}

async fn import_user(pool: &DbPool, legacy: LegacyUser) -> Result<Outcome> {
    let id = legacy.id.trim().to_string();
    let username = legacy.username.trim().to_string();
    if id.is_empty() || username.is_empty() {
        return reject("id and username are required");
    }
    let role: UserRole = match legacy.role.parse() {
        Ok(role) => role,
        Err(e) => return reject(e),
    };
    let Some(password) = legacy.password.filter(|p| !p.is_empty()) else {
        return reject("password is required");
    };
    let rut = match legacy.rut.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match Rut::parse(raw) {
            Ok(rut) => Some(rut.to_string()),
            Err(e) => return reject(e.to_string()),
        },
    };

    if repo::get_user(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }

    let display_name = legacy
        .display_name
        .map(|d| collapse_whitespace(&d))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| username.clone());
    let teachers = StringMap(
        legacy
            .assigned_teachers
            .into_iter()
            .filter_map(|(subject, teacher)| teacher.as_str().map(|t| (subject, t.to_string())))
            .collect(),
    );
    let email = legacy.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());

    let user = User::new(username, &password, role, display_name)
        .with_id(id)
        .with_rut(rut)
        .with_email(email)
        .with_active_courses(legacy.active_courses)
        .with_assigned_teachers(teachers);
    match repo::insert_user(pool, user).await {
        Ok(_) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

async fn import_course(pool: &DbPool, legacy: LegacyCourse) -> Result<Outcome> {
    let Some(id) = guid(&legacy.id) else {
        return reject(format!("course id {:?} is not a GUID", legacy.id));
    };
    let name = collapse_whitespace(&legacy.name);
    if name.is_empty() {
        return reject("course name is required");
    }
    if repo::get_course(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }
    if repo::get_course_by_name(pool, &name)?.is_some() {
        return reject(format!("another course is already named {}", name));
    }

    match repo::insert_course(pool, &Course::new_with_fields(id, name, Utc::now())).await {
        Ok(()) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

async fn import_section(pool: &DbPool, legacy: LegacySection) -> Result<Outcome> {
    let Some(id) = guid(&legacy.id) else {
        return reject(format!("section id {:?} is not a GUID", legacy.id));
    };
    let Some(course_id) = guid(&legacy.course_id) else {
        return reject(format!("course id {:?} is not a GUID", legacy.course_id));
    };
    let name = collapse_whitespace(&legacy.name);
    if name.is_empty() {
        return reject("section name is required");
    }
    if repo::get_section(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }
    if repo::get_course(pool, &course_id)?.is_none() {
        return reject(format!("unknown course {}", course_id));
    }

    let section = Section::new_with_fields(id, course_id, name, Utc::now());
    match repo::insert_section(pool, &section).await {
        Ok(()) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

async fn import_assignment(pool: &DbPool, legacy: LegacyAssignment) -> Result<Outcome> {
    let id = legacy.id.trim().to_string();
    if id.is_empty() {
        return reject("id is required");
    }
    let (Some(course_id), Some(section_id)) = (guid(&legacy.course_id), guid(&legacy.section_id)) else {
        return reject("course and section ids must be GUIDs");
    };
    if repo::get_assignment(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }

    match repo::get_user(pool, legacy.student_id.trim())? {
        Some(user) if user.get_role() == UserRole::Student => {}
        Some(_) => return reject(format!("user {} is not a student", legacy.student_id)),
        None => return reject(format!("unknown student {}", legacy.student_id)),
    }
    match repo::get_section(pool, &section_id)? {
        Some(section) if section.get_course_id() == course_id => {}
        Some(_) => return reject(format!("section {} is not in course {}", section_id, course_id)),
        None => return reject(format!("unknown section {}", section_id)),
    }
    let already = repo::list_assignments(
        pool,
        &repo::AssignmentFilter {
            student_id: Some(legacy.student_id.trim().to_string()),
            course_id: Some(course_id.clone()),
            section_id: None,
        },
    )?;
    if !already.is_empty() {
        return reject("student already has an assignment in this course");
    }

    let created_at = legacy
        .created_at
        .as_ref()
        .and_then(LegacyTimestamp::to_datetime)
        .unwrap_or_else(Utc::now);
    let assignment = StudentAssignment::new_with_fields(
        id,
        legacy.student_id.trim().to_string(),
        course_id,
        section_id,
        legacy.created_by.unwrap_or_else(|| "legacy-import".to_string()),
        created_at,
    );
    match repo::insert_assignment(pool, &assignment).await {
        Ok(()) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

async fn import_task(pool: &DbPool, legacy: LegacyTask) -> Result<Outcome> {
    let id = legacy.id.trim().to_string();
    if id.is_empty() || legacy.title.trim().is_empty() {
        return reject("id and title are required");
    }
    let assigned_to: AssignedTo = match legacy.assigned_to.as_deref() {
        None => AssignedTo::Course,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => return reject(e),
        },
    };
    if assigned_to == AssignedTo::Student && legacy.assigned_student_ids.is_empty() {
        return reject("a student task needs at least one student");
    }
    if repo::get_task(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }

    let resolved = repo::resolve_course_section(pool, &legacy.course)?;
    if resolved.is_none() && assigned_to == AssignedTo::Course {
        warn!("Legacy task {} has an unresolvable course reference {:?}", id, legacy.course);
    }
    let task = Task::new(
        NewTask {
            title: legacy.title.trim().to_string(),
            description: legacy.description,
            subject: legacy.subject,
            created_by: legacy
                .assigned_by_username
                .unwrap_or_else(|| "legacy-import".to_string()),
            assigned_to,
            course_ref: legacy.course,
            assigned_student_ids: legacy.assigned_student_ids,
            due_date: legacy.due_date.as_ref().and_then(LegacyTimestamp::to_datetime),
        },
        resolved.as_ref().map(|r| r.course.get_id()),
        resolved.as_ref().map(|r| r.section.get_id()),
    )
    .with_id(id);

    match repo::insert_task(pool, &task).await {
        Ok(()) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

async fn import_notification(pool: &DbPool, legacy: LegacyNotification) -> Result<Outcome> {
    let id = legacy.id.trim().to_string();
    if id.is_empty() {
        return reject("id is required");
    }
    let notification_type: NotificationType = match legacy.notification_type.parse() {
        Ok(value) => value,
        Err(e) => return reject(e),
    };
    if repo::get_notification(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }
    if repo::get_task(pool, &legacy.task_id)?.is_none() {
        return reject(format!("unknown task {}", legacy.task_id));
    }

    let read_by: Vec<String> = legacy
        .read_by
        .into_iter()
        .filter(|u| legacy.target_usernames.contains(u))
        .collect();
    let notification = TaskNotification::new(
        legacy.task_id,
        notification_type,
        legacy.target_usernames,
        legacy.from_username,
        legacy.course,
    )
    .with_id(id)
    .with_read_by(read_by);

    match repo::create_notification(pool, &notification).await {
        Ok(()) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

async fn import_grade(pool: &DbPool, legacy: LegacyGrade, year: i32) -> Result<Outcome> {
    let id = legacy.id.trim().to_string();
    if id.is_empty() {
        return reject("id is required");
    }
    if !is_valid_score(legacy.score) {
        return reject(format!("score {} is outside 0-100", legacy.score));
    }
    let activity_type: ActivityType = match legacy.activity_type.as_deref() {
        None => ActivityType::Test,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => return reject(e),
        },
    };
    let optional_guid = |value: &Option<String>| -> Result<Option<String>, String> {
        match value.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => guid(raw).map(Some).ok_or_else(|| format!("{:?} is not a GUID", raw)),
        }
    };
    let (course_id, section_id) = match (optional_guid(&legacy.course_id), optional_guid(&legacy.section_id)) {
        (Ok(course_id), Ok(section_id)) => (course_id, section_id),
        (Err(reason), _) | (_, Err(reason)) => return reject(reason),
    };
    let student_rut = match legacy.rut.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match Rut::parse(raw) {
            Ok(rut) => Some(rut.to_string()),
            Err(e) => return reject(e.to_string()),
        },
    };
    if repo::get_grade(pool, &id)?.is_some() {
        return Ok(Outcome::Skipped);
    }

    let student_id = match legacy.student_id.as_deref().map(str::trim) {
        Some(student_id) if !student_id.is_empty() => {
            if repo::get_user(pool, student_id)?.is_some() {
                Some(student_id.to_string())
            } else if student_rut.is_some() {
                None
            } else {
                return reject(format!("unknown student {} and no RUT", student_id));
            }
        }
        _ if student_rut.is_some() => None,
        _ => return reject("a grade needs a student id or a RUT"),
    };

    // A grade without a date is placed at the start of the key's school year
    let graded_at = legacy
        .graded_at
        .as_ref()
        .and_then(LegacyTimestamp::to_datetime)
        .or_else(|| Utc.with_ymd_and_hms(year, 3, 1, 12, 0, 0).single())
        .unwrap_or_else(Utc::now);

    let grade = Grade::new(NewGrade {
        student_id,
        student_rut,
        course_id,
        section_id,
        subject: legacy.subject.trim().to_string(),
        activity_type,
        score: legacy.score,
        topic: legacy.topic,
        graded_at,
    })
    .with_id(id);

    match repo::insert_grade(pool, &grade).await {
        Ok(()) => Ok(Outcome::Imported),
        Err(e) => conflict_or_err(e),
    }
}

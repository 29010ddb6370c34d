use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StringList;
use super::text_enum::text_enum;

text_enum! {
    /// Who a task is addressed to
    pub enum AssignedTo {
        /// Every student of a course-section
        Course => "course",
        /// An explicit list of students
        Student => "student",
    }
}

/// Represents a task (homework or evaluation) assigned by a teacher
///
/// `course_ref` keeps the course identifier exactly as it was supplied (a
/// bare course id or a combined course-section id); `course_id` and
/// `section_id` hold what it resolved to at creation time, or `None` when it
/// did not resolve.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::tasks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Task {
    id: String,
    title: String,
    description: String,
    subject: String,
    /// Username of the teacher who created the task
    created_by: String,
    assigned_to: AssignedTo,
    course_ref: String,
    course_id: Option<String>,
    section_id: Option<String>,
    /// Student ids, only meaningful when `assigned_to` is `student`
    assigned_student_ids: StringList,
    due_date: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
}

/// Fields needed to create a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    pub created_by: String,
    pub assigned_to: AssignedTo,
    /// Combined course-section id, or a bare course id
    #[serde(default)]
    pub course_ref: String,
    #[serde(default)]
    pub assigned_student_ids: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a task from its fields and the resolved course-section
    pub fn new(fields: NewTask, course_id: Option<String>, section_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: fields.title,
            description: fields.description,
            subject: fields.subject,
            created_by: fields.created_by,
            assigned_to: fields.assigned_to,
            course_ref: fields.course_ref.trim().to_string(),
            course_id,
            section_id,
            assigned_student_ids: StringList(fields.assigned_student_ids),
            due_date: fields.due_date.map(|d| d.naive_utc()),
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Overrides the generated id (used when importing legacy tasks)
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }

    /// Replaces the resolved course and section, e.g. after a re-resolution
    pub fn with_course_section(mut self, course_id: Option<String>, section_id: Option<String>) -> Self {
        self.course_id = course_id;
        self.section_id = section_id;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_title(&self) -> String {
        self.title.clone()
    }

    pub fn get_description(&self) -> String {
        self.description.clone()
    }

    pub fn get_subject(&self) -> String {
        self.subject.clone()
    }

    pub fn get_created_by(&self) -> String {
        self.created_by.clone()
    }

    pub fn get_assigned_to(&self) -> AssignedTo {
        self.assigned_to
    }

    pub fn get_course_ref(&self) -> String {
        self.course_ref.clone()
    }

    pub fn get_course_id(&self) -> Option<String> {
        self.course_id.clone()
    }

    pub fn get_section_id(&self) -> Option<String> {
        self.section_id.clone()
    }

    pub fn get_assigned_student_ids(&self) -> Vec<String> {
        self.assigned_student_ids.0.clone()
    }

    pub fn get_due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date.map(|d| DateTime::from_naive_utc_and_offset(d, Utc))
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }
}

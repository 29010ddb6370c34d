use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Links a student to one section of a course
///
/// A student holds at most one assignment per course; the pair
/// `(student_id, course_id)` is unique in the database.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::student_assignments)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StudentAssignment {
    /// Unique identifier for the assignment (UUID v4 as string)
    id: String,

    /// The assigned student
    student_id: String,

    /// The course the student attends
    course_id: String,

    /// The section of that course
    section_id: String,

    /// Who (or which maintenance command) created the assignment
    created_by: String,

    /// When this assignment was created
    created_at: NaiveDateTime,
}

impl StudentAssignment {
    /// Creates a new assignment with a generated id
    pub fn new(student_id: String, course_id: String, section_id: String, created_by: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id,
            course_id,
            section_id,
            created_by,
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Creates an assignment with all fields specified
    pub fn new_with_fields(
        id: String,
        student_id: String,
        course_id: String,
        section_id: String,
        created_by: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student_id,
            course_id,
            section_id,
            created_by,
            created_at: created_at.naive_utc(),
        }
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_student_id(&self) -> String {
        self.student_id.clone()
    }

    pub fn get_course_id(&self) -> String {
        self.course_id.clone()
    }

    pub fn get_section_id(&self) -> String {
        self.section_id.clone()
    }

    pub fn get_created_by(&self) -> String {
        self.created_by.clone()
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    /// Gets the raw creation timestamp, used for deterministic ordering
    pub fn get_created_at_raw(&self) -> NaiveDateTime {
        self.created_at
    }

    /// Returns true if this assignment places its student in the given course-section
    pub fn matches(&self, course_id: &str, section_id: &str) -> bool {
        self.course_id == course_id && self.section_id == section_id
    }
}

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a subdivision of a course, e.g. section "A" of "5to Básico"
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Section {
    /// Unique identifier for the section (UUID v4 as string)
    id: String,

    /// The course this section belongs to
    course_id: String,

    /// The section name, unique within its course
    name: String,

    /// When this section was created
    created_at: NaiveDateTime,
}

impl Section {
    /// Creates a new section of `course_id` with a generated id
    pub fn new(course_id: String, name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            course_id,
            name,
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Creates a section with all fields specified
    pub fn new_with_fields(id: String, course_id: String, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            course_id,
            name,
            created_at: created_at.naive_utc(),
        }
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_course_id(&self) -> String {
        self.course_id.clone()
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }
}

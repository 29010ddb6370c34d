use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a course (grade level), e.g. "5to Básico"
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Course {
    /// Unique identifier for the course (UUID v4 as string)
    id: String,

    /// The course name, unique across the school
    name: String,

    /// When this course was created
    created_at: NaiveDateTime,
}

impl Course {
    /// Creates a new course with a generated id
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Creates a course with all fields specified
    pub fn new_with_fields(id: String, name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            created_at: created_at.naive_utc(),
        }
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }
}

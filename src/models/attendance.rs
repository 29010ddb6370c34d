use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum::text_enum;

text_enum! {
    /// Attendance outcome for one student on one school day
    pub enum AttendanceStatus {
        Present => "present",
        Late => "late",
        Excused => "excused",
        Absent => "absent",
    }
}

/// One attendance mark; unique per student and date
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::attendance)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttendanceRecord {
    id: String,
    student_id: String,
    course_id: String,
    section_id: String,
    date: NaiveDate,
    status: AttendanceStatus,
    comment: String,
    year: i32,
    created_at: NaiveDateTime,
}

impl AttendanceRecord {
    /// Creates a new attendance mark; the year is taken from `date`
    pub fn new(
        student_id: String,
        course_id: String,
        section_id: String,
        date: NaiveDate,
        status: AttendanceStatus,
        comment: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id,
            course_id,
            section_id,
            date,
            status,
            comment,
            year: date.year(),
            created_at: Utc::now().naive_utc(),
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

    pub fn get_date(&self) -> NaiveDate {
        self.date
    }

    pub fn get_status(&self) -> AttendanceStatus {
        self.status
    }

    pub fn get_comment(&self) -> String {
        self.comment.clone()
    }

    pub fn get_year(&self) -> i32 {
        self.year
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }
}

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum::text_enum;

text_enum! {
    /// The kind of graded activity
    pub enum ActivityType {
        Test => "prueba",
        Homework => "tarea",
        Evaluation => "evaluacion",
    }
}

/// Lowest accepted score
pub const MIN_SCORE: f64 = 0.0;

/// Highest accepted score
pub const MAX_SCORE: f64 = 100.0;

/// Represents a single grade
///
/// Grades arrive from several loading paths: some know the internal student
/// id, others only the student's RUT. Both are kept so that
/// `link_grades_to_students` can fill in the id later.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::grades)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Grade {
    id: String,
    student_id: Option<String>,
    student_rut: Option<String>,
    course_id: Option<String>,
    section_id: Option<String>,
    subject: String,
    activity_type: ActivityType,
    score: f64,
    topic: String,
    graded_at: NaiveDateTime,
    /// School year, derived from `graded_at`
    year: i32,
    created_at: NaiveDateTime,
}

/// Fields needed to create a grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGrade {
    pub student_id: Option<String>,
    pub student_rut: Option<String>,
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub subject: String,
    pub activity_type: ActivityType,
    pub score: f64,
    #[serde(default)]
    pub topic: String,
    pub graded_at: DateTime<Utc>,
}

/// Returns true if `score` lies within the accepted range
pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)
}

impl Grade {
    /// Creates a grade; the year is taken from `graded_at`
    pub fn new(fields: NewGrade) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            student_id: fields.student_id,
            student_rut: fields.student_rut,
            course_id: fields.course_id,
            section_id: fields.section_id,
            subject: fields.subject,
            activity_type: fields.activity_type,
            score: fields.score,
            topic: fields.topic,
            graded_at: fields.graded_at.naive_utc(),
            year: fields.graded_at.year(),
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Overrides the generated id (used when importing legacy grades)
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_student_id(&self) -> Option<String> {
        self.student_id.clone()
    }

    pub fn get_student_rut(&self) -> Option<String> {
        self.student_rut.clone()
    }

    pub fn get_course_id(&self) -> Option<String> {
        self.course_id.clone()
    }

    pub fn get_section_id(&self) -> Option<String> {
        self.section_id.clone()
    }

    pub fn get_subject(&self) -> String {
        self.subject.clone()
    }

    pub fn get_activity_type(&self) -> ActivityType {
        self.activity_type
    }

    pub fn get_score(&self) -> f64 {
        self.score
    }

    pub fn get_topic(&self) -> String {
        self.topic.clone()
    }

    pub fn get_graded_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.graded_at, Utc)
    }

    pub fn get_year(&self) -> i32 {
        self.year
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_year_follows_graded_at() {
        let grade = Grade::new(NewGrade {
            student_id: None,
            student_rut: Some("10000000-8".to_string()),
            course_id: None,
            section_id: None,
            subject: "Matemáticas".to_string(),
            activity_type: ActivityType::Test,
            score: 87.0,
            topic: "Fracciones".to_string(),
            graded_at: Utc.with_ymd_and_hms(2024, 11, 3, 12, 0, 0).unwrap(),
        });
        assert_eq!(grade.get_year(), 2024);
    }

    #[test]
    fn test_score_bounds() {
        assert!(is_valid_score(0.0));
        assert!(is_valid_score(100.0));
        assert!(!is_valid_score(100.5));
        assert!(!is_valid_score(-1.0));
        assert!(!is_valid_score(f64::NAN));
    }

    #[test]
    fn test_activity_type_uses_spanish_labels() {
        assert_eq!(ActivityType::Evaluation.as_str(), "evaluacion");
        assert_eq!("TAREA".parse::<ActivityType>().unwrap(), ActivityType::Homework);
    }
}

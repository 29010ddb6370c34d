use crate::db::{DbPool, with_retry};
use crate::models::{Grade, NewGrade, is_valid_score};
use crate::repo::{DeletePage, RepoError, get_user, get_user_by_rut};
use crate::rut::Rut;
use crate::schema::grades;
use anyhow::Result;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Optional filters for listing grades
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeFilter {
    pub year: Option<i32>,
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub section_id: Option<String>,
    pub subject: Option<String>,
}

/// Records a grade
///
/// The RUT is stored in canonical form. When only a RUT is given and a user
/// has it, the grade is linked to that user.
///
/// ### Errors
///
/// Returns an error if:
/// - The score is outside 0–100
/// - Neither a student id nor a RUT is given, or the RUT is invalid
/// - The given student id does not exist
#[instrument(skip(pool, new_grade), fields(subject = %new_grade.subject, score = new_grade.score))]
pub async fn create_grade(pool: &DbPool, new_grade: NewGrade) -> Result<Grade> {
    if !is_valid_score(new_grade.score) {
        return Err(RepoError::Invalid(format!("score {} is outside 0-100", new_grade.score)).into());
    }
    if new_grade.subject.trim().is_empty() {
        return Err(RepoError::Invalid("subject must not be empty".to_string()).into());
    }

    let student_rut = match new_grade.student_rut.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Rut::parse(raw)
                .map_err(|e| RepoError::Invalid(e.to_string()))?
                .to_string(),
        ),
    };

    let student_id = match (&new_grade.student_id, &student_rut) {
        (Some(id), _) => {
            get_user(pool, id)?.ok_or_else(|| RepoError::NotFound(format!("Student {}", id)))?;
            Some(id.clone())
        }
        (None, Some(rut)) => get_user_by_rut(pool, rut)?.map(|u| u.get_id()),
        (None, None) => {
            return Err(RepoError::Invalid("a grade needs a student id or a RUT".to_string()).into());
        }
    };

    let grade = Grade::new(NewGrade {
        student_id,
        student_rut,
        subject: new_grade.subject.trim().to_string(),
        ..new_grade
    });
    insert_grade(pool, &grade).await?;
    Ok(grade)
}

/// Inserts an already built grade (used by imports that carry their own ids)
pub async fn insert_grade(pool: &DbPool, grade: &Grade) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| diesel::insert_into(grades::table).values(grade).execute(conn)).await?;
    Ok(())
}

/// Retrieves a grade by its ID
pub fn get_grade(pool: &DbPool, grade_id: &str) -> Result<Option<Grade>> {
    let conn = &mut pool.get()?;

    let result = grades::table
        .find(grade_id)
        .first::<Grade>(conn)
        .optional()?;

    Ok(result)
}

/// Lists grades matching the filter, ordered by grading date
pub fn list_grades(pool: &DbPool, filter: &GradeFilter) -> Result<Vec<Grade>> {
    let conn = &mut pool.get()?;

    let mut query = grades::table
        .order((grades::graded_at.asc(), grades::id.asc()))
        .into_boxed();
    if let Some(year) = filter.year {
        query = query.filter(grades::year.eq(year));
    }
    if let Some(student_id) = &filter.student_id {
        query = query.filter(grades::student_id.eq(student_id.clone()));
    }
    if let Some(course_id) = &filter.course_id {
        query = query.filter(grades::course_id.eq(course_id.clone()));
    }
    if let Some(section_id) = &filter.section_id {
        query = query.filter(grades::section_id.eq(section_id.clone()));
    }
    if let Some(subject) = &filter.subject {
        query = query.filter(grades::subject.eq(subject.clone()));
    }

    Ok(query.load::<Grade>(conn)?)
}

/// Sets the student, course and section links of a grade
pub async fn link_grade(
    pool: &DbPool,
    grade_id: &str,
    student_id: Option<String>,
    course_id: Option<String>,
    section_id: Option<String>,
) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| {
        diesel::update(grades::table.find(grade_id))
            .set((
                grades::student_id.eq(&student_id),
                grades::course_id.eq(&course_id),
                grades::section_id.eq(&section_id),
            ))
            .execute(conn)
    })
    .await?;
    Ok(())
}

/// Deletes up to `limit` grades of a school year, in id order after `cursor`
///
/// Call repeatedly with the returned cursor while `more` is true.
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `year` - The school year to delete
/// * `limit` - Page size (clamp it with `clamp_page_limit` first)
/// * `cursor` - The `next_cursor` of the previous page, if any
#[instrument(skip(pool))]
pub async fn delete_grades_by_year_page(
    pool: &DbPool,
    year: i32,
    limit: i64,
    cursor: Option<&str>,
) -> Result<DeletePage> {
    let conn = &mut pool.get()?;
    let after = cursor.unwrap_or("").to_string();

    let page = with_retry(|| {
        conn.transaction(|conn| {
            let ids: Vec<String> = grades::table
                .filter(grades::year.eq(year))
                .filter(grades::id.gt(&after))
                .order(grades::id.asc())
                .limit(limit)
                .select(grades::id)
                .load(conn)?;

            let deleted = diesel::delete(grades::table.filter(grades::id.eq_any(&ids))).execute(conn)?;
            let last = ids.last().cloned();

            let remaining: i64 = match &last {
                Some(last) => grades::table
                    .filter(grades::year.eq(year))
                    .filter(grades::id.gt(last))
                    .count()
                    .get_result(conn)?,
                None => 0,
            };

            Ok(DeletePage {
                year,
                deleted,
                more: remaining > 0,
                next_cursor: if remaining > 0 { last } else { None },
            })
        })
    })
    .await?;

    info!("Deleted {} grades of {}", page.deleted, year);
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityType, NewUser, UserRole};
    use crate::repo::create_user;
    use crate::test_utils::{arb_invalid_score, setup_test_db};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn grade_for_rut(rut: &str, year: i32, score: f64) -> NewGrade {
        NewGrade {
            student_id: None,
            student_rut: Some(rut.to_string()),
            course_id: None,
            section_id: None,
            subject: "Matemáticas".to_string(),
            activity_type: ActivityType::Test,
            score,
            topic: "Fracciones".to_string(),
            graded_at: Utc.with_ymd_and_hms(year, 5, 10, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_grade_links_student_by_rut() {
        let pool = setup_test_db();
        let user = create_user(
            &pool,
            NewUser {
                username: "ana".to_string(),
                password: "1234".to_string(),
                role: UserRole::Student,
                display_name: "Ana".to_string(),
                rut: Some("12345678-5".to_string()),
                email: None,
                active_courses: vec![],
            },
        )
        .await
        .unwrap();

        let grade = create_grade(&pool, grade_for_rut("12.345.678-5", 2025, 90.0)).await.unwrap();

        assert_eq!(grade.get_student_id(), Some(user.get_id()));
        assert_eq!(grade.get_student_rut(), Some("12345678-5".to_string()));
        assert_eq!(grade.get_year(), 2025);
    }

    #[tokio::test]
    async fn test_create_grade_keeps_unknown_rut_unlinked() {
        let pool = setup_test_db();
        let grade = create_grade(&pool, grade_for_rut("11111111-1", 2025, 70.0)).await.unwrap();

        assert_eq!(grade.get_student_id(), None);
        assert_eq!(list_grades(&pool, &GradeFilter::default()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_grade_requires_a_student_reference() {
        let pool = setup_test_db();
        let mut fields = grade_for_rut("11111111-1", 2025, 70.0);
        fields.student_rut = None;

        let err = create_grade(&pool, fields).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_list_grades_by_year() {
        let pool = setup_test_db();
        create_grade(&pool, grade_for_rut("11111111-1", 2024, 70.0)).await.unwrap();
        create_grade(&pool, grade_for_rut("11111111-1", 2025, 80.0)).await.unwrap();

        let filter = GradeFilter { year: Some(2025), ..Default::default() };
        let grades = list_grades(&pool, &filter).unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].get_score(), 80.0);
    }

    #[tokio::test]
    async fn test_delete_grades_by_year_pages_through_all_records() {
        let pool = setup_test_db();
        for i in 0..5 {
            create_grade(&pool, grade_for_rut("11111111-1", 2024, 60.0 + i as f64)).await.unwrap();
        }
        create_grade(&pool, grade_for_rut("11111111-1", 2025, 99.0)).await.unwrap();

        let first = delete_grades_by_year_page(&pool, 2024, 2, None).await.unwrap();
        assert_eq!(first.deleted, 2);
        assert!(first.more);

        let second = delete_grades_by_year_page(&pool, 2024, 2, first.next_cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(second.deleted, 2);
        assert!(second.more);

        let third = delete_grades_by_year_page(&pool, 2024, 2, second.next_cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(third.deleted, 1);
        assert!(!third.more);
        assert_eq!(third.next_cursor, None);

        let remaining = list_grades(&pool, &GradeFilter::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get_year(), 2025);
    }

    #[tokio::test]
    async fn test_delete_grades_for_empty_year() {
        let pool = setup_test_db();
        let page = delete_grades_by_year_page(&pool, 1999, 100, None).await.unwrap();
        assert_eq!(page.deleted, 0);
        assert!(!page.more);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_out_of_range_scores_are_rejected(score in arb_invalid_score()) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let pool = setup_test_db();
                let result = create_grade(&pool, grade_for_rut("11111111-1", 2025, score)).await;
                assert!(result.is_err(), "score {} should be rejected", score);
                assert!(list_grades(&pool, &GradeFilter::default()).unwrap().is_empty());
            });
        }
    }
}

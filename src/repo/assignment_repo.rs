use crate::course_section::{self, ResolvedCourseSection};
use crate::db::{DbPool, with_retry};
use crate::models::{Section, StudentAssignment, User, UserRole};
use crate::repo::{RepoError, get_course, get_section, get_user};
use crate::schema::{sections, student_assignments, users};
use anyhow::Result;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Optional filters for listing assignments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub section_id: Option<String>,
}

/// Places a student in a course-section
///
/// A student has at most one assignment per course. Assigning to the same
/// section again returns the existing assignment unchanged; assigning to a
/// different section of the same course moves the student.
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `student_id` - The student to place
/// * `course_id` - The course
/// * `section_id` - The section, which must belong to the course
/// * `created_by` - Username of whoever made the assignment
///
/// ### Returns
///
/// A Result containing the current assignment
///
/// ### Errors
///
/// Returns an error if:
/// - The student, course or section does not exist
/// - The user is not a student
/// - The section belongs to another course
#[instrument(skip(pool))]
pub async fn assign_student_to_section(
    pool: &DbPool,
    student_id: &str,
    course_id: &str,
    section_id: &str,
    created_by: &str,
) -> Result<StudentAssignment> {
    let student = get_user(pool, student_id)?
        .ok_or_else(|| RepoError::NotFound(format!("Student {}", student_id)))?;
    if student.get_role() != UserRole::Student {
        return Err(RepoError::Invalid(format!("user {} is not a student", student.get_username())).into());
    }
    get_course(pool, course_id)?.ok_or_else(|| RepoError::NotFound(format!("Course {}", course_id)))?;
    let section = get_section(pool, section_id)?
        .ok_or_else(|| RepoError::NotFound(format!("Section {}", section_id)))?;
    if section.get_course_id() != course_id {
        return Err(RepoError::Invalid(format!(
            "section {} does not belong to course {}",
            section_id, course_id
        ))
        .into());
    }

    let conn = &mut pool.get()?;
    let assignment = with_retry(|| {
        conn.transaction(|conn| {
            let existing = student_assignments::table
                .filter(student_assignments::student_id.eq(student_id))
                .filter(student_assignments::course_id.eq(course_id))
                .first::<StudentAssignment>(conn)
                .optional()?;

            match existing {
                Some(current) if current.get_section_id() == section_id => Ok(current),
                Some(current) => {
                    diesel::update(student_assignments::table.find(current.get_id()))
                        .set(student_assignments::section_id.eq(section_id))
                        .execute(conn)?;
                    student_assignments::table
                        .find(current.get_id())
                        .first::<StudentAssignment>(conn)
                }
                None => {
                    let assignment = StudentAssignment::new(
                        student_id.to_string(),
                        course_id.to_string(),
                        section_id.to_string(),
                        created_by.to_string(),
                    );
                    diesel::insert_into(student_assignments::table)
                        .values(&assignment)
                        .execute(conn)?;
                    Ok(assignment)
                }
            }
        })
    })
    .await?;

    info!("Student {} assigned to section {}", student.get_username(), section.get_name());
    Ok(assignment)
}

/// Inserts an already built assignment (used by the legacy import)
pub async fn insert_assignment(pool: &DbPool, assignment: &StudentAssignment) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| {
        diesel::insert_into(student_assignments::table)
            .values(assignment)
            .execute(conn)
    })
    .await?;
    Ok(())
}

/// Removes a student's assignment to a course
pub async fn unassign_student(pool: &DbPool, student_id: &str, course_id: &str) -> Result<()> {
    let conn = &mut pool.get()?;

    let deleted = with_retry(|| {
        diesel::delete(
            student_assignments::table
                .filter(student_assignments::student_id.eq(student_id))
                .filter(student_assignments::course_id.eq(course_id)),
        )
        .execute(conn)
    })
    .await?;

    if deleted == 0 {
        return Err(RepoError::NotFound(format!(
            "Assignment of {} to course {}",
            student_id, course_id
        ))
        .into());
    }
    debug!("Removed assignment of {} from {}", student_id, course_id);
    Ok(())
}

/// Retrieves an assignment by its ID
pub fn get_assignment(pool: &DbPool, assignment_id: &str) -> Result<Option<StudentAssignment>> {
    let conn = &mut pool.get()?;

    let result = student_assignments::table
        .find(assignment_id)
        .first::<StudentAssignment>(conn)
        .optional()?;

    Ok(result)
}

/// Lists assignments matching the filter, oldest first
pub fn list_assignments(pool: &DbPool, filter: &AssignmentFilter) -> Result<Vec<StudentAssignment>> {
    let conn = &mut pool.get()?;

    let mut query = student_assignments::table
        .order((student_assignments::created_at.asc(), student_assignments::id.asc()))
        .into_boxed();
    if let Some(student_id) = &filter.student_id {
        query = query.filter(student_assignments::student_id.eq(student_id.clone()));
    }
    if let Some(course_id) = &filter.course_id {
        query = query.filter(student_assignments::course_id.eq(course_id.clone()));
    }
    if let Some(section_id) = &filter.section_id {
        query = query.filter(student_assignments::section_id.eq(section_id.clone()));
    }

    Ok(query.load::<StudentAssignment>(conn)?)
}

/// Lists the students assigned to a course-section, ordered by username
///
/// Each student appears once; users whose role is no longer student are left out.
pub fn get_students_for_course_section(
    pool: &DbPool,
    course_id: &str,
    section_id: &str,
) -> Result<Vec<User>> {
    let conn = &mut pool.get()?;

    let students = student_assignments::table
        .inner_join(users::table)
        .filter(student_assignments::course_id.eq(course_id))
        .filter(student_assignments::section_id.eq(section_id))
        .filter(users::role.eq(UserRole::Student))
        .order(users::username.asc())
        .select(User::as_select())
        .load::<User>(conn)?;

    Ok(students)
}

/// Resolves a course reference against the stored reference data
///
/// Loads only the rows the reference can touch: its course, that course's
/// sections and that course's assignments.
///
/// ### Returns
///
/// `None` when the reference is unparseable or names unknown records
pub fn resolve_course_section(pool: &DbPool, raw: &str) -> Result<Option<ResolvedCourseSection>> {
    let Some(parsed) = course_section::parse_course_ref(raw) else {
        debug!("Unparseable course reference {:?}", raw);
        return Ok(None);
    };
    let course_id = parsed.course_id().to_string();

    let Some(course) = get_course(pool, &course_id)? else {
        return Ok(None);
    };

    let conn = &mut pool.get()?;
    let course_sections = sections::table
        .filter(sections::course_id.eq(&course_id))
        .load::<Section>(conn)?;
    let course_assignments = student_assignments::table
        .filter(student_assignments::course_id.eq(&course_id))
        .load::<StudentAssignment>(conn)?;

    Ok(course_section::resolve_course_section(
        raw,
        &[course],
        &course_sections,
        &course_assignments,
    ))
}

use crate::db::{DbPool, with_retry};
use crate::models::{Course, Section};
use crate::normalize::{collapse_whitespace, normalize_course_name, normalize_text};
use crate::repo::RepoError;
use crate::schema::{courses, sections};
use anyhow::Result;
use diesel::prelude::*;
use tracing::{info, instrument};

/// Creates a new course
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `name` - The course name, e.g. "4to Básico"
///
/// ### Returns
///
/// A Result containing the newly created Course if successful
///
/// ### Errors
///
/// Returns an error if:
/// - The name is blank
/// - A course with an equivalent name already exists
/// - The database insert operation fails
#[instrument(skip(pool))]
pub async fn create_course(pool: &DbPool, name: String) -> Result<Course> {
    let name = collapse_whitespace(&name);
    if name.is_empty() {
        return Err(RepoError::Invalid("course name must not be empty".to_string()).into());
    }
    if get_course_by_name(pool, &name)?.is_some() {
        return Err(RepoError::Conflict(format!("course {} already exists", name)).into());
    }

    let course = Course::new(name);
    insert_course(pool, &course).await?;
    Ok(course)
}

/// Inserts an already built course (used by imports that carry their own ids)
pub async fn insert_course(pool: &DbPool, course: &Course) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| diesel::insert_into(courses::table).values(course).execute(conn)).await?;
    Ok(())
}

/// Retrieves a course by its ID
pub fn get_course(pool: &DbPool, course_id: &str) -> Result<Option<Course>> {
    let conn = &mut pool.get()?;

    let result = courses::table
        .find(course_id)
        .first::<Course>(conn)
        .optional()?;

    Ok(result)
}

/// Retrieves a course by name
///
/// Names are compared after `normalize_course_name`, so "1ro Básico" finds
/// a course stored as "1° Básico".
pub fn get_course_by_name(pool: &DbPool, name: &str) -> Result<Option<Course>> {
    let wanted = normalize_course_name(name);
    Ok(list_courses(pool)?
        .into_iter()
        .find(|course| normalize_course_name(&course.get_name()) == wanted))
}

/// Lists all courses ordered by name
pub fn list_courses(pool: &DbPool) -> Result<Vec<Course>> {
    let conn = &mut pool.get()?;
    Ok(courses::table.order(courses::name.asc()).load::<Course>(conn)?)
}

/// Deletes a course together with its sections and assignments
pub async fn delete_course(pool: &DbPool, course_id: &str) -> Result<()> {
    let conn = &mut pool.get()?;

    let deleted = with_retry(|| diesel::delete(courses::table.find(course_id)).execute(conn)).await?;
    if deleted == 0 {
        return Err(RepoError::NotFound(format!("Course {}", course_id)).into());
    }
    Ok(())
}

/// Creates a section in a course
///
/// ### Errors
///
/// Returns an error if:
/// - The course does not exist
/// - The name is blank or already used in the course
#[instrument(skip(pool))]
pub async fn create_section(pool: &DbPool, course_id: &str, name: String) -> Result<Section> {
    let name = collapse_whitespace(&name);
    if name.is_empty() {
        return Err(RepoError::Invalid("section name must not be empty".to_string()).into());
    }
    if get_course(pool, course_id)?.is_none() {
        return Err(RepoError::NotFound(format!("Course {}", course_id)).into());
    }
    if find_section_by_name(pool, course_id, &name)?.is_some() {
        return Err(RepoError::Conflict(format!("section {} already exists in course", name)).into());
    }

    let section = Section::new(course_id.to_string(), name);
    insert_section(pool, &section).await?;
    Ok(section)
}

/// Inserts an already built section (used by imports that carry their own ids)
pub async fn insert_section(pool: &DbPool, section: &Section) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| diesel::insert_into(sections::table).values(section).execute(conn)).await?;
    Ok(())
}

/// Retrieves a section by its ID
pub fn get_section(pool: &DbPool, section_id: &str) -> Result<Option<Section>> {
    let conn = &mut pool.get()?;

    let result = sections::table
        .find(section_id)
        .first::<Section>(conn)
        .optional()?;

    Ok(result)
}

/// Lists sections ordered by name, optionally restricted to one course
pub fn list_sections(pool: &DbPool, course_id: Option<&str>) -> Result<Vec<Section>> {
    let conn = &mut pool.get()?;

    let mut query = sections::table.order(sections::name.asc()).into_boxed();
    if let Some(course_id) = course_id {
        query = query.filter(sections::course_id.eq(course_id.to_string()));
    }

    Ok(query.load::<Section>(conn)?)
}

/// Finds a section of a course by name, ignoring case and accents
pub fn find_section_by_name(pool: &DbPool, course_id: &str, name: &str) -> Result<Option<Section>> {
    let wanted = normalize_text(name);
    Ok(list_sections(pool, Some(course_id))?
        .into_iter()
        .find(|section| normalize_text(&section.get_name()) == wanted))
}

/// Returns the course and section with the given names, creating either if missing
///
/// Used by imports, which name courses and sections instead of referencing ids.
#[instrument(skip(pool))]
pub async fn ensure_course_section(
    pool: &DbPool,
    course_name: &str,
    section_name: &str,
) -> Result<(Course, Section)> {
    let course = match get_course_by_name(pool, course_name)? {
        Some(course) => course,
        None => {
            info!("Creating course {}", course_name);
            create_course(pool, course_name.to_string()).await?
        }
    };

    let section = match find_section_by_name(pool, &course.get_id(), section_name)? {
        Some(section) => section,
        None => {
            info!("Creating section {} in {}", section_name, course.get_name());
            create_section(pool, &course.get_id(), section_name.to_string()).await?
        }
    };

    Ok((course, section))
}

use crate::db::{DbPool, with_retry};
use crate::models::{AssignedTo, NewTask, NotificationType, Task, TaskNotification, User, UserRole};
use crate::repo::{RepoError, get_students_for_course_section, resolve_course_section};
use crate::schema::{task_notifications, tasks, users};
use anyhow::Result;
use diesel::prelude::*;
use tracing::{info, instrument, warn};

/// Creates a task and notifies its recipients
///
/// Course tasks have their `course_ref` resolved to a course and section at
/// creation. A reference that does not resolve is stored as given, but the
/// task then has no recipients and no notification is created. Student tasks
/// go to the listed students.
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `new_task` - The task fields
///
/// ### Returns
///
/// A Result containing the created Task
///
/// ### Errors
///
/// Returns an error if:
/// - The title is blank
/// - A student task lists no students
/// - The database operation fails
#[instrument(skip(pool, new_task), fields(title = %new_task.title, assigned_to = %new_task.assigned_to))]
pub async fn create_task(pool: &DbPool, new_task: NewTask) -> Result<Task> {
    if new_task.title.trim().is_empty() {
        return Err(RepoError::Invalid("title must not be empty".to_string()).into());
    }
    if new_task.assigned_to == AssignedTo::Student && new_task.assigned_student_ids.is_empty() {
        return Err(RepoError::Invalid("a student task needs at least one student".to_string()).into());
    }

    let resolved = if new_task.course_ref.trim().is_empty() {
        None
    } else {
        resolve_course_section(pool, &new_task.course_ref)?
    };
    if resolved.is_none() && new_task.assigned_to == AssignedTo::Course {
        warn!("Course reference {:?} does not resolve; task will have no recipients", new_task.course_ref);
    }

    let task = Task::new(
        new_task,
        resolved.as_ref().map(|r| r.course.get_id()),
        resolved.as_ref().map(|r| r.section.get_id()),
    );

    let recipients = resolve_task_recipients(pool, &task)?;
    let notification = if recipients.is_empty() {
        None
    } else {
        Some(TaskNotification::new(
            task.get_id(),
            NotificationType::NewTask,
            recipients.iter().map(|u| u.get_username()).collect(),
            task.get_created_by(),
            task.get_course_ref(),
        ))
    };

    let conn = &mut pool.get()?;
    with_retry(|| {
        conn.transaction(|conn| {
            diesel::insert_into(tasks::table).values(&task).execute(conn)?;
            if let Some(notification) = &notification {
                diesel::insert_into(task_notifications::table)
                    .values(notification)
                    .execute(conn)?;
            }
            Ok(())
        })
    })
    .await?;

    info!("Created task {} for {} recipients", task.get_id(), recipients.len());
    Ok(task)
}

/// Inserts an already built task without notifying anyone (used by the legacy import)
pub async fn insert_task(pool: &DbPool, task: &Task) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| diesel::insert_into(tasks::table).values(task).execute(conn)).await?;
    Ok(())
}

/// Retrieves a task by its ID
pub fn get_task(pool: &DbPool, task_id: &str) -> Result<Option<Task>> {
    let conn = &mut pool.get()?;

    let result = tasks::table
        .find(task_id)
        .first::<Task>(conn)
        .optional()?;

    Ok(result)
}

/// Lists tasks, newest first, optionally only those created by one user
pub fn list_tasks(pool: &DbPool, created_by: Option<&str>) -> Result<Vec<Task>> {
    let conn = &mut pool.get()?;

    let mut query = tasks::table
        .order((tasks::created_at.desc(), tasks::id.asc()))
        .into_boxed();
    if let Some(created_by) = created_by {
        query = query.filter(tasks::created_by.eq(created_by.to_string()));
    }

    Ok(query.load::<Task>(conn)?)
}

/// Stores the course and section a task's `course_ref` resolves to
pub async fn set_task_course_section(
    pool: &DbPool,
    task_id: &str,
    course_id: Option<&str>,
    section_id: Option<&str>,
) -> Result<()> {
    let conn = &mut pool.get()?;

    let updated = with_retry(|| {
        diesel::update(tasks::table.find(task_id))
            .set((tasks::course_id.eq(course_id), tasks::section_id.eq(section_id)))
            .execute(conn)
    })
    .await?;
    if updated == 0 {
        return Err(RepoError::NotFound(format!("Task {}", task_id)).into());
    }
    Ok(())
}

/// Deletes a task and its notifications
pub async fn delete_task(pool: &DbPool, task_id: &str) -> Result<()> {
    let conn = &mut pool.get()?;

    let deleted = with_retry(|| diesel::delete(tasks::table.find(task_id)).execute(conn)).await?;
    if deleted == 0 {
        return Err(RepoError::NotFound(format!("Task {}", task_id)).into());
    }
    Ok(())
}

/// Computes the students a task is addressed to
///
/// Course tasks go to every student assigned to the resolved course-section;
/// an unresolved task has no recipients. Student tasks go to the listed ids
/// that still name students.
pub fn resolve_task_recipients(pool: &DbPool, task: &Task) -> Result<Vec<User>> {
    match task.get_assigned_to() {
        AssignedTo::Course => match (task.get_course_id(), task.get_section_id()) {
            (Some(course_id), Some(section_id)) => {
                get_students_for_course_section(pool, &course_id, &section_id)
            }
            _ => Ok(Vec::new()),
        },
        AssignedTo::Student => {
            let ids = task.get_assigned_student_ids();
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let conn = &mut pool.get()?;
            let students = users::table
                .filter(users::id.eq_any(ids))
                .filter(users::role.eq(UserRole::Student))
                .order(users::username.asc())
                .load::<User>(conn)?;
            Ok(students)
        }
    }
}

/// Returns true if the task is addressed to the student
///
/// ### Errors
///
/// Returns `RepoError::NotFound` if the task does not exist.
pub fn is_student_assigned_to_task(pool: &DbPool, task_id: &str, student_id: &str) -> Result<bool> {
    let task = get_task(pool, task_id)?
        .ok_or_else(|| RepoError::NotFound(format!("Task {}", task_id)))?;

    Ok(resolve_task_recipients(pool, &task)?
        .iter()
        .any(|student| student.get_id() == student_id))
}

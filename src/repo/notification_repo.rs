use crate::db::{DbPool, with_retry};
use crate::models::{StringList, TaskNotification};
use crate::repo::RepoError;
use crate::schema::task_notifications;
use anyhow::Result;
use diesel::prelude::*;
use tracing::{debug, instrument};

/// Stores a notification
pub async fn create_notification(pool: &DbPool, notification: &TaskNotification) -> Result<()> {
    let conn = &mut pool.get()?;
    with_retry(|| {
        diesel::insert_into(task_notifications::table)
            .values(notification)
            .execute(conn)
    })
    .await?;
    Ok(())
}

/// Retrieves a notification by its ID
pub fn get_notification(pool: &DbPool, notification_id: &str) -> Result<Option<TaskNotification>> {
    let conn = &mut pool.get()?;

    let result = task_notifications::table
        .find(notification_id)
        .first::<TaskNotification>(conn)
        .optional()?;

    Ok(result)
}

/// Lists the notifications of one task, oldest first
pub fn list_notifications_for_task(pool: &DbPool, task_id: &str) -> Result<Vec<TaskNotification>> {
    let conn = &mut pool.get()?;

    let result = task_notifications::table
        .filter(task_notifications::task_id.eq(task_id))
        .order((task_notifications::created_at.asc(), task_notifications::id.asc()))
        .load::<TaskNotification>(conn)?;

    Ok(result)
}

/// Lists the notifications addressed to a user, newest first
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `username` - The recipient
/// * `unread_only` - Leave out notifications the user already read
pub fn list_notifications_for_user(
    pool: &DbPool,
    username: &str,
    unread_only: bool,
) -> Result<Vec<TaskNotification>> {
    let conn = &mut pool.get()?;

    // Narrow down in SQL on the JSON text, then check membership exactly
    let quoted = serde_json::to_string(username)?;
    let escaped = quoted
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("%{}%", escaped);
    let candidates = task_notifications::table
        .filter(task_notifications::target_usernames.like(pattern).escape('\\'))
        .order((task_notifications::created_at.desc(), task_notifications::id.asc()))
        .load::<TaskNotification>(conn)?;

    Ok(candidates
        .into_iter()
        .filter(|n| n.targets(username))
        .filter(|n| !unread_only || !n.is_read_by(username))
        .collect())
}

/// What marking a notification read found inside the transaction
enum MarkRead {
    Missing,
    NotRecipient,
    AlreadyRead(TaskNotification),
    Marked(TaskNotification),
}

/// Marks a notification as read by one of its recipients
///
/// Marking twice is harmless. The read and the write of `read_by` share one
/// immediate transaction, so concurrent marks by different recipients are
/// all kept.
///
/// ### Errors
///
/// Returns an error if:
/// - The notification does not exist
/// - The user is not one of its recipients
#[instrument(skip(pool))]
pub async fn mark_notification_read(
    pool: &DbPool,
    notification_id: &str,
    username: &str,
) -> Result<TaskNotification> {
    let conn = &mut pool.get()?;
    let outcome = with_retry(|| {
        conn.immediate_transaction(|conn| {
            let Some(notification) = task_notifications::table
                .find(notification_id)
                .first::<TaskNotification>(conn)
                .optional()?
            else {
                return Ok(MarkRead::Missing);
            };
            if !notification.targets(username) {
                return Ok(MarkRead::NotRecipient);
            }
            if notification.is_read_by(username) {
                return Ok(MarkRead::AlreadyRead(notification));
            }

            let mut read_by = StringList(notification.get_read_by());
            read_by.insert_unique(username);
            diesel::update(task_notifications::table.find(notification_id))
                .set(task_notifications::read_by.eq(&read_by))
                .execute(conn)?;
            Ok(MarkRead::Marked(notification.with_read_by(read_by.0)))
        })
    })
    .await?;

    match outcome {
        MarkRead::Missing => Err(RepoError::NotFound(format!("Notification {}", notification_id)).into()),
        MarkRead::NotRecipient => Err(RepoError::Invalid(format!(
            "{} is not a recipient of notification {}",
            username, notification_id
        ))
        .into()),
        MarkRead::AlreadyRead(notification) => {
            debug!("Notification already read");
            Ok(notification)
        }
        MarkRead::Marked(notification) => Ok(notification),
    }
}

/// Replaces the recipients of a notification, keeping read marks of the
/// recipients that remain
pub async fn set_notification_targets(
    pool: &DbPool,
    notification: &TaskNotification,
    target_usernames: Vec<String>,
) -> Result<()> {
    let read_by = StringList(
        notification
            .get_read_by()
            .into_iter()
            .filter(|u| target_usernames.contains(u))
            .collect(),
    );
    let targets = StringList(target_usernames);

    let conn = &mut pool.get()?;
    with_retry(|| {
        diesel::update(task_notifications::table.find(notification.get_id()))
            .set((
                task_notifications::target_usernames.eq(&targets),
                task_notifications::read_by.eq(&read_by),
            ))
            .execute(conn)
    })
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignedTo, NewTask, NotificationType, Task};
    use crate::repo::insert_task;
    use crate::test_utils::setup_test_db;

    async fn stored_task(pool: &DbPool) -> Task {
        let task = Task::new(
            NewTask {
                title: "Guía 1".to_string(),
                description: String::new(),
                subject: "Matemáticas".to_string(),
                created_by: "prof".to_string(),
                assigned_to: AssignedTo::Student,
                course_ref: String::new(),
                assigned_student_ids: vec!["x".to_string()],
                due_date: None,
            },
            None,
            None,
        );
        insert_task(pool, &task).await.unwrap();
        task
    }

    fn notification_for(task: &Task, targets: &[&str]) -> TaskNotification {
        TaskNotification::new(
            task.get_id(),
            NotificationType::NewTask,
            targets.iter().map(|t| t.to_string()).collect(),
            "prof".to_string(),
            String::new(),
        )
    }

    #[tokio::test]
    async fn test_list_notifications_for_user_matches_exact_username() {
        let pool = setup_test_db();
        let task = stored_task(&pool).await;
        create_notification(&pool, &notification_for(&task, &["ana", "anabel"])).await.unwrap();
        create_notification(&pool, &notification_for(&task, &["anabel"])).await.unwrap();

        assert_eq!(list_notifications_for_user(&pool, "ana", false).unwrap().len(), 1);
        assert_eq!(list_notifications_for_user(&pool, "anabel", false).unwrap().len(), 2);
        assert!(list_notifications_for_user(&pool, "an", false).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usernames_with_like_wildcards_are_literal() {
        let pool = setup_test_db();
        let task = stored_task(&pool).await;
        create_notification(&pool, &notification_for(&task, &["a_b"])).await.unwrap();
        create_notification(&pool, &notification_for(&task, &["axb"])).await.unwrap();

        assert_eq!(list_notifications_for_user(&pool, "a_b", false).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent_and_filters_unread() {
        let pool = setup_test_db();
        let task = stored_task(&pool).await;
        let notification = notification_for(&task, &["ana", "beto"]);
        create_notification(&pool, &notification).await.unwrap();

        let once = mark_notification_read(&pool, &notification.get_id(), "ana").await.unwrap();
        let twice = mark_notification_read(&pool, &notification.get_id(), "ana").await.unwrap();

        assert_eq!(once.get_read_by(), vec!["ana"]);
        assert_eq!(twice.get_read_by(), vec!["ana"]);
        assert!(list_notifications_for_user(&pool, "ana", true).unwrap().is_empty());
        assert_eq!(list_notifications_for_user(&pool, "beto", true).unwrap().len(), 1);
        assert!(!twice.is_read());
    }

    #[tokio::test]
    async fn test_mark_read_by_stranger_is_rejected() {
        let pool = setup_test_db();
        let task = stored_task(&pool).await;
        let notification = notification_for(&task, &["ana"]);
        create_notification(&pool, &notification).await.unwrap();

        let err = mark_notification_read(&pool, &notification.get_id(), "mallory").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::Invalid(_))));

        let err = mark_notification_read(&pool, "missing", "ana").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_marks_by_different_recipients_are_all_kept() {
        let pool = setup_test_db();
        let task = stored_task(&pool).await;
        let readers = ["ana", "beto", "carla", "dani"];
        let notification = notification_for(&task, &readers);
        create_notification(&pool, &notification).await.unwrap();

        let handles: Vec<_> = readers
            .iter()
            .map(|&reader| {
                let pool = pool.clone();
                let id = notification.get_id();
                tokio::spawn(async move { mark_notification_read(&pool, &id, reader).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = get_notification(&pool, &notification.get_id()).unwrap().unwrap();
        let mut read_by = stored.get_read_by();
        read_by.sort();
        assert_eq!(read_by, readers);
        assert!(stored.is_read());
    }

    #[tokio::test]
    async fn test_set_targets_keeps_remaining_read_marks() {
        let pool = setup_test_db();
        let task = stored_task(&pool).await;
        let notification = notification_for(&task, &["ana", "beto"]);
        create_notification(&pool, &notification).await.unwrap();
        let read = mark_notification_read(&pool, &notification.get_id(), "beto").await.unwrap();

        set_notification_targets(&pool, &read, vec!["beto".to_string(), "carla".to_string()])
            .await
            .unwrap();

        let stored = get_notification(&pool, &notification.get_id()).unwrap().unwrap();
        assert_eq!(stored.get_target_usernames(), vec!["beto", "carla"]);
        assert_eq!(stored.get_read_by(), vec!["beto"]);
    }
}

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StringList;
use super::text_enum::text_enum;

text_enum! {
    /// The event a notification announces
    pub enum NotificationType {
        NewTask => "new_task",
        TaskCompleted => "task_completed",
        TeacherComment => "teacher_comment",
        GradePublished => "grade_published",
    }
}

/// Fan-out of a task event to its recipients
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::task_notifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskNotification {
    id: String,
    task_id: String,
    notification_type: NotificationType,
    /// Usernames that should see this notification
    target_usernames: StringList,
    from_username: String,
    /// Course reference copied from the task
    course_ref: String,
    /// Usernames that have already read it
    read_by: StringList,
    created_at: NaiveDateTime,
}

impl TaskNotification {
    /// Creates a new, unread notification
    pub fn new(
        task_id: String,
        notification_type: NotificationType,
        target_usernames: Vec<String>,
        from_username: String,
        course_ref: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id,
            notification_type,
            target_usernames: StringList(target_usernames),
            from_username,
            course_ref,
            read_by: StringList::default(),
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Overrides the generated id (used when importing legacy notifications)
    pub fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }

    /// Sets who has read the notification
    pub fn with_read_by(mut self, read_by: Vec<String>) -> Self {
        self.read_by = StringList(read_by);
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_task_id(&self) -> String {
        self.task_id.clone()
    }

    pub fn get_notification_type(&self) -> NotificationType {
        self.notification_type
    }

    pub fn get_target_usernames(&self) -> Vec<String> {
        self.target_usernames.0.clone()
    }

    pub fn get_from_username(&self) -> String {
        self.from_username.clone()
    }

    pub fn get_course_ref(&self) -> String {
        self.course_ref.clone()
    }

    pub fn get_read_by(&self) -> Vec<String> {
        self.read_by.0.clone()
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    /// Returns true if `username` is one of the recipients
    pub fn targets(&self, username: &str) -> bool {
        self.target_usernames.contains(username)
    }

    /// Returns true if `username` has read this notification
    pub fn is_read_by(&self, username: &str) -> bool {
        self.read_by.contains(username)
    }

    /// Returns true once every recipient has read it
    pub fn is_read(&self) -> bool {
        !self.target_usernames.0.is_empty()
            && self.target_usernames.0.iter().all(|u| self.read_by.contains(u))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_read_requires_every_recipient() {
        let notification = TaskNotification::new(
            "task".to_string(),
            NotificationType::NewTask,
            vec!["ana".to_string(), "luis".to_string()],
            "prof".to_string(),
            "course".to_string(),
        );
        assert!(!notification.is_read());

        let partially_read = notification.clone().with_read_by(vec!["ana".to_string()]);
        assert!(partially_read.is_read_by("ana"));
        assert!(!partially_read.is_read());

        let fully_read = notification.with_read_by(vec!["luis".to_string(), "ana".to_string()]);
        assert!(fully_read.is_read());
    }

    #[test]
    fn test_notification_type_text() {
        assert_eq!(NotificationType::NewTask.as_str(), "new_task");
        assert_eq!("grade_published".parse::<NotificationType>().unwrap(), NotificationType::GradePublished);
    }
}

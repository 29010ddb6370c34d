/// Data models module
///
/// This module defines the typed records of the school roster. Each struct
/// maps to one database table; list, map and enum columns are stored as TEXT
/// through the conversions in `json_text` and `text_enum`.

mod text_enum;

mod json_text;
pub use json_text::{StringList, StringMap};

mod user;
pub use user::{NewUser, User, UserRole, UserUpdate, hash_password};

mod course;
pub use course::Course;

mod section;
pub use section::Section;

mod student_assignment;
pub use student_assignment::StudentAssignment;

mod task;
pub use task::{AssignedTo, NewTask, Task};

mod task_notification;
pub use task_notification::{NotificationType, TaskNotification};

mod grade;
pub use grade::{ActivityType, Grade, MAX_SCORE, MIN_SCORE, NewGrade, is_valid_score};

mod attendance;
pub use attendance::{AttendanceRecord, AttendanceStatus};

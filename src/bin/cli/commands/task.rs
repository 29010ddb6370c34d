use chrono::{DateTime, Utc};
use clap::Subcommand;
use smart_student::models::{AssignedTo, NewTask};

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Task management commands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks, optionally only those created by one teacher
    List {
        #[clap(long)]
        created_by: Option<String>,
    },
    /// Show a task
    Get {
        /// The task ID
        id: String,
    },
    /// Create a task and notify its recipients
    Create {
        #[clap(long)]
        title: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long, default_value = "")]
        subject: String,
        /// Username of the teacher creating the task
        #[clap(long)]
        created_by: String,
        /// Who receives the task: course or student
        #[clap(long)]
        assigned_to: AssignedTo,
        /// Combined course-section id, or a bare course id
        #[clap(long, default_value = "")]
        course: String,
        /// Student receiving the task when assigned to students; repeatable
        #[clap(long = "student")]
        students: Vec<String>,
        /// Due date as RFC 3339, e.g. 2025-04-30T23:59:00Z
        #[clap(long)]
        due: Option<DateTime<Utc>>,
    },
    /// Delete a task and its notifications
    Delete {
        /// The task ID
        id: String,
    },
    /// List the students who receive a task
    Recipients {
        /// The task ID
        id: String,
    },
    /// Check whether a student receives a task
    Assigned {
        /// The task ID
        id: String,
        student_id: String,
    },
}

/// Executes a task command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: TaskCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        TaskCommands::List { created_by } => {
            let tasks = client.list_tasks(created_by.as_deref()).await?;
            output::print_tasks(&tasks, config);
        }
        TaskCommands::Get { id } => {
            let task = client.get_task(&id).await?;
            output::print_task(&task, config);
        }
        TaskCommands::Create {
            title,
            description,
            subject,
            created_by,
            assigned_to,
            course,
            students,
            due,
        } => {
            let new_task = NewTask {
                title,
                description,
                subject,
                created_by,
                assigned_to,
                course_ref: course,
                assigned_student_ids: students,
                due_date: due,
            };
            let task = client.create_task(&new_task).await?;
            output::print_task(&task, config);
        }
        TaskCommands::Delete { id } => {
            client.delete_task(&id).await?;
            output::print_success(&format!("Deleted task {}", id), config);
        }
        TaskCommands::Recipients { id } => {
            let students = client.task_recipients(&id).await?;
            output::print_users(&students, config);
        }
        TaskCommands::Assigned { id, student_id } => {
            let assigned = client.task_assigned(&id, &student_id).await?;
            output::print_assigned(&assigned, config);
        }
    }
    Ok(())
}

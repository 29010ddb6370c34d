use clap::Subcommand;
use smart_student::dto::AssignStudentDto;
use smart_student::repo::AssignmentFilter;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Student assignment commands
#[derive(Subcommand, Debug)]
pub enum AssignmentCommands {
    /// List assignments matching the filters
    List {
        #[clap(long)]
        student: Option<String>,
        #[clap(long)]
        course: Option<String>,
        #[clap(long)]
        section: Option<String>,
    },
    /// Assign a student to a course-section, moving them if already in the course
    Assign {
        student_id: String,
        course_id: String,
        section_id: String,
        /// Username recorded as the author of the assignment
        #[clap(long)]
        by: Option<String>,
    },
    /// Remove a student from a course
    Unassign {
        student_id: String,
        course_id: String,
    },
}

/// Executes an assignment command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: AssignmentCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        AssignmentCommands::List { student, course, section } => {
            let filter = AssignmentFilter {
                student_id: student,
                course_id: course,
                section_id: section,
            };
            let assignments = client.list_assignments(&filter).await?;
            output::print_assignments(&assignments, config);
        }
        AssignmentCommands::Assign { student_id, course_id, section_id, by } => {
            let dto = AssignStudentDto {
                student_id,
                course_id,
                section_id,
                created_by: by,
            };
            let assignment = client.assign_student(&dto).await?;
            output::print_assignment(&assignment, config);
        }
        AssignmentCommands::Unassign { student_id, course_id } => {
            client.unassign_student(&student_id, &course_id).await?;
            output::print_success(
                &format!("Removed student {} from course {}", student_id, course_id),
                config,
            );
        }
    }
    Ok(())
}

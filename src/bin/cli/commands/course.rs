use clap::Subcommand;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Course management commands
#[derive(Subcommand, Debug)]
pub enum CourseCommands {
    /// List all courses
    List,
    /// Show a course
    Get {
        /// The course ID
        id: String,
    },
    /// Create a course
    Create {
        /// Name of the course, e.g. "4to Básico"
        #[clap(long)]
        name: String,
    },
    /// Delete a course with its sections and assignments
    Delete {
        /// The course ID
        id: String,
    },
}

/// Executes a course command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: CourseCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        CourseCommands::List => {
            let courses = client.list_courses().await?;
            output::print_courses(&courses, config);
        }
        CourseCommands::Get { id } => {
            let course = client.get_course(&id).await?;
            output::print_course(&course, config);
        }
        CourseCommands::Create { name } => {
            let course = client.create_course(name).await?;
            output::print_course(&course, config);
        }
        CourseCommands::Delete { id } => {
            client.delete_course(&id).await?;
            output::print_success(&format!("Deleted course {}", id), config);
        }
    }
    Ok(())
}

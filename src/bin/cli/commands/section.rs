use clap::Subcommand;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Section and course-section commands
#[derive(Subcommand, Debug)]
pub enum SectionCommands {
    /// List sections, optionally of one course
    List {
        #[clap(long)]
        course: Option<String>,
    },
    /// Create a section in a course
    Create {
        /// The course ID
        course_id: String,
        /// Section letter or name, e.g. "A"
        #[clap(long)]
        name: String,
    },
    /// Resolve a combined course-section id or a bare course id
    Resolve {
        raw: String,
    },
    /// List the students assigned to a course-section
    Students {
        course_id: String,
        section_id: String,
    },
}

/// Executes a section command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: SectionCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SectionCommands::List { course } => {
            let sections = client.list_sections(course.as_deref()).await?;
            output::print_sections(&sections, config);
        }
        SectionCommands::Create { course_id, name } => {
            let section = client.create_section(&course_id, name).await?;
            output::print_section(&section, config);
        }
        SectionCommands::Resolve { raw } => {
            let resolved = client.resolve_course_section(&raw).await?;
            output::print_resolved(&resolved, config);
        }
        SectionCommands::Students { course_id, section_id } => {
            let students = client.course_section_students(&course_id, &section_id).await?;
            output::print_users(&students, config);
        }
    }
    Ok(())
}

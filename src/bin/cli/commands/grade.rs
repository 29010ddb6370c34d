use chrono::{DateTime, Utc};
use clap::Subcommand;
use smart_student::models::{ActivityType, NewGrade};
use smart_student::repo::GradeFilter;

use super::DeleteYearArgs;
use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Grade commands
#[derive(Subcommand, Debug)]
pub enum GradeCommands {
    /// List grades matching the filters
    List {
        #[clap(long)]
        year: Option<i32>,
        #[clap(long)]
        student: Option<String>,
        #[clap(long)]
        course: Option<String>,
        #[clap(long)]
        section: Option<String>,
        #[clap(long)]
        subject: Option<String>,
    },
    /// Record a grade
    Create {
        /// Student ID; give this or --rut
        #[clap(long)]
        student: Option<String>,
        #[clap(long)]
        rut: Option<String>,
        #[clap(long)]
        course: Option<String>,
        #[clap(long)]
        section: Option<String>,
        #[clap(long)]
        subject: String,
        /// prueba, tarea or evaluacion
        #[clap(long = "type")]
        activity_type: ActivityType,
        /// Score between 0 and 100
        #[clap(long)]
        score: f64,
        #[clap(long, default_value = "")]
        topic: String,
        /// When the grade was given, RFC 3339; defaults to now
        #[clap(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Delete every grade of a year
    DeleteYear(DeleteYearArgs),
}

/// Executes a grade command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: GradeCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        GradeCommands::List { year, student, course, section, subject } => {
            let filter = GradeFilter {
                year,
                student_id: student,
                course_id: course,
                section_id: section,
                subject,
            };
            let grades = client.list_grades(&filter).await?;
            output::print_grades(&grades, config);
        }
        GradeCommands::Create {
            student,
            rut,
            course,
            section,
            subject,
            activity_type,
            score,
            topic,
            at,
        } => {
            let new_grade = NewGrade {
                student_id: student,
                student_rut: rut,
                course_id: course,
                section_id: section,
                subject,
                activity_type,
                score,
                topic,
                graded_at: at.unwrap_or_else(Utc::now),
            };
            let grade = client.create_grade(&new_grade).await?;
            output::print_grade(&grade, config);
        }
        GradeCommands::DeleteYear(args) => {
            let result = client.delete_by_year("grades", args.year, &args.query()).await?;
            output::print_delete_result(&result, config);
        }
    }
    Ok(())
}

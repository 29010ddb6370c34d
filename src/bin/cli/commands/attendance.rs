use chrono::NaiveDate;
use clap::Subcommand;
use smart_student::models::AttendanceStatus;
use smart_student::repo::{AttendanceFilter, NewAttendance};
use std::path::PathBuf;

use super::DeleteYearArgs;
use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Attendance commands
#[derive(Subcommand, Debug)]
pub enum AttendanceCommands {
    /// List attendance matching the filters
    List {
        #[clap(long)]
        year: Option<i32>,
        #[clap(long)]
        student: Option<String>,
        #[clap(long)]
        course: Option<String>,
        #[clap(long)]
        section: Option<String>,
        /// A single day, YYYY-MM-DD
        #[clap(long)]
        date: Option<NaiveDate>,
    },
    /// Record one student's attendance for a day, replacing any earlier entry
    Record {
        student_id: String,
        /// Day, YYYY-MM-DD
        date: NaiveDate,
        /// present, late, excused or absent
        status: AttendanceStatus,
        #[clap(long)]
        course: String,
        #[clap(long)]
        section: String,
        #[clap(long, default_value = "")]
        comment: String,
    },
    /// Delete every attendance record of a year
    DeleteYear(DeleteYearArgs),
    /// Generate a synthetic attendance CSV for every assigned student
    Generate {
        #[clap(long)]
        year: i32,
        /// Seed for reproducible output
        #[clap(long)]
        seed: Option<u64>,
        /// Write the CSV here instead of stdout
        #[clap(long, short)]
        output: Option<PathBuf>,
    },
}

/// Executes an attendance command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: AttendanceCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        AttendanceCommands::List { year, student, course, section, date } => {
            let filter = AttendanceFilter {
                year,
                student_id: student,
                course_id: course,
                section_id: section,
                date,
            };
            let records = client.list_attendance(&filter).await?;
            output::print_attendance(&records, config);
        }
        AttendanceCommands::Record { student_id, date, status, course, section, comment } => {
            let entry = NewAttendance {
                student_id,
                course_id: course,
                section_id: section,
                date,
                status,
                comment,
            };
            let record = client.record_attendance(&entry).await?;
            output::print_attendance_record(&record, config);
        }
        AttendanceCommands::DeleteYear(args) => {
            let result = client.delete_by_year("attendance", args.year, &args.query()).await?;
            output::print_delete_result(&result, config);
        }
        AttendanceCommands::Generate { year, seed, output: path } => {
            let csv = client.generate_attendance(year, seed).await?;
            match path {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    output::print_success(&format!("Wrote {}", path.display()), config);
                }
                None => print!("{}", csv),
            }
        }
    }
    Ok(())
}

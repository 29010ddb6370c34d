use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Which records to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Grades,
    Attendance,
}

/// Export commands
#[derive(Subcommand, Debug)]
pub enum ExportCommands {
    /// Download records as CSV
    Csv {
        #[clap(value_enum)]
        kind: ExportKind,
        /// Only records of this year
        #[clap(long)]
        year: Option<i32>,
        /// Write the CSV here instead of stdout
        #[clap(long, short)]
        output: Option<PathBuf>,
    },
}

/// Executes an export command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: ExportCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ExportCommands::Csv { kind, year, output: path } => {
            let name = match kind {
                ExportKind::Grades => "grades",
                ExportKind::Attendance => "attendance",
            };
            let csv = client.export_csv(name, year).await?;
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

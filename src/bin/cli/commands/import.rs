use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Which records a CSV file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CsvKind {
    Users,
    Grades,
    Attendance,
}

impl CsvKind {
    fn as_str(self) -> &'static str {
        match self {
            CsvKind::Users => "users",
            CsvKind::Grades => "grades",
            CsvKind::Attendance => "attendance",
        }
    }
}

/// Import commands
#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// Import a JSON snapshot of the old browser storage
    Legacy {
        /// Path to the snapshot file
        file: PathBuf,
    },
    /// Import a CSV file
    Csv {
        #[clap(value_enum)]
        kind: CsvKind,
        /// Path to the CSV file
        file: PathBuf,
    },
}

/// Executes an import command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: ImportCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ImportCommands::Legacy { file } => {
            let text = std::fs::read_to_string(&file)?;
            let snapshot: serde_json::Value = serde_json::from_str(&text)?;
            let reports = client.import_legacy(&snapshot).await?;
            output::print_legacy_reports(&reports, config);
        }
        ImportCommands::Csv { kind, file } => {
            let text = std::fs::read_to_string(&file)?;
            let report = client.import_csv(kind.as_str(), text).await?;
            output::print_csv_report(&report, config);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_kind_matches_import_routes() {
        let kinds: Vec<&str> = CsvKind::value_variants().iter().map(|k| k.as_str()).collect();
        assert_eq!(kinds, vec!["users", "grades", "attendance"]);
    }
}

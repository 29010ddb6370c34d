use clap::Subcommand;
use smart_student::maintenance::MaintenanceCommand;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Maintenance commands
#[derive(Subcommand, Debug)]
pub enum MaintenanceCommands {
    /// List the available repair commands
    List,
    /// Run a repair command; reports only unless --apply is given
    Run {
        /// e.g. diagnose, repair-active-courses, backfill-student-assignments
        command: MaintenanceCommand,
        /// Write the changes instead of reporting them
        #[clap(long)]
        apply: bool,
    },
}

/// Executes a maintenance command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: MaintenanceCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        MaintenanceCommands::List => {
            let commands = client.list_maintenance_commands().await?;
            output::print_maintenance_commands(&commands, config);
        }
        MaintenanceCommands::Run { command, apply } => {
            let report = client.run_maintenance(command, !apply).await?;
            output::print_maintenance_report(&report, config);
        }
    }
    Ok(())
}

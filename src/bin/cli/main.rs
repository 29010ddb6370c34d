mod client;
mod commands;
mod output;

use clap::{Parser, Subcommand};
use client::SmartStudentClient;
use output::{OutputConfig, OutputFormat};
use smart_student::config;
use std::process;

/// CLI for the Smart Student roster service
#[derive(Parser, Debug)]
#[clap(name = "smart-student-cli", about = "CLI for the Smart Student roster service")]
struct Cli {
    /// Server URL to connect to
    #[clap(long, env = "SMART_STUDENT_URL", global = true)]
    server_url: Option<String>,

    /// Output format
    #[clap(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    format: OutputFormat,

    /// Quiet mode: minimal output (just IDs or counts)
    #[clap(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(commands::user::UserCommands),
    /// Manage courses
    #[command(subcommand)]
    Course(commands::course::CourseCommands),
    /// Manage sections and course-sections
    #[command(subcommand)]
    Section(commands::section::SectionCommands),
    /// Manage which section each student belongs to
    #[command(subcommand)]
    Assignment(commands::assignment::AssignmentCommands),
    /// Manage tasks
    #[command(subcommand)]
    Task(commands::task::TaskCommands),
    /// Read and acknowledge task notifications
    #[command(subcommand)]
    Notification(commands::notification::NotificationCommands),
    /// Manage grades
    #[command(subcommand)]
    Grade(commands::grade::GradeCommands),
    /// Manage attendance
    #[command(subcommand)]
    Attendance(commands::attendance::AttendanceCommands),
    /// Import browser snapshots and CSV files
    #[command(subcommand)]
    Import(commands::import::ImportCommands),
    /// Export grades and attendance as CSV
    #[command(subcommand)]
    Export(commands::export::ExportCommands),
    /// Run repair commands
    #[command(subcommand)]
    Maintenance(commands::maintenance::MaintenanceCommands),
    /// Analyze answer sheets
    #[command(subcommand)]
    Ocr(commands::ocr::OcrCommands),
    /// Generate presentation slides and find images for them
    #[command(subcommand)]
    Slides(commands::slides::SlidesCommands),
}

/// Resolves the server URL from CLI args, config file, or defaults
///
/// Precedence: CLI flag / env var > config file > default port
fn resolve_server_url(cli_url: Option<String>) -> String {
    if let Some(url) = cli_url {
        return url;
    }

    if let Some(dir) = config::get_config_dir_path() {
        if let Ok(update) = config::config_from_file(Some(dir.join("config.toml"))) {
            if let Some(url) = update.server_url {
                return url;
            }
        }
    }

    format!("http://localhost:{}", config::default_port())
}

/// Formats an error for human-readable stderr output
fn format_error(err: &dyn std::error::Error) -> String {
    let err_string = err.to_string();

    if err_string.contains("error sending request")
        || err_string.contains("connection refused")
        || err_string.contains("Connection refused")
        || err_string.contains("tcp connect error")
    {
        return format!(
            "Could not connect to server. Is smart-student running?\n  {}",
            err_string
        );
    }

    err_string
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let server_url = resolve_server_url(cli.server_url);
    let client = SmartStudentClient::new(server_url);
    let output_config = OutputConfig {
        format: cli.format,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Commands::User(cmd) => commands::user::execute(&client, cmd, &output_config).await,
        Commands::Course(cmd) => commands::course::execute(&client, cmd, &output_config).await,
        Commands::Section(cmd) => commands::section::execute(&client, cmd, &output_config).await,
        Commands::Assignment(cmd) => {
            commands::assignment::execute(&client, cmd, &output_config).await
        }
        Commands::Task(cmd) => commands::task::execute(&client, cmd, &output_config).await,
        Commands::Notification(cmd) => {
            commands::notification::execute(&client, cmd, &output_config).await
        }
        Commands::Grade(cmd) => commands::grade::execute(&client, cmd, &output_config).await,
        Commands::Attendance(cmd) => {
            commands::attendance::execute(&client, cmd, &output_config).await
        }
        Commands::Import(cmd) => commands::import::execute(&client, cmd, &output_config).await,
        Commands::Export(cmd) => commands::export::execute(&client, cmd, &output_config).await,
        Commands::Maintenance(cmd) => {
            commands::maintenance::execute(&client, cmd, &output_config).await
        }
        Commands::Ocr(cmd) => commands::ocr::execute(&client, cmd, &output_config).await,
        Commands::Slides(cmd) => commands::slides::execute(&client, cmd, &output_config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", format_error(e.as_ref()));
        process::exit(1);
    }
}

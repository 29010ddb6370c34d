use clap::Subcommand;
use smart_student::models::{NewUser, UserRole, UserUpdate};

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// User management commands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// List users
    List {
        /// Only list users with this role (student, teacher, admin); repeatable
        #[clap(long)]
        role: Vec<UserRole>,
    },
    /// Show a user
    Get {
        /// The user ID
        id: String,
    },
    /// Create a user
    Create {
        #[clap(long)]
        username: String,
        #[clap(long)]
        password: String,
        #[clap(long)]
        role: UserRole,
        /// Name shown in the UI
        #[clap(long)]
        name: String,
        /// Chilean national id, with or without dots
        #[clap(long)]
        rut: Option<String>,
        #[clap(long)]
        email: Option<String>,
        /// Course-section id the user is active in; repeatable
        #[clap(long = "course")]
        courses: Vec<String>,
    },
    /// Update a user; omitted fields are left unchanged
    Update {
        /// The user ID
        id: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        password: Option<String>,
        #[clap(long)]
        role: Option<UserRole>,
        #[clap(long)]
        rut: Option<String>,
        #[clap(long)]
        email: Option<String>,
        /// Replaces the active courses; repeatable
        #[clap(long = "course")]
        courses: Option<Vec<String>>,
    },
    /// Delete a user
    Delete {
        /// The user ID
        id: String,
    },
}

/// Executes a user command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: UserCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        UserCommands::List { role } => {
            let users = client.list_users(&role).await?;
            output::print_users(&users, config);
        }
        UserCommands::Get { id } => {
            let user = client.get_user(&id).await?;
            output::print_user(&user, config);
        }
        UserCommands::Create { username, password, role, name, rut, email, courses } => {
            let new_user = NewUser {
                username,
                password,
                role,
                display_name: name,
                rut,
                email,
                active_courses: courses,
            };
            let user = client.create_user(&new_user).await?;
            output::print_user(&user, config);
        }
        UserCommands::Update { id, name, password, role, rut, email, courses } => {
            let update = UserUpdate {
                display_name: name,
                password,
                role,
                rut,
                email,
                active_courses: courses,
                assigned_teachers: None,
            };
            let user = client.update_user(&id, &update).await?;
            output::print_user(&user, config);
        }
        UserCommands::Delete { id } => {
            client.delete_user(&id).await?;
            output::print_success(&format!("Deleted user {}", id), config);
        }
    }
    Ok(())
}

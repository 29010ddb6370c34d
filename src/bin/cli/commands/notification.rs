use clap::Subcommand;

use crate::client::SmartStudentClient;
use crate::output::{self, OutputConfig};

/// Task notification commands
#[derive(Subcommand, Debug)]
pub enum NotificationCommands {
    /// List the notifications addressed to a user
    List {
        /// User ID or username
        user: String,
        /// Skip notifications the user has already read
        #[clap(long)]
        unread: bool,
    },
    /// Mark a notification as read by a user
    Read {
        /// The notification ID
        id: String,
        #[clap(long)]
        username: String,
    },
}

/// Executes a notification command
pub async fn execute(
    client: &SmartStudentClient,
    cmd: NotificationCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        NotificationCommands::List { user, unread } => {
            let notifications = client.list_notifications(&user, unread).await?;
            output::print_notifications(&notifications, config);
        }
        NotificationCommands::Read { id, username } => {
            let notification = client.mark_notification_read(&id, username).await?;
            output::print_notification(&notification, config);
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};

/// Approval bridge — wait on operator decisions made in Telegram
#[derive(Parser)]
#[command(name = "approval-bridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the channel poller
    Serve {
        /// Port to bind (defaults to $PORT, then 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a notification to the operator chat and print its message id
    Send {
        text: String,
        /// Attach Approve / Reject buttons
        #[arg(long)]
        decision_buttons: bool,
    },

    /// Wait for the operator's decision on a message and print it
    Wait {
        message_id: String,
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },
}

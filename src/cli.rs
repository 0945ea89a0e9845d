use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Approval relay: CodePipeline approvals to Slack via SNS
#[derive(Parser)]
#[command(name = "approval-relay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Accept SNS HTTP deliveries on /notifications
    Serve {
        /// Port to bind (defaults to RELAY_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Relay a single SNS event read from a file ("-" for stdin)
    Handle {
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },

    /// Print the Slack message for an event without publishing it
    Render {
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },
}

//! Command-line interface definition for Chatline
//!
//! This module defines the CLI structure using clap's derive API,
//! providing an interactive chat mode plus one-shot conversation commands.

use clap::{Parser, Subcommand};

/// Chatline - multi-conversation chat client
///
/// Lists, creates, renames and deletes conversations and sends messages
/// whose replies are produced by the backend.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CHATLINE_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Act as this user id (overrides config and environment)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Chatline
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Conversation to open instead of the most recent one
        #[arg(long)]
        chat: Option<String>,
    },

    /// List conversations, most recently updated first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the messages of one conversation
    Show {
        /// Conversation identifier
        id: String,
    },

    /// Create a conversation with the default title
    Create,

    /// Rename a conversation
    Rename {
        /// Conversation identifier
        id: String,
        /// New title
        title: String,
    },

    /// Delete a conversation and its messages
    Delete {
        /// Conversation identifier
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Send one message and trigger a reply
    Send {
        /// Target conversation; the most recent one when omitted
        #[arg(long)]
        chat: Option<String>,
        /// Message content
        content: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

//! Special commands parser for interactive chat mode
//!
//! This module parses the slash commands that can be entered during an
//! interactive chat session. Special commands allow users to:
//! - Create, list, select, rename and delete conversations
//! - Re-print the selected conversation
//! - Display help information
//! - Exit the session
//!
//! Commands are prefixed with `/` and are case-insensitive. Anything else is
//! a message to send.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// How `/select` names a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    /// 1-based position in the conversation list
    Index(usize),
    /// Conversation identifier
    Id(String),
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Create a conversation and select it
    New,

    /// Show the conversation list
    List,

    /// Select a conversation by list position or identifier
    Select(ChatRef),

    /// Rename the selected conversation
    Rename(String),

    /// Delete the selected conversation after confirmation
    Delete,

    /// Re-print the selected conversation
    Show,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent as a message.
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns CommandError::UnknownCommand if input starts with "/" but is not a valid command.
/// Returns CommandError::UnsupportedArgument if a command receives an invalid argument.
/// Returns CommandError::MissingArgument if a command requires an argument but none was provided.
///
/// # Examples
///
/// ```
/// use chatline::commands::special_commands::{parse_special_command, ChatRef, SpecialCommand};
///
/// let cmd = parse_special_command("/select 2").unwrap();
/// assert_eq!(cmd, SpecialCommand::Select(ChatRef::Index(2)));
///
/// let cmd = parse_special_command("hello there").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    // If input doesn't start with "/", it's not a command (except exit/quit)
    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "/new" => no_argument("/new", rest, SpecialCommand::New),
        "/list" | "/ls" => no_argument("/list", rest, SpecialCommand::List),
        "/show" => no_argument("/show", rest, SpecialCommand::Show),
        "/delete" => no_argument("/delete", rest, SpecialCommand::Delete),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/exit" | "/quit" | "exit" | "quit" => Ok(SpecialCommand::Exit),

        "/select" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "/select".to_string(),
                    usage: "/select <number|id>".to_string(),
                });
            }
            match rest.parse::<usize>() {
                Ok(0) => Err(CommandError::UnsupportedArgument {
                    command: "/select".to_string(),
                    arg: rest.to_string(),
                }),
                Ok(index) => Ok(SpecialCommand::Select(ChatRef::Index(index))),
                Err(_) => Ok(SpecialCommand::Select(ChatRef::Id(rest.to_string()))),
            }
        }

        // Titles keep their case
        "/rename" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/rename".to_string(),
                    usage: "/rename <title>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Rename(rest.to_string()))
            }
        }

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn no_argument(
    command: &str,
    rest: &str,
    parsed: SpecialCommand,
) -> Result<SpecialCommand, CommandError> {
    if rest.is_empty() {
        Ok(parsed)
    } else {
        Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: rest.to_string(),
        })
    }
}

/// Print help for the interactive session
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CONVERSATIONS:
  /new              - Create a conversation and switch to it
  /list             - List conversations (alias: /ls)
  /select <n|id>    - Switch to conversation number n from /list, or by id
  /rename <title>   - Rename the current conversation
  /delete           - Delete the current conversation (asks first)
  /show             - Print the current conversation again

SESSION:
  /help             - Show this help
  /exit             - Leave the session (also: exit, quit, Ctrl-D)

Anything else is sent as a message to the current conversation.
"#
    );
}

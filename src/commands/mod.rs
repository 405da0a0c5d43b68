/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`: interactive chat session
- `conversations`: one-shot list/show/create/rename/delete/send commands
- `special_commands`: slash command parser used by the chat session

The helpers below wire the configured backends together and format
conversations and messages for the terminal.
*/

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use colored::Colorize;

use crate::backend::{GraphqlBackend, WsLiveChannel};
use crate::chat::types::{Message, Role};
use crate::chat::SessionController;
use crate::config::{ChatConfig, Config};
use crate::error::Result;
use crate::identity::{IdentityHandle, StaticIdentityProvider};

pub mod chat;
pub mod conversations;
pub mod special_commands;

/// Configured collaborators for one process
pub struct Backends {
    pub backend: Arc<GraphqlBackend>,
    pub live: Arc<WsLiveChannel>,
    pub identity: IdentityHandle,
}

/// Build the identity provider and both backends from configuration
pub fn connect(config: &Config) -> Result<Backends> {
    let identity: IdentityHandle = Arc::new(StaticIdentityProvider::from_config(&config.identity));
    let backend = Arc::new(GraphqlBackend::new(&config.backend, identity.clone())?);
    let live = Arc::new(WsLiveChannel::new(&config.backend, identity.clone())?);
    Ok(Backends {
        backend,
        live,
        identity,
    })
}

/// Build a session controller over the configured backends
pub fn open_session(config: &Config, chat: &ChatConfig) -> Result<SessionController> {
    let backends = connect(config)?;
    Ok(SessionController::new(
        backends.backend,
        backends.live,
        backends.identity,
        chat,
    ))
}

/// Short age label for a conversation list
///
/// Less than a day old shows the time, less than a week shows the weekday,
/// anything older shows month and day.
pub fn format_age(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let local = updated_at.with_timezone(&Local);
    let age = now - updated_at;
    if age < Duration::hours(24) {
        local.format("%H:%M").to_string()
    } else if age < Duration::days(7) {
        local.format("%a").to_string()
    } else {
        local.format("%b %-d").to_string()
    }
}

/// Time-of-day label for a message
pub fn format_time(created_at: DateTime<Utc>) -> String {
    created_at.with_timezone(&Local).format("%H:%M").to_string()
}

/// Print one message line
pub fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you".cyan().bold(),
        Role::Assistant => "assistant".green().bold(),
    };
    println!(
        "{} {} {}",
        format_time(message.created_at).dimmed(),
        who,
        message.content
    );
}

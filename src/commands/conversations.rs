//! One-shot conversation commands
//!
//! Each handler builds the components it needs, performs one operation and
//! prints the result.

use std::io::IsTerminal;

use chrono::Utc;
use colored::Colorize;
use prettytable::{format, row, Table};

use crate::backend::ChatBackend;
use crate::chat::list::{ConversationListManager, DeleteOutcome};
use crate::chat::metadata::MetadataStore;
use crate::chat::send::SendOutcome;
use crate::chat::timeline::TimelineMerger;
use crate::chat::types::{Chat, ChatId};
use crate::commands::{connect, format_age, open_session, print_message};
use crate::config::{ChatConfig, Config};
use crate::error::{ChatlineError, Result};

struct Context {
    lists: ConversationListManager,
    store: MetadataStore,
}

async fn context(config: &Config) -> Result<Context> {
    let backends = connect(config)?;
    let identity = backends.identity.require()?;
    let mut store = MetadataStore::new();
    store.refresh(backends.backend.as_ref(), &identity).await?;
    let lists = ConversationListManager::new(
        backends.backend.clone(),
        backends.identity.clone(),
        config.chat.default_title.clone(),
    );
    Ok(Context { lists, store })
}

/// Render conversations as a table, most recent first
pub fn conversation_table(chats: &[Chat]) -> Table {
    let now = Utc::now();
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "#".bold(),
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Updated".bold()
    ]);
    for (index, chat) in chats.iter().enumerate() {
        let title = if chat.title.chars().count() > 40 {
            format!("{}...", chat.title.chars().take(37).collect::<String>())
        } else {
            chat.title.clone()
        };
        table.add_row(row![
            index + 1,
            chat.id.as_str().cyan(),
            title,
            chat.message_count,
            format_age(chat.updated_at, now)
        ]);
    }
    table
}

/// List conversations
pub async fn list(config: &Config, json: bool) -> Result<()> {
    let ctx = context(config).await?;
    let chats = ctx.store.chats();

    if json {
        println!("{}", serde_json::to_string_pretty(chats).map_err(ChatlineError::from)?);
        return Ok(());
    }

    if chats.is_empty() {
        println!("{}", "No conversations yet.".yellow());
        println!("Use {} to start one.", "chatline create".cyan());
        return Ok(());
    }

    println!("\nConversations:");
    conversation_table(chats).printstd();
    println!();
    Ok(())
}

/// Print one conversation's timeline
pub async fn show(config: &Config, id: &str) -> Result<()> {
    let backends = connect(config)?;
    let identity = backends.identity.require()?;
    let chat_id = ChatId::new(id);
    let detail = backends.backend.fetch_chat(&chat_id, &identity.id).await?;

    let mut timeline = TimelineMerger::new();
    timeline.reset(Some(chat_id.clone()));
    timeline.apply_fetch(&chat_id, detail.messages);

    println!("\n{} ({} messages)\n", detail.chat.title.bold(), timeline.len());
    if timeline.is_empty() {
        println!("{}", "No messages yet.".dimmed());
    }
    for message in timeline.messages() {
        print_message(message);
    }
    println!();
    Ok(())
}

/// Create a conversation with the default title
pub async fn create(config: &Config) -> Result<()> {
    let mut ctx = context(config).await?;
    let id = ctx.lists.create(&mut ctx.store).await?;
    println!("{} {}", "Created conversation".green(), id.as_str().cyan());
    Ok(())
}

/// Rename a conversation
pub async fn rename(config: &Config, id: &str, title: &str) -> Result<()> {
    let mut ctx = context(config).await?;
    let chat_id = ChatId::new(id);
    ctx.lists.rename(&chat_id, title, &mut ctx.store).await?;
    println!("{} {}", "Renamed conversation".green(), chat_id.as_str().cyan());
    Ok(())
}

/// Delete a conversation, asking first unless `yes` is set
///
/// # Errors
///
/// Returns `DeleteNotConfirmed` when confirmation is required but stdin is
/// not a terminal.
pub async fn delete(config: &Config, id: &str, yes: bool) -> Result<()> {
    let mut ctx = context(config).await?;
    let chat_id = ChatId::new(id);
    let chat = ctx
        .store
        .get(&chat_id)
        .cloned()
        .ok_or_else(|| ChatlineError::NotFound(format!("conversation {}", id)))?;

    let confirmed = if yes || !config.chat.confirm_delete {
        true
    } else if std::io::stdin().is_terminal() {
        ask_yes_no(&format!("Delete \"{}\" and all its messages?", chat.title))?
    } else {
        return Err(ChatlineError::DeleteNotConfirmed(id.to_string()).into());
    };

    match ctx.lists.delete(&chat_id, &mut ctx.store, |_| confirmed).await? {
        DeleteOutcome::Deleted => println!("{}", format!("Deleted conversation {}", id).green()),
        DeleteOutcome::Cancelled => println!("{}", "Cancelled.".yellow()),
    }
    Ok(())
}

/// Send one message to `chat`, or to the most recent conversation
pub async fn send(config: &Config, chat: Option<&str>, content: &str) -> Result<()> {
    let chat_config = ChatConfig {
        live_chat_list: false,
        ..config.chat.clone()
    };
    let mut session = open_session(config, &chat_config)?;
    session.load().await?;
    if let Some(id) = chat {
        session.select(&ChatId::new(id)).await?;
    }

    match session.send(content).await? {
        SendOutcome::Sent { response, .. } => {
            println!("{}", "Message sent.".green());
            if let Some(reply) = response.response {
                println!("{} {}", "assistant".green().bold(), reply);
            }
        }
        SendOutcome::ChatCreated(id) => {
            println!(
                "{} {}",
                "No conversation existed; created".yellow(),
                id.as_str().cyan()
            );
            println!("Send the message again to post it there.");
        }
    }
    Ok(())
}

/// Ask a yes/no question on the terminal; anything but "y"/"yes" is no
pub fn ask_yes_no(question: &str) -> Result<bool> {
    let mut editor = rustyline::DefaultEditor::new()?;
    let answer = match editor.readline(&format!("{} [y/N] ", question)) {
        Ok(line) => line,
        Err(_) => return Ok(false),
    };
    Ok(is_yes(&answer))
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

//! Interactive chat mode handler.
//!
//! Loads the session, then runs a readline loop that sends plain lines
//! through the send pipeline and dispatches slash commands. Live snapshots
//! are printed while the prompt waits for input.

use std::collections::HashSet;
use std::sync::mpsc as std_mpsc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use crate::chat::send::SendOutcome;
use crate::chat::session::SessionEvent;
use crate::chat::types::{ChatId, MessageId};
use crate::chat::SessionController;
use crate::commands::conversations::{conversation_table, is_yes};
use crate::commands::special_commands::{parse_special_command, print_help, ChatRef, SpecialCommand};
use crate::commands::{open_session, print_message};
use crate::config::Config;
use crate::error::{kind_of, ChatlineError, ErrorKind, Result};

/// One answer from the line reader thread
enum Input {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// Readline running on its own thread, one prompt at a time
///
/// The editor blocks, so it cannot share the runtime thread with the live
/// feeds. Each `request` reads exactly one line.
struct LineReader {
    prompts: std_mpsc::Sender<String>,
    lines: mpsc::UnboundedReceiver<Input>,
}

impl LineReader {
    fn spawn() -> Self {
        let (prompt_tx, prompt_rx) = std_mpsc::channel::<String>();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            let mut editor = match DefaultEditor::new() {
                Ok(editor) => editor,
                Err(e) => {
                    let _ = line_tx.send(Input::Failed(e.to_string()));
                    return;
                }
            };
            for prompt in prompt_rx {
                let input = match editor.readline(&prompt) {
                    Ok(line) => {
                        if !line.trim().is_empty() {
                            let _ = editor.add_history_entry(line.as_str());
                        }
                        Input::Line(line)
                    }
                    Err(ReadlineError::Interrupted) => Input::Interrupted,
                    Err(ReadlineError::Eof) => Input::Eof,
                    Err(e) => Input::Failed(e.to_string()),
                };
                if line_tx.send(input).is_err() {
                    break;
                }
            }
        });

        Self {
            prompts: prompt_tx,
            lines: line_rx,
        }
    }

    fn request(&self, prompt: String) -> Result<()> {
        self.prompts
            .send(prompt)
            .map_err(|_| ChatlineError::Io(std::io::ErrorKind::BrokenPipe.into()))?;
        Ok(())
    }

    async fn next(&mut self) -> Input {
        self.lines.recv().await.unwrap_or(Input::Eof)
    }

    /// Ask a question and wait for the answer, without serving live feeds
    async fn ask(&mut self, question: &str) -> Result<bool> {
        self.request(format!("{} [y/N] ", question))?;
        Ok(matches!(self.next().await, Input::Line(answer) if is_yes(&answer)))
    }
}

/// Messages already printed for the selected conversation
#[derive(Default)]
struct Transcript {
    chat_id: Option<ChatId>,
    printed: HashSet<MessageId>,
}

impl Transcript {
    /// Print whatever the session shows that has not been printed yet
    ///
    /// A change of selection prints the new conversation from the top.
    fn sync(&mut self, session: &SessionController) {
        if session.selected_id() != self.chat_id.as_ref() {
            self.chat_id = session.selected_id().cloned();
            self.printed.clear();
            match session.selected_chat() {
                Some(chat) => println!("\n{} {}\n", "──".dimmed(), chat.title.bold()),
                None => println!(
                    "{}",
                    "No conversation selected. Type /new or just start typing.".yellow()
                ),
            }
        }
        for message in session.messages() {
            if self.printed.insert(message.id.clone()) {
                print_message(message);
            }
        }
    }

    fn reprint(&mut self, session: &SessionController) {
        self.chat_id = None;
        self.sync(session);
    }
}

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `chat` - Optional conversation to open instead of the most recent one
pub async fn run_chat(config: Config, chat: Option<String>) -> Result<()> {
    let mut session = open_session(&config, &config.chat)?;
    session.load().await?;
    if let Some(id) = chat {
        session.select(&ChatId::new(id)).await?;
    }

    let mut reader = LineReader::spawn();
    let mut transcript = Transcript::default();

    print_welcome_banner(&session);
    transcript.sync(&session);

    loop {
        reader.request(prompt(&session))?;

        let input = loop {
            tokio::select! {
                biased;
                input = reader.next() => break input,
                event = session.next_event() => {
                    match event {
                        Ok(SessionEvent::LiveError(error)) => {
                            println!("{} {}", "live update failed:".yellow(), error);
                        }
                        Ok(SessionEvent::LiveChannelClosed(_)) => {
                            tracing::debug!("Live message feed closed");
                        }
                        Ok(_) => {}
                        Err(e) => report_error(&e),
                    }
                    transcript.sync(&session);
                }
            }
        };

        let line = match input {
            Input::Line(line) => line,
            Input::Interrupted => continue,
            Input::Eof => break,
            Input::Failed(error) => {
                tracing::error!("Readline error: {}", error);
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let command = match parse_special_command(trimmed) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e.to_string().red());
                continue;
            }
        };

        let result = match command {
            SpecialCommand::Exit => break,
            SpecialCommand::Help => {
                print_help();
                Ok(())
            }
            SpecialCommand::List => {
                print_conversations(&session);
                Ok(())
            }
            SpecialCommand::Show => {
                transcript.reprint(&session);
                Ok(())
            }
            SpecialCommand::New => session.create_conversation().await.map(|id| {
                tracing::debug!(chat_id = %id, "Created from chat mode");
            }),
            SpecialCommand::Select(target) => select(&mut session, target).await,
            SpecialCommand::Rename(title) => rename(&mut session, &title).await,
            SpecialCommand::Delete => {
                delete(&mut session, &mut reader, config.chat.confirm_delete).await
            }
            SpecialCommand::None => send(&mut session, trimmed).await,
        };

        if let Err(e) = result {
            report_error(&e);
        }
        transcript.sync(&session);
    }

    println!("Goodbye!");
    Ok(())
}

fn prompt(session: &SessionController) -> String {
    let title = session
        .selected_chat()
        .map(|chat| chat.title.as_str())
        .unwrap_or("no conversation");
    format!("[{}] >> ", title)
}

fn print_welcome_banner(session: &SessionController) {
    let who = session
        .identity()
        .map(|identity| identity.label().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    println!("{}", "Chatline".bold());
    println!("Signed in as {}", who.cyan());
    println!(
        "{} conversation(s). Type {} for commands.",
        session.conversations().len(),
        "/help".cyan()
    );
}

fn print_conversations(session: &SessionController) {
    let chats = session.conversations();
    if chats.is_empty() {
        println!("{}", "No conversations yet.".yellow());
        return;
    }
    conversation_table(chats).printstd();
    if let Some(error) = session.store().last_error() {
        println!("{} {}", "list may be stale:".yellow(), error);
    }
}

async fn select(session: &mut SessionController, target: ChatRef) -> Result<()> {
    let id = match target {
        ChatRef::Index(index) => session
            .conversations()
            .get(index - 1)
            .map(|chat| chat.id.clone())
            .ok_or_else(|| ChatlineError::NotFound(format!("conversation #{}", index)))?,
        ChatRef::Id(id) => ChatId::new(id),
    };
    session.select(&id).await
}

async fn rename(session: &mut SessionController, title: &str) -> Result<()> {
    session.begin_rename()?;
    session.update_rename_draft(title);
    let result = session.commit_rename().await;
    if result.is_err() && session.editing().is_some() {
        println!("{}", "Rename not applied; try /rename again.".dimmed());
    }
    result
}

async fn delete(
    session: &mut SessionController,
    reader: &mut LineReader,
    ask_first: bool,
) -> Result<()> {
    let Some(chat) = session.selected_chat().cloned() else {
        println!("{}", "No conversation selected.".yellow());
        return Ok(());
    };
    let confirmed = !ask_first
        || reader
            .ask(&format!("Delete \"{}\" and all its messages?", chat.title))
            .await?;
    let outcome = session.delete(&chat.id, |_| confirmed).await?;
    tracing::debug!(chat_id = %chat.id, ?outcome, "Delete finished");
    Ok(())
}

async fn send(session: &mut SessionController, content: &str) -> Result<()> {
    if let SendOutcome::ChatCreated(_) = session.send(content).await? {
        println!(
            "{}",
            "Started a new conversation. Send your message again to post it.".yellow()
        );
    }
    Ok(())
}

fn report_error(err: &anyhow::Error) {
    match kind_of(err) {
        ErrorKind::PartialSuccess => {
            println!("{} {}", "warning:".yellow().bold(), err);
            println!("{}", "Your message was saved. Send it again to retry the reply.".dimmed());
        }
        ErrorKind::Validation => println!("{}", err.to_string().yellow()),
        _ => println!("{} {:#}", "error:".red().bold(), err),
    }
}

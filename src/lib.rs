//! Chatline - multi-conversation chat client library
//!
//! This library keeps one consistent, ordered message timeline per
//! conversation while data arrives from a bulk fetch channel, a live push
//! channel and local writes that the backend has not confirmed yet.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: reconciliation core (metadata store, timeline, send pipeline,
//!   list manager, session controller)
//! - `backend`: collaborator traits plus GraphQL HTTP and WebSocket clients
//! - `identity`: identity handle threaded through every component
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//! - `commands`: CLI command handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatline::backend::{GraphqlBackend, WsLiveChannel};
//! use chatline::identity::{IdentityHandle, StaticIdentityProvider};
//! use chatline::{Config, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let identity: IdentityHandle =
//!         Arc::new(StaticIdentityProvider::from_config(&config.identity));
//!     let backend = Arc::new(GraphqlBackend::new(&config.backend, identity.clone())?);
//!     let live = Arc::new(WsLiveChannel::new(&config.backend, identity.clone())?);
//!
//!     let mut session = SessionController::new(backend, live, identity, &config.chat);
//!     session.load().await?;
//!     session.send("Hello").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;

// Re-export commonly used types
pub use chat::{ChatId, Message, Role, SessionController, SessionEvent};
pub use config::Config;
pub use error::{ChatlineError, ErrorKind, Result};
pub use identity::{Identity, IdentityHandle};

#[cfg(test)]
pub mod test_utils;

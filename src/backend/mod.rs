//! Collaborator contracts consumed by the core
//!
//! The core never talks to the network directly. It depends on two traits:
//!
//! - [`ChatBackend`] -- the bulk fetch channel plus the write operations
//!   (conversation CRUD, message insert, triggered reply action).
//! - [`LiveChannel`] -- the push channel, which re-delivers the complete
//!   ordered set on every server-side change.
//!
//! Concrete implementations live in submodules:
//!
//! - [`graphql::GraphqlBackend`] -- queries and mutations over HTTP.
//! - [`ws::WsLiveChannel`] -- subscriptions over the `graphql-transport-ws`
//!   WebSocket protocol.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::types::{Chat, ChatDetail, ChatId, Message, Role, SendMessageResponse};
use crate::error::Result;

pub mod graphql;
pub mod ws;

pub use graphql::GraphqlBackend;
pub use ws::WsLiveChannel;

/// Bulk fetch and write operations against the remote store
///
/// Implementations must fail explicitly on authorization and not-found
/// errors rather than returning partial data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// List the conversations owned by `user_id`, most recently updated first
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>>;

    /// Fetch one conversation with its full history, oldest first
    async fn fetch_chat(&self, chat_id: &ChatId, user_id: &str) -> Result<ChatDetail>;

    /// Insert a conversation and return the created record
    async fn create_chat(&self, title: &str, user_id: &str) -> Result<Chat>;

    /// Change a conversation title
    async fn rename_chat(&self, chat_id: &ChatId, title: &str) -> Result<Chat>;

    /// Delete a conversation and, by cascade, its messages
    async fn delete_chat(&self, chat_id: &ChatId) -> Result<()>;

    /// Persist one message
    async fn insert_message(&self, chat_id: &ChatId, content: &str, role: Role)
        -> Result<Message>;

    /// Trigger backend-side reply generation and await its acknowledgment
    async fn send_message_action(
        &self,
        chat_id: &ChatId,
        content: &str,
    ) -> Result<SendMessageResponse>;
}

/// Push channel delivering full snapshots
#[async_trait]
pub trait LiveChannel: Send + Sync {
    /// Subscribe to the complete ordered message list of one conversation
    async fn subscribe_messages(&self, chat_id: &ChatId) -> Result<LiveSubscription<Vec<Message>>>;

    /// Subscribe to the complete ordered conversation list of one identity
    async fn subscribe_chats(&self, user_id: &str) -> Result<LiveSubscription<Vec<Chat>>>;
}

/// One emission of a live subscription, tagged with what it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Conversation id or user id the subscription was opened for
    pub key: String,
    /// Complete current data set
    pub data: T,
}

/// Handle to an open live subscription
///
/// Dropping the handle (or calling [`LiveSubscription::cancel`]) tears the
/// subscription down; the producer observes this through its
/// [`LiveSender`].
#[derive(Debug)]
pub struct LiveSubscription<T> {
    key: String,
    rx: mpsc::UnboundedReceiver<Result<T>>,
    cancel: CancellationToken,
}

/// Producer side of a [`LiveSubscription`]
#[derive(Debug)]
pub struct LiveSender<T> {
    tx: mpsc::UnboundedSender<Result<T>>,
    cancel: CancellationToken,
}

impl<T> Clone for LiveSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> LiveSubscription<T> {
    /// Create a subscription handle and its producer
    pub fn channel(key: impl Into<String>) -> (Self, LiveSender<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let subscription = Self {
            key: key.into(),
            rx,
            cancel: cancel.clone(),
        };
        (subscription, LiveSender { tx, cancel })
    }

    /// What this subscription was opened for
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Wait for the next emission
    ///
    /// Returns `None` once the producer has gone away.
    pub async fn next(&mut self) -> Option<Result<Snapshot<T>>> {
        let item = self.rx.recv().await?;
        Some(item.map(|data| Snapshot {
            key: self.key.clone(),
            data,
        }))
    }

    /// Stop interest in further emissions
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Drop for LiveSubscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> LiveSender<T> {
    /// Deliver a snapshot; returns false once the subscriber is gone
    pub fn send(&self, data: T) -> bool {
        !self.cancel.is_cancelled() && self.tx.send(Ok(data)).is_ok()
    }

    /// Deliver a failure
    pub fn fail(&self, err: anyhow::Error) -> bool {
        !self.cancel.is_cancelled() && self.tx.send(Err(err)).is_ok()
    }

    /// Whether the subscriber has torn the subscription down
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Token that fires when the subscriber tears the subscription down
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

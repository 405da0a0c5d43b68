//! Message timeline for the selected conversation
//!
//! Two sources feed the timeline:
//!
//! - the bulk fetch result, used as the initial view and as the fallback
//!   whenever the live channel is unavailable;
//! - the live channel, which carries the complete ordered list on every
//!   emission. Once it has emitted it is the single source of truth and
//!   replaces the view wholesale; the two sources are never merged
//!   element by element.
//!
//! Whatever the source, the view is deduplicated by message id, ordered by
//! `(created_at, id)`, and a message keeps the role it was first seen with.

use std::collections::{HashMap, HashSet};

use crate::backend::{LiveSubscription, Snapshot};
use crate::chat::types::{ChatId, Message, MessageId, Role};
use crate::error::Result;

/// Where the current view came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineSource {
    /// Nothing delivered yet
    Empty,
    /// Bulk fetch result
    Fetched,
    /// Most recent live snapshot
    Live,
}

/// Ordered, gapless message view for one conversation
#[derive(Debug, Default)]
pub struct TimelineMerger {
    chat_id: Option<ChatId>,
    fetched: Option<Vec<Message>>,
    live: Option<Vec<Message>>,
    roles: HashMap<MessageId, Role>,
    subscription: Option<LiveSubscription<Vec<Message>>>,
    last_error: Option<String>,
}

impl TimelineMerger {
    /// Create a timeline with no conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation the timeline currently belongs to
    pub fn chat_id(&self) -> Option<&ChatId> {
        self.chat_id.as_ref()
    }

    /// Discard the view and start over for `chat_id`
    ///
    /// Dropping the previous live subscription tears it down. Roles already
    /// seen are kept for the whole session, so switching away and back
    /// cannot change a message's role.
    pub fn reset(&mut self, chat_id: Option<ChatId>) {
        if let Some(previous) = self.subscription.take() {
            tracing::debug!(chat_id = previous.key(), "Tearing down live subscription");
        }
        let roles = std::mem::take(&mut self.roles);
        *self = Self {
            chat_id,
            roles,
            ..Self::default()
        };
    }

    /// Install the live subscription for the current conversation
    ///
    /// Returns false (and drops the subscription) if it was opened for a
    /// different conversation.
    pub fn attach(&mut self, subscription: LiveSubscription<Vec<Message>>) -> bool {
        if !self.is_current(subscription.key()) {
            tracing::debug!(
                key = subscription.key(),
                "Discarding live subscription for a conversation no longer selected"
            );
            return false;
        }
        self.subscription = Some(subscription);
        true
    }

    /// Whether a live subscription is installed
    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Record a bulk fetch result
    ///
    /// Ignored if it belongs to another conversation. The live view, once
    /// present, keeps precedence.
    pub fn apply_fetch(&mut self, chat_id: &ChatId, messages: Vec<Message>) -> bool {
        if self.chat_id.as_ref() != Some(chat_id) {
            tracing::debug!(chat_id = %chat_id, "Discarding stale fetch result");
            return false;
        }
        let normalized = self.normalize(chat_id, messages);
        self.fetched = Some(normalized);
        self.last_error = None;
        true
    }

    /// Replace the view with a live snapshot
    ///
    /// Ignored if it belongs to another conversation.
    pub fn apply_live(&mut self, chat_id: &ChatId, messages: Vec<Message>) -> bool {
        if self.chat_id.as_ref() != Some(chat_id) {
            tracing::debug!(chat_id = %chat_id, "Discarding stale live snapshot");
            return false;
        }
        let normalized = self.normalize(chat_id, messages);
        tracing::debug!(chat_id = %chat_id, count = normalized.len(), "Applied live snapshot");
        self.live = Some(normalized);
        self.last_error = None;
        true
    }

    /// Forget the live view after the channel closed
    ///
    /// The view falls back to the fetched history until a new fetch or
    /// subscription arrives.
    pub fn live_closed(&mut self) {
        self.subscription = None;
        self.live = None;
    }

    /// Record a failure from either source
    pub fn record_error(&mut self, err: &anyhow::Error) {
        self.last_error = Some(err.to_string());
    }

    /// Error from the most recent failed delivery
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The current view
    pub fn messages(&self) -> &[Message] {
        self.live
            .as_deref()
            .or(self.fetched.as_deref())
            .unwrap_or(&[])
    }

    /// Number of messages in the current view
    pub fn len(&self) -> usize {
        self.messages().len()
    }

    /// Whether the current view is empty
    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }

    /// Which source the current view came from
    pub fn source(&self) -> TimelineSource {
        if self.live.is_some() {
            TimelineSource::Live
        } else if self.fetched.is_some() {
            TimelineSource::Fetched
        } else {
            TimelineSource::Empty
        }
    }

    /// Wait for the next live emission
    ///
    /// Never resolves while no subscription is installed.
    pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot<Vec<Message>>>> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.next().await,
            None => futures::future::pending().await,
        }
    }

    fn is_current(&self, key: &str) -> bool {
        self.chat_id.as_ref().map(ChatId::as_str) == Some(key)
    }

    fn normalize(&mut self, chat_id: &ChatId, messages: Vec<Message>) -> Vec<Message> {
        let mut seen = HashSet::with_capacity(messages.len());
        let mut out = Vec::with_capacity(messages.len());

        for mut message in messages {
            if &message.chat_id != chat_id {
                tracing::warn!(
                    message_id = %message.id,
                    "Dropping message delivered for another conversation"
                );
                continue;
            }
            if !seen.insert(message.id.clone()) {
                continue;
            }
            match self.roles.get(&message.id) {
                Some(role) if *role != message.role => {
                    tracing::warn!(
                        message_id = %message.id,
                        "Message changed role from {} to {}; keeping {}",
                        role,
                        message.role,
                        role
                    );
                    message.role = *role;
                }
                Some(_) => {}
                None => {
                    self.roles.insert(message.id.clone(), message.role);
                }
            }
            out.push(message);
        }

        out.sort_by(|a, b| a.timeline_key().cmp(&b.timeline_key()));
        out
    }
}

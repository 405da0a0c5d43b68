//! Test utilities for Chatline
//!
//! Builders for the data model plus [`FakeBackend`], an in-memory remote
//! store that implements both collaborator traits. The fake behaves like the
//! real backend where the core cares: inserts bump the owning conversation,
//! deletes cascade, and every change re-delivers full snapshots to open
//! live subscriptions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::backend::{ChatBackend, LiveChannel, LiveSender, LiveSubscription};
use crate::chat::types::{Chat, ChatDetail, ChatId, Message, MessageId, Role, SendMessageResponse};
use crate::error::{ChatlineError, Result};
use crate::identity::{Identity, IdentityHandle, StaticIdentityProvider};

/// User id used by [`identity`]
pub const USER_ID: &str = "u-1";

/// Fixed point all test timestamps are relative to
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base time")
}

/// Timestamp `secs` seconds after [`base_time`]
pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(secs)
}

/// Conversation owned by [`USER_ID`], created and updated at `secs`
pub fn chat(id: &str, secs: i64) -> Chat {
    Chat {
        id: ChatId::new(id),
        title: format!("Chat {}", id),
        user_id: Some(USER_ID.to_string()),
        created_at: at(secs),
        updated_at: at(secs),
        message_count: 0,
    }
}

/// Message in `chat_id` created at `secs`
pub fn message(chat_id: &str, id: &str, role: Role, secs: i64) -> Message {
    Message {
        id: MessageId::new(id),
        chat_id: ChatId::new(chat_id),
        role,
        content: format!("message {}", id),
        created_at: at(secs),
    }
}

/// The signed-in test identity
pub fn identity() -> Identity {
    let mut identity = Identity::new(USER_ID);
    identity.display_name = Some("Test User".to_string());
    identity
}

/// Identity handle that is signed in as [`identity`]
pub fn identity_handle() -> IdentityHandle {
    Arc::new(StaticIdentityProvider::authenticated(identity()))
}

/// Backend operation, used for failure injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListChats,
    FetchChat,
    CreateChat,
    RenameChat,
    DeleteChat,
    InsertMessage,
    SendAction,
    SubscribeMessages,
    SubscribeChats,
}

#[derive(Default)]
struct FakeState {
    chats: Vec<Chat>,
    messages: Vec<Message>,
    clock: i64,
    next_id: u64,
    failing: HashSet<Op>,
    calls: Vec<Op>,
    action_response: Option<SendMessageResponse>,
    auto_reply: bool,
    message_subs: Vec<(ChatId, LiveSender<Vec<Message>>)>,
    chat_subs: Vec<(String, LiveSender<Vec<Chat>>)>,
}

impl FakeState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        at(self.clock)
    }

    fn mint(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn enter(&mut self, op: Op) -> Result<()> {
        self.calls.push(op);
        if self.failing.contains(&op) {
            return Err(ChatlineError::Transport(format!("injected {:?} failure", op)).into());
        }
        Ok(())
    }

    fn with_count(&self, chat: &Chat) -> Chat {
        let mut chat = chat.clone();
        chat.message_count = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat.id)
            .count();
        chat
    }

    fn chats_for(&self, user_id: &str) -> Vec<Chat> {
        let mut chats: Vec<Chat> = self
            .chats
            .iter()
            .filter(|c| c.user_id.as_deref() == Some(user_id))
            .map(|c| self.with_count(c))
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        chats
    }

    fn messages_for(&self, chat_id: &ChatId) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| &m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timeline_key().cmp(&b.timeline_key()));
        messages
    }

    fn insert(&mut self, chat_id: &ChatId, content: &str, role: Role) -> Result<Message> {
        let now = self.tick();
        let chat = self
            .chats
            .iter_mut()
            .find(|c| &c.id == chat_id)
            .ok_or_else(|| ChatlineError::NotFound(format!("chat {}", chat_id)))?;
        chat.updated_at = now;

        let id = self.mint("msg");
        let message = Message {
            id: MessageId::new(id),
            chat_id: chat_id.clone(),
            role,
            content: content.to_string(),
            created_at: now,
        };
        self.messages.push(message.clone());
        self.publish_messages(chat_id);
        self.publish_chats();
        Ok(message)
    }

    fn publish_messages(&mut self, chat_id: &ChatId) {
        let snapshot = self.messages_for(chat_id);
        self.message_subs.retain(|(_, tx)| !tx.is_cancelled());
        for (key, tx) in &self.message_subs {
            if key == chat_id {
                tx.send(snapshot.clone());
            }
        }
    }

    fn publish_chats(&mut self) {
        self.chat_subs.retain(|(_, tx)| !tx.is_cancelled());
        let snapshots: Vec<(LiveSender<Vec<Chat>>, Vec<Chat>)> = self
            .chat_subs
            .iter()
            .map(|(user, tx)| (tx.clone(), self.chats_for(user)))
            .collect();
        for (tx, chats) in snapshots {
            tx.send(chats);
        }
    }
}

/// In-memory remote store implementing [`ChatBackend`] and [`LiveChannel`]
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Empty store; the triggered action succeeds and replies by default
    pub fn new() -> Self {
        let backend = Self::default();
        backend.lock().auto_reply = true;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake backend lock poisoned")
    }

    /// Add a conversation owned by [`USER_ID`]
    pub fn seed_chat(&self, id: &str, secs: i64) {
        let mut state = self.lock();
        state.clock = state.clock.max(secs);
        state.chats.push(chat(id, secs));
    }

    /// Add a message without publishing it
    pub fn seed_message(&self, chat_id: &str, id: &str, role: Role, secs: i64) {
        let mut state = self.lock();
        state.clock = state.clock.max(secs);
        state.messages.push(message(chat_id, id, role, secs));
    }

    /// Make every call of `op` fail with a transport error
    pub fn fail(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    /// Stop failing `op`
    pub fn recover(&self, op: Op) {
        self.lock().failing.remove(&op);
    }

    /// Fixed acknowledgment for the triggered action, with no reply inserted
    pub fn set_action_response(&self, response: SendMessageResponse) {
        let mut state = self.lock();
        state.action_response = Some(response);
        state.auto_reply = false;
    }

    /// Push a snapshot to the message subscribers of `chat_id`
    pub fn emit_messages(&self, chat_id: &str, messages: Vec<Message>) {
        let state = self.lock();
        for (key, tx) in &state.message_subs {
            if key.as_str() == chat_id {
                tx.send(messages.clone());
            }
        }
    }

    /// Close every message subscription from the server side
    pub fn close_message_subscriptions(&self) {
        self.lock().message_subs.clear();
    }

    /// Number of open message subscriptions, optionally for one conversation
    pub fn open_message_subscriptions(&self, chat_id: Option<&str>) -> usize {
        self.lock()
            .message_subs
            .iter()
            .filter(|(key, tx)| !tx.is_cancelled() && chat_id.map_or(true, |id| key.as_str() == id))
            .count()
    }

    /// Current server-side conversations for [`USER_ID`]
    pub fn stored_chats(&self) -> Vec<Chat> {
        self.lock().chats_for(USER_ID)
    }

    /// Current server-side messages of one conversation
    pub fn stored_messages(&self, chat_id: &str) -> Vec<Message> {
        self.lock().messages_for(&ChatId::new(chat_id))
    }

    /// How many times `op` was attempted
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>> {
        let mut state = self.lock();
        state.enter(Op::ListChats)?;
        Ok(state.chats_for(user_id))
    }

    async fn fetch_chat(&self, chat_id: &ChatId, user_id: &str) -> Result<ChatDetail> {
        let mut state = self.lock();
        state.enter(Op::FetchChat)?;
        let chat = state
            .chats
            .iter()
            .find(|c| &c.id == chat_id && c.user_id.as_deref() == Some(user_id))
            .map(|c| state.with_count(c))
            .ok_or_else(|| ChatlineError::NotFound(format!("chat {}", chat_id)))?;
        let messages = state.messages_for(chat_id);
        Ok(ChatDetail { chat, messages })
    }

    async fn create_chat(&self, title: &str, user_id: &str) -> Result<Chat> {
        let mut state = self.lock();
        state.enter(Op::CreateChat)?;
        let now = state.tick();
        let id = state.mint("chat");
        let chat = Chat {
            id: ChatId::new(id),
            title: title.to_string(),
            user_id: Some(user_id.to_string()),
            created_at: now,
            updated_at: now,
            message_count: 0,
        };
        state.chats.push(chat.clone());
        state.publish_chats();
        Ok(chat)
    }

    async fn rename_chat(&self, chat_id: &ChatId, title: &str) -> Result<Chat> {
        let mut state = self.lock();
        state.enter(Op::RenameChat)?;
        let now = state.tick();
        let chat = state
            .chats
            .iter_mut()
            .find(|c| &c.id == chat_id)
            .ok_or_else(|| ChatlineError::NotFound(format!("chat {}", chat_id)))?;
        chat.title = title.to_string();
        chat.updated_at = now;
        let chat = chat.clone();
        state.publish_chats();
        Ok(chat)
    }

    async fn delete_chat(&self, chat_id: &ChatId) -> Result<()> {
        let mut state = self.lock();
        state.enter(Op::DeleteChat)?;
        let before = state.chats.len();
        state.chats.retain(|c| &c.id != chat_id);
        if state.chats.len() == before {
            return Err(ChatlineError::NotFound(format!("chat {}", chat_id)).into());
        }
        state.messages.retain(|m| &m.chat_id != chat_id);
        state.message_subs.retain(|(key, _)| key != chat_id);
        state.publish_chats();
        Ok(())
    }

    async fn insert_message(&self, chat_id: &ChatId, content: &str, role: Role) -> Result<Message> {
        let mut state = self.lock();
        state.enter(Op::InsertMessage)?;
        state.insert(chat_id, content, role)
    }

    async fn send_message_action(
        &self,
        chat_id: &ChatId,
        content: &str,
    ) -> Result<SendMessageResponse> {
        let mut state = self.lock();
        state.enter(Op::SendAction)?;
        if let Some(response) = state.action_response.clone() {
            return Ok(response);
        }
        let reply = format!("echo: {}", content);
        if state.auto_reply {
            state.insert(chat_id, &reply, Role::Assistant)?;
        }
        Ok(SendMessageResponse {
            success: true,
            message: None,
            response: Some(reply),
        })
    }
}

#[async_trait]
impl LiveChannel for FakeBackend {
    async fn subscribe_messages(&self, chat_id: &ChatId) -> Result<LiveSubscription<Vec<Message>>> {
        let mut state = self.lock();
        state.enter(Op::SubscribeMessages)?;
        let (subscription, tx) = LiveSubscription::channel(chat_id.as_str());
        tx.send(state.messages_for(chat_id));
        state.message_subs.push((chat_id.clone(), tx));
        Ok(subscription)
    }

    async fn subscribe_chats(&self, user_id: &str) -> Result<LiveSubscription<Vec<Chat>>> {
        let mut state = self.lock();
        state.enter(Op::SubscribeChats)?;
        let (subscription, tx) = LiveSubscription::channel(user_id);
        tx.send(state.chats_for(user_id));
        state.chat_subs.push((user_id.to_string(), tx));
        Ok(subscription)
    }
}

/// Assert that an error is a [`ChatlineError`] of the given kind
pub fn assert_kind(err: &anyhow::Error, kind: crate::error::ErrorKind) {
    assert_eq!(
        crate::error::kind_of(err),
        kind,
        "unexpected error kind for: {:#}",
        err
    );
}

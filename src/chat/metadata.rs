//! Conversation metadata store
//!
//! Holds the conversations visible to the current identity, most recently
//! updated first. The list only changes on a successful refresh or a live
//! snapshot; a failed refresh keeps the last known good list and records an
//! error signal instead.

use std::collections::HashSet;

use crate::backend::ChatBackend;
use crate::chat::types::{Chat, ChatId};
use crate::error::Result;
use crate::identity::Identity;

/// Ordered conversation list for one identity
#[derive(Debug, Default)]
pub struct MetadataStore {
    owner: Option<String>,
    chats: Vec<Chat>,
    loaded: bool,
    last_error: Option<String>,
    // Ids deleted this session. Backend ids are never reused, so these are
    // kept until the identity changes: a snapshot taken before the delete
    // may arrive after any later refresh.
    deleted: HashSet<ChatId>,
}

impl MetadataStore {
    /// Create an empty, not yet loaded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Current conversations, most recently updated first
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Whether at least one refresh or snapshot has succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Error from the most recent failed update, cleared on success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Look up one conversation
    pub fn get(&self, id: &ChatId) -> Option<&Chat> {
        self.chats.iter().find(|chat| &chat.id == id)
    }

    /// Whether `id` is in the current list
    pub fn contains(&self, id: &ChatId) -> bool {
        self.get(id).is_some()
    }

    /// The most recently updated conversation
    pub fn most_recent(&self) -> Option<&Chat> {
        self.chats.first()
    }

    /// Message count the backend reported for `id`
    pub fn message_count(&self, id: &ChatId) -> Option<usize> {
        self.get(id).map(|chat| chat.message_count)
    }

    /// Reload the list from the bulk fetch channel
    ///
    /// # Errors
    ///
    /// Returns the fetch error. The previous list is kept and the error is
    /// also recorded in [`MetadataStore::last_error`].
    pub async fn refresh(&mut self, backend: &dyn ChatBackend, identity: &Identity) -> Result<()> {
        match backend.list_chats(&identity.id).await {
            Ok(chats) => {
                tracing::debug!(count = chats.len(), "Conversation list refreshed");
                self.replace(&identity.id, chats);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Conversation list refresh failed: {:#}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Apply a full list delivered by the live channel
    ///
    /// Snapshots for an identity other than the one the store was loaded
    /// for are discarded. Returns whether the snapshot was applied.
    pub fn apply_snapshot(&mut self, user_id: &str, chats: Vec<Chat>) -> bool {
        if let Some(owner) = self.owner.as_deref() {
            if owner != user_id {
                tracing::debug!(user_id, "Discarding conversation snapshot for another identity");
                return false;
            }
        }
        self.replace(user_id, chats);
        true
    }

    /// Record a failure from a live feed without touching the list
    pub fn record_failure(&mut self, err: &anyhow::Error) {
        self.last_error = Some(err.to_string());
    }

    /// Drop a conversation whose deletion the backend confirmed
    ///
    /// The id is also remembered so a late response that still contains
    /// it cannot bring it back.
    pub fn forget(&mut self, id: &ChatId) {
        self.chats.retain(|chat| &chat.id != id);
        self.deleted.insert(id.clone());
    }

    fn replace(&mut self, user_id: &str, mut chats: Vec<Chat>) {
        if self.owner.as_deref() != Some(user_id) {
            self.deleted.clear();
        }
        chats.retain(|chat| !self.deleted.contains(&chat.id));
        // Stable sort: equal timestamps keep backend order.
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        self.owner = Some(user_id.to_string());
        self.chats = chats;
        self.loaded = true;
        self.last_error = None;
    }
}

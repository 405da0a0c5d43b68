//! Create, rename and delete conversations
//!
//! Every mutation waits for the backend to confirm it and then refreshes the
//! [`MetadataStore`]; nothing is applied to local state ahead of the write.
//! A refresh that fails after a confirmed write does not turn the write into
//! an error; the store's error signal reports it instead.

use std::sync::Arc;

use crate::backend::ChatBackend;
use crate::chat::metadata::MetadataStore;
use crate::chat::types::{Chat, ChatId};
use crate::error::{ChatlineError, Result};
use crate::identity::{Identity, IdentityHandle};

/// Rename in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDraft {
    /// Conversation being renamed
    pub chat_id: ChatId,
    /// Draft title as typed so far
    pub text: String,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The backend confirmed the deletion
    Deleted,
    /// The caller declined the confirmation; nothing was dispatched
    Cancelled,
}

/// Conversation CRUD plus rename edit state
pub struct ConversationListManager {
    backend: Arc<dyn ChatBackend>,
    identity: IdentityHandle,
    default_title: String,
    editing: Option<RenameDraft>,
}

impl ConversationListManager {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        identity: IdentityHandle,
        default_title: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            identity,
            default_title: default_title.into(),
            editing: None,
        }
    }

    /// Title given to new conversations
    pub fn default_title(&self) -> &str {
        &self.default_title
    }

    /// Insert a conversation with the default title and return its id
    pub async fn create(&self, store: &mut MetadataStore) -> Result<ChatId> {
        let identity = self.identity.require()?;
        let chat = self
            .backend
            .create_chat(&self.default_title, &identity.id)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to create conversation: {:#}", e);
                e
            })?;
        tracing::info!(chat_id = %chat.id, "Conversation created");

        self.refresh(store, &identity).await;
        Ok(chat.id)
    }

    /// Current rename draft, if any
    pub fn editing(&self) -> Option<&RenameDraft> {
        self.editing.as_ref()
    }

    /// Open the rename editor for `id`, seeded with its current title
    ///
    /// Replaces any rename already in progress.
    pub fn begin_rename(&mut self, store: &MetadataStore, id: &ChatId) -> Result<&RenameDraft> {
        let chat = store
            .get(id)
            .ok_or_else(|| ChatlineError::NotFound(format!("conversation {}", id)))?;
        Ok(self.editing.insert(RenameDraft {
            chat_id: chat.id.clone(),
            text: chat.title.clone(),
        }))
    }

    /// Replace the draft text; returns false when no rename is open
    pub fn update_draft(&mut self, text: impl Into<String>) -> bool {
        match self.editing.as_mut() {
            Some(draft) => {
                draft.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Close the rename editor without dispatching
    pub fn cancel_rename(&mut self) -> Option<RenameDraft> {
        self.editing.take()
    }

    /// Dispatch the open rename draft
    pub async fn commit_rename(&mut self, store: &mut MetadataStore) -> Result<()> {
        let draft = self
            .editing
            .clone()
            .ok_or_else(|| ChatlineError::Validation("No rename in progress".to_string()))?;
        self.rename(&draft.chat_id, &draft.text, store).await
    }

    /// Rename `id` to `title`
    ///
    /// Blank titles are rejected locally. Renaming to the current title
    /// succeeds without a backend call. On success the editor for `id` is
    /// closed; on failure it stays open so the user can retry.
    pub async fn rename(&mut self, id: &ChatId, title: &str, store: &mut MetadataStore) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatlineError::Validation("Title cannot be empty".to_string()).into());
        }
        let identity = self.identity.require()?;

        let current = store
            .get(id)
            .ok_or_else(|| ChatlineError::NotFound(format!("conversation {}", id)))?;
        if current.title == title {
            tracing::debug!(chat_id = %id, "Title unchanged; skipping rename");
            self.close_editor(id);
            return Ok(());
        }

        self.backend.rename_chat(id, title).await.map_err(|e| {
            tracing::warn!(chat_id = %id, "Failed to rename conversation: {:#}", e);
            e
        })?;
        tracing::info!(chat_id = %id, "Conversation renamed");

        self.close_editor(id);
        self.refresh(store, &identity).await;
        Ok(())
    }

    /// Delete `id` once `confirm` agrees
    ///
    /// `confirm` sees the conversation about to be deleted; returning false
    /// cancels without contacting the backend. Selection is not touched
    /// here; the session controller revalidates it afterwards.
    pub async fn delete<F>(
        &mut self,
        id: &ChatId,
        store: &mut MetadataStore,
        confirm: F,
    ) -> Result<DeleteOutcome>
    where
        F: FnOnce(&Chat) -> bool,
    {
        let chat = store
            .get(id)
            .ok_or_else(|| ChatlineError::NotFound(format!("conversation {}", id)))?;
        if !confirm(chat) {
            tracing::debug!(chat_id = %id, "Deletion not confirmed");
            return Ok(DeleteOutcome::Cancelled);
        }
        let identity = self.identity.require()?;

        self.backend.delete_chat(id).await.map_err(|e| {
            tracing::warn!(chat_id = %id, "Failed to delete conversation: {:#}", e);
            e
        })?;
        tracing::info!(chat_id = %id, "Conversation deleted");

        store.forget(id);
        self.close_editor(id);
        self.refresh(store, &identity).await;
        Ok(DeleteOutcome::Deleted)
    }

    fn close_editor(&mut self, id: &ChatId) {
        if self.editing.as_ref().is_some_and(|draft| &draft.chat_id == id) {
            self.editing = None;
        }
    }

    async fn refresh(&self, store: &mut MetadataStore, identity: &Identity) {
        if let Err(e) = store.refresh(self.backend.as_ref(), identity).await {
            tracing::debug!("Refresh after mutation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{assert_kind, identity, identity_handle, FakeBackend, Op};

    struct Fixture {
        fake: FakeBackend,
        lists: ConversationListManager,
        store: MetadataStore,
    }

    async fn fixture(seed: &[(&str, i64)]) -> Fixture {
        let fake = FakeBackend::new();
        for (id, secs) in seed {
            fake.seed_chat(id, *secs);
        }
        let lists = ConversationListManager::new(Arc::new(fake.clone()), identity_handle(), "New Chat");
        let mut store = MetadataStore::new();
        store.refresh(&fake, &identity()).await.unwrap();
        Fixture { fake, lists, store }
    }

    #[tokio::test]
    async fn test_create_uses_default_title_and_refreshes() {
        let mut f = fixture(&[]).await;
        let id = f.lists.create(&mut f.store).await.unwrap();

        assert_eq!(f.store.chats().len(), 1);
        let chat = f.store.get(&id).unwrap();
        assert_eq!(chat.title, "New Chat");
        assert_eq!(f.fake.calls(Op::ListChats), 2);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_store_unchanged() {
        let mut f = fixture(&[("a", 10)]).await;
        f.fake.fail(Op::CreateChat);

        let err = f.lists.create(&mut f.store).await.unwrap_err();

        assert_kind(&err, ErrorKind::Transport);
        assert_eq!(f.store.chats().len(), 1);
        assert_eq!(f.fake.calls(Op::ListChats), 1);
    }

    #[tokio::test]
    async fn test_blank_title_rejected_and_editor_stays_open() {
        let mut f = fixture(&[("a", 10)]).await;
        let id = ChatId::new("a");
        f.lists.begin_rename(&f.store, &id).unwrap();
        f.lists.update_draft("   ");

        let err = f.lists.commit_rename(&mut f.store).await.unwrap_err();

        assert_kind(&err, ErrorKind::Validation);
        assert!(f.lists.editing().is_some());
        assert_eq!(f.fake.calls(Op::RenameChat), 0);
    }

    #[tokio::test]
    async fn test_rename_success_closes_editor() {
        let mut f = fixture(&[("a", 10), ("b", 20)]).await;
        let id = ChatId::new("a");
        f.lists.begin_rename(&f.store, &id).unwrap();
        assert_eq!(f.lists.editing().unwrap().text, "Chat a");
        f.lists.update_draft("  Groceries ");

        f.lists.commit_rename(&mut f.store).await.unwrap();

        assert!(f.lists.editing().is_none());
        assert_eq!(f.store.get(&id).unwrap().title, "Groceries");
        // Rename bumps updated_at, so the renamed chat moves to the front.
        assert_eq!(f.store.most_recent().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_rename_failure_keeps_editor_open() {
        let mut f = fixture(&[("a", 10)]).await;
        let id = ChatId::new("a");
        f.fake.fail(Op::RenameChat);
        f.lists.begin_rename(&f.store, &id).unwrap();
        f.lists.update_draft("Groceries");

        assert!(f.lists.commit_rename(&mut f.store).await.is_err());

        let draft = f.lists.editing().unwrap();
        assert_eq!(draft.text, "Groceries");
        assert_eq!(f.store.get(&id).unwrap().title, "Chat a");
    }

    #[tokio::test]
    async fn test_rename_to_current_title_is_noop() {
        let mut f = fixture(&[("a", 10), ("b", 20)]).await;
        let before = f.store.chats().to_vec();

        f.lists
            .rename(&ChatId::new("a"), "Chat a", &mut f.store)
            .await
            .unwrap();

        assert_eq!(f.store.chats(), before.as_slice());
        assert_eq!(f.fake.calls(Op::RenameChat), 0);
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation() {
        let mut f = fixture(&[("a", 10)]).await;
        let id = ChatId::new("a");

        let outcome = f.lists.delete(&id, &mut f.store, |_| false).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert!(f.store.contains(&id));
        assert_eq!(f.fake.calls(Op::DeleteChat), 0);
    }

    #[tokio::test]
    async fn test_delete_confirmed_removes_chat() {
        let mut f = fixture(&[("a", 10), ("b", 20)]).await;
        let id = ChatId::new("a");
        f.lists.begin_rename(&f.store, &id).unwrap();

        let outcome = f
            .lists
            .delete(&id, &mut f.store, |chat| chat.title == "Chat a")
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(!f.store.contains(&id));
        assert!(f.lists.editing().is_none());
        assert!(f.fake.stored_chats().iter().all(|c| c.id != id));
    }

    #[tokio::test]
    async fn test_delete_survives_failed_refresh() {
        let mut f = fixture(&[("a", 10), ("b", 20)]).await;
        let id = ChatId::new("a");
        f.fake.fail(Op::ListChats);

        let outcome = f.lists.delete(&id, &mut f.store, |_| true).await.unwrap();

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(!f.store.contains(&id));
        assert!(f.store.last_error().is_some());
    }

    #[tokio::test]
    async fn test_delete_unknown_chat_is_not_found() {
        let mut f = fixture(&[]).await;
        let err = f
            .lists
            .delete(&ChatId::new("ghost"), &mut f.store, |_| true)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatlineError>(),
            Some(ChatlineError::NotFound(_))
        ));
    }
}

//! Session controller
//!
//! Owns the current selection and routes user intents to the metadata
//! store, timeline, send pipeline and list manager. The selection is either
//! nothing or a conversation that is in the store's current list; every
//! operation that can change the list revalidates it.
//!
//! Live feeds are consumed through [`SessionController::next_event`], which
//! waits for whichever subscription fires next and applies it before
//! returning.

use std::sync::Arc;

use crate::backend::{ChatBackend, LiveChannel, LiveSubscription, Snapshot};
use crate::chat::list::{ConversationListManager, DeleteOutcome, RenameDraft};
use crate::chat::metadata::MetadataStore;
use crate::chat::send::{PendingFlag, SendOutcome, SendPipeline};
use crate::chat::timeline::TimelineMerger;
use crate::chat::types::{Chat, ChatDetail, ChatId, Message};
use crate::config::ChatConfig;
use crate::error::{kind_of, ChatlineError, ErrorKind, Result};
use crate::identity::{Identity, IdentityHandle};

/// Which conversation is selected
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Selected(ChatId),
}

impl Selection {
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::None => None,
            Self::Selected(id) => Some(id),
        }
    }
}

/// Something a live feed changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The selected conversation's timeline was replaced by a live snapshot
    TimelineUpdated(ChatId),
    /// The conversation list was replaced by a live snapshot
    ConversationsUpdated,
    /// A live feed delivered an error; the previous data is kept
    LiveError(String),
    /// The message feed of this conversation closed; the timeline fell back
    /// to the bulk view
    LiveChannelClosed(ChatId),
    /// The conversation list feed closed; the list is refreshed on demand
    ChatListClosed,
}

enum Feed {
    Timeline(Option<Result<Snapshot<Vec<Message>>>>),
    Chats(Option<Result<Snapshot<Vec<Chat>>>>),
}

/// Composes the core components for one signed-in session
pub struct SessionController {
    backend: Arc<dyn ChatBackend>,
    live: Arc<dyn LiveChannel>,
    identity: IdentityHandle,
    store: MetadataStore,
    timeline: TimelineMerger,
    lists: ConversationListManager,
    sender: SendPipeline,
    selection: Selection,
    chat_feed: Option<LiveSubscription<Vec<Chat>>>,
    live_chat_list: bool,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        live: Arc<dyn LiveChannel>,
        identity: IdentityHandle,
        config: &ChatConfig,
    ) -> Self {
        Self {
            lists: ConversationListManager::new(
                backend.clone(),
                identity.clone(),
                config.default_title.clone(),
            ),
            sender: SendPipeline::new(backend.clone(), identity.clone()),
            backend,
            live,
            identity,
            store: MetadataStore::new(),
            timeline: TimelineMerger::new(),
            selection: Selection::None,
            chat_feed: None,
            live_chat_list: config.live_chat_list,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_id(&self) -> Option<&ChatId> {
        self.selection.chat_id()
    }

    /// The selected conversation's metadata
    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected_id().and_then(|id| self.store.get(id))
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn conversations(&self) -> &[Chat] {
        self.store.chats()
    }

    pub fn timeline(&self) -> &TimelineMerger {
        &self.timeline
    }

    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    pub fn pending(&self) -> PendingFlag {
        self.sender.pending()
    }

    pub fn editing(&self) -> Option<&RenameDraft> {
        self.lists.editing()
    }

    pub fn identity(&self) -> Result<Identity> {
        self.identity.require()
    }

    /// Load the conversation list and auto-select the most recent one
    ///
    /// Also opens the live conversation-list feed when enabled. A feed that
    /// cannot be opened only costs liveness; the list is still refreshed
    /// after every mutation.
    pub async fn load(&mut self) -> Result<()> {
        let identity = self.identity.require()?;
        self.store.refresh(self.backend.as_ref(), &identity).await?;
        tracing::info!(count = self.store.chats().len(), "Conversations loaded");

        if self.live_chat_list && self.chat_feed.is_none() {
            match self.live.subscribe_chats(&identity.id).await {
                Ok(feed) => self.chat_feed = Some(feed),
                Err(e) => tracing::warn!("Live conversation list unavailable: {:#}", e),
            }
        }

        self.reconcile_selection().await;
        Ok(())
    }

    /// Refresh the conversation list and revalidate the selection
    pub async fn refresh(&mut self) -> Result<()> {
        let identity = self.identity.require()?;
        let refreshed = self.store.refresh(self.backend.as_ref(), &identity).await;
        self.reconcile_selection().await;
        refreshed
    }

    /// Select `id`
    ///
    /// Tears down the previous conversation's live subscription and
    /// rebuilds the timeline from scratch. Selecting the current
    /// conversation again is a no-op. If neither history nor the live feed
    /// can be loaded, the previous selection and timeline stay as they were.
    pub async fn select(&mut self, id: &ChatId) -> Result<()> {
        if !self.store.contains(id) {
            return Err(ChatlineError::NotFound(format!("conversation {}", id)).into());
        }
        if self.selected_id() == Some(id) {
            return Ok(());
        }
        self.activate(id.clone()).await
    }

    /// Create a conversation and select it
    ///
    /// Succeeds once the backend created it; failing to load the new
    /// conversation afterwards is recorded on the timeline.
    pub async fn create_conversation(&mut self) -> Result<ChatId> {
        let id = self.lists.create(&mut self.store).await?;
        self.select_created(&id).await;
        Ok(id)
    }

    /// Open the rename editor for the selected conversation
    pub fn begin_rename(&mut self) -> Result<&RenameDraft> {
        let id = self
            .selected_id()
            .cloned()
            .ok_or_else(|| ChatlineError::Validation("No conversation selected".to_string()))?;
        self.lists.begin_rename(&self.store, &id)
    }

    pub fn update_rename_draft(&mut self, text: impl Into<String>) -> bool {
        self.lists.update_draft(text)
    }

    pub fn cancel_rename(&mut self) -> Option<RenameDraft> {
        self.lists.cancel_rename()
    }

    /// Dispatch the open rename draft
    pub async fn commit_rename(&mut self) -> Result<()> {
        self.lists.commit_rename(&mut self.store).await?;
        self.reconcile_selection().await;
        Ok(())
    }

    /// Rename `id` directly, without the editor
    pub async fn rename(&mut self, id: &ChatId, title: &str) -> Result<()> {
        self.lists.rename(id, title, &mut self.store).await?;
        self.reconcile_selection().await;
        Ok(())
    }

    /// Delete `id` after `confirm` agrees
    ///
    /// If the deleted conversation was selected, the selection moves to the
    /// most recent remaining conversation, or to nothing. A confirmed delete
    /// is reported as such even if the replacement cannot be loaded.
    pub async fn delete<F>(&mut self, id: &ChatId, confirm: F) -> Result<DeleteOutcome>
    where
        F: FnOnce(&Chat) -> bool,
    {
        let outcome = self.lists.delete(id, &mut self.store, confirm).await?;
        if outcome == DeleteOutcome::Deleted {
            self.reconcile_selection().await;
        }
        Ok(outcome)
    }

    /// Send `content` to the selected conversation
    ///
    /// With nothing selected this creates and selects a conversation
    /// without sending. When the live feed is not running and a message was
    /// persisted, the timeline is re-fetched so it shows up anyway. Rejected
    /// sends touch nothing.
    pub async fn send(&mut self, content: &str) -> Result<SendOutcome> {
        let target = self.selected_id().cloned();
        let result = self
            .sender
            .send(target.as_ref(), content, &self.lists, &mut self.store)
            .await;

        let persisted = match &result {
            Ok(SendOutcome::Sent { .. }) => true,
            Ok(SendOutcome::ChatCreated(_)) => false,
            Err(e) => kind_of(e) == ErrorKind::PartialSuccess,
        };

        match (&result, target) {
            (Ok(SendOutcome::ChatCreated(id)), _) => {
                self.select_created(id).await;
            }
            (_, Some(id)) if persisted => {
                if !self.timeline.is_live() {
                    self.refetch(&id).await;
                }
                self.reconcile_selection().await;
            }
            _ => {}
        }
        result
    }

    /// Wait for the next live emission and apply it
    ///
    /// Snapshots for a conversation or identity no longer current are
    /// skipped. Never resolves while no live feed is open.
    pub async fn next_event(&mut self) -> Result<SessionEvent> {
        loop {
            let feed = tokio::select! {
                item = self.timeline.next_snapshot() => Feed::Timeline(item),
                item = next_chats(&mut self.chat_feed) => Feed::Chats(item),
            };

            let event = match feed {
                Feed::Timeline(item) => self.on_timeline(item).await?,
                Feed::Chats(item) => self.on_chats(item).await?,
            };
            if let Some(event) = event {
                return Ok(event);
            }
        }
    }

    async fn on_timeline(
        &mut self,
        item: Option<Result<Snapshot<Vec<Message>>>>,
    ) -> Result<Option<SessionEvent>> {
        match item {
            Some(Ok(snapshot)) => {
                let id = ChatId::new(snapshot.key);
                if self.selected_id() != Some(&id) || !self.timeline.apply_live(&id, snapshot.data) {
                    return Ok(None);
                }
                if self.store.message_count(&id) != Some(self.timeline.len()) {
                    tracing::debug!(chat_id = %id, "Message count drifted; refreshing conversations");
                    let identity = self.identity.require()?;
                    if self.store.refresh(self.backend.as_ref(), &identity).await.is_ok() {
                        self.reconcile_selection().await;
                    }
                }
                Ok(Some(SessionEvent::TimelineUpdated(id)))
            }
            Some(Err(e)) => {
                tracing::warn!("Live message feed error: {:#}", e);
                self.timeline.record_error(&e);
                Ok(Some(SessionEvent::LiveError(e.to_string())))
            }
            None => {
                self.timeline.live_closed();
                let Some(id) = self.selected_id().cloned() else {
                    return Ok(None);
                };
                tracing::info!(chat_id = %id, "Live message feed closed; falling back to fetch");
                self.refetch(&id).await;
                Ok(Some(SessionEvent::LiveChannelClosed(id)))
            }
        }
    }

    async fn on_chats(
        &mut self,
        item: Option<Result<Snapshot<Vec<Chat>>>>,
    ) -> Result<Option<SessionEvent>> {
        match item {
            Some(Ok(snapshot)) => {
                if !self.store.apply_snapshot(&snapshot.key, snapshot.data) {
                    return Ok(None);
                }
                self.reconcile_selection().await;
                Ok(Some(SessionEvent::ConversationsUpdated))
            }
            Some(Err(e)) => {
                tracing::warn!("Live conversation feed error: {:#}", e);
                self.store.record_failure(&e);
                Ok(Some(SessionEvent::LiveError(e.to_string())))
            }
            None => {
                tracing::info!("Live conversation feed closed");
                self.chat_feed = None;
                Ok(Some(SessionEvent::ChatListClosed))
            }
        }
    }

    /// Bring the selection back in line with the store
    ///
    /// Nothing selected and a non-empty list selects the most recent
    /// conversation; a selected conversation that disappeared is replaced
    /// the same way, or cleared when the list is empty.
    async fn reconcile_selection(&mut self) {
        if let Some(id) = self.selected_id() {
            if self.store.contains(id) {
                return;
            }
            tracing::info!(chat_id = %id, "Selected conversation is gone");
        }

        match self.store.most_recent().map(|chat| chat.id.clone()) {
            Some(id) => self.move_selection(id).await,
            None => self.clear_selection(),
        }
    }

    async fn select_created(&mut self, id: &ChatId) {
        if !self.store.contains(id) {
            self.reconcile_selection().await;
        } else if self.selected_id() != Some(id) {
            self.move_selection(id.clone()).await;
        }
    }

    /// Select `id` even if it cannot be loaded
    ///
    /// Used when the previous selection is no longer valid. A load failure
    /// leaves an empty timeline carrying the error.
    async fn move_selection(&mut self, id: ChatId) {
        if let Err(e) = self.activate(id.clone()).await {
            tracing::warn!(chat_id = %id, "Selected conversation could not be loaded: {:#}", e);
            self.install(id, None, Err(e));
        }
    }

    fn clear_selection(&mut self) {
        if self.selection != Selection::None {
            tracing::debug!("Selection cleared");
        }
        self.selection = Selection::None;
        self.timeline.reset(None);
    }

    /// Switch to `id`, fetching history and subscribing concurrently
    ///
    /// Fails only when neither source could be set up, in which case
    /// nothing local has changed.
    async fn activate(&mut self, id: ChatId) -> Result<()> {
        let identity = self.identity.require()?;
        tracing::debug!(chat_id = %id, "Selecting conversation");

        let (fetched, subscribed) = tokio::join!(
            self.backend.fetch_chat(&id, &identity.id),
            self.live.subscribe_messages(&id),
        );

        let subscription = match subscribed {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(chat_id = %id, "Live message feed unavailable: {:#}", e);
                None
            }
        };
        let fetched = match (fetched, subscription.is_some()) {
            (Err(e), false) => return Err(e),
            (fetched, _) => fetched,
        };

        self.install(id, subscription, fetched);
        Ok(())
    }

    fn install(
        &mut self,
        id: ChatId,
        subscription: Option<LiveSubscription<Vec<Message>>>,
        fetched: Result<ChatDetail>,
    ) {
        self.selection = Selection::Selected(id.clone());
        self.timeline.reset(Some(id.clone()));
        if let Some(subscription) = subscription {
            self.timeline.attach(subscription);
        }
        match fetched {
            Ok(detail) => {
                self.timeline.apply_fetch(&id, detail.messages);
            }
            Err(e) => {
                tracing::warn!(chat_id = %id, "Failed to fetch conversation: {:#}", e);
                self.timeline.record_error(&e);
            }
        }
    }

    async fn refetch(&mut self, id: &ChatId) {
        let identity = match self.identity.require() {
            Ok(identity) => identity,
            Err(e) => {
                self.timeline.record_error(&e);
                return;
            }
        };
        match self.backend.fetch_chat(id, &identity.id).await {
            Ok(detail) => {
                self.timeline.apply_fetch(id, detail.messages);
            }
            Err(e) => {
                tracing::warn!(chat_id = %id, "Failed to re-fetch conversation: {:#}", e);
                self.timeline.record_error(&e);
            }
        }
    }
}

async fn next_chats(
    feed: &mut Option<LiveSubscription<Vec<Chat>>>,
) -> Option<Result<Snapshot<Vec<Chat>>>> {
    match feed.as_mut() {
        Some(feed) => feed.next().await,
        None => futures::future::pending().await,
    }
}

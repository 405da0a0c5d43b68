//! Two-phase send: persist the user message, then trigger the reply action
//!
//! The persisted message is never rolled back. If the triggered action
//! fails or reports `success: false`, the caller gets a
//! [`ChatlineError::PartialSuccess`] naming the orphaned message, and the
//! timeline will show it without a reply until the user retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::ChatBackend;
use crate::chat::list::ConversationListManager;
use crate::chat::metadata::MetadataStore;
use crate::chat::types::{ChatId, Message, Role, SendMessageResponse};
use crate::error::{ChatlineError, Result};
use crate::identity::IdentityHandle;

/// "Response pending" indicator shared with the caller
#[derive(Debug, Clone, Default)]
pub struct PendingFlag(Arc<AtomicBool>);

impl PendingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a send is in flight
    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag unless it is already raised
    ///
    /// The returned guard lowers it again when dropped, including when the
    /// send future itself is dropped half way.
    pub fn begin(&self) -> Option<PendingGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PendingGuard(self.0.clone()))
    }
}

/// Keeps the [`PendingFlag`] raised while alive
#[derive(Debug)]
pub struct PendingGuard(Arc<AtomicBool>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a send did
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Message persisted and reply action acknowledged
    Sent {
        message: Message,
        response: SendMessageResponse,
    },
    /// No conversation was selected; one was created and the content was
    /// not sent
    ChatCreated(ChatId),
}

/// Executes sends against the backend
pub struct SendPipeline {
    backend: Arc<dyn ChatBackend>,
    identity: IdentityHandle,
    pending: PendingFlag,
}

impl SendPipeline {
    pub fn new(backend: Arc<dyn ChatBackend>, identity: IdentityHandle) -> Self {
        Self {
            backend,
            identity,
            pending: PendingFlag::new(),
        }
    }

    /// Handle to the pending flag
    pub fn pending(&self) -> PendingFlag {
        self.pending.clone()
    }

    /// Send `content` to `target`
    ///
    /// Without a target a conversation is created instead and
    /// [`SendOutcome::ChatCreated`] is returned; the caller has to send
    /// again. After a message has been persisted the store is refreshed,
    /// whatever the action reported.
    ///
    /// # Errors
    ///
    /// - `Validation` for blank content or while another send is pending
    /// - `Authorization` when no identity is signed in
    /// - the backend error if persisting the message fails
    /// - `PartialSuccess` if the message was persisted but the action failed
    pub async fn send(
        &self,
        target: Option<&ChatId>,
        content: &str,
        lists: &ConversationListManager,
        store: &mut MetadataStore,
    ) -> Result<SendOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatlineError::Validation("Message content cannot be empty".to_string()).into());
        }
        if self.pending.is_pending() {
            return Err(ChatlineError::Validation("A message is already being sent".to_string()).into());
        }
        let identity = self.identity.require()?;

        let chat_id = match target {
            Some(chat_id) => chat_id,
            None => {
                tracing::info!("No conversation selected; creating one instead of sending");
                let chat_id = lists.create(store).await?;
                return Ok(SendOutcome::ChatCreated(chat_id));
            }
        };

        let result = {
            let _guard = self.pending.begin().ok_or_else(|| {
                ChatlineError::Validation("A message is already being sent".to_string())
            })?;
            self.commit_then_trigger(chat_id, content).await
        };

        let persisted = match &result {
            Ok(_) => true,
            Err(e) => matches!(
                e.downcast_ref::<ChatlineError>(),
                Some(ChatlineError::PartialSuccess { .. })
            ),
        };
        if persisted {
            if let Err(e) = store.refresh(self.backend.as_ref(), &identity).await {
                tracing::debug!("Refresh after send failed: {}", e);
            }
        }

        result
    }

    async fn commit_then_trigger(&self, chat_id: &ChatId, content: &str) -> Result<SendOutcome> {
        let message = self
            .backend
            .insert_message(chat_id, content, Role::User)
            .await
            .map_err(|e| {
                tracing::warn!(chat_id = %chat_id, "Failed to persist message: {:#}", e);
                e
            })?;
        tracing::debug!(chat_id = %chat_id, message_id = %message.id, "Message persisted");

        let reason = match self.backend.send_message_action(chat_id, content).await {
            Ok(response) if response.success => {
                tracing::info!(chat_id = %chat_id, "Reply action accepted");
                return Ok(SendOutcome::Sent { message, response });
            }
            Ok(response) => response
                .message
                .unwrap_or_else(|| "reply action reported failure".to_string()),
            Err(e) => format!("{:#}", e),
        };

        tracing::warn!(
            chat_id = %chat_id,
            message_id = %message.id,
            "Message persisted but reply action failed: {}",
            reason
        );
        Err(ChatlineError::PartialSuccess {
            message_id: message.id.to_string(),
            reason,
        }
        .into())
    }
}

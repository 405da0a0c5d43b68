//! Conversation reconciliation core
//!
//! - `types`: data model
//! - `metadata`: conversation list for the current identity
//! - `timeline`: ordered message view of the selected conversation
//! - `send`: persist-then-trigger send pipeline
//! - `list`: create, rename and delete
//! - `session`: selection state machine composing the above

pub mod list;
pub mod metadata;
pub mod send;
pub mod session;
pub mod timeline;
pub mod types;

pub use list::{ConversationListManager, DeleteOutcome, RenameDraft};
pub use metadata::MetadataStore;
pub use send::{PendingFlag, SendOutcome, SendPipeline};
pub use session::{Selection, SessionController, SessionEvent};
pub use timeline::{TimelineMerger, TimelineSource};
pub use types::{Chat, ChatDetail, ChatId, Message, MessageId, Role, SendMessageResponse};

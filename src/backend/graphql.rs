//! GraphQL-over-HTTP implementation of [`ChatBackend`]
//!
//! Every query and mutation is a POST of `{operationName, query, variables}`
//! to the configured endpoint. The bearer token is read from the identity
//! handle on each request, so a refreshed token is picked up without
//! rebuilding the client.
//!
//! # Failure mapping
//!
//! - HTTP 401/403, or GraphQL errors whose `extensions.code` is an auth
//!   code, become [`ChatlineError::Authorization`].
//! - A `null` by-primary-key result becomes [`ChatlineError::NotFound`].
//! - Everything else (network, timeout, other GraphQL errors, malformed
//!   payloads) becomes [`ChatlineError::Transport`].
//!
//! When a response carries `errors`, any accompanying `data` is ignored.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::ChatBackend;
use crate::chat::types::{Chat, ChatDetail, ChatId, Message, MessageId, Role, SendMessageResponse};
use crate::config::BackendConfig;
use crate::error::{ChatlineError, Result};
use crate::identity::IdentityHandle;

/// Conversations for one user, most recently updated first
pub const GET_CHATS: &str = r#"
query GetChats($user_id: uuid!) {
  chats(where: { user_id: { _eq: $user_id } }, order_by: { updated_at: desc }) {
    id
    title
    created_at
    updated_at
    messages_aggregate {
      aggregate {
        count
      }
    }
  }
}"#;

/// One conversation with its messages, oldest first
pub const GET_CHAT_WITH_MESSAGES: &str = r#"
query GetChatWithMessages($chatId: uuid!) {
  chats_by_pk(id: $chatId) {
    id
    title
    created_at
    updated_at
    user_id
    messages(order_by: { created_at: asc }) {
      id
      content
      role
      created_at
    }
  }
}"#;

/// Insert a conversation
pub const CREATE_CHAT: &str = r#"
mutation CreateChat($title: String!, $user_id: uuid!) {
  insert_chats_one(object: { title: $title, user_id: $user_id }) {
    id
    title
    created_at
    updated_at
  }
}"#;

/// Change a conversation title
pub const UPDATE_CHAT_TITLE: &str = r#"
mutation UpdateChatTitle($chatId: uuid!, $title: String!) {
  update_chats_by_pk(pk_columns: { id: $chatId }, _set: { title: $title }) {
    id
    title
    created_at
    updated_at
  }
}"#;

/// Delete a conversation
pub const DELETE_CHAT: &str = r#"
mutation DeleteChat($chatId: uuid!) {
  delete_chats_by_pk(id: $chatId) {
    id
  }
}"#;

/// Persist one message
pub const INSERT_MESSAGE: &str = r#"
mutation InsertMessage($chatId: uuid!, $content: String!, $role: String!) {
  insert_messages_one(object: { chat_id: $chatId, content: $content, role: $role }) {
    id
    content
    role
    created_at
  }
}"#;

/// Trigger reply generation for a conversation
pub const SEND_MESSAGE_ACTION: &str = r#"
mutation SendMessage($chatId: uuid!, $content: String!) {
  sendMessage(chat_id: $chatId, content: $content) {
    success
    message
    response
  }
}"#;

/// GraphQL error codes treated as authorization failures
const AUTH_ERROR_CODES: &[&str] = &["invalid-jwt", "access-denied", "permission-error"];

/// Conversation row as returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatRow {
    id: String,
    title: String,
    #[serde(default)]
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    messages_aggregate: Option<AggregateRow>,
    #[serde(default)]
    messages: Option<Vec<MessageRow>>,
}

#[derive(Debug, Clone, Deserialize)]
struct AggregateRow {
    aggregate: AggregateCount,
}

#[derive(Debug, Clone, Deserialize)]
struct AggregateCount {
    count: usize,
}

/// Message row as returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageRow {
    id: String,
    content: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    pub(crate) fn into_message(self, chat_id: &ChatId) -> Message {
        Message {
            id: MessageId::new(self.id),
            chat_id: chat_id.clone(),
            role: self.role,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

impl ChatRow {
    pub(crate) fn into_chat(self) -> Chat {
        let message_count = match (&self.messages_aggregate, &self.messages) {
            (Some(agg), _) => agg.aggregate.count,
            (None, Some(messages)) => messages.len(),
            (None, None) => 0,
        };
        Chat {
            id: ChatId::new(self.id),
            title: self.title,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count,
        }
    }

    fn into_detail(mut self) -> ChatDetail {
        let rows = self.messages.take().unwrap_or_default();
        let count = rows.len();
        let mut chat = self.into_chat();
        chat.message_count = count;
        let messages = rows
            .into_iter()
            .map(|row| row.into_message(&chat.id))
            .collect();
        ChatDetail { chat, messages }
    }
}

/// One entry of a GraphQL `errors` array
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphqlError {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphqlErrorExtensions {
    #[serde(default)]
    pub code: Option<String>,
}

/// Turn a GraphQL `errors` array into a typed failure
pub(crate) fn classify_errors(operation: &str, errors: &[GraphqlError]) -> ChatlineError {
    let summary = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let is_auth = errors.iter().any(|e| {
        e.extensions
            .as_ref()
            .and_then(|ext| ext.code.as_deref())
            .map(|code| AUTH_ERROR_CODES.contains(&code))
            .unwrap_or(false)
    });

    if is_auth {
        ChatlineError::Authorization(format!("{} rejected: {}", operation, summary))
    } else {
        ChatlineError::Transport(format!("{} failed: {}", operation, summary))
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest<'a> {
    operation_name: &'a str,
    query: &'a str,
    variables: Value,
}

/// Queries and mutations against a GraphQL endpoint
pub struct GraphqlBackend {
    client: reqwest::Client,
    endpoint: url::Url,
    identity: IdentityHandle,
}

impl std::fmt::Debug for GraphqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlBackend")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl GraphqlBackend {
    /// Build a backend client from configuration
    ///
    /// No network I/O is performed at construction time.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: &BackendConfig, identity: IdentityHandle) -> Result<Self> {
        let endpoint = url::Url::parse(&config.graphql_url).map_err(|e| {
            ChatlineError::Config(format!("Invalid GraphQL URL {}: {}", config.graphql_url, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ChatlineError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            identity,
        })
    }

    /// Execute one operation and return the value under `data.<field>`
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
        field: &str,
    ) -> Result<Option<T>> {
        let identity = self.identity.require()?;

        let mut request = self.client.post(self.endpoint.clone()).json(&GraphqlRequest {
            operation_name: operation,
            query,
            variables,
        });
        if let Some(token) = identity.access_token.as_deref() {
            request = request.bearer_auth(token);
        }

        tracing::debug!(operation, "Executing GraphQL operation");

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() { "timed out" } else { "failed" };
            ChatlineError::Transport(format!("{} {}: {}", operation, kind, e))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ChatlineError::Authorization(format!(
                "{} rejected with HTTP {}",
                operation, status
            ))
            .into());
        }
        if !status.is_success() {
            return Err(ChatlineError::Transport(format!(
                "{} failed with HTTP {}",
                operation, status
            ))
            .into());
        }

        let body: GraphqlResponse = response.json().await.map_err(|e| {
            ChatlineError::Transport(format!("{} returned an unreadable body: {}", operation, e))
        })?;

        if let Some(errors) = body.errors.filter(|errors| !errors.is_empty()) {
            return Err(classify_errors(operation, &errors).into());
        }

        let mut data = body.data.ok_or_else(|| {
            ChatlineError::Transport(format!("{} returned no data", operation))
        })?;

        match data.get_mut(field).map(Value::take) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ChatlineError::Transport(format!("{} returned malformed data: {}", operation, e))
                    .into()
            }),
        }
    }
}

fn missing(operation: &str, what: impl std::fmt::Display) -> anyhow::Error {
    ChatlineError::NotFound(format!("{}: {}", operation, what)).into()
}

#[async_trait]
impl ChatBackend for GraphqlBackend {
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>> {
        let rows: Vec<ChatRow> = self
            .execute("GetChats", GET_CHATS, json!({ "user_id": user_id }), "chats")
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(ChatRow::into_chat).collect())
    }

    async fn fetch_chat(&self, chat_id: &ChatId, user_id: &str) -> Result<ChatDetail> {
        let row: ChatRow = self
            .execute(
                "GetChatWithMessages",
                GET_CHAT_WITH_MESSAGES,
                json!({ "chatId": chat_id.as_str() }),
                "chats_by_pk",
            )
            .await?
            .ok_or_else(|| missing("GetChatWithMessages", chat_id))?;

        // Row-level permissions normally hide foreign rows; this covers
        // backends that return them anyway.
        if let Some(owner) = row.user_id.as_deref() {
            if owner != user_id {
                return Err(ChatlineError::Authorization(format!(
                    "conversation {} belongs to another user",
                    chat_id
                ))
                .into());
            }
        }

        Ok(row.into_detail())
    }

    async fn create_chat(&self, title: &str, user_id: &str) -> Result<Chat> {
        let row: ChatRow = self
            .execute(
                "CreateChat",
                CREATE_CHAT,
                json!({ "title": title, "user_id": user_id }),
                "insert_chats_one",
            )
            .await?
            .ok_or_else(|| {
                ChatlineError::Transport("CreateChat returned no conversation".to_string())
            })?;
        Ok(row.into_chat())
    }

    async fn rename_chat(&self, chat_id: &ChatId, title: &str) -> Result<Chat> {
        let row: ChatRow = self
            .execute(
                "UpdateChatTitle",
                UPDATE_CHAT_TITLE,
                json!({ "chatId": chat_id.as_str(), "title": title }),
                "update_chats_by_pk",
            )
            .await?
            .ok_or_else(|| missing("UpdateChatTitle", chat_id))?;
        Ok(row.into_chat())
    }

    async fn delete_chat(&self, chat_id: &ChatId) -> Result<()> {
        let deleted: Value = self
            .execute(
                "DeleteChat",
                DELETE_CHAT,
                json!({ "chatId": chat_id.as_str() }),
                "delete_chats_by_pk",
            )
            .await?
            .ok_or_else(|| missing("DeleteChat", chat_id))?;
        tracing::debug!(?deleted, "Conversation deleted");
        Ok(())
    }

    async fn insert_message(
        &self,
        chat_id: &ChatId,
        content: &str,
        role: Role,
    ) -> Result<Message> {
        let row: MessageRow = self
            .execute(
                "InsertMessage",
                INSERT_MESSAGE,
                json!({ "chatId": chat_id.as_str(), "content": content, "role": role.as_str() }),
                "insert_messages_one",
            )
            .await?
            .ok_or_else(|| {
                ChatlineError::Transport("InsertMessage returned no message".to_string())
            })?;
        Ok(row.into_message(chat_id))
    }

    async fn send_message_action(
        &self,
        chat_id: &ChatId,
        content: &str,
    ) -> Result<SendMessageResponse> {
        let response: SendMessageResponse = self
            .execute(
                "SendMessage",
                SEND_MESSAGE_ACTION,
                json!({ "chatId": chat_id.as_str(), "content": content }),
                "sendMessage",
            )
            .await?
            .ok_or_else(|| {
                ChatlineError::Transport("SendMessage returned no acknowledgment".to_string())
            })?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{kind_of, ErrorKind};

    fn err(message: &str, code: Option<&str>) -> GraphqlError {
        GraphqlError {
            message: message.to_string(),
            extensions: Some(GraphqlErrorExtensions {
                code: code.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_classify_auth_code() {
        let classified = classify_errors("GetChats", &[err("Could not verify JWT", Some("invalid-jwt"))]);
        assert!(matches!(classified, ChatlineError::Authorization(_)));
    }

    #[test]
    fn test_classify_other_code_is_transport() {
        let classified = classify_errors(
            "GetChats",
            &[err("field not found", Some("validation-failed")), err("x", None)],
        );
        match classified {
            ChatlineError::Transport(msg) => assert!(msg.contains("field not found; x")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_chat_row_uses_aggregate_count() {
        let row: ChatRow = serde_json::from_value(json!({
            "id": "c-1",
            "title": "New Chat",
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:05:00.123456+00:00",
            "messages_aggregate": { "aggregate": { "count": 4 } }
        }))
        .unwrap();
        let chat = row.into_chat();
        assert_eq!(chat.id.as_str(), "c-1");
        assert_eq!(chat.message_count, 4);
        assert!(chat.user_id.is_none());
    }

    #[test]
    fn test_detail_attaches_chat_id_to_messages() {
        let row: ChatRow = serde_json::from_value(json!({
            "id": "c-1",
            "title": "Trip",
            "user_id": "u-1",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z",
            "messages": [
                { "id": "m-1", "content": "hi", "role": "user", "created_at": "2024-05-01T10:00:01Z" },
                { "id": "m-2", "content": "hello", "role": "assistant", "created_at": "2024-05-01T10:00:02Z" }
            ]
        }))
        .unwrap();
        let detail = row.into_detail();
        assert_eq!(detail.chat.message_count, 2);
        assert!(detail.messages.iter().all(|m| m.chat_id.as_str() == "c-1"));
        assert_eq!(detail.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_unauthenticated_identity_never_reaches_network() {
        use crate::identity::{AuthState, StaticIdentityProvider};
        use std::sync::Arc;

        let config = BackendConfig {
            // Nothing listens here; an attempted request would be a transport error.
            graphql_url: "http://127.0.0.1:9/v1/graphql".to_string(),
            ..Default::default()
        };
        let backend = GraphqlBackend::new(
            &config,
            Arc::new(StaticIdentityProvider::new(AuthState::Unauthenticated)),
        )
        .unwrap();
        let err = backend.list_chats("u-1").await.unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::Authorization);
    }
}

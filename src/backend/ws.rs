//! Live subscriptions over the `graphql-transport-ws` protocol
//!
//! Each subscription owns its own WebSocket connection. Setup (connect,
//! `connection_init`, `connection_ack`, `subscribe`) happens before
//! [`LiveChannel::subscribe_messages`] returns, so setup failures surface
//! to the caller, which then keeps showing the bulk-fetched view. After
//! setup a background task pumps `next` payloads into the returned
//! [`LiveSubscription`] until either side ends it.
//!
//! ```text
//! client                          server
//!   connection_init {headers} -->
//!                             <-- connection_ack
//!   subscribe {id, query}     -->
//!                             <-- next {id, data}   (full snapshot, repeated)
//!   complete {id}             -->                   (on teardown)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::backend::graphql::{classify_errors, ChatRow, GraphqlError, MessageRow};
use crate::backend::{LiveChannel, LiveSender, LiveSubscription};
use crate::chat::types::{Chat, ChatId, Message};
use crate::config::BackendConfig;
use crate::error::{ChatlineError, Result};
use crate::identity::IdentityHandle;

/// WebSocket subprotocol spoken by the server
const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Close codes the protocol uses for rejected credentials
const CLOSE_UNAUTHORIZED: u16 = 4401;
const CLOSE_FORBIDDEN: u16 = 4403;

/// Full message list of one conversation
pub const MESSAGES_SUBSCRIPTION: &str = r#"
subscription MessagesSubscription($chatId: uuid!) {
  messages(where: { chat_id: { _eq: $chatId } }, order_by: { created_at: asc }) {
    id
    content
    role
    created_at
  }
}"#;

/// Full conversation list of one user
pub const CHATS_SUBSCRIPTION: &str = r#"
subscription ChatsSubscription($user_id: uuid!) {
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

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound protocol frame
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    ConnectionAck,
    Ping,
    Pong,
    Next {
        id: String,
        payload: NextPayload,
    },
    Error {
        id: String,
        payload: Vec<GraphqlError>,
    },
    Complete {
        id: String,
    },
}

#[derive(Debug, Deserialize)]
struct NextPayload {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

/// Decodes the `data` object of one `next` frame
type Decoder<T> = Box<dyn Fn(Value) -> Result<T> + Send>;

/// Push channel backed by GraphQL subscriptions over WebSocket
pub struct WsLiveChannel {
    endpoint: url::Url,
    connect_timeout: Duration,
    identity: IdentityHandle,
}

impl std::fmt::Debug for WsLiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsLiveChannel")
            .field("endpoint", &self.endpoint.as_str())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl WsLiveChannel {
    /// Build a live channel from configuration
    ///
    /// No network I/O is performed until a subscription is opened.
    pub fn new(config: &BackendConfig, identity: IdentityHandle) -> Result<Self> {
        let endpoint = url::Url::parse(&config.ws_url).map_err(|e| {
            ChatlineError::Config(format!("Invalid WebSocket URL {}: {}", config.ws_url, e))
        })?;
        Ok(Self {
            endpoint,
            connect_timeout: Duration::from_secs(config.connect_timeout_seconds),
            identity,
        })
    }

    async fn connect(&self) -> Result<Socket> {
        let identity = self.identity.require()?;

        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(ChatlineError::from)?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        let (mut socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                ChatlineError::Transport(format!(
                    "live channel connect timed out after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(ChatlineError::from)?;

        let headers = match identity.access_token.as_deref() {
            Some(token) => json!({ "Authorization": format!("Bearer {}", token) }),
            None => json!({}),
        };
        send_frame(
            &mut socket,
            json!({ "type": "connection_init", "payload": { "headers": headers } }),
        )
        .await?;

        tokio::time::timeout(self.connect_timeout, await_ack(&mut socket))
            .await
            .map_err(|_| {
                ChatlineError::Transport("live channel was not acknowledged in time".to_string())
            })??;

        Ok(socket)
    }

    async fn open<T: Send + 'static>(
        &self,
        operation: &'static str,
        query: &'static str,
        variables: Value,
        key: String,
        decode: Decoder<T>,
    ) -> Result<LiveSubscription<T>> {
        let mut socket = self.connect().await?;
        let id = uuid::Uuid::new_v4().to_string();

        send_frame(
            &mut socket,
            json!({
                "id": id,
                "type": "subscribe",
                "payload": { "operationName": operation, "query": query, "variables": variables }
            }),
        )
        .await?;

        tracing::info!(operation, key = %key, "Live subscription opened");

        let (subscription, sender) = LiveSubscription::channel(key);
        tokio::spawn(pump(socket, id, operation, sender, decode));
        Ok(subscription)
    }
}

#[async_trait]
impl LiveChannel for WsLiveChannel {
    async fn subscribe_messages(&self, chat_id: &ChatId) -> Result<LiveSubscription<Vec<Message>>> {
        let owner = chat_id.clone();
        let decode: Decoder<Vec<Message>> = Box::new(move |data| {
            let rows: Vec<MessageRow> = take_field(data, "messages")?;
            Ok(rows.into_iter().map(|row| row.into_message(&owner)).collect())
        });
        self.open(
            "MessagesSubscription",
            MESSAGES_SUBSCRIPTION,
            json!({ "chatId": chat_id.as_str() }),
            chat_id.to_string(),
            decode,
        )
        .await
    }

    async fn subscribe_chats(&self, user_id: &str) -> Result<LiveSubscription<Vec<Chat>>> {
        let decode: Decoder<Vec<Chat>> = Box::new(|data| {
            let rows: Vec<ChatRow> = take_field(data, "chats")?;
            Ok(rows.into_iter().map(ChatRow::into_chat).collect())
        });
        self.open(
            "ChatsSubscription",
            CHATS_SUBSCRIPTION,
            json!({ "user_id": user_id }),
            user_id.to_string(),
            decode,
        )
        .await
    }
}

fn take_field<T: serde::de::DeserializeOwned>(mut data: Value, field: &str) -> Result<T> {
    let value = data.get_mut(field).map(Value::take).unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        ChatlineError::Transport(format!("malformed {} snapshot: {}", field, e)).into()
    })
}

async fn send_frame(socket: &mut Socket, frame: Value) -> Result<()> {
    socket
        .send(WsMessage::text(frame.to_string()))
        .await
        .map_err(|e| ChatlineError::Transport(format!("live channel send failed: {}", e)).into())
}

fn close_error(frame: Option<&CloseFrame>) -> ChatlineError {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            if code == CLOSE_UNAUTHORIZED || code == CLOSE_FORBIDDEN {
                ChatlineError::Authorization(format!(
                    "live channel rejected: {}",
                    frame.reason.as_str()
                ))
            } else {
                ChatlineError::Transport(format!(
                    "live channel closed ({}): {}",
                    code,
                    frame.reason.as_str()
                ))
            }
        }
        None => ChatlineError::Transport("live channel closed".to_string()),
    }
}

async fn await_ack(socket: &mut Socket) -> Result<()> {
    while let Some(message) = socket.next().await {
        match message.map_err(ChatlineError::from)? {
            WsMessage::Text(text) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                Ok(ServerFrame::ConnectionAck) => return Ok(()),
                Ok(ServerFrame::Ping) => send_frame(socket, json!({ "type": "pong" })).await?,
                Ok(other) => tracing::debug!(?other, "Ignoring frame before acknowledgment"),
                Err(e) => tracing::debug!("Unparseable frame before acknowledgment: {}", e),
            },
            WsMessage::Close(frame) => return Err(close_error(frame.as_ref()).into()),
            _ => {}
        }
    }
    Err(close_error(None).into())
}

/// Forward `next` payloads until the subscriber or the server ends it
async fn pump<T>(
    mut socket: Socket,
    id: String,
    operation: &'static str,
    sender: LiveSender<T>,
    decode: Decoder<T>,
) {
    let cancelled = sender.cancellation();

    loop {
        let message = tokio::select! {
            _ = cancelled.cancelled() => {
                tracing::debug!(operation, "Live subscription torn down by subscriber");
                let _ = send_frame(&mut socket, json!({ "id": id, "type": "complete" })).await;
                let _ = socket.close(None).await;
                return;
            }
            message = socket.next() => message,
        };

        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::warn!(operation, "Live channel error: {}", e);
                sender.fail(ChatlineError::Transport(e.to_string()).into());
                return;
            }
            None => {
                tracing::info!(operation, "Live channel ended by server");
                return;
            }
        };

        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(frame) => {
                let err = close_error(frame.as_ref());
                tracing::warn!(operation, "{}", err);
                sender.fail(err.into());
                return;
            }
            _ => continue,
        };

        let frame = match serde_json::from_str::<ServerFrame>(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(operation, "Ignoring unparseable frame: {}", e);
                continue;
            }
        };

        match frame {
            ServerFrame::Ping => {
                if send_frame(&mut socket, json!({ "type": "pong" })).await.is_err() {
                    return;
                }
            }
            ServerFrame::Next { id: frame_id, payload } if frame_id == id => {
                if let Some(errors) = payload.errors.filter(|errors| !errors.is_empty()) {
                    sender.fail(classify_errors(operation, &errors).into());
                    continue;
                }
                let delivered = match payload.data.map(&decode) {
                    Some(Ok(snapshot)) => {
                        tracing::debug!(operation, "Live snapshot received");
                        sender.send(snapshot)
                    }
                    Some(Err(e)) => sender.fail(e),
                    None => true,
                };
                if !delivered {
                    let _ = send_frame(&mut socket, json!({ "id": id, "type": "complete" })).await;
                    let _ = socket.close(None).await;
                    return;
                }
            }
            ServerFrame::Error { id: frame_id, payload } if frame_id == id => {
                sender.fail(classify_errors(operation, &payload).into());
                return;
            }
            ServerFrame::Complete { id: frame_id } if frame_id == id => {
                tracing::info!(operation, "Live subscription completed by server");
                return;
            }
            _ => {}
        }
    }
}

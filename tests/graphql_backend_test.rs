//! GraphQL backend integration tests
//!
//! Runs `GraphqlBackend` against a `wiremock` server standing in for the
//! GraphQL endpoint and checks request shape and failure mapping.

mod common;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatline::backend::{ChatBackend, GraphqlBackend};
use chatline::chat::types::{ChatId, Role};
use chatline::error::{kind_of, ChatlineError, ErrorKind};

use common::{backend_config, signed_in, signed_out};

async fn backend(server: &MockServer) -> GraphqlBackend {
    GraphqlBackend::new(&backend_config(&server.uri()), signed_in("u-1", Some("tok-1")))
        .expect("valid backend config")
}

fn chat_row(id: &str, updated_at: &str, count: usize) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Chat {}", id),
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": updated_at,
        "messages_aggregate": { "aggregate": { "count": count } }
    })
}

#[tokio::test]
async fn test_list_chats_sends_token_and_maps_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "operationName": "GetChats",
            "variables": { "user_id": "u-1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "chats": [
                    chat_row("b", "2024-01-02T00:00:00Z", 4),
                    chat_row("a", "2024-01-01T12:00:00Z", 0)
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chats = backend(&server).await.list_chats("u-1").await.unwrap();

    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].id.as_str(), "b");
    assert_eq!(chats[0].message_count, 4);
    assert_eq!(chats[1].title, "Chat a");
}

#[tokio::test]
async fn test_fetch_chat_returns_messages_oldest_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "GetChatWithMessages" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "chats_by_pk": {
                    "id": "c-1",
                    "title": "Trip",
                    "user_id": "u-1",
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:05:00Z",
                    "messages": [
                        { "id": "1", "content": "hi", "role": "user", "created_at": "2024-01-01T00:00:10Z" },
                        { "id": "2", "content": "hello", "role": "assistant", "created_at": "2024-01-01T00:00:20Z" }
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let detail = backend(&server)
        .await
        .fetch_chat(&ChatId::new("c-1"), "u-1")
        .await
        .unwrap();

    assert_eq!(detail.chat.message_count, 2);
    assert_eq!(detail.messages[0].role, Role::User);
    assert_eq!(detail.messages[1].role, Role::Assistant);
    assert!(detail.messages.iter().all(|m| m.chat_id.as_str() == "c-1"));
}

#[tokio::test]
async fn test_missing_chat_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "chats_by_pk": null } })),
        )
        .mount(&server)
        .await;

    let err = backend(&server)
        .await
        .fetch_chat(&ChatId::new("ghost"), "u-1")
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ChatlineError>(),
        Some(ChatlineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_http_401_is_authorization_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = backend(&server).await.list_chats("u-1").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_graphql_auth_code_is_authorization_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "Could not verify JWT", "extensions": { "code": "invalid-jwt" } }]
        })))
        .mount(&server)
        .await;

    let err = backend(&server).await.list_chats("u-1").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_errors_discard_partial_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "chats": [chat_row("a", "2024-01-01T00:00:00Z", 1)] },
            "errors": [{ "message": "field 'chats' partially resolved" }]
        })))
        .mount(&server)
        .await;

    let err = backend(&server).await.list_chats("u-1").await.unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Transport);
    assert!(err.to_string().contains("partially resolved"));
}

#[tokio::test]
async fn test_server_error_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = backend(&server)
        .await
        .create_chat("New Chat", "u-1")
        .await
        .unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Transport);
}

#[tokio::test]
async fn test_insert_message_and_trigger_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "operationName": "InsertMessage",
            "variables": { "chatId": "c-1", "content": "hi", "role": "user" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "insert_messages_one": {
                    "id": "m-1", "content": "hi", "role": "user", "created_at": "2024-01-01T00:00:10Z"
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "operationName": "SendMessage" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "sendMessage": { "success": false, "message": "backend busy" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server).await;
    let chat_id = ChatId::new("c-1");
    let message = backend.insert_message(&chat_id, "hi", Role::User).await.unwrap();
    let ack = backend.send_message_action(&chat_id, "hi").await.unwrap();

    assert_eq!(message.id.as_str(), "m-1");
    assert_eq!(message.chat_id, chat_id);
    assert!(!ack.success);
    assert_eq!(ack.message.as_deref(), Some("backend busy"));
    assert!(ack.response.is_none());
}

#[tokio::test]
async fn test_signed_out_requests_never_reach_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = GraphqlBackend::new(&backend_config(&server.uri()), signed_out()).unwrap();
    let err = backend.delete_chat(&ChatId::new("c-1")).await.unwrap_err();

    assert_eq!(kind_of(&err), ErrorKind::Authorization);
}

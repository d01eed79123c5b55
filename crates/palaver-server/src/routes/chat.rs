use axum::{
    extract::{Path, State},
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use palaver::session::{clamp_temperature, clean_message, ChatSession, TurnEvent};

use crate::auth::AuthenticatedUser;
use crate::routes::conversation::store_error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// Kept as raw JSON so a non-string message is a validation error
    /// rather than a deserialization failure of the whole body.
    #[serde(default)]
    message: Value,
    #[serde(default)]
    temperature: Value,
}

// Frame formatting: one `data: <json>` frame per event
struct FrameFormatter;

impl FrameFormatter {
    fn render(event: &TurnEvent) -> String {
        let body = match event {
            TurnEvent::Text(text) => json!({"text": text}),
            TurnEvent::Error(error) => json!({"error": error}),
            TurnEvent::Done { usage } => json!({
                "done": true,
                "usage": {
                    "input_tokens": usage.input_tokens,
                    "output_tokens": usage.output_tokens,
                },
            }),
        };
        format!("data: {}\n\n", body)
    }
}

/// SSE response over the session's event channel. Frames are rendered as
/// they are pulled, never buffered. Dropping the response (client
/// disconnect) drops the receiver, which the session observes as
/// cancellation.
pub struct SseResponse {
    rx: ReceiverStream<TurnEvent>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<TurnEvent>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|event| Ok(Bytes::from(FrameFormatter::render(&event)))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let body = axum::body::Body::from_stream(self);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<SseResponse, Response> {
    // Validation first: an empty or non-string message never opens a
    // stream and never touches the store.
    let Some(text) = clean_message(&request.message) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "message must be a non-empty string"})),
        )
            .into_response());
    };
    let temperature = clamp_temperature(request.temperature.as_f64());

    // Ownership gate: the un-checked append inside the session is only
    // ever reached for a conversation this caller owns.
    if let Err(e) = state.store.get(id, &owner).await {
        return Err(store_error_response(e));
    }

    let (tx, rx) = mpsc::channel(100);
    let session = ChatSession::new(state.store.clone(), state.provider.clone());
    tokio::spawn(async move {
        session.run_turn(id, text, temperature, tx).await;
    });

    Ok(SseResponse::new(ReceiverStream::new(rx)))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations/:id/chat", post(chat_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuthenticator;
    use crate::routes;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use palaver::providers::base::{StopReason, Usage};
    use palaver::providers::mock::MockProvider;
    use palaver::store::memory::MemoryStore;
    use palaver::store::{ConversationStore, MAX_MESSAGES};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(provider: MockProvider) -> AppState {
        let mut tokens = HashMap::new();
        tokens.insert("alice-token".to_string(), "alice".to_string());
        tokens.insert("bob-token".to_string(), "bob".to_string());
        AppState {
            store: Arc::new(MemoryStore::new()),
            provider: Arc::new(provider),
            authenticator: Arc::new(TokenAuthenticator::new(tokens)),
        }
    }

    fn chat_request(id: Uuid, token: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(format!("/conversations/{}/chat", id))
            .method("POST")
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Drain the SSE body and parse each `data:` frame as JSON.
    async fn collect_frames(response: axum::response::Response) -> Vec<Value> {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        body.split("\n\n")
            .filter_map(|frame| frame.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_hello() {
        let provider = MockProvider::new(vec![MockProvider::text_round(
            &["Hi", " there!"],
            StopReason::EndTurn,
            Usage::new(7, 3),
        )]);
        let state = test_state(provider);
        let conversation = state.store.create("alice").await.unwrap();
        let app = routes::configure(state.clone());

        let response = app
            .clone()
            .oneshot(chat_request(
                conversation.id,
                "alice-token",
                json!({"message": "Hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let frames = collect_frames(response).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], json!({"text": "Hi"}));
        assert_eq!(frames[1], json!({"text": " there!"}));
        assert_eq!(
            frames[2],
            json!({"done": true, "usage": {"input_tokens": 7, "output_tokens": 3}})
        );

        // The stored conversation now has the user turn and the
        // concatenated assistant text.
        let request = Request::builder()
            .uri(format!("/conversations/{}", conversation.id))
            .method("GET")
            .header("authorization", "Bearer alice-token")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let stored: Value = serde_json::from_slice(&bytes).unwrap();

        let messages = stored["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], json!({"role": "user", "content": "Hello"}));
        assert_eq!(
            messages[1],
            json!({"role": "assistant", "content": "Hi there!"})
        );
        assert_eq!(stored["title"], "Hello");
    }

    #[tokio::test]
    async fn test_empty_message_rejected_without_mutation() {
        let state = test_state(MockProvider::failing());
        let conversation = state.store.create("alice").await.unwrap();
        let app = routes::configure(state.clone());

        for body in [json!({"message": "   "}), json!({"message": 42}), json!({})] {
            let response = app
                .clone()
                .oneshot(chat_request(conversation.id, "alice-token", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let stored = state.store.get(conversation.id, "alice").await.unwrap();
        assert!(stored.messages.is_empty());
    }

    #[tokio::test]
    async fn test_chat_on_missing_or_unowned_conversation() {
        let state = test_state(MockProvider::failing());
        let conversation = state.store.create("alice").await.unwrap();
        let app = routes::configure(state);

        let response = app
            .clone()
            .oneshot(chat_request(
                Uuid::new_v4(),
                "alice-token",
                json!({"message": "Hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(chat_request(
                conversation.id,
                "bob-token",
                json!({"message": "Hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_model_failure_streams_error_then_done() {
        let state = test_state(MockProvider::failing());
        let conversation = state.store.create("alice").await.unwrap();
        let app = routes::configure(state.clone());

        let response = app
            .oneshot(chat_request(
                conversation.id,
                "alice-token",
                json!({"message": "Hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let frames = collect_frames(response).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].get("error").is_some());
        assert_eq!(frames[1]["done"], true);
        assert_eq!(frames[1]["usage"]["input_tokens"], 0);

        let stored = state.store.get(conversation.id, "alice").await.unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_history_stays_capped_across_many_turns() {
        let state = test_state(MockProvider::repeating("ok"));
        let conversation = state.store.create("alice").await.unwrap();
        let app = routes::configure(state.clone());

        for i in 0..=MAX_MESSAGES {
            let response = app
                .clone()
                .oneshot(chat_request(
                    conversation.id,
                    "alice-token",
                    json!({"message": format!("message {}", i)}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            // Drain so the turn is fully finalized before the next one
            collect_frames(response).await;
        }

        let stored = state.store.get(conversation.id, "alice").await.unwrap();
        assert_eq!(stored.messages.len(), MAX_MESSAGES);
        let contents: Vec<String> = stored
            .messages
            .iter()
            .map(|message| message.text_content())
            .collect();
        assert!(!contents.contains(&"message 0".to_string()));
        assert!(contents.contains(&format!("message {}", MAX_MESSAGES)));
        assert_eq!(contents.last().unwrap(), "ok");
    }
}

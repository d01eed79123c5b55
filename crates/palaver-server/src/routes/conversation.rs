use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use palaver::store::{Conversation, StoreError};

use crate::auth::AuthenticatedUser;
use crate::state::AppState;

/// NotFound maps to 404; everything else is a storage fault and maps to
/// 500, without leaking whether the id exists.
pub(crate) fn store_error_response(error: StoreError) -> Response {
    match error {
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "conversation not found"})),
        )
            .into_response(),
        e => {
            tracing::error!(error = %e, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "storage failure"})),
            )
                .into_response()
        }
    }
}

/// Full conversation rendered for the client, content flattened to text.
fn conversation_body(conversation: &Conversation) -> Value {
    json!({
        "id": conversation.id,
        "title": conversation.title,
        "createdAt": conversation.created_at,
        "messages": conversation
            .messages
            .iter()
            .map(|message| json!({
                "role": message.role,
                "content": message.text_content(),
            }))
            .collect::<Vec<_>>(),
    })
}

async fn create_conversation(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
) -> Response {
    match state.store.create(&owner).await {
        Ok(conversation) => (
            StatusCode::CREATED,
            Json(json!({
                "id": conversation.id,
                "title": conversation.title,
                "createdAt": conversation.created_at,
            })),
        )
            .into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
) -> Response {
    match state.store.list(&owner).await {
        Ok(summaries) => Json(
            summaries
                .iter()
                .map(|meta| {
                    json!({
                        "id": meta.id,
                        "title": meta.title,
                        "createdAt": meta.created_at,
                    })
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn get_conversation(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.get(id, &owner).await {
        Ok(conversation) => Json(conversation_body(&conversation)).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn reset_conversation(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.reset(id, &owner).await {
        Ok(true) => Json(json!({"status": "conversation reset"})).into_response(),
        Ok(false) => store_error_response(StoreError::NotFound),
        Err(e) => store_error_response(e),
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/reset", post(reset_conversation))
        .with_state(state)
}

//! Durable mapping from conversation id to ordered message history plus
//! metadata, behind a capability interface so backends stay swappable.
pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::message::Message;
use crate::models::role::Role;

/// Maximum number of messages retained per conversation. Appending beyond
/// the cap evicts the oldest messages first.
pub const MAX_MESSAGES: usize = 100;

/// Title assigned at creation, replaced once by the first user message.
pub const DEFAULT_TITLE: &str = "New conversation";

/// How many characters of the first user message become the title.
pub const TITLE_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    /// Unix milliseconds at creation.
    pub created_at: i64,
    pub messages: Vec<Message>,
}

/// Listing payload: metadata only, message bodies excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    pub id: Uuid,
    pub title: String,
    pub created_at: i64,
}

impl Conversation {
    pub fn meta(&self) -> ConversationMeta {
        ConversationMeta {
            id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
        }
    }

    /// Append a message, applying the one-time title rule and the
    /// retention cap. Shared by every backend.
    pub(crate) fn push_message(&mut self, message: Message) {
        if message.role == Role::User && self.title == DEFAULT_TITLE {
            self.title = message.text_content().chars().take(TITLE_LEN).collect();
        }

        self.messages.push(message);

        if self.messages.len() > MAX_MESSAGES {
            let excess = self.messages.len() - MAX_MESSAGES;
            self.messages.drain(..excess);
        }
    }
}

/// `NotFound` covers both a missing id and an ownership mismatch, so a
/// caller cannot probe for conversations it does not own. Everything else
/// is an I/O-class fault and maps to a 5xx, never a 404.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation not found")]
    NotFound,

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Conversation storage, selected at startup. Sessions and transport
/// depend only on this trait.
///
/// Operations are individually atomic, but concurrent turns on the same
/// conversation are not serialized here: appends interleave at message
/// granularity and the last writer wins. Callers needing stricter
/// sequencing serialize above this interface.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, owner_id: &str) -> StoreResult<Conversation>;

    /// `NotFound` when the conversation is missing or owned by someone
    /// else.
    async fn get(&self, id: Uuid, owner_id: &str) -> StoreResult<Conversation>;

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<ConversationMeta>>;

    /// Append without an ownership check, returning the updated
    /// conversation as re-read from storage. Callers must gate this
    /// behind a prior `get` for the same owner.
    async fn append_message(&self, id: Uuid, message: Message) -> StoreResult<Conversation>;

    /// Clear history and restore the default title; id, owner and
    /// creation time survive. Returns whether the conversation existed
    /// and was owned.
    async fn reset(&self, id: Uuid, owner_id: &str) -> StoreResult<bool>;
}

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{
    Conversation, ConversationMeta, ConversationStore, StoreError, StoreResult, DEFAULT_TITLE,
};
use crate::models::message::Message;

/// In-memory conversation storage; state lives and dies with the process.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create(&self, owner_id: &str) -> StoreResult<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
        };

        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());

        Ok(conversation)
    }

    async fn get(&self, id: Uuid, owner_id: &str) -> StoreResult<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .get(&id)
            .filter(|conversation| conversation.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<ConversationMeta>> {
        let mut summaries: Vec<ConversationMeta> = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|conversation| conversation.owner_id == owner_id)
            .map(Conversation::meta)
            .collect();
        summaries.sort_by_key(|meta| meta.created_at);
        Ok(summaries)
    }

    async fn append_message(&self, id: Uuid, message: Message) -> StoreResult<Conversation> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations.get_mut(&id).ok_or(StoreError::NotFound)?;
        conversation.push_message(message);
        Ok(conversation.clone())
    }

    async fn reset(&self, id: Uuid, owner_id: &str) -> StoreResult<bool> {
        let mut conversations = self.conversations.lock().unwrap();
        match conversations.get_mut(&id) {
            Some(conversation) if conversation.owner_id == owner_id => {
                conversation.messages.clear();
                conversation.title = DEFAULT_TITLE.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

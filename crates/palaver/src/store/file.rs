use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

use super::{
    Conversation, ConversationMeta, ConversationStore, StoreError, StoreResult, DEFAULT_TITLE,
};
use crate::models::message::Message;

/// File-backed conversation storage: one JSON document per conversation
/// under the data directory, rewritten whole on every mutation and landed
/// via a temp-file rename. Conversations survive process restarts.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn document_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn read_document(&self, id: Uuid) -> StoreResult<Conversation> {
        let bytes = match fs::read(self.document_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_document(&self, conversation: &Conversation) -> StoreResult<()> {
        let tmp = self.dir.join(format!("{}.json.tmp", conversation.id));
        fs::write(&tmp, serde_json::to_vec(conversation)?).await?;
        fs::rename(&tmp, self.document_path(conversation.id)).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    async fn create(&self, owner_id: &str) -> StoreResult<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
        };
        self.write_document(&conversation).await?;
        Ok(conversation)
    }

    async fn get(&self, id: Uuid, owner_id: &str) -> StoreResult<Conversation> {
        let conversation = self.read_document(id).await?;
        if conversation.owner_id != owner_id {
            return Err(StoreError::NotFound);
        }
        Ok(conversation)
    }

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<ConversationMeta>> {
        let mut summaries = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let conversation: Conversation = serde_json::from_slice(&fs::read(&path).await?)?;
            if conversation.owner_id == owner_id {
                summaries.push(conversation.meta());
            }
        }
        summaries.sort_by_key(|meta| meta.created_at);
        Ok(summaries)
    }

    async fn append_message(&self, id: Uuid, message: Message) -> StoreResult<Conversation> {
        let mut conversation = self.read_document(id).await?;
        conversation.push_message(message);
        self.write_document(&conversation).await?;
        // Re-read so the caller always sees what actually landed on disk.
        self.read_document(id).await
    }

    async fn reset(&self, id: Uuid, owner_id: &str) -> StoreResult<bool> {
        let mut conversation = match self.read_document(id).await {
            Ok(conversation) => conversation,
            Err(StoreError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        if conversation.owner_id != owner_id {
            return Ok(false);
        }
        conversation.messages.clear();
        conversation.title = DEFAULT_TITLE.to_string();
        self.write_document(&conversation).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MAX_MESSAGES;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        let created = store.create("alice").await.unwrap();
        let fetched = store.get(created.id, "alice").await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_conversations_survive_reopen() {
        let dir = tempdir().unwrap();
        let created = {
            let store = FileStore::new(dir.path()).await.unwrap();
            let created = store.create("alice").await.unwrap();
            store
                .append_message(created.id, Message::user().with_text("Hello again"))
                .await
                .unwrap();
            created
        };

        let reopened = FileStore::new(dir.path()).await.unwrap();
        let conversation = reopened.get(created.id, "alice").await.unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.title, "Hello again");
    }

    #[tokio::test]
    async fn test_get_unknown_or_unowned_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let created = store.create("alice").await.unwrap();

        assert!(matches!(
            store.get(Uuid::new_v4(), "alice").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get(created.id, "bob").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_owner() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let mine = store.create("alice").await.unwrap();
        store.create("bob").await.unwrap();

        let summaries = store.list("alice").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, mine.id);
    }

    #[tokio::test]
    async fn test_append_applies_title_and_cap() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let created = store.create("alice").await.unwrap();

        for i in 0..MAX_MESSAGES + 10 {
            store
                .append_message(
                    created.id,
                    Message::user().with_text(format!("Message {}", i)),
                )
                .await
                .unwrap();
        }

        let conversation = store.get(created.id, "alice").await.unwrap();
        assert_eq!(conversation.messages.len(), MAX_MESSAGES);
        assert_eq!(conversation.messages[0].text_content(), "Message 10");
        assert_eq!(conversation.title, "Message 0");
    }

    #[tokio::test]
    async fn test_append_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        let result = store
            .append_message(Uuid::new_v4(), Message::user().with_text("Hello"))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_reset_clears_document() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let created = store.create("alice").await.unwrap();
        store
            .append_message(created.id, Message::user().with_text("Hello"))
            .await
            .unwrap();

        assert!(store.reset(created.id, "alice").await.unwrap());
        assert!(!store.reset(created.id, "bob").await.unwrap());
        assert!(!store.reset(Uuid::new_v4(), "alice").await.unwrap());

        let conversation = store.get(created.id, "alice").await.unwrap();
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.title, DEFAULT_TITLE);
    }
}

//! Async collection interfaces consumed by the hub, and their SQLite
//! implementation.
//!
//! `rusqlite` is blocking, so [`SqliteStore`] serialises access through a
//! mutex and runs every call on tokio's blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{GroupDraft, GroupRecord, Message, MessageDraft};

/// The **messages** collection.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, draft: MessageDraft) -> Result<Message>;

    /// Undelivered direct messages for `recipient_id`, in store order.
    async fn undelivered_for(&self, recipient_id: &str) -> Result<Vec<Message>>;

    /// Batch-flag messages as delivered at `at`.
    async fn mark_delivered(&self, ids: Vec<Uuid>, at: DateTime<Utc>) -> Result<usize>;
}

/// The **groups** collection.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create_group(&self, draft: GroupDraft) -> Result<GroupRecord>;

    /// Idempotent set-add. [`StoreError::NotFound`] for unknown groups.
    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<GroupRecord>;

    async fn load_groups(&self) -> Result<Vec<GroupRecord>>;
}

/// Read access to user profiles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// A presentable name for `user_id`, if the user is known and has one.
    async fn display_name(&self, user_id: &str) -> Result<Option<String>>;
}

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Register or rename a user. Called by the auth layer on sign-up and
    /// profile edits.
    pub async fn upsert_user(
        &self,
        id: &str,
        name: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<()> {
        let id = id.to_string();
        let name = name.map(str::to_string);
        let display_name = display_name.map(str::to_string);
        self.with_db(move |db| db.upsert_user(&id, name.as_deref(), display_name.as_deref()))
            .await
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, draft: MessageDraft) -> Result<Message> {
        self.with_db(move |db| db.insert_message(draft)).await
    }

    async fn undelivered_for(&self, recipient_id: &str) -> Result<Vec<Message>> {
        let recipient_id = recipient_id.to_string();
        self.with_db(move |db| db.undelivered_for(&recipient_id)).await
    }

    async fn mark_delivered(&self, ids: Vec<Uuid>, at: DateTime<Utc>) -> Result<usize> {
        self.with_db(move |db| db.mark_delivered(&ids, at)).await
    }
}

#[async_trait]
impl GroupStore for SqliteStore {
    async fn create_group(&self, draft: GroupDraft) -> Result<GroupRecord> {
        self.with_db(move |db| db.create_group(draft)).await
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<GroupRecord> {
        let group_id = group_id.to_string();
        let user_id = user_id.to_string();
        self.with_db(move |db| db.add_group_member(&group_id, &user_id))
            .await
    }

    async fn load_groups(&self) -> Result<Vec<GroupRecord>> {
        self.with_db(|db| db.list_groups()).await
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn display_name(&self, user_id: &str) -> Result<Option<String>> {
        let user_id = user_id.to_string();
        self.with_db(move |db| {
            Ok(db
                .get_user(&user_id)?
                .and_then(|user| user.presentable_name().map(str::to_string)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageTarget;

    #[tokio::test]
    async fn test_message_collection_through_traits() {
        let store = SqliteStore::in_memory().unwrap();
        let saved = store
            .insert_message(MessageDraft {
                sender_id: "alice".to_string(),
                target: MessageTarget::Direct("bob".to_string()),
                content: "hola".to_string(),
                content_lang: "es".to_string(),
                reply_to: None,
                reply_text: None,
                reply_sender: None,
                files: Vec::new(),
            })
            .await
            .unwrap();

        let pending = store.undelivered_for("bob").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, saved.id);

        let changed = store.mark_delivered(vec![saved.id], Utc::now()).await.unwrap();
        assert_eq!(changed, 1);
        assert!(store.undelivered_for("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_group_collection_through_traits() {
        let store = SqliteStore::in_memory().unwrap();
        let group = store
            .create_group(GroupDraft {
                name: "team".to_string(),
                created_by: "carol".to_string(),
                members: vec!["alice".to_string()],
            })
            .await
            .unwrap();

        let after = store.add_group_member(&group.id, "bob").await.unwrap();
        assert_eq!(after.members, vec!["carol", "alice", "bob"]);

        let all = store.load_groups().await.unwrap();
        assert_eq!(all, vec![after]);
    }

    #[tokio::test]
    async fn test_display_name_lookup() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_user("u1", Some("Alice"), None).await.unwrap();

        assert_eq!(
            store.display_name("u1").await.unwrap().as_deref(),
            Some("Alice")
        );
        assert_eq!(store.display_name("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_on_disk_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");

        let store = SqliteStore::open(&path).unwrap();
        store
            .create_group(GroupDraft {
                name: "team".to_string(),
                created_by: "carol".to_string(),
                members: Vec::new(),
            })
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load_groups().await.unwrap().len(), 1);
    }
}

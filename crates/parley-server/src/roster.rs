//! In-memory mirror of group membership.
//!
//! Every mutation is written to the [`GroupStore`] first and mirrored only
//! after the write succeeds, so the mirror never holds state the store
//! does not.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use parley_shared::{GroupId, UserId};
use parley_store::{GroupDraft, GroupRecord, GroupStore, StoreError};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Group store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub members: HashSet<UserId>,
}

impl From<GroupRecord> for Group {
    fn from(record: GroupRecord) -> Self {
        let mut members: HashSet<UserId> = record.members.into_iter().map(UserId).collect();
        members.insert(UserId(record.created_by.clone()));
        Self {
            id: GroupId(record.id),
            name: record.name,
            created_by: UserId(record.created_by),
            created_at: record.created_at,
            members,
        }
    }
}

#[derive(Clone)]
pub struct GroupRoster {
    groups: Arc<RwLock<HashMap<GroupId, Group>>>,
    store: Arc<dyn GroupStore>,
}

impl GroupRoster {
    pub fn new(store: Arc<dyn GroupStore>) -> Self {
        Self {
            groups: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    /// Replace the mirror with every group in the store.
    pub async fn load_all(&self) -> Result<usize, RosterError> {
        let records = self.store.load_groups().await?;
        let loaded: HashMap<GroupId, Group> = records
            .into_iter()
            .map(|record| {
                let group = Group::from(record);
                (group.id.clone(), group)
            })
            .collect();

        let count = loaded.len();
        *self.groups.write().await = loaded;
        info!(groups = count, "Loaded groups from store");
        Ok(count)
    }

    pub async fn create(
        &self,
        name: &str,
        creator: &UserId,
        members: &[UserId],
    ) -> Result<GroupId, RosterError> {
        let record = self
            .store
            .create_group(GroupDraft {
                name: name.to_string(),
                created_by: creator.to_string(),
                members: members.iter().map(UserId::to_string).collect(),
            })
            .await?;

        let group = Group::from(record);
        let group_id = group.id.clone();
        info!(
            group = %group_id,
            name = %group.name,
            creator = %creator,
            members = group.members.len(),
            "Group created"
        );
        self.groups.write().await.insert(group_id.clone(), group);
        Ok(group_id)
    }

    pub async fn add_member(&self, group_id: &GroupId, user_id: &UserId) -> Result<(), RosterError> {
        let record = match self
            .store
            .add_group_member(group_id.as_str(), user_id.as_str())
            .await
        {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(RosterError::GroupNotFound(group_id.clone())),
            Err(e) => return Err(e.into()),
        };

        let mut groups = self.groups.write().await;
        match groups.get_mut(group_id) {
            Some(group) => {
                group.members.insert(user_id.clone());
                group
                    .members
                    .extend(record.members.into_iter().map(UserId));
            }
            // Created outside this process since startup.
            None => {
                groups.insert(group_id.clone(), Group::from(record));
            }
        }
        info!(group = %group_id, user = %user_id, "Member joined group");
        Ok(())
    }

    /// Copy of the group's membership.
    pub async fn members_of(&self, group_id: &GroupId) -> Option<HashSet<UserId>> {
        self.groups
            .read()
            .await
            .get(group_id)
            .map(|group| group.members.clone())
    }

    #[allow(dead_code)]
    pub async fn is_member(&self, group_id: &GroupId, user_id: &UserId) -> bool {
        self.groups
            .read()
            .await
            .get(group_id)
            .map(|group| group.members.contains(user_id))
            .unwrap_or(false)
    }

    pub async fn contains(&self, group_id: &GroupId) -> bool {
        self.groups.read().await.contains_key(group_id)
    }

    #[cfg(test)]
    pub async fn get(&self, group_id: &GroupId) -> Option<Group> {
        self.groups.read().await.get(group_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.groups.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_store::SqliteStore;

    struct ReadOnlyStore;

    #[async_trait]
    impl GroupStore for ReadOnlyStore {
        async fn create_group(&self, _: GroupDraft) -> parley_store::Result<GroupRecord> {
            Err(StoreError::Migration("read-only".to_string()))
        }

        async fn add_group_member(&self, _: &str, _: &str) -> parley_store::Result<GroupRecord> {
            Err(StoreError::Migration("read-only".to_string()))
        }

        async fn load_groups(&self) -> parley_store::Result<Vec<GroupRecord>> {
            Ok(vec![GroupRecord {
                id: "g1".to_string(),
                name: "legacy".to_string(),
                members: vec!["a".to_string()],
                created_by: "c".to_string(),
                created_at: Utc::now(),
            }])
        }
    }

    fn ids(names: &[&str]) -> HashSet<UserId> {
        names.iter().map(|n| UserId::from(*n)).collect()
    }

    #[tokio::test]
    async fn test_membership_is_monotonic() {
        let roster = GroupRoster::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let creator = UserId::from("creator");

        let group_id = roster
            .create("team", &creator, &[UserId::from("a"), UserId::from("b")])
            .await
            .unwrap();
        roster.add_member(&group_id, &UserId::from("c")).await.unwrap();

        assert_eq!(
            roster.members_of(&group_id).await.unwrap(),
            ids(&["creator", "a", "b", "c"])
        );
        assert!(roster.is_member(&group_id, &creator).await);
        assert_eq!(roster.get(&group_id).await.unwrap().name, "team");
    }

    #[tokio::test]
    async fn test_load_all_replaces_mirror() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let first = GroupRoster::new(store.clone());
        let group_id = first.create("team", &UserId::from("c"), &[]).await.unwrap();

        let second = GroupRoster::new(store);
        assert!(!second.contains(&group_id).await);
        assert_eq!(second.load_all().await.unwrap(), 1);
        assert_eq!(second.members_of(&group_id).await.unwrap(), ids(&["c"]));
    }

    #[tokio::test]
    async fn test_unknown_group_join() {
        let roster = GroupRoster::new(Arc::new(SqliteStore::in_memory().unwrap()));
        let err = roster
            .add_member(&GroupId::from("nope"), &UserId::from("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::GroupNotFound(_)));
        assert!(!roster.contains(&GroupId::from("nope")).await);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_mirror_untouched() {
        let roster = GroupRoster::new(Arc::new(ReadOnlyStore));
        roster.load_all().await.unwrap();
        let group_id = GroupId::from("g1");

        assert!(roster.create("new", &UserId::from("x"), &[]).await.is_err());
        assert_eq!(roster.len().await, 1);

        let err = roster.add_member(&group_id, &UserId::from("z")).await.unwrap_err();
        assert!(matches!(err, RosterError::Store(_)));
        assert_eq!(roster.members_of(&group_id).await.unwrap(), ids(&["a", "c"]));
    }

    #[tokio::test]
    async fn test_join_mirrors_group_created_elsewhere() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let record = store
            .create_group(GroupDraft {
                name: "outside".to_string(),
                created_by: "c".to_string(),
                members: Vec::new(),
            })
            .await
            .unwrap();

        let roster = GroupRoster::new(store);
        let group_id = GroupId(record.id);
        roster.add_member(&group_id, &UserId::from("a")).await.unwrap();
        assert_eq!(roster.members_of(&group_id).await.unwrap(), ids(&["c", "a"]));
    }
}

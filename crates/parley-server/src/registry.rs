//! Connection registry: who is online, and where to reach them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use parley_shared::UserId;

use crate::connection::ConnectionHandle;

/// Maps each user to their single active connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<UserId, Arc<ConnectionHandle>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional upsert. Returns the handle that was superseded, if any.
    pub async fn register(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        let user_id = handle.user_id().clone();
        let previous = self.connections.write().await.insert(user_id.clone(), handle);
        debug!(user = %user_id, superseded = previous.is_some(), "Connection registered");
        previous
    }

    /// Remove `user_id` only if its current entry is `connection_id`.
    pub async fn deregister(&self, user_id: &UserId, connection_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(user_id) {
            Some(current) if current.id() == connection_id => {
                connections.remove(user_id);
                debug!(user = %user_id, "Connection deregistered");
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: &UserId) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(user_id).cloned()
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.connections.read().await.contains_key(user_id)
    }

    /// Copy of the online user ids, taken under the read lock.
    pub async fn snapshot_online_ids(&self) -> HashSet<UserId> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }
}

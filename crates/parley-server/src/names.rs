//! Reply-sender presentation.
//!
//! Clients quote earlier messages by sender identifier; recipients should
//! see a name. Resolution is best effort: unknown users, lookup errors and
//! slow lookups all fall back to the raw identifier.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use parley_store::UserDirectory;

#[derive(Clone)]
pub struct NameResolver {
    directory: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl NameResolver {
    pub fn new(directory: Arc<dyn UserDirectory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Display name for `identifier`, or `identifier` itself.
    pub async fn resolve(&self, identifier: &str) -> String {
        if identifier.is_empty() {
            return String::new();
        }

        match tokio::time::timeout(self.timeout, self.directory.display_name(identifier)).await {
            Ok(Ok(Some(name))) => name,
            Ok(Ok(None)) => identifier.to_string(),
            Ok(Err(e)) => {
                debug!(id = identifier, error = %e, "Display name lookup failed");
                identifier.to_string()
            }
            Err(_) => {
                debug!(id = identifier, "Display name lookup timed out");
                identifier.to_string()
            }
        }
    }

    pub async fn resolve_opt(&self, identifier: Option<&str>) -> Option<String> {
        match identifier {
            Some(id) => Some(self.resolve(id).await),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_store::{SqliteStore, StoreError};

    struct BrokenDirectory;

    #[async_trait]
    impl UserDirectory for BrokenDirectory {
        async fn display_name(&self, _: &str) -> parley_store::Result<Option<String>> {
            Err(StoreError::Poisoned)
        }
    }

    struct SlowDirectory;

    #[async_trait]
    impl UserDirectory for SlowDirectory {
        async fn display_name(&self, _: &str) -> parley_store::Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some("too late".to_string()))
        }
    }

    #[tokio::test]
    async fn test_resolves_known_user() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_user("u1", Some("Alice"), Some("ally")).await.unwrap();
        let resolver = NameResolver::new(Arc::new(store), Duration::from_secs(1));

        assert_eq!(resolver.resolve("u1").await, "ally");
        assert_eq!(resolver.resolve("stranger").await, "stranger");
        assert_eq!(resolver.resolve("").await, "");
        assert_eq!(resolver.resolve_opt(None).await, None);
    }

    #[tokio::test]
    async fn test_failure_and_timeout_fall_back() {
        let broken = NameResolver::new(Arc::new(BrokenDirectory), Duration::from_secs(1));
        assert_eq!(broken.resolve("u1").await, "u1");

        let slow = NameResolver::new(Arc::new(SlowDirectory), Duration::from_millis(50));
        assert_eq!(slow.resolve_opt(Some("u2")).await.as_deref(), Some("u2"));
    }
}

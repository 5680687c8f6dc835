//! The hub: registry, roster and router behind one explicitly owned value.
//!
//! A [`Hub`] is built once at startup and handed to the HTTP layer. Each
//! admitted connection runs inside [`Hub::admit`] until it ends.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, Stream};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use parley_shared::UserId;
use parley_store::{GroupStore, MessageStore, SqliteStore, UserDirectory};

use crate::config::HubConfig;
use crate::connection::ConnectionHandle;
use crate::names::NameResolver;
use crate::pipeline::{drain_outbound, pump_inbound, Teardown};
use crate::registry::ConnectionRegistry;
use crate::roster::{GroupRoster, RosterError};
use crate::router::MessageRouter;
use crate::stats::{DeliveryStats, StatsSnapshot};
use crate::translate::{TranslationProvider, Translator};

/// The persistent collections the hub reads and writes.
#[derive(Clone)]
pub struct HubStores {
    pub messages: Arc<dyn MessageStore>,
    pub groups: Arc<dyn GroupStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl HubStores {
    pub fn sqlite(store: SqliteStore) -> Self {
        Self {
            messages: Arc::new(store.clone()),
            groups: Arc::new(store.clone()),
            users: Arc::new(store),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub online: usize,
    pub groups: usize,
    #[serde(flatten)]
    pub delivery: StatsSnapshot,
}

pub struct Hub {
    config: HubConfig,
    registry: ConnectionRegistry,
    roster: GroupRoster,
    router: MessageRouter,
    stats: Arc<DeliveryStats>,
    shutdown: watch::Sender<bool>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        stores: HubStores,
        provider: Arc<dyn TranslationProvider>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let roster = GroupRoster::new(stores.groups);
        let stats = Arc::new(DeliveryStats::default());
        let router = MessageRouter::new(
            registry.clone(),
            roster.clone(),
            stores.messages,
            Translator::new(provider, config.translate_timeout),
            NameResolver::new(stores.users, config.display_name_timeout),
            stats.clone(),
            &config,
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            registry,
            roster,
            router,
            stats,
            shutdown,
        }
    }

    /// Hydrate the group roster from the store.
    pub async fn load_groups(&self) -> Result<usize, RosterError> {
        self.roster.load_all().await
    }

    /// Run one connection to completion.
    ///
    /// The outbound drain starts first, then the connection is registered
    /// and its offline backlog replayed while live enqueues are held back.
    /// Only then are inbound frames read. `lang` falls back to the
    /// configured default when absent or blank.
    pub async fn admit<S, E, K>(
        &self,
        user_id: UserId,
        lang: Option<String>,
        inbound: S,
        outbound: K,
    ) -> Teardown
    where
        S: Stream<Item = Result<String, E>> + Unpin + Send,
        E: Display + Send,
        K: Sink<String> + Unpin + Send + 'static,
        K::Error: Display + Send,
    {
        let lang = lang
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.config.default_lang.clone());

        let (handle, queue) = ConnectionHandle::new(user_id, lang, self.config.queue_capacity);
        let writer = tokio::spawn(drain_outbound(
            handle.clone(),
            queue,
            outbound,
            self.shutdown.subscribe(),
        ));

        let window = handle.open_catch_up().await;
        if let Some(previous) = self.registry.register(handle.clone()).await {
            self.stats.record_superseded();
            previous.close();
            info!(user = %handle.user_id(), old = %previous.id(), new = %handle.id(), "Superseded previous connection");
        }
        let replayed = self.router.catch_up(&window).await;
        drop(window);

        info!(
            user = %handle.user_id(),
            connection = %handle.id(),
            lang = handle.lang(),
            replayed,
            "Connection admitted"
        );

        let reason = pump_inbound(&self.router, &handle, inbound, self.shutdown.subscribe()).await;

        self.registry.deregister(handle.user_id(), handle.id()).await;
        // On shutdown the drain flushes what is queued and exits by itself.
        if reason != Teardown::Shutdown {
            handle.close();
        }
        if let Err(e) = writer.await {
            warn!(user = %handle.user_id(), error = %e, "Outbound task failed");
        }

        info!(user = %handle.user_id(), connection = %handle.id(), ?reason, "Connection closed");
        reason
    }

    /// Online user ids, sorted.
    pub async fn online_user_ids(&self) -> Vec<UserId> {
        let mut online: Vec<UserId> = self.registry.snapshot_online_ids().await.into_iter().collect();
        online.sort();
        online
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.registry.is_online(user_id).await
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            online: self.registry.len().await,
            groups: self.roster.len().await,
            delivery: self.stats.snapshot(),
        }
    }

    #[cfg(test)]
    pub fn roster(&self) -> &GroupRoster {
        &self.roster
    }

    /// Signal every pipeline to stop. Outbound loops flush their queues
    /// before closing the transport.
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Hub shutting down");
        }
    }
}

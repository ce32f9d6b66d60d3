//! Favorite recipes per user, persisted locally.
//!
//! [`FavoritesStore`] fronts two backends behind [`FavoritesBackend`]:
//!
//! ```text
//! [caller] → [stability signal?] ─ yes ─────────────────────→ [LocalFavorites]
//!                 │ no                                              ↑
//!                 └→ [OperationQueue] → [SqliteFavorites] ─ error ──┘
//! ```
//!
//! The relational backend is opened at most once per store. If that fails,
//! or a single statement fails or times out, the same operation is replayed
//! on the key-value fallback. Public operations never return errors: a
//! failure shows up as an empty list, `false`, or no effect, plus a log line.

pub mod backend;
pub mod local;
pub mod models;
pub mod sqlite;

pub use backend::FavoritesBackend;
pub use local::LocalFavorites;
pub use models::Favorite;
pub use sqlite::SqliteFavorites;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::FavoritesConfig;
use crate::database::{Connector, SqliteConnector};
use crate::errors::FavoritesError;
use crate::kv::{FileKeyValueStore, KeyValueStore};
use crate::memory::{MemoryMonitor, ProcMemorySampler};
use crate::platform::{DebugInfo, DeviceSignals, HostSignals, Platform};
use crate::queue::OperationQueue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    Uninitialized,
    Initializing,
    Relational,
    FallbackOnly,
}

enum StoreState {
    Uninitialized,
    Initializing,
    Relational(Arc<dyn FavoritesBackend>),
    FallbackOnly,
}

impl StoreState {
    fn kind(&self) -> InitState {
        match self {
            StoreState::Uninitialized => InitState::Uninitialized,
            StoreState::Initializing => InitState::Initializing,
            StoreState::Relational(_) => InitState::Relational,
            StoreState::FallbackOnly => InitState::FallbackOnly,
        }
    }
}

pub struct FavoritesStore {
    state: RwLock<StoreState>,
    init_lock: tokio::sync::Mutex<()>,
    connector: Arc<dyn Connector>,
    fallback: Arc<LocalFavorites>,
    host: Arc<dyn HostSignals>,
    queue: OperationQueue,
    web_ready_timeout: Duration,
    web_ready_poll: Duration,
}

impl FavoritesStore {
    /// Must be called inside a tokio runtime (the queue worker is spawned here).
    pub fn new(
        config: &FavoritesConfig,
        connector: Arc<dyn Connector>,
        fallback_storage: Arc<dyn KeyValueStore>,
        host: Arc<dyn HostSignals>,
    ) -> Self {
        Self {
            state: RwLock::new(StoreState::Uninitialized),
            init_lock: tokio::sync::Mutex::new(()),
            connector,
            fallback: Arc::new(LocalFavorites::new(
                fallback_storage,
                config.storage_prefix.clone(),
            )),
            host,
            queue: OperationQueue::new(config.operation_timeout(), config.queue_pause()),
            web_ready_timeout: config.web_ready_timeout(),
            web_ready_poll: config.web_ready_poll(),
        }
    }

    /// Production wiring: SQLite connector, file-backed fallback, device signals.
    ///
    /// On Android the memory monitor is started as well. It samples until the
    /// returned host signals and the store are dropped.
    pub fn from_config(config: &FavoritesConfig) -> Result<(Self, Arc<DeviceSignals>), FavoritesError> {
        let storage = Arc::new(FileKeyValueStore::open(&config.fallback_path)?);
        let memory = Arc::new(MemoryMonitor::new(Arc::new(ProcMemorySampler)));
        if config.platform == Platform::Android {
            memory.start(config.memory_check_interval());
        }
        let mut host = DeviceSignals::new(config.platform, memory)
            .with_fallback_on_emulator(config.fallback_on_emulator);
        if let Some(user_agent) = &config.user_agent {
            host = host.with_user_agent(user_agent.clone());
        }
        if let Some(host_name) = &config.host_name {
            host = host.with_host_name(host_name.clone());
        }
        let host = Arc::new(host);
        let connector = Arc::new(SqliteConnector::new(config.database.clone()));

        let store = Self::new(config, connector, storage, host.clone());
        Ok((store, host))
    }

    /// Opens the relational backend. Only the first call does anything; later
    /// calls (including concurrent ones) wait for that attempt and return.
    pub async fn initialize(&self) {
        let _guard = self.init_lock.lock().await;
        if !matches!(*self.state.read(), StoreState::Uninitialized) {
            return;
        }
        *self.state.write() = StoreState::Initializing;

        let resolved = match self.open_relational().await {
            Ok(backend) => {
                log::info!("Favorites using {} backend", backend.name());
                StoreState::Relational(backend)
            }
            Err(e) => {
                log::warn!("Relational favorites unavailable, using fallback store: {}", e);
                StoreState::FallbackOnly
            }
        };
        *self.state.write() = resolved;
    }

    async fn open_relational(&self) -> Result<Arc<dyn FavoritesBackend>, FavoritesError> {
        if self.host.platform() == Platform::Web {
            if !self.wait_for_persistence_element().await {
                return Err(FavoritesError::Unavailable(format!(
                    "persistence element not ready after {:?}",
                    self.web_ready_timeout
                )));
            }
            self.connector.prepare_web_store().await?;
        }
        self.connector.connect().await
    }

    async fn wait_for_persistence_element(&self) -> bool {
        let deadline = Instant::now() + self.web_ready_timeout;
        loop {
            if self.host.persistence_element_ready() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.web_ready_poll).await;
        }
    }

    pub fn init_state(&self) -> InitState {
        self.state.read().kind()
    }

    /// True when favorites are durable here: relational backend open, or a web host.
    pub fn is_available(&self) -> bool {
        matches!(*self.state.read(), StoreState::Relational(_))
            || self.host.platform() == Platform::Web
    }

    pub fn platform(&self) -> Platform {
        self.host.platform()
    }

    pub fn debug_info(&self) -> DebugInfo {
        self.host.debug_info()
    }

    pub fn pending_operations(&self) -> usize {
        self.queue.pending()
    }

    pub fn fallback_key(&self, user_id: &str) -> String {
        self.fallback.storage_key(user_id)
    }

    fn relational(&self) -> Option<Arc<dyn FavoritesBackend>> {
        match &*self.state.read() {
            StoreState::Relational(backend) => Some(backend.clone()),
            _ => None,
        }
    }

    /// Runs `op` on the relational backend through the queue, or on the
    /// fallback when the host is unstable, the backend is not open, or the
    /// relational attempt failed.
    async fn run<T, F>(&self, name: &'static str, op: F) -> Result<T, FavoritesError>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn FavoritesBackend>) -> BoxFuture<'static, Result<T, FavoritesError>>,
    {
        if self.host.should_use_fallback() {
            log::debug!("{}: host unstable, using fallback store", name);
        } else if let Some(backend) = self.relational() {
            log::debug!("{}: {:?}", name, self.host.debug_info());
            match self.queue.submit(name, op(backend)).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("{} failed on relational backend, retrying on fallback: {}", name, e);
                }
            }
        }

        let fallback: Arc<dyn FavoritesBackend> = self.fallback.clone();
        op(fallback).await
    }

    pub async fn add_favorite(&self, recipe_id: &str, user_id: &str) {
        let (recipe, user) = (recipe_id.to_string(), user_id.to_string());
        let result = self
            .run("add_favorite", move |backend| {
                let (recipe, user) = (recipe.clone(), user.clone());
                async move { backend.add(&recipe, &user).await }.boxed()
            })
            .await;

        if let Err(e) = result {
            log::warn!("Could not add favorite {} for {}: {}", recipe_id, user_id, e);
        }
    }

    pub async fn remove_favorite(&self, recipe_id: &str, user_id: &str) {
        let (recipe, user) = (recipe_id.to_string(), user_id.to_string());
        let result = self
            .run("remove_favorite", move |backend| {
                let (recipe, user) = (recipe.clone(), user.clone());
                async move { backend.remove(&recipe, &user).await }.boxed()
            })
            .await;

        if let Err(e) = result {
            log::warn!("Could not remove favorite {} for {}: {}", recipe_id, user_id, e);
        }
    }

    /// Recipe ids, most recently added first.
    pub async fn get_favorites(&self, user_id: &str) -> Vec<String> {
        let user = user_id.to_string();
        self.run("get_favorites", move |backend| {
            let user = user.clone();
            async move { backend.list(&user).await }.boxed()
        })
        .await
        .unwrap_or_else(|e| {
            log::warn!("Could not load favorites for {}: {}", user_id, e);
            Vec::new()
        })
    }

    pub async fn is_favorite(&self, recipe_id: &str, user_id: &str) -> bool {
        let (recipe, user) = (recipe_id.to_string(), user_id.to_string());
        self.run("is_favorite", move |backend| {
            let (recipe, user) = (recipe.clone(), user.clone());
            async move { backend.contains(&recipe, &user).await }.boxed()
        })
        .await
        .unwrap_or_else(|e| {
            log::warn!("Could not check favorite {} for {}: {}", recipe_id, user_id, e);
            false
        })
    }

    /// Flips the favorite and returns the new state.
    ///
    /// Read then write, not atomic: two toggles of the same pair racing each
    /// other can both see the old state. Callers serialize toggles per recipe.
    pub async fn toggle_favorite(&self, recipe_id: &str, user_id: &str) -> bool {
        if self.is_favorite(recipe_id, user_id).await {
            self.remove_favorite(recipe_id, user_id).await;
            false
        } else {
            self.add_favorite(recipe_id, user_id).await;
            true
        }
    }

    /// Account cleanup. The fallback key is dropped too so nothing is left behind.
    pub async fn clear_user_favorites(&self, user_id: &str) {
        let user = user_id.to_string();
        let result = self
            .run("clear_user_favorites", move |backend| {
                let user = user.clone();
                async move { backend.clear(&user).await }.boxed()
            })
            .await;

        if let Err(e) = result {
            log::warn!("Could not clear favorites for {}: {}", user_id, e);
        }
        if let Err(e) = self.fallback.clear(user_id).await {
            log::warn!("Could not clear fallback favorites for {}: {}", user_id, e);
        }
    }

    pub async fn get_favorite_count(&self, user_id: &str) -> usize {
        let user = user_id.to_string();
        self.run("get_favorite_count", move |backend| {
            let user = user.clone();
            async move { backend.count(&user).await }.boxed()
        })
        .await
        .unwrap_or_else(|e| {
            log::warn!("Could not count favorites for {}: {}", user_id, e);
            0
        })
    }

    pub async fn get_favorite_details(&self, user_id: &str) -> Vec<Favorite> {
        let user = user_id.to_string();
        self.run("get_favorite_details", move |backend| {
            let user = user.clone();
            async move { backend.details(&user).await }.boxed()
        })
        .await
        .unwrap_or_else(|e| {
            log::warn!("Could not load favorite details for {}: {}", user_id, e);
            Vec::new()
        })
    }

    pub async fn close(&self) {
        if let Some(backend) = self.relational() {
            backend.close().await;
            log::info!("Closed {} favorites backend", backend.name());
        }
    }
}

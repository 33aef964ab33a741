//! Wiring: one storage backend shared by the document store and the
//! account/session keys, with every service built on top of it.

use std::sync::Arc;

#[cfg(feature = "rocks")]
use nest_store::{RocksStorage, StoreConfig};
use nest_store::{Database, DocumentStore, FeedConfig, KeyValueStore, MemoryStorage};

use crate::anniversary::Anniversaries;
use crate::auth::{Accounts, AuthService};
use crate::chat::Chat;
use crate::error::NestError;
use crate::profile::{seed_couple, Profiles};
use crate::times::TimesToDo;

/// Where the nest keeps its data.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Process-local, gone on exit.
    Memory,
    /// RocksDB directory.
    #[cfg(feature = "rocks")]
    Rocks(StoreConfig),
}

/// App configuration.
#[derive(Debug, Clone)]
pub struct NestConfig {
    pub backend: Backend,
    pub feed: FeedConfig,
    /// Register both members and write their initial profiles on open
    /// (default: true)
    pub seed_users: bool,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            feed: FeedConfig::default(),
            seed_users: true,
        }
    }
}

impl NestConfig {
    /// Persistent config rooted at `path`.
    #[cfg(feature = "rocks")]
    pub fn persistent(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            backend: Backend::Rocks(StoreConfig::at(path)),
            ..Self::default()
        }
    }
}

pub struct NestApp {
    storage: Arc<dyn KeyValueStore>,
    database: Database,
    accounts: Arc<Accounts>,
    auth: AuthService,
}

impl NestApp {
    pub fn open(config: NestConfig) -> Result<Self, NestError> {
        let storage: Arc<dyn KeyValueStore> = match config.backend {
            Backend::Memory => Arc::new(MemoryStorage::new()),
            #[cfg(feature = "rocks")]
            Backend::Rocks(store_config) => Arc::new(RocksStorage::open(store_config)?),
        };

        let store = DocumentStore::with_feed_config(storage.clone(), config.feed);
        let database = Database::new(Arc::new(store));
        let accounts = Arc::new(Accounts::new(storage.clone()));
        let auth = AuthService::new(accounts.clone(), storage.clone());

        let app = Self {
            storage,
            database,
            accounts,
            auth,
        };
        if config.seed_users {
            seed_couple(&app.accounts, &app.profiles())?;
        }
        log::info!("Nest opened");
        Ok(app)
    }

    /// Memory-backed app with both members seeded.
    pub fn in_memory() -> Result<Self, NestError> {
        Self::open(NestConfig::default())
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn accounts(&self) -> &Arc<Accounts> {
        &self.accounts
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn profiles(&self) -> Profiles {
        Profiles::new(self.database.clone())
    }

    pub fn chat(&self) -> Chat {
        Chat::new(self.database.clone())
    }

    pub fn anniversaries(&self) -> Anniversaries {
        Anniversaries::new(self.database.clone())
    }

    pub fn times(&self) -> TimesToDo {
        TimesToDo::new(self.database.clone())
    }
}

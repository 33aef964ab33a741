//! # nest-store: local document store for Our Nest
//!
//! Emulates a cloud document database (get / set / update / delete / add and
//! per-document snapshot subscriptions) on top of a flat key-value store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   doc_{col}_{id}    ┌──────────────────┐
//! │ Database    │ ──────────────────► │ DocumentStore    │
//! │ (DocRef,    │                     │ (JSON documents) │
//! │  CollRef)   │                     └────────┬─────────┘
//! └─────────────┘                              │
//!                       ┌──────────────────────┼──────────────────────┐
//!                       ▼                      ▼                      ▼
//!              ┌────────────────┐   ┌───────────────────┐   ┌────────────────┐
//!              │ KeyValueStore  │   │ ListenerRegistry  │   │ ChangeFeed     │
//!              │ (memory/rocks) │   │ (sync callbacks)  │   │ (tokio watch)  │
//!              └────────────────┘   └───────────────────┘   └────────────────┘
//! ```
//!
//! Writes are last-write-wins whole-document overwrites. There are no
//! transactions, no query predicates and no cross-process notification.
//!
//! ## Modules
//!
//! - [`storage`]: key-value backends (in-memory, RocksDB)
//! - [`document`]: the document store itself
//! - [`listeners`]: synchronous snapshot subscriptions
//! - [`feed`]: async change feed for tokio consumers
//! - [`database`]: collection / document reference facade

pub mod database;
pub mod document;
pub mod error;
pub mod feed;
pub mod listeners;
pub mod storage;

pub use database::{CollectionRef, Database, DocRef};
pub use document::{Document, DocumentStore};
pub use error::StoreError;
pub use feed::{ChangeFeed, DocumentChange, DocumentWatcher, FeedConfig, FeedStats};
pub use listeners::{DocumentSnapshot, ListenerRegistry, Subscription};
pub use storage::{KeyValueStore, MemoryStorage, StoreConfig};

#[cfg(feature = "rocks")]
pub use storage::RocksStorage;

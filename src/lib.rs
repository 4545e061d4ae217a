//! Muster - a native user store backed by an indexed document store
//!
//! This library persists users (credentials, roles, profile) in an external
//! indexed document store and exposes lookup, verification, and mutation
//! operations to a surrounding authentication framework. The store owns a
//! lifecycle state machine gated on the readiness of the backing index, a
//! change-detection poller that notifies listeners about updated and
//! deleted users, and a write-then-invalidate protocol that purges realm
//! caches after mutations.
//!
//! No caching of verified credentials is done by this library; it is
//! handled at a higher level.

pub mod cluster;
pub mod config;
pub mod docstore;
pub mod error;
pub mod hasher;
pub mod realm;
pub mod record;
pub mod types;
pub mod userstore;

pub use cluster::{ClusterChangedEvent, ClusterState, IndexRoutingState};
pub use config::StoreConfig;
pub use docstore::DocumentStore;
pub use error::{Error, Result};
pub use hasher::Hasher;
pub use realm::RealmCacheClient;
pub use types::*;
pub use userstore::{ChangeListener, NativeUserStore};

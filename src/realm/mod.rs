//! Realm-cache purge client
//!
//! Realms cache resolved credentials across the cluster. After a user
//! mutation the store asks every node to drop its cached entries for the
//! affected username before acknowledging the caller.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Username;

pub mod r#impl;

/// Acknowledgment of a realm-cache purge
#[derive(Debug, Clone, Default)]
pub struct ClearRealmCacheResponse {
    /// Ids of the nodes that acknowledged the purge
    pub acknowledged_nodes: Vec<String>,
}

/// Client for purging realm caches across the cluster
#[async_trait]
pub trait RealmCacheClient: Send + Sync {
    /// Drop cached credentials for the given usernames on every node
    async fn clear_realm_cache(&self, usernames: &[Username]) -> Result<ClearRealmCacheResponse>;
}

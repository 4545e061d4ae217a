//! Cluster-state snapshots consumed by the readiness checks
//!
//! The store never talks to the cluster directly; the surrounding system
//! observes cluster-state changes and forwards immutable snapshots to
//! [`can_start`](crate::NativeUserStore::can_start) and
//! [`on_cluster_changed`](crate::NativeUserStore::on_cluster_changed).

use std::collections::{HashMap, HashSet};

/// Name of the index holding user documents
pub const SECURITY_INDEX_NAME: &str = ".security";

/// Name of the index template expected before the store may start
pub const SECURITY_TEMPLATE_NAME: &str = "security-index-template";

/// Document type under which user records are stored
pub const USER_DOC_TYPE: &str = "user";

/// Immutable snapshot of the cluster state relevant to the store
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    /// Whether the cluster has recovered its persisted state from disk.
    /// Until then index metadata may be incomplete.
    pub recovered_from_disk: bool,
    /// Names of the index templates present in the cluster
    pub templates: HashSet<String>,
    /// Routing state per existing index
    pub indices: HashMap<String, IndexRoutingState>,
}

impl ClusterState {
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains(name)
    }

    /// Routing state of the named index, or `None` if it does not exist
    pub fn index(&self, name: &str) -> Option<&IndexRoutingState> {
        self.indices.get(name)
    }
}

/// Shard-allocation state of a single index
#[derive(Debug, Clone)]
pub struct IndexRoutingState {
    pub all_primary_shards_active: bool,
}

/// A cluster-state change as delivered by the surrounding system
#[derive(Debug, Clone)]
pub struct ClusterChangedEvent {
    pub state: ClusterState,
}

//! In-memory realm-cache client
//!
//! Records every purge request so tests can assert on purge counts, and
//! supports failure injection for exercising the purge-failure path.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::realm::{ClearRealmCacheResponse, RealmCacheClient};
use crate::types::Username;

/// Realm-cache client for a single-process deployment
pub struct InMemoryRealmCache {
    requests: Mutex<Vec<Vec<Username>>>,
    fail: AtomicBool,
}

impl InMemoryRealmCache {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make subsequent purge requests fail until turned off again
    pub fn fail_requests(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every purge request received so far, in arrival order
    pub fn requests(&self) -> Vec<Vec<Username>> {
        self.requests.lock().clone()
    }
}

impl Default for InMemoryRealmCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealmCacheClient for InMemoryRealmCache {
    async fn clear_realm_cache(&self, usernames: &[Username]) -> Result<ClearRealmCacheResponse> {
        self.requests.lock().push(usernames.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable(
                "realm cache purge was rejected".to_string(),
            ));
        }
        Ok(ClearRealmCacheResponse {
            acknowledged_nodes: vec!["node_0".to_string()],
        })
    }
}

//! Store configuration
//!
//! The surrounding system owns settings loading; it constructs a
//! [`StoreConfig`] from whatever source it uses and hands it to the store.
//! Field documentation names the recognized settings keys.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Runtime settings for the native user store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Scroll page size for user scans (`authc.native.scroll.size`)
    pub scroll_size: usize,
    /// Scroll cursor TTL (`authc.native.scroll.keep_alive`)
    pub scroll_keep_alive: Duration,
    /// Fixed delay between poller iterations (`authc.native.reload.interval`)
    pub reload_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            scroll_size: 1000,
            scroll_keep_alive: Duration::from_secs(10),
            reload_interval: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Reject configurations the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scroll_size == 0 {
            return Err(Error::InvalidConfig(
                "scroll size must be greater than zero".to_string(),
            ));
        }
        if self.scroll_keep_alive.is_zero() {
            return Err(Error::InvalidConfig(
                "scroll keep-alive must be greater than zero".to_string(),
            ));
        }
        if self.reload_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "reload interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

//! Change-detection poller
//!
//! Periodically scans the user index, diffs the live `(username, version)`
//! set against the locally cached version map, and notifies registered
//! listeners about updated and deleted users. Runs at a fixed delay: the
//! next iteration is scheduled only after the previous one completes.

use async_std::task;
use log::{debug, error, trace};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::cluster::{SECURITY_INDEX_NAME, USER_DOC_TYPE};
use crate::docstore::{self, DocumentStore, Query, SearchRequest};
use crate::error::{Error, Result};
use crate::types::{State, Username};

use super::Shared;

/// Fixed-delay scheduler loop; exits once the store leaves the started
/// state or the loop's generation is superseded by a stop
pub(super) async fn run(shared: Arc<Shared>, generation: u64) {
    let interval = shared.config.reload_interval;
    loop {
        task::sleep(interval).await;
        if shared.poll_generation.load(Ordering::Acquire) != generation {
            break;
        }
        match shared.state.load() {
            State::Starting | State::Started => {}
            _ => break,
        }
        if let Err(e) = poll_once(&shared).await {
            error!(
                "error occurred while checking the native users for changes: {}",
                e
            );
        }
    }
}

/// One poll iteration
///
/// Listener failures are returned to the scheduler; everything else is
/// absorbed here or logged by the scheduler loop.
pub(super) async fn poll_once(shared: &Arc<Shared>) -> Result<()> {
    if shared.is_stopped() {
        return Ok(());
    }
    if !shared.index_ready.load(Ordering::Acquire) {
        trace!(
            "cannot poll for user changes since the security index [{}] does not exist",
            SECURITY_INDEX_NAME
        );
        return Ok(());
    }

    // Hold our own reference for the whole iteration: the poller may still
    // be running after the store is stopped, and the test-only reset
    // clears the slot.
    let client = match shared.client.read().clone() {
        Some(client) => client,
        None => return Ok(()),
    };

    trace!("starting poll of the user index to check for changes");

    let mut known_users: HashSet<Username> =
        shared.version_map.lock().keys().cloned().collect();

    let current = match collect_users_and_versions(shared, client.as_ref()).await? {
        Some(current) => current,
        // the store turned stopping mid-scroll; leave the version map alone
        None => return Ok(()),
    };

    // exit before comparing with known users
    if shared.is_stopped() {
        return Ok(());
    }

    let mut changed_users: Vec<Username> = Vec::new();
    {
        let mut version_map = shared.version_map.lock();
        for (username, version) in current {
            if known_users.remove(&username) {
                let last_known = version_map.get(&username).copied().unwrap_or(0);
                if version != last_known {
                    // versions assigned by the backing store only grow
                    debug_assert!(version > last_known);
                    version_map.insert(username.clone(), version);
                    // the user's cache may already have been cleared by the
                    // write path; a second purge downstream is harmless
                    changed_users.push(username);
                }
            } else {
                // first observation of this user: recorded, not published
                version_map.insert(username, version);
            }
        }

        // whatever is left was in our version map and has been deleted in
        // the backing store
        for username in known_users {
            version_map.remove(&username);
            changed_users.push(username);
        }
    }

    if changed_users.is_empty() {
        return Ok(());
    }

    debug!("changes detected for users {:?}", changed_users);

    let listeners = Arc::clone(&shared.listeners.read());
    let mut primary: Option<Error> = None;
    let mut suppressed: Vec<Error> = Vec::new();
    for listener in listeners.iter() {
        if let Err(e) = listener.on_users_changed(&changed_users) {
            if primary.is_none() {
                primary = Some(e);
            } else {
                suppressed.push(e);
            }
        }
    }

    match primary {
        None => Ok(()),
        Some(primary) => Err(Error::ListenerFailure {
            primary: Box::new(primary),
            suppressed,
        }),
    }
}

/// Scroll the live `(username, version)` set out of the user index
///
/// Returns `None` when the scan was aborted because the store is stopping.
/// A missing index yields whatever was collected so far (an empty snapshot
/// on the initial search), so deletions are still detected.
async fn collect_users_and_versions(
    shared: &Shared,
    client: &dyn DocumentStore,
) -> Result<Option<HashMap<Username, u64>>> {
    let request = SearchRequest {
        index: SECURITY_INDEX_NAME.to_string(),
        doc_type: USER_DOC_TYPE.to_string(),
        query: Query::DocType(USER_DOC_TYPE.to_string()),
        page_size: shared.config.scroll_size,
        keep_alive: shared.config.scroll_keep_alive,
        with_version: true,
        fetch_source: true,
        ignore_unavailable: false,
    };

    let mut current = HashMap::new();
    let mut aborted = false;
    let scan = docstore::scroll_all(client, request, |hits| {
        if shared.is_stopped() {
            aborted = true;
            return ControlFlow::Break(());
        }
        for hit in hits {
            if let Some(version) = hit.version {
                current.insert(hit.id.clone(), version);
            }
        }
        ControlFlow::Continue(())
    })
    .await;

    match scan {
        Ok(()) => {}
        Err(Error::IndexNotFound(_)) => {
            trace!("security index does not exist");
        }
        Err(e) => return Err(e),
    }

    if aborted {
        return Ok(None);
    }
    Ok(Some(current))
}

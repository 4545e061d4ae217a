//! Native user store
//!
//! A user store that reads from an index in the backing document store
//! instead of a local file or database. It owns the lifecycle of a
//! change-detection poller, rejects operations until started, and
//! coordinates realm-cache purges after mutations.
//!
//! No caching of verified credentials is done here; that is handled at a
//! higher level.

use async_std::task;
use futures::channel::oneshot;
use log::{debug, error, info, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cluster::{
    ClusterChangedEvent, ClusterState, SECURITY_INDEX_NAME, SECURITY_TEMPLATE_NAME, USER_DOC_TYPE,
};
use crate::config::StoreConfig;
use crate::docstore::{self, DocumentStore, Query, SearchRequest};
use crate::error::{Error, Result};
use crate::hasher::Hasher;
use crate::realm::RealmCacheClient;
use crate::record;
use crate::types::{DeleteUserRequest, PutUserRequest, State, User, UserAndPassword, Username};

mod poller;

/// How long the blocking read surface waits for the asynchronous lookup
const BLOCKING_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback invoked by the poller when user records change in the backing
/// index
pub trait ChangeListener: Send + Sync {
    /// Called with the usernames whose records were updated or deleted
    /// since the previous poll. The slice is shared across listeners and
    /// must not be assumed to outlive the call.
    fn on_users_changed(&self, changed: &[Username]) -> Result<()>;
}

/// Lifecycle state cell with compare-and-set transitions
struct AtomicState(AtomicU8);

impl AtomicState {
    fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn compare_and_set(&self, from: State, to: State) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// State shared between the store surface and the poller task
struct Shared {
    config: StoreConfig,
    client_provider: Arc<dyn DocumentStore>,
    realm_cache: Arc<dyn RealmCacheClient>,
    hasher: Hasher,
    state: AtomicState,
    /// True only while the security index exists with all primary shards
    /// active; gates the poller, not reads
    index_ready: AtomicBool,
    /// username -> last observed document version, mutated only by the
    /// poller (and the test-only reset)
    version_map: Mutex<HashMap<Username, u64>>,
    /// Copy-on-write listener list; registration swaps the vector so the
    /// poller iterates a stable snapshot
    listeners: RwLock<Arc<Vec<Arc<dyn ChangeListener>>>>,
    /// Backing client captured at start, cleared by reset
    client: RwLock<Option<Arc<dyn DocumentStore>>>,
    poller: Mutex<Option<task::JoinHandle<()>>>,
    /// Bumped by `stop()`; a scheduler loop only keeps running while its
    /// spawn-time snapshot still matches, so a superseded loop cannot
    /// resume after a reset/start cycle restores the started state
    poll_generation: AtomicU64,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        matches!(self.state.load(), State::Stopping | State::Stopped)
    }
}

/// User store backed by an indexed document store
#[derive(Clone)]
pub struct NativeUserStore {
    shared: Arc<Shared>,
}

impl NativeUserStore {
    pub fn new(
        client: Arc<dyn DocumentStore>,
        realm_cache: Arc<dyn RealmCacheClient>,
        config: StoreConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                client_provider: client,
                realm_cache,
                hasher: Hasher::Bcrypt,
                state: AtomicState::new(State::Initialized),
                index_ready: AtomicBool::new(false),
                version_map: Mutex::new(HashMap::new()),
                listeners: RwLock::new(Arc::new(Vec::new())),
                client: RwLock::new(None),
                poller: Mutex::new(None),
                poll_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> State {
        self.shared.state.load()
    }

    /// Register a change listener; listeners cannot be removed
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        let mut guard = self.shared.listeners.write();
        let mut list = (**guard).clone();
        list.push(listener);
        *guard = Arc::new(list);
    }

    /// Whether the store may transition out of its initial state given the
    /// current cluster state
    pub fn can_start(&self, cluster_state: &ClusterState, _is_master: bool) -> bool {
        if self.state() != State::Initialized {
            return false;
        }

        if !cluster_state.recovered_from_disk {
            // the security index may exist on disk but not yet be visible
            // in the cluster state
            debug!("native user store waiting until the cluster has recovered from disk");
            return false;
        }

        if !cluster_state.has_template(SECURITY_TEMPLATE_NAME) {
            debug!(
                "security template [{}] does not exist, so the native user store cannot start",
                SECURITY_TEMPLATE_NAME
            );
            return false;
        }

        match cluster_state.index(SECURITY_INDEX_NAME) {
            None => {
                debug!(
                    "security index [{}] does not exist, so the native user store can start",
                    SECURITY_INDEX_NAME
                );
                true
            }
            Some(routing) if routing.all_primary_shards_active => {
                debug!(
                    "security index [{}] has all primary shards started, so the native user store can start",
                    SECURITY_INDEX_NAME
                );
                true
            }
            Some(_) => false,
        }
    }

    /// Capture the backing client, perform one poll, and schedule the
    /// poller at a fixed delay
    ///
    /// A no-op unless the store is in its initial state. Start failures
    /// leave the store in the `Failed` state.
    pub async fn start(&self) {
        if !self
            .shared
            .state
            .compare_and_set(State::Initialized, State::Starting)
        {
            return;
        }
        match self.start_inner().await {
            Ok(()) => self.shared.state.set(State::Started),
            Err(e) => {
                error!("failed to start native user store: {}", e);
                self.shared.state.set(State::Failed);
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        self.shared.config.validate()?;
        *self.shared.client.write() = Some(Arc::clone(&self.shared.client_provider));

        if let Err(e) = poller::poll_once(&self.shared).await {
            warn!("failed to do initial poll of users: {}", e);
        }

        let generation = self.shared.poll_generation.load(Ordering::Acquire);
        let shared = Arc::clone(&self.shared);
        *self.shared.poller.lock() = Some(task::spawn(poller::run(shared, generation)));
        Ok(())
    }

    /// Cancel the scheduled poll and stop the store
    ///
    /// Best-effort: an in-flight poll iteration is not interrupted, it
    /// observes the state change at its next checkpoint and exits. The
    /// scheduler loop itself is superseded by the generation bump and
    /// exits at its next wake-up, even if the store has been reset and
    /// started again by then.
    pub fn stop(&self) {
        if self
            .shared
            .state
            .compare_and_set(State::Started, State::Stopping)
        {
            self.shared.poll_generation.fetch_add(1, Ordering::AcqRel);
            let _detached = self.shared.poller.lock().take();
            self.shared.state.set(State::Stopped);
        }
    }

    /// Track whether the security index is ready for polling
    pub fn on_cluster_changed(&self, event: &ClusterChangedEvent) {
        let ready = event
            .state
            .index(SECURITY_INDEX_NAME)
            .map(|routing| routing.all_primary_shards_active)
            .unwrap_or(false);
        if ready {
            debug!(
                "security index [{}] has all primary shards started, so polling can start",
                SECURITY_INDEX_NAME
            );
        }
        // always store the value, it may have changed
        self.shared.index_ready.store(ready, Ordering::Release);
    }

    /// Return the store to its initial state; test-only
    ///
    /// Only valid when stopped or failed. Clears the version map, the
    /// listener list, and the captured client.
    pub fn reset(&self) -> Result<()> {
        let state = self.state();
        if state != State::Stopped && state != State::Failed {
            return Err(Error::InvalidState(format!(
                "native user store can only be reset when stopped or failed, not {:?}",
                state
            )));
        }
        self.shared.version_map.lock().clear();
        *self.shared.listeners.write() = Arc::new(Vec::new());
        *self.shared.client.write() = None;
        self.shared.index_ready.store(false, Ordering::Release);
        self.shared.state.set(State::Initialized);
        Ok(())
    }

    /// Retrieve a single user
    ///
    /// Retrieval failures are suppressed: a missing index or an unavailable
    /// backing store yields `Ok(None)`, not an error.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        if self.state() != State::Started {
            trace!(
                "attempted to get user [{}] before the native user store was started",
                username
            );
            return Err(Error::NotStarted(
                "user cannot be retrieved as the native user store has not been started"
                    .to_string(),
            ));
        }
        Ok(self
            .get_user_and_password(username)
            .await?
            .map(UserAndPassword::into_user))
    }

    /// Blocking variant of [`get_user`](Self::get_user) with a bounded wait
    ///
    /// Returns `None` on timeout or any retrieval failure.
    pub fn get_user_blocking(&self, username: &str) -> Option<User> {
        if self.state() != State::Started {
            trace!(
                "attempted to get user [{}] before the native user store was started",
                username
            );
            return None;
        }
        self.get_user_and_password_blocking(username)
            .map(UserAndPassword::into_user)
    }

    /// Retrieve several users; an empty username list fetches all users
    pub async fn get_users(&self, usernames: &[Username]) -> Result<Vec<User>> {
        if self.state() != State::Started {
            trace!("attempted to get users before the native user store was started");
            return Err(Error::NotStarted(
                "users cannot be retrieved as the native user store has not been started"
                    .to_string(),
            ));
        }
        let client = self.client()?;

        let query = if usernames.is_empty() {
            Query::MatchAll
        } else {
            Query::Ids(usernames.to_vec())
        };
        let request = SearchRequest {
            index: SECURITY_INDEX_NAME.to_string(),
            doc_type: USER_DOC_TYPE.to_string(),
            query,
            page_size: self.shared.config.scroll_size,
            keep_alive: self.shared.config.scroll_keep_alive,
            with_version: false,
            fetch_source: true,
            ignore_unavailable: true,
        };

        let mut users = Vec::new();
        let scan = docstore::scroll_all(client.as_ref(), request, |hits| {
            for hit in hits {
                if let Some(source) = &hit.source {
                    if let Some(user) = record::decode_user(&hit.id, source) {
                        users.push(user.into_user());
                    }
                }
            }
            ControlFlow::Continue(())
        })
        .await;

        match scan {
            Ok(()) => Ok(users),
            Err(Error::IndexNotFound(_)) => {
                trace!("could not retrieve users because the security index does not exist");
                Ok(Vec::new())
            }
            Err(e) => {
                info!("failed to retrieve users: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Verify a username and plaintext password against the stored record
    ///
    /// Returns the user on success, `None` when the user is missing or the
    /// password does not match. The plaintext is used as given and not
    /// retained.
    pub fn verify_password(&self, username: &str, plaintext: &str) -> Option<User> {
        if self.state() != State::Started {
            trace!(
                "attempted to verify credentials for [{}] but the native user store was not started",
                username
            );
            return None;
        }
        let user = self.get_user_and_password_blocking(username)?;
        if self.shared.hasher.verify(plaintext, user.password_hash()) {
            Some(user.into_user())
        } else {
            None
        }
    }

    /// Create or fully replace a user document
    ///
    /// Returns whether the document was created. An update purges the realm
    /// caches for the username before the caller is acknowledged; a
    /// creation does not, since a fresh username cannot be cached anywhere.
    pub async fn put_user(&self, request: PutUserRequest) -> Result<bool> {
        if self.state() != State::Started {
            return Err(Error::NotStarted(
                "user cannot be added as the native user store has not been started".to_string(),
            ));
        }
        let client = self.client()?;

        let source = record::encode_user(&request);
        let outcome = client
            .index(
                SECURITY_INDEX_NAME,
                USER_DOC_TYPE,
                &request.username,
                source,
                request.refresh,
            )
            .await?;

        if outcome.created {
            return Ok(true);
        }
        self.clear_realm_cache(&request.username, outcome.created)
            .await
    }

    /// Delete a user document; returns whether one was found
    ///
    /// The realm caches are purged whether or not the user existed.
    pub async fn delete_user(&self, request: DeleteUserRequest) -> Result<bool> {
        if self.state() != State::Started {
            return Err(Error::NotStarted(
                "user cannot be deleted as the native user store has not been started".to_string(),
            ));
        }
        let client = self.client()?;

        let found = client
            .delete(
                SECURITY_INDEX_NAME,
                USER_DOC_TYPE,
                &request.username,
                request.refresh,
            )
            .await?;
        self.clear_realm_cache(&request.username, found).await
    }

    async fn clear_realm_cache<T>(&self, username: &str, response: T) -> Result<T> {
        match self
            .shared
            .realm_cache
            .clear_realm_cache(&[username.to_string()])
            .await
        {
            Ok(_) => Ok(response),
            Err(e) => {
                error!("unable to clear realm cache for user [{}]: {}", username, e);
                Err(Error::CachePurgeFailed {
                    username: username.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn get_user_and_password(&self, username: &str) -> Result<Option<UserAndPassword>> {
        let client = self.client()?;
        match client.get(SECURITY_INDEX_NAME, USER_DOC_TYPE, username).await {
            Ok(Some(document)) => Ok(record::decode_user(username, &document.source)),
            Ok(None) => Ok(None),
            Err(Error::IndexNotFound(_)) => {
                trace!(
                    "could not retrieve user [{}] because the security index does not exist",
                    username
                );
                Ok(None)
            }
            Err(e) => {
                info!("failed to retrieve user [{}]: {}", username, e);
                Ok(None)
            }
        }
    }

    fn get_user_and_password_blocking(&self, username: &str) -> Option<UserAndPassword> {
        let (tx, rx) = oneshot::channel();
        let store = self.clone();
        let username = username.to_string();
        task::spawn(async move {
            let _ = tx.send(store.get_user_and_password(&username).await);
        });

        match task::block_on(async_std::future::timeout(BLOCKING_READ_TIMEOUT, rx)) {
            Ok(Ok(Ok(user))) => user,
            Ok(Ok(Err(e))) => {
                info!("failed to retrieve user: {}", e);
                None
            }
            // the lookup task dropped its reply slot
            Ok(Err(_)) => None,
            Err(_) => {
                info!("timed out retrieving user");
                None
            }
        }
    }

    fn client(&self) -> Result<Arc<dyn DocumentStore>> {
        self.shared
            .client
            .read()
            .clone()
            .ok_or_else(|| Error::Internal("no backing client is available".to_string()))
    }
}

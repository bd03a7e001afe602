//! Optimistic synchronization between a membership store and the backend.
//!
//! Local state changes first, then the remote call runs; a failed remote
//! call is compensated locally. Membership checks always read the live
//! store inside the same atomic update that applies the change.

use std::sync::{Arc, Mutex, PoisonError};

use mercato_core::UserId;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, Identity, Keyed, MembershipBackend};

use super::inflight::InflightTracker;
use super::membership::MembershipState;
use super::reactive::Store;

/// State type held by a [`MembershipSync`] over backend `B`.
pub type StateOf<B> =
    MembershipState<<B as MembershipBackend>::Key, <B as MembershipBackend>::Entity>;

/// Errors surfaced by membership operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No signed-in identity; nothing was changed.
    #[error("Please sign in to use your {0}.")]
    NotAuthenticated(&'static str),

    /// The backend call failed; local state was rolled back.
    #[error("{message}")]
    Remote {
        /// User-facing message (also stored in the state's `error`).
        message: String,
        #[source]
        source: BackendError,
    },
}

/// What a membership operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Added,
    Removed,
    /// Already in the requested state; no remote call was made.
    Unchanged,
}

/// Binds a membership [`Store`] to a [`MembershipBackend`].
pub struct MembershipSync<B: MembershipBackend> {
    label: &'static str,
    backend: Arc<B>,
    store: Store<StateOf<B>>,
    inflight: InflightTracker<B::Key>,
    init_lock: tokio::sync::Mutex<()>,
    /// User whose list the store currently holds.
    owner: Mutex<Option<UserId>>,
}

impl<B: MembershipBackend> MembershipSync<B> {
    /// Create an empty, uninitialized sync. `label` names the collection in
    /// logs and user-facing messages (e.g. "wishlist").
    #[must_use]
    pub fn new(label: &'static str, backend: Arc<B>) -> Self {
        Self {
            label,
            backend,
            store: Store::default(),
            inflight: InflightTracker::new(),
            init_lock: tokio::sync::Mutex::new(()),
            owner: Mutex::new(None),
        }
    }

    /// The underlying store, for subscriptions.
    #[must_use]
    pub const fn store(&self) -> &Store<StateOf<B>> {
        &self.store
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<StateOf<B>> {
        self.store.get()
    }

    #[must_use]
    pub fn contains(&self, key: &B::Key) -> bool {
        self.store.read(|s| s.contains(key))
    }

    /// Bind the store to `identity`, discarding a list held for anyone else.
    fn claim(&self, identity: &Identity) {
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if owner.as_ref() == Some(identity.user_id()) {
            return;
        }
        if owner.is_some() {
            self.store.set(MembershipState::default());
            info!("Identity changed, discarded previous list");
        }
        *owner = Some(identity.user_id().clone());
    }

    fn remote_error(&self, source: BackendError) -> SyncError {
        SyncError::Remote {
            message: format!(
                "We couldn't update your {}. {}",
                self.label,
                source.user_message()
            ),
            source,
        }
    }

    /// Populate the store from the backend once per identity session.
    ///
    /// Without an identity this is a no-op. Repeated or concurrent calls
    /// after the first successful load return immediately. A call for a
    /// different user than the one loaded clears the store and reloads.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the fetch fails; the message is also
    /// recorded in the state's `error`.
    #[instrument(skip(self, identity), fields(list = self.label))]
    pub async fn initialize(&self, identity: Option<&Identity>) -> Result<(), SyncError> {
        let Some(identity) = identity else {
            debug!("No identity, skipping initialization");
            return Ok(());
        };
        self.claim(identity);
        if self.store.read(|s| s.initialized) {
            return Ok(());
        }

        let _init = self.init_lock.lock().await;
        // Another caller may have finished loading while we waited.
        if self.store.read(|s| s.initialized) {
            return Ok(());
        }

        self.store.update(MembershipState::loading_started);

        match self.backend.fetch_all(identity).await {
            Ok(entities) => {
                let count = entities.len();
                self.store.update(|s| s.loaded(entities));
                info!(count, "Membership store initialized");
                Ok(())
            }
            Err(e) => {
                let err = SyncError::Remote {
                    message: format!("We couldn't load your {}. {}", self.label, e.user_message()),
                    source: e,
                };
                let message = err.to_string();
                self.store.update(|s| s.load_failed(&message));
                tracing::error!(error = ?err, "Failed to load membership store");
                Err(err)
            }
        }
    }

    /// Add `key` optimistically.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without an identity; `Remote` after rollback when
    /// the backend rejects the change.
    pub async fn add(
        &self,
        identity: Option<&Identity>,
        key: &B::Key,
    ) -> Result<SyncOutcome, SyncError> {
        let identity = identity.ok_or(SyncError::NotAuthenticated(self.label))?;
        self.claim(identity);
        let _guard = self.inflight.acquire(key).await;
        self.add_locked(identity, key.clone(), None).await
    }

    /// Add an entity optimistically, caching it alongside its key.
    ///
    /// # Errors
    ///
    /// Same as [`MembershipSync::add`].
    pub async fn add_entity(
        &self,
        identity: Option<&Identity>,
        entity: B::Entity,
    ) -> Result<SyncOutcome, SyncError> {
        let identity = identity.ok_or(SyncError::NotAuthenticated(self.label))?;
        self.claim(identity);
        let key = entity.key().clone();
        let _guard = self.inflight.acquire(&key).await;
        self.add_locked(identity, key, Some(entity)).await
    }

    /// Remove `key` optimistically, restoring the full prior set on failure.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without an identity; `Remote` after rollback when
    /// the backend rejects the change.
    pub async fn remove(
        &self,
        identity: Option<&Identity>,
        key: &B::Key,
    ) -> Result<SyncOutcome, SyncError> {
        let identity = identity.ok_or(SyncError::NotAuthenticated(self.label))?;
        self.claim(identity);
        let _guard = self.inflight.acquire(key).await;
        self.remove_locked(identity, key).await
    }

    /// Add when absent, remove when present.
    ///
    /// Membership is read after any queued operation on the same key has
    /// settled.
    ///
    /// # Errors
    ///
    /// Same as [`MembershipSync::add`] / [`MembershipSync::remove`].
    pub async fn toggle(
        &self,
        identity: Option<&Identity>,
        key: &B::Key,
    ) -> Result<SyncOutcome, SyncError> {
        let identity = identity.ok_or(SyncError::NotAuthenticated(self.label))?;
        self.claim(identity);
        let _guard = self.inflight.acquire(key).await;

        if self.contains(key) {
            self.remove_locked(identity, key).await
        } else {
            self.add_locked(identity, key.clone(), None).await
        }
    }

    /// Like [`MembershipSync::toggle`], caching `entity` when it is added.
    ///
    /// # Errors
    ///
    /// Same as [`MembershipSync::toggle`].
    pub async fn toggle_entity(
        &self,
        identity: Option<&Identity>,
        entity: B::Entity,
    ) -> Result<SyncOutcome, SyncError> {
        let identity = identity.ok_or(SyncError::NotAuthenticated(self.label))?;
        self.claim(identity);
        let key = entity.key().clone();
        let _guard = self.inflight.acquire(&key).await;

        if self.contains(&key) {
            self.remove_locked(identity, &key).await
        } else {
            self.add_locked(identity, key, Some(entity)).await
        }
    }

    /// Clear everything back to the initial empty state (sign-out).
    #[instrument(skip(self), fields(list = self.label))]
    pub fn reset(&self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.store.set(MembershipState::default());
        debug!("Membership store reset");
    }

    #[instrument(skip(self, identity, entity), fields(list = self.label, key = %key))]
    async fn add_locked(
        &self,
        identity: &Identity,
        key: B::Key,
        entity: Option<B::Entity>,
    ) -> Result<SyncOutcome, SyncError> {
        let applied = self.store.update_if(|s| {
            if s.contains(&key) {
                None
            } else {
                Some(s.with_member(key.clone(), entity))
            }
        });
        if !applied {
            debug!("Already a member, nothing to do");
            return Ok(SyncOutcome::Unchanged);
        }

        match self.backend.add_membership(identity, &key).await {
            Ok(()) => {
                debug!("Added");
                Ok(SyncOutcome::Added)
            }
            Err(e) => {
                let err = self.remote_error(e);
                let message = err.to_string();
                self.store.update(|s| s.without_member(&key).with_error(&message));
                warn!(error = ?err, "Add failed, rolled back");
                Err(err)
            }
        }
    }

    #[instrument(skip(self, identity), fields(list = self.label, key = %key))]
    async fn remove_locked(
        &self,
        identity: &Identity,
        key: &B::Key,
    ) -> Result<SyncOutcome, SyncError> {
        // Removal also drops the cached entity, which a single re-add could
        // not restore, so the whole set is saved.
        let mut snapshot = None;
        let applied = self.store.update_if(|s| {
            if s.contains(key) {
                snapshot = Some(s.snapshot());
                Some(s.without_member(key))
            } else {
                None
            }
        });
        let Some(snapshot) = snapshot.filter(|_| applied) else {
            debug!("Not a member, nothing to do");
            return Ok(SyncOutcome::Unchanged);
        };

        match self.backend.remove_membership(identity, key).await {
            Ok(()) => {
                debug!("Removed");
                Ok(SyncOutcome::Removed)
            }
            Err(e) => {
                let err = self.remote_error(e);
                let message = err.to_string();
                self.store.update(|s| s.restored(snapshot).with_error(&message));
                warn!(error = ?err, "Remove failed, restored previous set");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::backend::Keyed;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        id: String,
    }

    impl Keyed for Item {
        type Key = String;

        fn key(&self) -> &String {
            &self.id
        }
    }

    fn item(id: &str) -> Item {
        Item { id: id.to_string() }
    }

    /// In-memory backend with switchable failures and call counting.
    #[derive(Default)]
    struct FakeBackend {
        remote: Mutex<Vec<Item>>,
        fail: AtomicBool,
        delay: Option<Duration>,
        fetches: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FakeBackend {
        fn with_items(ids: &[&str]) -> Self {
            Self {
                remote: Mutex::new(ids.iter().map(|id| item(id)).collect()),
                ..Self::default()
            }
        }

        fn failure() -> BackendError {
            BackendError::Api {
                status: 500,
                message: "boom".to_string(),
            }
        }
    }

    impl MembershipBackend for FakeBackend {
        type Key = String;
        type Entity = Item;

        async fn fetch_all(&self, _identity: &Identity) -> Result<Vec<Item>, BackendError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            Ok(self.remote.lock().unwrap().clone())
        }

        async fn add_membership(
            &self,
            _identity: &Identity,
            key: &String,
        ) -> Result<(), BackendError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            self.remote.lock().unwrap().push(item(key));
            Ok(())
        }

        async fn remove_membership(
            &self,
            _identity: &Identity,
            key: &String,
        ) -> Result<(), BackendError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            self.remote.lock().unwrap().retain(|i| &i.id != key);
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity::new(UserId::parse("u1").unwrap(), "token")
    }

    fn ids(sync: &MembershipSync<FakeBackend>) -> HashSet<String> {
        (*sync.state().ids).clone()
    }

    fn entities(sync: &MembershipSync<FakeBackend>) -> Vec<Item> {
        (*sync.state().entities).clone()
    }

    async fn loaded(backend: FakeBackend) -> (Arc<FakeBackend>, MembershipSync<FakeBackend>) {
        let backend = Arc::new(backend);
        let sync = MembershipSync::new("wishlist", Arc::clone(&backend));
        sync.initialize(Some(&identity())).await.unwrap();
        (backend, sync)
    }

    #[tokio::test]
    async fn test_initialize_loads_remote_set() {
        let (backend, sync) = loaded(FakeBackend::with_items(&["a", "b"])).await;
        let state = sync.state();
        assert!(state.initialized);
        assert!(!state.loading);
        assert_eq!(ids(&sync), HashSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);

        // Second call is suppressed by the initialized flag.
        sync.initialize(Some(&identity())).await.unwrap();
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_fetches_once() {
        let backend = Arc::new(FakeBackend {
            delay: Some(Duration::from_millis(20)),
            ..FakeBackend::with_items(&["a"])
        });
        let sync = MembershipSync::new("wishlist", Arc::clone(&backend));
        let identity = identity();

        let (first, second) = tokio::join!(
            sync.initialize(Some(&identity)),
            sync.initialize(Some(&identity))
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_initialize_without_identity_is_noop() {
        let backend = Arc::new(FakeBackend::with_items(&["a"]));
        let sync = MembershipSync::new("wishlist", Arc::clone(&backend));
        sync.initialize(None).await.unwrap();
        assert!(!sync.state().initialized);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initialize_failure_records_error() {
        let backend = FakeBackend::default();
        backend.fail.store(true, Ordering::SeqCst);
        let sync = MembershipSync::new("wishlist", Arc::new(backend));

        let result = sync.initialize(Some(&identity())).await;
        assert!(matches!(result, Err(SyncError::Remote { .. })));
        let state = sync.state();
        assert!(!state.initialized);
        assert!(!state.loading);
        assert!(state.error.as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_add_without_identity_changes_nothing() {
        let (backend, sync) = loaded(FakeBackend::default()).await;
        let result = sync.add(None, &"a".to_string()).await;
        assert!(matches!(result, Err(SyncError::NotAuthenticated("wishlist"))));
        assert!(ids(&sync).is_empty());
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_present_item_makes_no_remote_call() {
        let (backend, sync) = loaded(FakeBackend::with_items(&["a"])).await;
        let outcome = sync.add(Some(&identity()), &"a".to_string()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_failure_rolls_back() {
        let (backend, sync) = loaded(FakeBackend::with_items(&["a"])).await;
        let before_ids = ids(&sync);
        let before_entities = entities(&sync);
        backend.fail.store(true, Ordering::SeqCst);

        let result = sync.add_entity(Some(&identity()), item("b")).await;
        assert!(matches!(result, Err(SyncError::Remote { .. })));
        assert_eq!(ids(&sync), before_ids);
        assert_eq!(entities(&sync), before_entities);
        assert!(sync.state().error.is_some());
    }

    #[tokio::test]
    async fn test_add_is_visible_before_remote_completes() {
        let backend = FakeBackend {
            delay: Some(Duration::from_millis(50)),
            ..FakeBackend::default()
        };
        let (_backend, sync) = loaded(backend).await;
        let sync = Arc::new(sync);

        let task = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.add(Some(&identity()), &"x".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sync.contains(&"x".to_string()));

        assert_eq!(task.await.unwrap().unwrap(), SyncOutcome::Added);
        assert!(sync.contains(&"x".to_string()));
    }

    #[tokio::test]
    async fn test_remove_scenario_success() {
        let (_backend, sync) = loaded(FakeBackend::with_items(&["A", "B"])).await;
        let outcome = sync
            .remove(Some(&identity()), &"B".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Removed);
        assert_eq!(ids(&sync), HashSet::from(["A".to_string()]));
        assert_eq!(entities(&sync), vec![item("A")]);
    }

    #[tokio::test]
    async fn test_remove_scenario_failure_restores_snapshot() {
        let (backend, sync) = loaded(FakeBackend::with_items(&["A", "B"])).await;
        backend.fail.store(true, Ordering::SeqCst);

        let result = sync.remove(Some(&identity()), &"B".to_string()).await;
        assert!(matches!(result, Err(SyncError::Remote { .. })));
        assert_eq!(
            ids(&sync),
            HashSet::from(["A".to_string(), "B".to_string()])
        );
        assert_eq!(entities(&sync), vec![item("A"), item("B")]);
    }

    #[tokio::test]
    async fn test_remove_absent_item_is_noop() {
        let (backend, sync) = loaded(FakeBackend::with_items(&["A"])).await;
        let outcome = sync
            .remove(Some(&identity()), &"Z".to_string())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_toggle_is_its_own_inverse() {
        let (_backend, sync) = loaded(FakeBackend::with_items(&["a"])).await;
        let before = ids(&sync);
        let key = "b".to_string();

        assert_eq!(
            sync.toggle(Some(&identity()), &key).await.unwrap(),
            SyncOutcome::Added
        );
        assert_eq!(
            sync.toggle(Some(&identity()), &key).await.unwrap(),
            SyncOutcome::Removed
        );
        assert_eq!(ids(&sync), before);
    }

    #[tokio::test]
    async fn test_toggle_entity_caches_entity() {
        let (_backend, sync) = loaded(FakeBackend::default()).await;

        let outcome = sync.toggle_entity(Some(&identity()), item("x")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Added);
        assert_eq!(entities(&sync), vec![item("x")]);

        let outcome = sync.toggle_entity(Some(&identity()), item("x")).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Removed);
        assert!(entities(&sync).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_toggles_on_same_key_serialize() {
        let backend = FakeBackend {
            delay: Some(Duration::from_millis(20)),
            ..FakeBackend::default()
        };
        let (backend, sync) = loaded(backend).await;
        let identity = identity();
        let key = "k".to_string();

        let (first, second) = tokio::join!(
            sync.toggle(Some(&identity), &key),
            sync.toggle(Some(&identity), &key)
        );
        assert_eq!(first.unwrap(), SyncOutcome::Added);
        assert_eq!(second.unwrap(), SyncOutcome::Removed);
        assert!(!sync.contains(&key));
        assert!(backend.remote.lock().unwrap().is_empty());
        assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let (_backend, sync) = loaded(FakeBackend::with_items(&["a", "b"])).await;
        sync.reset();
        let state = sync.state();
        assert!(state.ids.is_empty());
        assert!(state.entities.is_empty());
        assert!(!state.loading);
        assert!(!state.initialized);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_initialize_for_other_user_discards_previous_list() {
        let (backend, sync) = loaded(FakeBackend::with_items(&["a"])).await;
        sync.add(Some(&identity()), &"b".to_string()).await.unwrap();

        backend.remote.lock().unwrap().clear();
        let other = Identity::new(UserId::parse("u2").unwrap(), "token-2");
        sync.initialize(Some(&other)).await.unwrap();

        assert!(ids(&sync).is_empty());
        assert!(entities(&sync).is_empty());
        assert!(sync.state().initialized);
        assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mutation_for_other_user_starts_from_empty() {
        let (_backend, sync) = loaded(FakeBackend::with_items(&["a", "b"])).await;
        let other = Identity::new(UserId::parse("u2").unwrap(), "token-2");

        let outcome = sync.add(Some(&other), &"c".to_string()).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Added);
        assert_eq!(ids(&sync), HashSet::from(["c".to_string()]));
    }

    #[tokio::test]
    async fn test_successful_mutation_clears_previous_error() {
        let (backend, sync) = loaded(FakeBackend::default()).await;
        backend.fail.store(true, Ordering::SeqCst);
        let _ = sync.add(Some(&identity()), &"a".to_string()).await;
        assert!(sync.state().error.is_some());

        backend.fail.store(false, Ordering::SeqCst);
        sync.add(Some(&identity()), &"a".to_string()).await.unwrap();
        assert!(sync.state().error.is_none());
    }
}

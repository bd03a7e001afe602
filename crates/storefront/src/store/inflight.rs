//! Per-key in-flight operation tracking.
//!
//! Operations on the same key queue behind one async lock, held across the
//! remote call. A second toggle of a product therefore runs its membership
//! check only after the first toggle has settled, rollback included.
//! Operations on different keys do not wait for each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Queue lock for one key, with the number of holders and waiters.
struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    claims: usize,
}

type SlotMap<K> = HashMap<K, Slot>;
type Slots<K> = Arc<Mutex<SlotMap<K>>>;

/// Tracks which keys have an operation running or queued.
pub struct InflightTracker<K> {
    slots: Slots<K>,
}

impl<K> Default for InflightTracker<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Clone + Eq + Hash> InflightTracker<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slots(slots: &Mutex<SlotMap<K>>) -> MutexGuard<'_, SlotMap<K>> {
        slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive use of `key`.
    ///
    /// Dropping the returned future while it waits gives up the place in
    /// the queue and forgets the key if nobody else wants it.
    pub async fn acquire(&self, key: &K) -> InflightGuard<K> {
        let lock = {
            let mut slots = Self::lock_slots(&self.slots);
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::default(),
                claims: 0,
            });
            slot.claims += 1;
            Arc::clone(&slot.lock)
        };

        let mut held = InflightGuard {
            key: key.clone(),
            slots: Arc::clone(&self.slots),
            guard: None,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    /// Whether an operation on `key` is running or queued.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        Self::lock_slots(&self.slots).contains_key(key)
    }

    /// Number of keys with running or queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        Self::lock_slots(&self.slots).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claim on one key, exclusive once acquired. Releases the key and, when
/// nobody else is waiting for it, forgets the key on drop.
pub struct InflightGuard<K: Clone + Eq + Hash> {
    key: K,
    slots: Slots<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Clone + Eq + Hash> Drop for InflightGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut slots = InflightTracker::<K>::lock_slots(&self.slots);
        let released = slots.get_mut(&self.key).is_some_and(|slot| {
            slot.claims = slot.claims.saturating_sub(1);
            slot.claims == 0
        });
        if released {
            slots.remove(&self.key);
        }
    }
}

//! Membership state: an identifier set plus its cached entities.
//!
//! All mutators are pure: they take `&self` and return the next state.
//! Slices that a mutator does not touch keep their `Arc` allocation, so
//! slice watchers on untouched slices stay asleep.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::Keyed;

/// Lifecycle of a membership store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninitialized,
    Loading,
    Ready,
    Error,
}

/// State of a user-scoped membership collection (e.g. a wishlist).
#[derive(Debug)]
pub struct MembershipState<K, E> {
    /// Member keys.
    pub ids: Arc<HashSet<K>>,
    /// Cached entities, one per member key when populated.
    pub entities: Arc<Vec<E>>,
    pub loading: bool,
    pub initialized: bool,
    /// Last user-facing error, cleared by the next successful mutation.
    pub error: Option<Arc<str>>,
}

/// Saved identifier set and entity list, used to undo a removal.
#[derive(Debug)]
pub struct MembershipSnapshot<K, E> {
    ids: Arc<HashSet<K>>,
    entities: Arc<Vec<E>>,
}

impl<K, E> Clone for MembershipState<K, E> {
    fn clone(&self) -> Self {
        Self {
            ids: Arc::clone(&self.ids),
            entities: Arc::clone(&self.entities),
            loading: self.loading,
            initialized: self.initialized,
            error: self.error.clone(),
        }
    }
}

impl<K, E> Default for MembershipState<K, E> {
    fn default() -> Self {
        Self {
            ids: Arc::new(HashSet::new()),
            entities: Arc::new(Vec::new()),
            loading: false,
            initialized: false,
            error: None,
        }
    }
}

impl<K, E> MembershipState<K, E>
where
    K: Clone + Eq + Hash,
    E: Keyed<Key = K> + Clone,
{
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.ids.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        if self.loading {
            Lifecycle::Loading
        } else if self.initialized {
            Lifecycle::Ready
        } else if self.error.is_some() {
            Lifecycle::Error
        } else {
            Lifecycle::Uninitialized
        }
    }

    /// Mark a fetch as started.
    #[must_use]
    pub fn loading_started(&self) -> Self {
        Self {
            loading: true,
            error: None,
            ..self.clone()
        }
    }

    /// Replace identifiers and entities with a freshly fetched set.
    #[must_use]
    pub fn loaded(&self, entities: Vec<E>) -> Self {
        let mut seen = HashSet::with_capacity(entities.len());
        let entities: Vec<E> = entities
            .into_iter()
            .filter(|e| seen.insert(e.key().clone()))
            .collect();

        Self {
            ids: Arc::new(seen),
            entities: Arc::new(entities),
            loading: false,
            initialized: true,
            error: None,
        }
    }

    /// Mark a fetch as failed.
    #[must_use]
    pub fn load_failed(&self, message: &str) -> Self {
        Self {
            loading: false,
            error: Some(Arc::from(message)),
            ..self.clone()
        }
    }

    /// Add `key`, and its entity if known.
    #[must_use]
    pub fn with_member(&self, key: K, entity: Option<E>) -> Self {
        let mut ids = (*self.ids).clone();
        ids.insert(key.clone());

        let entities = match entity {
            Some(entity) if !self.entities.iter().any(|e| e.key() == &key) => {
                let mut entities = (*self.entities).clone();
                entities.push(entity);
                Arc::new(entities)
            }
            _ => Arc::clone(&self.entities),
        };

        Self {
            ids: Arc::new(ids),
            entities,
            error: None,
            ..self.clone()
        }
    }

    /// Remove `key` and any entity cached for it.
    #[must_use]
    pub fn without_member(&self, key: &K) -> Self {
        let mut ids = (*self.ids).clone();
        ids.remove(key);

        let entities = if self.entities.iter().any(|e| e.key() == key) {
            Arc::new(
                self.entities
                    .iter()
                    .filter(|e| e.key() != key)
                    .cloned()
                    .collect(),
            )
        } else {
            Arc::clone(&self.entities)
        };

        Self {
            ids: Arc::new(ids),
            entities,
            error: None,
            ..self.clone()
        }
    }

    /// Capture the identifier set and entity list.
    #[must_use]
    pub fn snapshot(&self) -> MembershipSnapshot<K, E> {
        MembershipSnapshot {
            ids: Arc::clone(&self.ids),
            entities: Arc::clone(&self.entities),
        }
    }

    /// Put back a snapshot taken earlier.
    #[must_use]
    pub fn restored(&self, snapshot: MembershipSnapshot<K, E>) -> Self {
        Self {
            ids: snapshot.ids,
            entities: snapshot.entities,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_error(&self, message: &str) -> Self {
        Self {
            error: Some(Arc::from(message)),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Item {
        id: &'static str,
    }

    impl Keyed for Item {
        type Key = &'static str;

        fn key(&self) -> &&'static str {
            &self.id
        }
    }

    type State = MembershipState<&'static str, Item>;

    fn item(id: &'static str) -> Item {
        Item { id }
    }

    #[test]
    fn test_default_is_uninitialized() {
        let state = State::default();
        assert!(state.is_empty());
        assert_eq!(state.lifecycle(), Lifecycle::Uninitialized);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let state = State::default().loading_started();
        assert_eq!(state.lifecycle(), Lifecycle::Loading);

        let failed = state.load_failed("boom");
        assert_eq!(failed.lifecycle(), Lifecycle::Error);

        let ready = failed.loading_started().loaded(vec![item("a")]);
        assert_eq!(ready.lifecycle(), Lifecycle::Ready);
        assert!(ready.error.is_none());
    }

    #[test]
    fn test_loaded_dedupes_entities() {
        let state = State::default().loaded(vec![item("a"), item("b"), item("a")]);
        assert_eq!(state.len(), 2);
        assert_eq!(*state.entities, vec![item("a"), item("b")]);
    }

    #[test]
    fn test_with_member_keeps_entities_when_none() {
        let state = State::default().loaded(vec![item("a")]);
        let next = state.with_member("b", None);
        assert!(next.contains(&"b"));
        assert!(Arc::ptr_eq(&state.entities, &next.entities));
        assert!(!Arc::ptr_eq(&state.ids, &next.ids));
    }

    #[test]
    fn test_without_member_drops_entity() {
        let state = State::default().loaded(vec![item("a"), item("b")]);
        let next = state.without_member(&"b");
        assert!(!next.contains(&"b"));
        assert_eq!(*next.entities, vec![item("a")]);
    }

    #[test]
    fn test_snapshot_restores_both_slices() {
        let state = State::default().loaded(vec![item("a"), item("b")]);
        let snapshot = state.snapshot();
        let removed = state.without_member(&"b").with_error("failed");
        let restored = removed.restored(snapshot);

        assert!(Arc::ptr_eq(&restored.ids, &state.ids));
        assert!(Arc::ptr_eq(&restored.entities, &state.entities));
        assert_eq!(restored.error.as_deref(), Some("failed"));
    }

    #[test]
    fn test_mutators_leave_original_untouched() {
        let state = State::default().loaded(vec![item("a")]);
        let _ = state.with_member("b", Some(item("b")));
        let _ = state.without_member(&"a");
        assert_eq!(state.len(), 1);
        assert_eq!(*state.entities, vec![item("a")]);
    }
}

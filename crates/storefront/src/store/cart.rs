//! Shopping cart state mirrored to durable per-session storage.
//!
//! The cart never touches the record backend until checkout. Its reactive
//! store is the working copy; a [`CartMirror`] keeps a durable copy so a
//! cart survives the in-memory store being evicted.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use mercato_core::ProductId;

use super::reactive::Store;

/// Upper bound for a single line's quantity.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Cart contents. At most one line per product, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub lines: Vec<CartLine>,
}

impl CartState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    #[must_use]
    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    /// Add a line, merging quantity into an existing line for the product.
    /// Quantities are clamped to `1..=MAX_LINE_QUANTITY`.
    #[must_use]
    pub fn with_item(&self, line: CartLine) -> Self {
        let mut lines = self.lines.clone();
        match lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .saturating_add(line.quantity)
                    .clamp(1, MAX_LINE_QUANTITY);
                // Keep the latest name/price/image shown for the product.
                existing.name = line.name;
                existing.unit_price = line.unit_price;
                existing.image = line.image;
            }
            None => lines.push(CartLine {
                quantity: line.quantity.clamp(1, MAX_LINE_QUANTITY),
                ..line
            }),
        }
        Self { lines }
    }

    /// Set a line's quantity. Zero removes the line; unknown products are
    /// ignored.
    #[must_use]
    pub fn with_quantity(&self, product_id: &ProductId, quantity: u32) -> Self {
        if quantity == 0 {
            return self.without_item(product_id);
        }
        let lines = self
            .lines
            .iter()
            .map(|l| {
                if &l.product_id == product_id {
                    CartLine {
                        quantity: quantity.min(MAX_LINE_QUANTITY),
                        ..l.clone()
                    }
                } else {
                    l.clone()
                }
            })
            .collect();
        Self { lines }
    }

    #[must_use]
    pub fn without_item(&self, product_id: &ProductId) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .filter(|l| &l.product_id != product_id)
                .cloned()
                .collect(),
        }
    }
}

/// Error from a cart mirror.
#[derive(Debug, Error)]
#[error("cart mirror error: {0}")]
pub struct MirrorError(pub String);

/// Durable copy of a cart (the session, in the server).
pub trait CartMirror: Send + Sync {
    /// Load the saved cart, if any.
    fn load(&self) -> impl Future<Output = Result<Option<CartState>, MirrorError>> + Send;

    /// Save the cart.
    fn save(&self, state: &CartState) -> impl Future<Output = Result<(), MirrorError>> + Send;
}

/// Reactive cart store.
#[derive(Default)]
pub struct CartStore {
    store: Store<CartState>,
    hydrated: AtomicBool,
    hydrate_lock: tokio::sync::Mutex<()>,
}

impl CartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn store(&self) -> &Store<CartState> {
        &self.store
    }

    #[must_use]
    pub fn state(&self) -> Arc<CartState> {
        self.store.get()
    }

    /// Load the mirrored cart the first time this store is used.
    ///
    /// Concurrent callers wait for the one load in progress. A mirror that
    /// cannot be read leaves the cart empty.
    pub async fn hydrate(&self, mirror: &impl CartMirror) -> Arc<CartState> {
        if self.hydrated.load(Ordering::Acquire) {
            return self.state();
        }
        let _load = self.hydrate_lock.lock().await;
        if self.hydrated.load(Ordering::Acquire) {
            return self.state();
        }

        match mirror.load().await {
            Ok(Some(saved)) => {
                debug!(lines = saved.lines.len(), "Cart hydrated from mirror");
                self.store.set(saved);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to load mirrored cart"),
        }
        self.hydrated.store(true, Ordering::Release);
        self.state()
    }

    async fn commit(
        &self,
        mirror: &impl CartMirror,
        f: impl FnOnce(&CartState) -> CartState,
    ) -> Arc<CartState> {
        self.store.update(f);
        let state = self.state();
        if let Err(e) = mirror.save(&state).await {
            warn!(error = %e, "Failed to mirror cart");
        }
        state
    }

    #[instrument(
        skip(self, mirror, line),
        fields(product = %line.product_id, quantity = line.quantity)
    )]
    pub async fn add_item(&self, mirror: &impl CartMirror, line: CartLine) -> Arc<CartState> {
        self.commit(mirror, |s| s.with_item(line)).await
    }

    #[instrument(skip(self, mirror))]
    pub async fn set_quantity(
        &self,
        mirror: &impl CartMirror,
        product_id: &ProductId,
        quantity: u32,
    ) -> Arc<CartState> {
        self.commit(mirror, |s| s.with_quantity(product_id, quantity)).await
    }

    #[instrument(skip(self, mirror))]
    pub async fn remove_item(
        &self,
        mirror: &impl CartMirror,
        product_id: &ProductId,
    ) -> Arc<CartState> {
        self.commit(mirror, |s| s.without_item(product_id)).await
    }

    #[instrument(skip(self, mirror))]
    pub async fn clear(&self, mirror: &impl CartMirror) -> Arc<CartState> {
        self.commit(mirror, |_| CartState::default()).await
    }

    /// Drop the in-memory cart without touching the mirror.
    pub fn reset(&self) {
        self.store.set(CartState::default());
        self.hydrated.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryMirror {
        saved: Mutex<Option<CartState>>,
        fail: bool,
        load_delay: Option<Duration>,
        loads: AtomicUsize,
    }

    impl CartMirror for MemoryMirror {
        async fn load(&self) -> Result<Option<CartState>, MirrorError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.load_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(MirrorError("unavailable".to_string()));
            }
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, state: &CartState) -> Result<(), MirrorError> {
            if self.fail {
                return Err(MirrorError("unavailable".to_string()));
            }
            *self.saved.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    fn line(id: &str, cents: i64, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::parse(id).unwrap(),
            name: format!("Product {id}"),
            unit_price: Decimal::new(cents, 2),
            quantity,
            image: None,
        }
    }

    fn pid(id: &str) -> ProductId {
        ProductId::parse(id).unwrap()
    }

    #[test]
    fn test_with_item_merges_quantity() {
        let state = CartState::default()
            .with_item(line("a", 500, 1))
            .with_item(line("a", 500, 2))
            .with_item(line("b", 250, 1));
        assert_eq!(state.lines.len(), 2);
        assert_eq!(state.line(&pid("a")).unwrap().quantity, 3);
        assert_eq!(state.item_count(), 4);
        assert_eq!(state.subtotal(), Decimal::new(1750, 2));
    }

    #[test]
    fn test_quantity_clamped() {
        let state = CartState::default()
            .with_item(line("a", 100, 0))
            .with_item(line("b", 100, 500));
        assert_eq!(state.line(&pid("a")).unwrap().quantity, 1);
        assert_eq!(state.line(&pid("b")).unwrap().quantity, MAX_LINE_QUANTITY);

        let merged = state.with_item(line("b", 100, 5));
        assert_eq!(merged.line(&pid("b")).unwrap().quantity, MAX_LINE_QUANTITY);
    }

    #[test]
    fn test_with_quantity_zero_removes() {
        let state = CartState::default().with_item(line("a", 100, 2));
        assert!(state.with_quantity(&pid("a"), 0).is_empty());
        assert_eq!(
            state.with_quantity(&pid("a"), 7).line(&pid("a")).unwrap().quantity,
            7
        );
        assert_eq!(state.with_quantity(&pid("zzz"), 3), state);
    }

    #[tokio::test]
    async fn test_mutations_are_mirrored() {
        let mirror = MemoryMirror::default();
        let cart = CartStore::new();
        cart.add_item(&mirror, line("a", 100, 1)).await;
        cart.add_item(&mirror, line("b", 200, 1)).await;
        cart.remove_item(&mirror, &pid("a")).await;

        let saved = mirror.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved, *cart.state());
        assert_eq!(saved.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_loads_once() {
        let mirror = MemoryMirror::default();
        *mirror.saved.lock().unwrap() = Some(CartState::default().with_item(line("a", 100, 2)));

        let cart = CartStore::new();
        assert_eq!(cart.hydrate(&mirror).await.item_count(), 2);

        // Later mirror contents are not re-read.
        *mirror.saved.lock().unwrap() = None;
        assert_eq!(cart.hydrate(&mirror).await.item_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_keeps_every_mutation() {
        let mirror = MemoryMirror {
            saved: Mutex::new(Some(CartState::default().with_item(line("a", 100, 2)))),
            load_delay: Some(Duration::from_millis(20)),
            ..MemoryMirror::default()
        };
        let cart = CartStore::new();

        let add = |id: &'static str| {
            let cart = &cart;
            let mirror = &mirror;
            async move {
                cart.hydrate(mirror).await;
                cart.add_item(mirror, line(id, 100, 1)).await
            }
        };
        tokio::join!(add("b"), add("c"));

        let state = cart.state();
        assert_eq!(state.lines.len(), 3);
        assert_eq!(state.item_count(), 4);
        assert_eq!(mirror.loads.load(Ordering::SeqCst), 1);
        assert_eq!(mirror.saved.lock().unwrap().clone().unwrap(), *state);
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_fail_mutation() {
        let mirror = MemoryMirror {
            fail: true,
            ..MemoryMirror::default()
        };
        let cart = CartStore::new();
        assert!(cart.hydrate(&mirror).await.is_empty());
        let state = cart.add_item(&mirror, line("a", 100, 1)).await;
        assert_eq!(state.item_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_and_reset() {
        let mirror = MemoryMirror::default();
        let cart = CartStore::new();
        cart.add_item(&mirror, line("a", 100, 1)).await;
        cart.clear(&mirror).await;
        assert!(cart.state().is_empty());
        assert_eq!(mirror.saved.lock().unwrap().clone(), Some(CartState::default()));

        cart.add_item(&mirror, line("a", 100, 1)).await;
        cart.reset();
        assert!(cart.state().is_empty());
        // Reset forgets hydration, so the mirror is read again.
        assert_eq!(cart.hydrate(&mirror).await.item_count(), 1);
    }
}

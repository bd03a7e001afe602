//! Checkout: turns the session cart into an `orders` record.

use std::future::Future;

use thiserror::Error;
use tracing::{info, instrument, warn};

use mercato_core::OrderStatus;

use crate::backend::{
    BackendError, FilterBuilder, Identity, ListQuery, NewOrder, OrderItem, OrderRecord,
    RecordClient, ShippingAddress, collections,
};
use crate::store::{CartLine, CartMirror, CartStore};

/// Most orders returned by an order history request.
const ORDER_HISTORY_LIMIT: u32 = 50;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Please sign in to check out.")]
    NotAuthenticated,

    #[error("Your cart is empty.")]
    EmptyCart,

    /// Required shipping fields left blank.
    #[error("Missing shipping details: {}", .0.join(", "))]
    InvalidShipping(Vec<&'static str>),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Remote collaborator for order records.
pub trait OrderBackend: Send + Sync + 'static {
    /// Create an order record.
    fn create_order(
        &self,
        identity: &Identity,
        order: &NewOrder<'_>,
    ) -> impl Future<Output = Result<OrderRecord, BackendError>> + Send;

    /// The identity's orders, newest first.
    fn list_orders(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<OrderRecord>, BackendError>> + Send;
}

impl OrderBackend for RecordClient {
    async fn create_order(
        &self,
        identity: &Identity,
        order: &NewOrder<'_>,
    ) -> Result<OrderRecord, BackendError> {
        self.create(collections::ORDERS, order, Some(identity)).await
    }

    async fn list_orders(&self, identity: &Identity) -> Result<Vec<OrderRecord>, BackendError> {
        let query = ListQuery::new()
            .filter(
                FilterBuilder::new()
                    .eq("user", identity.user_id().as_str())
                    .build(),
            )
            .sort("-created")
            .page(1, ORDER_HISTORY_LIMIT);
        let page = self
            .list::<OrderRecord>(collections::ORDERS, &query, Some(identity))
            .await?;
        Ok(page.items)
    }
}

/// Checkout service.
pub struct CheckoutService<B = RecordClient> {
    backend: B,
}

impl<B: OrderBackend> CheckoutService<B> {
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Place an order for everything in `cart`, then empty the cart.
    ///
    /// A backend failure leaves the cart untouched.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::EmptyCart` or `CheckoutError::InvalidShipping`
    /// before contacting the backend, or `CheckoutError::Backend` if the
    /// order cannot be created.
    #[instrument(skip(self, identity, cart, mirror, shipping))]
    pub async fn place_order(
        &self,
        identity: Option<&Identity>,
        cart: &CartStore,
        mirror: &impl CartMirror,
        shipping: &ShippingAddress,
    ) -> Result<OrderRecord, CheckoutError> {
        let identity = identity.ok_or(CheckoutError::NotAuthenticated)?;
        let state = cart.hydrate(mirror).await;
        if state.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let missing = shipping.missing_fields();
        if !missing.is_empty() {
            return Err(CheckoutError::InvalidShipping(missing));
        }

        let order = NewOrder {
            user: identity.user_id(),
            items: state.lines.iter().map(order_item).collect(),
            subtotal: state.subtotal(),
            status: OrderStatus::Pending,
            shipping,
        };

        let created = self
            .backend
            .create_order(identity, &order)
            .await
            .inspect_err(|e| warn!(error = %e, "Order creation failed"))?;

        cart.clear(mirror).await;
        info!(order_id = %created.id, subtotal = %created.subtotal, "Order placed");
        Ok(created)
    }

    /// Order history for `identity`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Backend` if the backend request fails.
    #[instrument(skip(self, identity))]
    pub async fn list_orders(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Vec<OrderRecord>, CheckoutError> {
        let identity = identity.ok_or(CheckoutError::NotAuthenticated)?;
        Ok(self.backend.list_orders(identity).await?)
    }
}

fn order_item(line: &CartLine) -> OrderItem {
    OrderItem {
        product_id: line.product_id.clone(),
        name: line.name.clone(),
        unit_price: line.unit_price,
        quantity: line.quantity,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use rust_decimal::Decimal;

    use mercato_core::{OrderId, ProductId, UserId};

    use crate::store::{CartState, MirrorError};

    #[derive(Default)]
    struct FakeOrders {
        orders: Mutex<Vec<OrderRecord>>,
        fail: AtomicBool,
    }

    impl OrderBackend for FakeOrders {
        async fn create_order(
            &self,
            _identity: &Identity,
            order: &NewOrder<'_>,
        ) -> Result<OrderRecord, BackendError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::Api {
                    status: 500,
                    message: String::new(),
                });
            }
            let mut orders = self.orders.lock().unwrap();
            let record = OrderRecord {
                id: OrderId::parse(&format!("order{}", orders.len() + 1)).unwrap(),
                user: order.user.clone(),
                items: order.items.clone(),
                subtotal: order.subtotal,
                status: order.status,
                shipping: order.shipping.clone(),
                created: format!("2026-01-0{} 00:00:00Z", orders.len() + 1),
            };
            orders.push(record.clone());
            Ok(record)
        }

        async fn list_orders(&self, identity: &Identity) -> Result<Vec<OrderRecord>, BackendError> {
            let mut orders: Vec<_> = self
                .orders
                .lock()
                .unwrap()
                .iter()
                .filter(|o| &o.user == identity.user_id())
                .cloned()
                .collect();
            orders.reverse();
            Ok(orders)
        }
    }

    #[derive(Default)]
    struct NullMirror;

    impl CartMirror for NullMirror {
        async fn load(&self) -> Result<Option<CartState>, MirrorError> {
            Ok(None)
        }

        async fn save(&self, _state: &CartState) -> Result<(), MirrorError> {
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity::new(UserId::parse("u1").unwrap(), "token")
    }

    fn shipping() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ada Lovelace".to_string(),
            line1: "1 Analytical Way".to_string(),
            line2: None,
            city: "London".to_string(),
            postal_code: "N1 1AA".to_string(),
            country: "GB".to_string(),
        }
    }

    async fn filled_cart() -> CartStore {
        let cart = CartStore::new();
        cart.add_item(
            &NullMirror,
            CartLine {
                product_id: ProductId::parse("p1").unwrap(),
                name: "Tea".to_string(),
                unit_price: Decimal::new(450, 2),
                quantity: 2,
                image: None,
            },
        )
        .await;
        cart
    }

    #[tokio::test]
    async fn test_place_order_creates_pending_order_and_clears_cart() {
        let service = CheckoutService::new(FakeOrders::default());
        let cart = filled_cart().await;

        let order = service
            .place_order(Some(&identity()), &cart, &NullMirror, &shipping())
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.subtotal, Decimal::new(900, 2));
        assert_eq!(order.items.len(), 1);
        assert!(cart.state().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_rejected() {
        let service = CheckoutService::new(FakeOrders::default());
        let err = service
            .place_order(Some(&identity()), &CartStore::new(), &NullMirror, &shipping())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn test_missing_shipping_fields_rejected() {
        let service = CheckoutService::new(FakeOrders::default());
        let cart = filled_cart().await;
        let address = ShippingAddress {
            city: " ".to_string(),
            country: String::new(),
            ..shipping()
        };

        let err = service
            .place_order(Some(&identity()), &cart, &NullMirror, &address)
            .await
            .unwrap_err();
        match err {
            CheckoutError::InvalidShipping(fields) => assert_eq!(fields, vec!["city", "country"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!cart.state().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_cart() {
        let backend = FakeOrders::default();
        backend.fail.store(true, Ordering::SeqCst);
        let service = CheckoutService::new(backend);
        let cart = filled_cart().await;

        let err = service
            .place_order(Some(&identity()), &cart, &NullMirror, &shipping())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Backend(_)));
        assert_eq!(cart.state().item_count(), 2);
    }

    #[tokio::test]
    async fn test_requires_identity() {
        let service = CheckoutService::new(FakeOrders::default());
        let cart = filled_cart().await;
        assert!(matches!(
            service
                .place_order(None, &cart, &NullMirror, &shipping())
                .await,
            Err(CheckoutError::NotAuthenticated)
        ));
        assert!(matches!(
            service.list_orders(None).await,
            Err(CheckoutError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let service = CheckoutService::new(FakeOrders::default());
        for _ in 0..2 {
            let cart = filled_cart().await;
            service
                .place_order(Some(&identity()), &cart, &NullMirror, &shipping())
                .await
                .unwrap();
        }
        let orders = service.list_orders(Some(&identity())).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id.as_str(), "order2");
    }
}

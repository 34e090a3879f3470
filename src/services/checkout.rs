//! Order creation: the one flow in the system where several stores must
//! agree.
//!
//! `create_order` resolves the item set (stored cart or a single direct
//! item), picks a shipping address, atomically deducts stock, and persists
//! the order snapshot. Pre-checks along the way exist for fast feedback
//! only; the transactional decrement is the authoritative stock check, and
//! the create-if-absent order write is the authoritative id check.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::domain::{address, derive_variant_key, Order, OrderItem, OrderStatus};
use crate::error::{Error, Result};
use crate::events::EventPublisher;
use crate::store::{CouponStore, OrderStore, StockDeduction};

use super::catalog::Catalog;
use super::inventory::Inventory;
use super::profiles::Profiles;

pub const ORDER_ID_PREFIX: &str = "ORD";
const ID_ATTEMPTS: usize = 10;
/// Retries of the final create-if-absent write when a generated id lands in
/// the window between its advisory check and the insert.
const CREATE_ATTEMPTS: usize = 5;

/// Human-readable order ids: `ORD-DDMM-XXXX` with a random uppercase-hex
/// suffix, checked against the live order set before use. The check is a
/// fast filter; uniqueness is enforced by the conditional insert.
#[derive(Clone)]
pub struct OrderIdGenerator {
    orders: Arc<dyn OrderStore>,
}

impl OrderIdGenerator {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    pub fn candidate(now: DateTime<Utc>) -> String {
        format!(
            "{}-{:02}{:02}-{:04X}",
            ORDER_ID_PREFIX,
            now.day(),
            now.month(),
            rand::random::<u16>()
        )
    }

    pub async fn generate(&self) -> Result<String> {
        for _ in 0..ID_ATTEMPTS {
            let candidate = Self::candidate(Utc::now());
            if !self.orders.exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        // Ten straight collisions against a 16-bit space means something is
        // systemically wrong (most likely the existence check itself).
        Err(Error::IdGenerationExhausted)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct OrderRequest {
    pub shipping_address_id: Option<String>,
    pub coupon_code: Option<String>,
    /// Present for the buy-now flow; absent means "check out my cart".
    #[validate]
    pub direct_item: Option<DirectItem>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DirectItem {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub color: String,
    #[validate(length(min = 1))]
    pub size: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Clone)]
pub struct OrderService {
    profiles: Profiles,
    catalog: Catalog,
    inventory: Inventory,
    orders: Arc<dyn OrderStore>,
    coupons: Arc<dyn CouponStore>,
    ids: OrderIdGenerator,
    events: EventPublisher,
    timeout: Duration,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profiles: Profiles,
        catalog: Catalog,
        inventory: Inventory,
        orders: Arc<dyn OrderStore>,
        coupons: Arc<dyn CouponStore>,
        events: EventPublisher,
        timeout: Duration,
    ) -> Self {
        Self {
            profiles,
            catalog,
            inventory,
            ids: OrderIdGenerator::new(orders.clone()),
            orders,
            coupons,
            events,
            timeout,
        }
    }

    pub async fn create_order(&self, customer_id: &str, request: OrderRequest) -> Result<Order> {
        match tokio::time::timeout(self.timeout, self.place(customer_id, request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        self.orders
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("order", id))
    }

    pub async fn orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        self.orders.list_for_customer(customer_id).await
    }

    pub async fn update_status(&self, id: &str, status: OrderStatus) -> Result<Order> {
        self.orders
            .update_status(id, status)
            .await?
            .ok_or_else(|| Error::not_found("order", id))
    }

    async fn place(&self, customer_id: &str, request: OrderRequest) -> Result<Order> {
        request.validate()?;

        // Every order belongs to a real user; the profile also carries the
        // address book the shipping resolution reads.
        let profile = self.profiles.find_user(customer_id).await?;

        let from_cart = request.direct_item.is_none();
        let items = match &request.direct_item {
            Some(direct) => vec![self.resolve_direct_item(direct).await?],
            None => self.resolve_cart_items(customer_id).await?,
        };

        let shipping_address =
            address::resolve_shipping(&profile.addresses, request.shipping_address_id.as_deref())?;

        let subtotal = crate::domain::order::subtotal_of(&items);
        let discount = match &request.coupon_code {
            Some(code) => self.resolve_discount(code, subtotal).await?,
            None => 0,
        };

        let deductions = items
            .iter()
            .map(|item| {
                Ok(StockDeduction {
                    variant_key: derive_variant_key(
                        &item.product_id,
                        &item.selected_color,
                        &item.selected_size,
                    )?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // The authoritative stock check: all lines deduct or none do.
        self.inventory.decrement(&deductions).await?;

        let order = match self
            .persist(customer_id, items, shipping_address, subtotal, discount, &request)
            .await
        {
            Ok(order) => order,
            Err(err) => {
                // Stock was already deducted with no order to show for it;
                // put it back before reporting the failure.
                if let Err(release_err) = self.inventory.release(&deductions).await {
                    tracing::error!(
                        customer_id,
                        error = %release_err,
                        "failed to restore stock after aborted order persist"
                    );
                }
                return Err(err);
            }
        };

        if from_cart {
            if let Err(err) = self.profiles.clear_cart(customer_id).await {
                // The order stands either way; a stale cart is recoverable.
                tracing::warn!(customer_id, order_id = %order.id, error = %err, "cart clear failed");
            }
        }

        tracing::info!(order_id = %order.id, customer_id, total = order.total, "order placed");
        self.events.order_placed(&order).await;
        Ok(order)
    }

    async fn resolve_cart_items(&self, customer_id: &str) -> Result<Vec<OrderItem>> {
        let cart = self.profiles.fetch_cart(customer_id).await?;
        if cart.is_empty() {
            return Err(Error::EmptyCart);
        }
        // Unavailable lines abort the order rather than being dropped: the
        // user must see the smaller cart before being charged for it.
        let unavailable: Vec<String> = cart
            .iter()
            .filter(|line| !line.available)
            .map(|line| line.id.clone())
            .collect();
        if !unavailable.is_empty() {
            return Err(Error::ItemsUnavailable(unavailable));
        }
        Ok(cart
            .into_iter()
            .map(|line| OrderItem {
                product_id: line.product_id,
                name: line.name,
                selected_color: line.selected_color,
                selected_size: line.selected_size,
                quantity: line.quantity,
                price_at_purchase: line.unit_price,
            })
            .collect())
    }

    async fn resolve_direct_item(&self, direct: &DirectItem) -> Result<OrderItem> {
        let product = self.catalog.get_required(&direct.product_id).await?;
        // Advisory pre-check for fast feedback; the decrement re-validates
        // inside its transaction and is allowed to disagree.
        let stock = self
            .inventory
            .stock_level(&direct.product_id, &direct.color, &direct.size)
            .await?;
        if stock.stock_level < direct.quantity {
            return Err(Error::InsufficientStock {
                variant_key: stock.variant_key,
                requested: direct.quantity,
                available: stock.stock_level,
            });
        }
        let price_at_purchase = product.effective_price();
        Ok(OrderItem {
            product_id: product.id,
            name: product.name,
            selected_color: direct.color.clone(),
            selected_size: direct.size.clone(),
            quantity: direct.quantity,
            price_at_purchase,
        })
    }

    async fn resolve_discount(&self, code: &str, subtotal: i64) -> Result<i64> {
        let normalized = code.trim().to_uppercase();
        let coupon = self
            .coupons
            .find(&normalized)
            .await?
            .ok_or_else(|| Error::validation(format!("unknown coupon code: {normalized}")))?;
        coupon.discount_for(subtotal, Utc::now())
    }

    async fn persist(
        &self,
        customer_id: &str,
        items: Vec<OrderItem>,
        shipping_address: crate::domain::Address,
        subtotal: i64,
        discount: i64,
        request: &OrderRequest,
    ) -> Result<Order> {
        for _ in 0..CREATE_ATTEMPTS {
            let id = self.ids.generate().await?;
            let now = Utc::now();
            let order = Order {
                id,
                customer_id: customer_id.to_string(),
                status: OrderStatus::Pending,
                items: items.clone(),
                shipping_address: shipping_address.clone(),
                subtotal,
                discount,
                total: subtotal - discount,
                coupon_code: request.coupon_code.as_deref().map(|c| c.trim().to_uppercase()),
                created_at: now,
                updated_at: now,
            };
            if self.orders.create(&order).await? {
                return Ok(order);
            }
            // The id was taken between the advisory check and the write;
            // draw a fresh one.
        }
        Err(Error::IdGenerationExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AddressInput, Coupon, Discount, NewProduct, ProductPatch, VariantSpec};
    use crate::services::profiles::AddToCart;
    use crate::store::{MemoryStore, VariantStore};

    struct Fixture {
        service: OrderService,
        profiles: Profiles,
        catalog: Catalog,
        store: Arc<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let inventory = Inventory::new(store.clone());
        let catalog = Catalog::new(store.clone(), inventory.clone());
        let profiles = Profiles::new(store.clone(), catalog.clone(), inventory.clone());
        let service = OrderService::new(
            profiles.clone(),
            catalog.clone(),
            inventory,
            store.clone(),
            store.clone(),
            EventPublisher::disabled(),
            Duration::from_secs(30),
        );
        Fixture {
            service,
            profiles,
            catalog,
            store,
        }
    }

    async fn seed_user(fixture: &Fixture, uid: &str) {
        fixture.profiles.ensure_user(uid, None, None).await.unwrap();
        fixture
            .profiles
            .add_address(
                uid,
                AddressInput {
                    label: None,
                    recipient: "Mira".into(),
                    line1: "14 Loom St".into(),
                    line2: None,
                    city: "Pune".into(),
                    state: None,
                    postal_code: "411001".into(),
                    country: "IN".into(),
                    phone: None,
                    is_default: false,
                },
            )
            .await
            .unwrap();
    }

    async fn seed_product(fixture: &Fixture, color: &str, size: &str, stock: i32, price: i64) -> String {
        fixture
            .catalog
            .create_product(NewProduct {
                name: "Linen Shirt".into(),
                category: "shirts".into(),
                base_price: price,
                sale_price: None,
                discount_label: None,
                colors: vec![],
                sizes: vec![],
                images: vec![],
                variants: vec![VariantSpec {
                    color: color.into(),
                    size: size.into(),
                    stock_level: stock,
                }],
            })
            .await
            .unwrap()
            .id
    }

    fn direct(product_id: &str, color: &str, size: &str, quantity: i32) -> OrderRequest {
        OrderRequest {
            direct_item: Some(DirectItem {
                product_id: product_id.into(),
                color: color.into(),
                size: size.into(),
                quantity,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn order_id_has_the_published_shape() {
        let id = OrderIdGenerator::candidate(Utc::now());
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[tokio::test]
    async fn a_thousand_allocated_ids_are_distinct() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        let generator = OrderIdGenerator::new(fixture.store.clone());
        let address = fixture.profiles.list_addresses("U1").await.unwrap().remove(0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let id = generator.generate().await.unwrap();
            assert!(seen.insert(id.clone()), "generator reused {id}");
            // Each id becomes a live order, exactly as in the checkout flow;
            // the generator's existence check must steer around all of them.
            let now = Utc::now();
            let taken = crate::store::OrderStore::create(
                fixture.store.as_ref(),
                &Order {
                    id,
                    customer_id: "U1".into(),
                    status: OrderStatus::Pending,
                    items: vec![],
                    shipping_address: address.clone(),
                    subtotal: 0,
                    discount: 0,
                    total: 0,
                    coupon_code: None,
                    created_at: now,
                    updated_at: now,
                },
            )
            .await
            .unwrap();
            assert!(taken);
        }
    }

    #[tokio::test]
    async fn cart_checkout_end_to_end() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        let product_id = seed_product(&fixture, "Red", "M", 5, 50000).await;
        fixture
            .profiles
            .add_to_cart(
                "U1",
                AddToCart {
                    product_id: product_id.clone(),
                    selected_color: "Red".into(),
                    selected_size: "M".into(),
                    quantity: 2,
                },
            )
            .await
            .unwrap();

        let order = fixture
            .service
            .create_order("U1", OrderRequest::default())
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].price_at_purchase, 50000);
        assert_eq!(order.total, 100_000);
        assert_eq!(order.shipping_address.recipient, "Mira");

        let key = derive_variant_key(&product_id, "Red", "M").unwrap();
        let stock = VariantStore::get(fixture.store.as_ref(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stock.stock_level, 3);
        assert!(fixture.profiles.fetch_cart("U1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkout_reprices_cart_lines_and_freezes_the_snapshot() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        let product_id = seed_product(&fixture, "Red", "M", 5, 99900).await;
        fixture
            .profiles
            .add_to_cart(
                "U1",
                AddToCart {
                    product_id: product_id.clone(),
                    selected_color: "Red".into(),
                    selected_size: "M".into(),
                    quantity: 1,
                },
            )
            .await
            .unwrap();

        // Price drops between add-to-cart and checkout.
        fixture
            .catalog
            .update(
                &product_id,
                ProductPatch {
                    sale_price: Some(79900),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let order = fixture
            .service
            .create_order("U1", OrderRequest::default())
            .await
            .unwrap();
        assert_eq!(order.items[0].price_at_purchase, 79900);

        // A later price change must not rewrite the snapshot.
        fixture
            .catalog
            .update(
                &product_id,
                ProductPatch {
                    sale_price: Some(59900),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let stored = fixture.service.get_order(&order.id).await.unwrap();
        assert_eq!(stored.items[0].price_at_purchase, 79900);
    }

    #[tokio::test]
    async fn direct_buy_with_insufficient_stock_leaves_stock_untouched() {
        let fixture = fixture().await;
        seed_user(&fixture, "U2").await;
        let product_id = seed_product(&fixture, "Blue", "L", 1, 50000).await;

        let err = fixture
            .service
            .create_order("U2", direct(&product_id, "Blue", "L", 5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientStock { requested: 5, available: 1, .. }
        ));

        let key = derive_variant_key(&product_id, "Blue", "L").unwrap();
        let stock = VariantStore::get(fixture.store.as_ref(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stock.stock_level, 1);
    }

    #[tokio::test]
    async fn direct_buy_succeeds_and_never_touches_the_cart() {
        let fixture = fixture().await;
        seed_user(&fixture, "U2").await;
        let cart_product = seed_product(&fixture, "Red", "M", 5, 50000).await;
        let buy_now_product = seed_product(&fixture, "Blue", "L", 3, 20000).await;
        fixture
            .profiles
            .add_to_cart(
                "U2",
                AddToCart {
                    product_id: cart_product,
                    selected_color: "Red".into(),
                    selected_size: "M".into(),
                    quantity: 1,
                },
            )
            .await
            .unwrap();

        let order = fixture
            .service
            .create_order("U2", direct(&buy_now_product, "Blue", "L", 2))
            .await
            .unwrap();
        assert_eq!(order.total, 40000);
        assert_eq!(fixture.profiles.fetch_cart("U2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_cart_and_missing_address_are_distinct_errors() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        assert!(matches!(
            fixture.service.create_order("U1", OrderRequest::default()).await,
            Err(Error::EmptyCart)
        ));

        // A user with items but no addresses fails on the address step.
        fixture.profiles.ensure_user("U3", None, None).await.unwrap();
        let product_id = seed_product(&fixture, "Red", "M", 5, 50000).await;
        fixture
            .profiles
            .add_to_cart(
                "U3",
                AddToCart {
                    product_id,
                    selected_color: "Red".into(),
                    selected_size: "M".into(),
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            fixture.service.create_order("U3", OrderRequest::default()).await,
            Err(Error::NoShippingAddress)
        ));
    }

    #[tokio::test]
    async fn unavailable_cart_lines_abort_the_order() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        let product_id = seed_product(&fixture, "Red", "M", 1, 50000).await;
        fixture
            .profiles
            .add_to_cart(
                "U1",
                AddToCart {
                    product_id: product_id.clone(),
                    selected_color: "Red".into(),
                    selected_size: "M".into(),
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        // Someone else takes the last unit before checkout.
        fixture
            .store
            .decrement(&[StockDeduction {
                variant_key: derive_variant_key(&product_id, "Red", "M").unwrap(),
                quantity: 1,
            }])
            .await
            .unwrap();

        let err = fixture
            .service
            .create_order("U1", OrderRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ItemsUnavailable(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let fixture = fixture().await;
        assert!(matches!(
            fixture.service.create_order("ghost", OrderRequest::default()).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn coupon_discount_is_captured_on_the_order() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        let product_id = seed_product(&fixture, "Red", "M", 5, 100_000).await;
        let now = Utc::now();
        fixture
            .store
            .upsert(&Coupon {
                code: "SAVE10".into(),
                discount: Discount::PercentOff { percent: 10 },
                min_order_total: 0,
                active: true,
                expires_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let mut request = direct(&product_id, "Red", "M", 1);
        request.coupon_code = Some("save10".into());
        let order = fixture.service.create_order("U1", request).await.unwrap();
        assert_eq!(order.subtotal, 100_000);
        assert_eq!(order.discount, 10_000);
        assert_eq!(order.total, 90_000);
        assert_eq!(order.coupon_code.as_deref(), Some("SAVE10"));

        let mut request = direct(&product_id, "Red", "M", 1);
        request.coupon_code = Some("BOGUS".into());
        assert!(matches!(
            fixture.service.create_order("U1", request).await,
            Err(Error::Validation(_))
        ));
    }

    /// Order store double whose create always loses the id race.
    struct UnwritableOrders;

    #[async_trait::async_trait]
    impl OrderStore for UnwritableOrders {
        async fn create(&self, _order: &Order) -> crate::error::Result<bool> {
            Ok(false)
        }
        async fn exists(&self, _id: &str) -> crate::error::Result<bool> {
            Ok(false)
        }
        async fn get(&self, _id: &str) -> crate::error::Result<Option<Order>> {
            Ok(None)
        }
        async fn list_for_customer(&self, _customer_id: &str) -> crate::error::Result<Vec<Order>> {
            Ok(vec![])
        }
        async fn update_status(
            &self,
            _id: &str,
            _status: OrderStatus,
        ) -> crate::error::Result<Option<Order>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn failed_persist_releases_the_deducted_stock() {
        let store = Arc::new(MemoryStore::new());
        let inventory = Inventory::new(store.clone());
        let catalog = Catalog::new(store.clone(), inventory.clone());
        let profiles = Profiles::new(store.clone(), catalog.clone(), inventory.clone());
        let service = OrderService::new(
            profiles.clone(),
            catalog.clone(),
            inventory,
            Arc::new(UnwritableOrders),
            store.clone(),
            EventPublisher::disabled(),
            Duration::from_secs(30),
        );
        let fixture = Fixture {
            service,
            profiles,
            catalog,
            store,
        };
        seed_user(&fixture, "U1").await;
        let product_id = seed_product(&fixture, "Red", "M", 5, 50000).await;

        let err = fixture
            .service
            .create_order("U1", direct(&product_id, "Red", "M", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdGenerationExhausted));

        // The decrement succeeded before the persist failed; the
        // compensation must have put the stock back.
        let key = derive_variant_key(&product_id, "Red", "M").unwrap();
        let stock = VariantStore::get(fixture.store.as_ref(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stock.stock_level, 5);
    }

    #[tokio::test]
    async fn requested_shipping_address_must_exist() {
        let fixture = fixture().await;
        seed_user(&fixture, "U1").await;
        let product_id = seed_product(&fixture, "Red", "M", 5, 50000).await;
        let mut request = direct(&product_id, "Red", "M", 1);
        request.shipping_address_id = Some("missing".into());
        assert!(matches!(
            fixture.service.create_order("U1", request).await,
            Err(Error::NotFound { .. })
        ));
    }
}

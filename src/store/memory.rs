//! In-memory backend.
//!
//! Backs the test suite and local development. A single mutex plays the role
//! the database transaction plays in the Postgres backend: every multi-step
//! operation (validate-then-decrement, revision-checked replace) runs inside
//! one critical section.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{
    Address, CartLineItem, Coupon, Order, OrderStatus, Product, UserProfile, VariantRecord,
};
use crate::error::{Error, Result};

use super::{
    CouponStore, OrderStore, ProductStore, StockDeduction, UserStore, VariantStore,
    VersionedProfile,
};

#[derive(Default)]
struct State {
    products: BTreeMap<String, Product>,
    variants: BTreeMap<String, VariantRecord>,
    users: HashMap<String, (UserProfile, i64)>,
    orders: HashMap<String, Order>,
    coupons: HashMap<String, Coupon>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert(&self, product: &Product) -> Result<()> {
        let mut state = self.state.lock().await;
        state.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(id).cloned())
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.products.contains_key(&product.id) {
            return Err(Error::not_found("product", &product.id));
        }
        state.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.state.lock().await.products.remove(id).is_some())
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, u64)> {
        let state = self.state.lock().await;
        let total = state.products.len() as u64;
        let skip = (page.saturating_sub(1) * per_page) as usize;
        let items = state
            .products
            .values()
            .skip(skip)
            .take(per_page as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }
}

#[async_trait]
impl VariantStore for MemoryStore {
    async fn insert_batch(&self, records: Vec<VariantRecord>) -> Result<()> {
        let mut state = self.state.lock().await;
        for record in records {
            state.variants.insert(record.variant_key.clone(), record);
        }
        Ok(())
    }

    async fn get(&self, variant_key: &str) -> Result<Option<VariantRecord>> {
        Ok(self.state.lock().await.variants.get(variant_key).cloned())
    }

    async fn list_for_product(&self, product_id: &str) -> Result<Vec<VariantRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn decrement(&self, deductions: &[StockDeduction]) -> Result<()> {
        let mut state = self.state.lock().await;
        // Validate every line against a working copy before touching the
        // real records; a failure on any line leaves all of them untouched.
        let mut staged: HashMap<String, i32> = HashMap::new();
        for deduction in deductions {
            let current = match staged.get(&deduction.variant_key) {
                Some(level) => *level,
                None => {
                    state
                        .variants
                        .get(&deduction.variant_key)
                        .ok_or_else(|| {
                            Error::InventoryInconsistency(deduction.variant_key.clone())
                        })?
                        .stock_level
                }
            };
            if current < deduction.quantity {
                return Err(Error::InsufficientStock {
                    variant_key: deduction.variant_key.clone(),
                    requested: deduction.quantity,
                    available: current,
                });
            }
            staged.insert(deduction.variant_key.clone(), current - deduction.quantity);
        }
        let now = Utc::now();
        for (key, level) in staged {
            if let Some(record) = state.variants.get_mut(&key) {
                record.stock_level = level;
                record.updated_at = now;
            }
        }
        Ok(())
    }

    async fn increment(&self, deductions: &[StockDeduction]) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for deduction in deductions {
            let record = state
                .variants
                .get_mut(&deduction.variant_key)
                .ok_or_else(|| Error::InventoryInconsistency(deduction.variant_key.clone()))?;
            record.stock_level += deduction.quantity;
            record.updated_at = now;
        }
        Ok(())
    }

    async fn delete_for_product(&self, product_id: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.variants.len();
        state.variants.retain(|_, v| v.product_id != product_id);
        Ok((before - state.variants.len()) as u64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert(
        &self,
        uid: &str,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Result<UserProfile> {
        let mut state = self.state.lock().await;
        let entry = state
            .users
            .entry(uid.to_string())
            .or_insert_with(|| (UserProfile::new(uid, None, None), 0));
        if email.is_some() {
            entry.0.email = email;
        }
        if display_name.is_some() {
            entry.0.display_name = display_name;
        }
        entry.0.updated_at = Utc::now();
        Ok(entry.0.clone())
    }

    async fn find(&self, uid: &str) -> Result<Option<VersionedProfile>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .get(uid)
            .map(|(profile, rev)| VersionedProfile {
                profile: profile.clone(),
                rev: *rev,
            }))
    }

    async fn replace_cart(&self, uid: &str, rev: i64, items: &[CartLineItem]) -> Result<bool> {
        let mut state = self.state.lock().await;
        let entry = state
            .users
            .get_mut(uid)
            .ok_or_else(|| Error::not_found("user", uid))?;
        if entry.1 != rev {
            return Ok(false);
        }
        entry.0.cart = items.to_vec();
        entry.0.updated_at = Utc::now();
        entry.1 += 1;
        Ok(true)
    }

    async fn replace_addresses(&self, uid: &str, rev: i64, addresses: &[Address]) -> Result<bool> {
        let mut state = self.state.lock().await;
        let entry = state
            .users
            .get_mut(uid)
            .ok_or_else(|| Error::not_found("user", uid))?;
        if entry.1 != rev {
            return Ok(false);
        }
        entry.0.addresses = addresses.to_vec();
        entry.0.updated_at = Utc::now();
        entry.1 += 1;
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: &Order) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Ok(false);
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(true)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.state.lock().await.orders.contains_key(id))
    }

    async fn get(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(id).cloned())
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state.orders.get_mut(id).map(|order| {
            order.status = status;
            order.updated_at = Utc::now();
            order.clone()
        }))
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn upsert(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.lock().await;
        state.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn find(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.lock().await.coupons.get(code).cloned())
    }

    async fn list(&self) -> Result<Vec<Coupon>> {
        Ok(self.state.lock().await.coupons.values().cloned().collect())
    }
}

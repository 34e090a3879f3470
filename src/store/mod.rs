//! Backing-store seams.
//!
//! Services talk to these traits; `postgres` is the production backend and
//! `memory` backs tests and local development. All cross-call coordination
//! (the atomic batch decrement, the user-document revision guard, the
//! create-if-absent order write) lives behind these seams so each backend
//! can use its own transaction primitive.

use async_trait::async_trait;

use crate::domain::{
    Address, CartLineItem, Coupon, Order, OrderStatus, Product, UserProfile, VariantRecord,
};
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One line of an atomic stock deduction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockDeduction {
    pub variant_key: String,
    pub quantity: i32,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: &Product) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Product>>;
    async fn update(&self, product: &Product) -> Result<()>;
    /// Returns false when no such product existed.
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, u64)>;
}

#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Writes all records in one atomic batch.
    async fn insert_batch(&self, records: Vec<VariantRecord>) -> Result<()>;
    async fn get(&self, variant_key: &str) -> Result<Option<VariantRecord>>;
    async fn list_for_product(&self, product_id: &str) -> Result<Vec<VariantRecord>>;
    /// Atomically decrements stock for every deduction, or none of them.
    ///
    /// Fails with `InventoryInconsistency` when a variant record is missing
    /// and `InsufficientStock` when a line cannot be covered; in both cases
    /// no stock is mutated, even under concurrent callers.
    async fn decrement(&self, deductions: &[StockDeduction]) -> Result<()>;
    /// Puts stock back; the compensation path for an aborted checkout.
    async fn increment(&self, deductions: &[StockDeduction]) -> Result<()>;
    async fn delete_for_product(&self, product_id: &str) -> Result<u64>;
}

/// A profile together with the document revision its embedded lists were
/// read at. Writers hand the revision back; a moved revision means the write
/// must be recomputed.
#[derive(Clone, Debug)]
pub struct VersionedProfile {
    pub profile: UserProfile,
    pub rev: i64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn upsert(
        &self,
        uid: &str,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Result<UserProfile>;
    async fn find(&self, uid: &str) -> Result<Option<VersionedProfile>>;
    /// Returns false when `rev` no longer matches; nothing is written then.
    async fn replace_cart(&self, uid: &str, rev: i64, items: &[CartLineItem]) -> Result<bool>;
    async fn replace_addresses(&self, uid: &str, rev: i64, addresses: &[Address]) -> Result<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create-if-absent; returns false when the id is already taken.
    async fn create(&self, order: &Order) -> Result<bool>;
    async fn exists(&self, id: &str) -> Result<bool>;
    async fn get(&self, id: &str) -> Result<Option<Order>>;
    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>>;
    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<Option<Order>>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn upsert(&self, coupon: &Coupon) -> Result<()>;
    async fn find(&self, code: &str) -> Result<Option<Coupon>>;
    async fn list(&self) -> Result<Vec<Coupon>>;
}

//! PostgreSQL backend.
//!
//! Embedded per-user collections (cart, addresses) and order snapshots are
//! JSONB columns; the atomic stock decrement is a single transaction that
//! locks every target row up front.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    Address, CartLineItem, ColorOption, Coupon, Discount, Order, OrderItem, OrderStatus, Product,
    UserProfile, VariantRecord,
};
use crate::error::{Error, Result};

use super::{
    CouponStore, OrderStore, ProductStore, StockDeduction, UserStore, VariantStore,
    VersionedProfile,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(e.into()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Internal(e.into()))
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    category: String,
    base_price: i64,
    sale_price: Option<i64>,
    discount_label: Option<String>,
    colors: serde_json::Value,
    sizes: serde_json::Value,
    images: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> Result<Product> {
        Ok(Product {
            id: self.id,
            name: self.name,
            category: self.category,
            base_price: self.base_price,
            sale_price: self.sale_price,
            discount_label: self.discount_label,
            colors: from_json::<Vec<ColorOption>>(self.colors)?,
            sizes: from_json::<Vec<String>>(self.sizes)?,
            images: from_json::<Vec<String>>(self.images)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert(&self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products \
             (id, name, category, base_price, sale_price, discount_label, colors, sizes, images, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.base_price)
        .bind(product.sale_price)
        .bind(&product.discount_label)
        .bind(to_json(&product.colors)?)
        .bind(to_json(&product.sizes)?)
        .bind(to_json(&product.images)?)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, category = $3, base_price = $4, sale_price = $5, \
             discount_label = $6, colors = $7, sizes = $8, images = $9, updated_at = $10 \
             WHERE id = $1",
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.base_price)
        .bind(product.sale_price)
        .bind(&product.discount_label)
        .bind(to_json(&product.colors)?)
        .bind(to_json(&product.sizes)?)
        .bind(to_json(&product.images)?)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("product", &product.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, u64)> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        let products = rows
            .into_iter()
            .map(ProductRow::into_product)
            .collect::<Result<Vec<_>>>()?;
        Ok((products, total as u64))
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    variant_key: String,
    product_id: String,
    color: String,
    size: String,
    stock_level: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for VariantRecord {
    fn from(row: VariantRow) -> Self {
        VariantRecord {
            variant_key: row.variant_key,
            product_id: row.product_id,
            color: row.color,
            size: row.size,
            stock_level: row.stock_level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl VariantStore for PgStore {
    async fn insert_batch(&self, records: Vec<VariantRecord>) -> Result<()> {
        let mut keys = Vec::with_capacity(records.len());
        let mut product_ids = Vec::with_capacity(records.len());
        let mut colors = Vec::with_capacity(records.len());
        let mut sizes = Vec::with_capacity(records.len());
        let mut levels = Vec::with_capacity(records.len());
        for record in &records {
            keys.push(record.variant_key.clone());
            product_ids.push(record.product_id.clone());
            colors.push(record.color.clone());
            sizes.push(record.size.clone());
            levels.push(record.stock_level);
        }
        sqlx::query(
            "INSERT INTO variants (variant_key, product_id, color, size, stock_level) \
             SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::int4[])",
        )
        .bind(&keys)
        .bind(&product_ids)
        .bind(&colors)
        .bind(&sizes)
        .bind(&levels)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, variant_key: &str) -> Result<Option<VariantRecord>> {
        let row = sqlx::query_as::<_, VariantRow>("SELECT * FROM variants WHERE variant_key = $1")
            .bind(variant_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(VariantRecord::from))
    }

    async fn list_for_product(&self, product_id: &str) -> Result<Vec<VariantRecord>> {
        let rows = sqlx::query_as::<_, VariantRow>(
            "SELECT * FROM variants WHERE product_id = $1 ORDER BY variant_key",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(VariantRecord::from).collect())
    }

    async fn decrement(&self, deductions: &[StockDeduction]) -> Result<()> {
        if deductions.is_empty() {
            return Ok(());
        }
        // Lock keys in sorted order so concurrent multi-line checkouts that
        // overlap cannot deadlock each other.
        let mut keys: Vec<String> = deductions.iter().map(|d| d.variant_key.clone()).collect();
        keys.sort();

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, VariantRow>(
            "SELECT * FROM variants WHERE variant_key = ANY($1) FOR UPDATE",
        )
        .bind(&keys)
        .fetch_all(&mut *tx)
        .await?;
        let levels: std::collections::HashMap<&str, i32> = rows
            .iter()
            .map(|row| (row.variant_key.as_str(), row.stock_level))
            .collect();

        // Every line must pass before any write happens; an early return
        // drops the transaction and rolls the lot back.
        for deduction in deductions {
            let Some(&available) = levels.get(deduction.variant_key.as_str()) else {
                return Err(Error::InventoryInconsistency(deduction.variant_key.clone()));
            };
            if available < deduction.quantity {
                return Err(Error::InsufficientStock {
                    variant_key: deduction.variant_key.clone(),
                    requested: deduction.quantity,
                    available,
                });
            }
        }

        for deduction in deductions {
            sqlx::query(
                "UPDATE variants SET stock_level = stock_level - $1, updated_at = NOW() \
                 WHERE variant_key = $2",
            )
            .bind(deduction.quantity)
            .bind(&deduction.variant_key)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn increment(&self, deductions: &[StockDeduction]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for deduction in deductions {
            sqlx::query(
                "UPDATE variants SET stock_level = stock_level + $1, updated_at = NOW() \
                 WHERE variant_key = $2",
            )
            .bind(deduction.quantity)
            .bind(&deduction.variant_key)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_for_product(&self, product_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM variants WHERE product_id = $1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uid: String,
    email: Option<String>,
    display_name: Option<String>,
    cart: serde_json::Value,
    addresses: serde_json::Value,
    profile_rev: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_versioned(self) -> Result<VersionedProfile> {
        Ok(VersionedProfile {
            rev: self.profile_rev,
            profile: UserProfile {
                uid: self.uid,
                email: self.email,
                display_name: self.display_name,
                cart: from_json::<Vec<CartLineItem>>(self.cart)?,
                addresses: from_json::<Vec<Address>>(self.addresses)?,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert(
        &self,
        uid: &str,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Result<UserProfile> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (uid, email, display_name) VALUES ($1, $2, $3) \
             ON CONFLICT (uid) DO UPDATE SET \
               email = COALESCE(EXCLUDED.email, users.email), \
               display_name = COALESCE(EXCLUDED.display_name, users.display_name), \
               updated_at = NOW() \
             RETURNING *",
        )
        .bind(uid)
        .bind(email)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_versioned()?.profile)
    }

    async fn find(&self, uid: &str) -> Result<Option<VersionedProfile>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRow::into_versioned).transpose()
    }

    async fn replace_cart(&self, uid: &str, rev: i64, items: &[CartLineItem]) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET cart = $3, profile_rev = profile_rev + 1, updated_at = NOW() \
             WHERE uid = $1 AND profile_rev = $2",
        )
        .bind(uid)
        .bind(rev)
        .bind(to_json(&items.to_vec())?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_addresses(&self, uid: &str, rev: i64, addresses: &[Address]) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET addresses = $3, profile_rev = profile_rev + 1, updated_at = NOW() \
             WHERE uid = $1 AND profile_rev = $2",
        )
        .bind(uid)
        .bind(rev)
        .bind(to_json(&addresses.to_vec())?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_id: String,
    status: String,
    items: serde_json::Value,
    shipping_address: serde_json::Value,
    subtotal: i64,
    discount: i64,
    total: i64,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order> {
        Ok(Order {
            status: self.status.parse()?,
            id: self.id,
            customer_id: self.customer_id,
            items: from_json::<Vec<OrderItem>>(self.items)?,
            shipping_address: from_json::<Address>(self.shipping_address)?,
            subtotal: self.subtotal,
            discount: self.discount,
            total: self.total,
            coupon_code: self.coupon_code,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn create(&self, order: &Order) -> Result<bool> {
        // Create-if-absent: losing an id race shows up as zero rows written,
        // never as a clobbered order.
        let result = sqlx::query(
            "INSERT INTO orders \
             (id, customer_id, status, items, shipping_address, subtotal, discount, total, coupon_code, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(order.status.as_str())
        .bind(to_json(&order.items)?)
        .bind(to_json(&order.shipping_address)?)
        .bind(order.subtotal)
        .bind(order.discount)
        .bind(order.total)
        .bind(&order.coupon_code)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn get(&self, id: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn list_for_customer(&self, customer_id: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    code: String,
    discount: serde_json::Value,
    min_order_total: i64,
    active: bool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CouponRow {
    fn into_coupon(self) -> Result<Coupon> {
        Ok(Coupon {
            code: self.code,
            discount: from_json::<Discount>(self.discount)?,
            min_order_total: self.min_order_total,
            active: self.active,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn upsert(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupons (code, discount, min_order_total, active, expires_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (code) DO UPDATE SET \
               discount = EXCLUDED.discount, \
               min_order_total = EXCLUDED.min_order_total, \
               active = EXCLUDED.active, \
               expires_at = EXCLUDED.expires_at, \
               updated_at = NOW()",
        )
        .bind(&coupon.code)
        .bind(to_json(&coupon.discount)?)
        .bind(coupon.min_order_total)
        .bind(coupon.active)
        .bind(coupon.expires_at)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CouponRow::into_coupon).transpose()
    }

    async fn list(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CouponRow::into_coupon).collect()
    }
}

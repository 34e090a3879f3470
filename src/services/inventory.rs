//! Per-variant stock: bulk initialization, point lookups, and the atomic
//! batch decrement that keeps concurrent checkouts from overselling.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::{derive_variant_key, StockView, VariantRecord, VariantSpec};
use crate::error::{Error, Result};
use crate::store::{StockDeduction, VariantStore};

#[derive(Clone)]
pub struct Inventory {
    variants: Arc<dyn VariantStore>,
}

impl Inventory {
    pub fn new(variants: Arc<dyn VariantStore>) -> Self {
        Self { variants }
    }

    /// Creates one stock record per spec in a single batch write. A product
    /// cannot exist with zero defined variants.
    pub async fn initialize_stock(&self, product_id: &str, specs: &[VariantSpec]) -> Result<usize> {
        if specs.is_empty() {
            return Err(Error::validation(
                "a product needs at least one stocked variant",
            ));
        }
        let now = Utc::now();
        let records = specs
            .iter()
            .map(|spec| {
                Ok(VariantRecord {
                    variant_key: derive_variant_key(product_id, &spec.color, &spec.size)?,
                    product_id: product_id.trim().to_string(),
                    color: spec.color.clone(),
                    size: spec.size.clone(),
                    stock_level: spec.stock_level.max(0),
                    created_at: now,
                    updated_at: now,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let count = records.len();
        self.variants.insert_batch(records).await?;
        Ok(count)
    }

    /// Current stock for a (product, color, size) combination. A missing
    /// record reads as 0 so a catalog/inventory mismatch degrades to
    /// "unavailable" instead of failing the read path.
    pub async fn stock_level(&self, product_id: &str, color: &str, size: &str) -> Result<StockView> {
        let variant_key = derive_variant_key(product_id, color, size)?;
        let stock_level = self
            .variants
            .get(&variant_key)
            .await?
            .map_or(0, |record| record.stock_level);
        Ok(StockView {
            variant_key,
            stock_level,
        })
    }

    pub async fn product_stock(&self, product_id: &str) -> Result<Vec<VariantRecord>> {
        self.variants.list_for_product(product_id).await
    }

    /// Atomic batch decrement; all lines succeed or none do. Lines that hit
    /// the same variant are merged first so the check sees their combined
    /// demand.
    pub async fn decrement(&self, deductions: &[StockDeduction]) -> Result<()> {
        let merged = merge_deductions(deductions)?;
        if merged.is_empty() {
            return Ok(());
        }
        self.variants.decrement(&merged).await
    }

    /// Returns previously deducted stock; used to unwind a checkout whose
    /// order document never landed.
    pub async fn release(&self, deductions: &[StockDeduction]) -> Result<()> {
        let merged = merge_deductions(deductions)?;
        if merged.is_empty() {
            return Ok(());
        }
        self.variants.increment(&merged).await
    }

    pub async fn clear_product(&self, product_id: &str) -> Result<u64> {
        self.variants.delete_for_product(product_id).await
    }
}

fn merge_deductions(deductions: &[StockDeduction]) -> Result<Vec<StockDeduction>> {
    let mut merged: HashMap<String, i32> = HashMap::new();
    for deduction in deductions {
        if deduction.quantity < 1 {
            return Err(Error::validation("deduction quantity must be at least 1"));
        }
        *merged.entry(deduction.variant_key.clone()).or_insert(0) += deduction.quantity;
    }
    let mut merged: Vec<StockDeduction> = merged
        .into_iter()
        .map(|(variant_key, quantity)| StockDeduction {
            variant_key,
            quantity,
        })
        .collect();
    merged.sort_by(|a, b| a.variant_key.cmp(&b.variant_key));
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn inventory() -> (Inventory, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Inventory::new(store.clone()), store)
    }

    fn spec(color: &str, size: &str, stock: i32) -> VariantSpec {
        VariantSpec {
            color: color.into(),
            size: size.into(),
            stock_level: stock,
        }
    }

    #[tokio::test]
    async fn initialize_rejects_an_empty_spec_list() {
        let (inventory, _) = inventory();
        assert!(matches!(
            inventory.initialize_stock("P1", &[]).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn initialize_writes_one_record_per_combination() {
        let (inventory, _) = inventory();
        let count = inventory
            .initialize_stock(
                "P1",
                &[spec("Red", "M", 5), spec("Red", "L", 2), spec("Blue", "M", 0)],
            )
            .await
            .unwrap();
        assert_eq!(count, 3);
        let view = inventory.stock_level("P1", "Red", "L").await.unwrap();
        assert_eq!(view.stock_level, 2);
        assert_eq!(view.variant_key, "P1_red_l");
    }

    #[tokio::test]
    async fn unstocked_variant_reads_as_zero() {
        let (inventory, _) = inventory();
        let view = inventory.stock_level("P9", "Green", "XL").await.unwrap();
        assert_eq!(view.stock_level, 0);
    }

    #[tokio::test]
    async fn duplicate_lines_are_merged_before_the_stock_check() {
        let (inventory, _) = inventory();
        inventory
            .initialize_stock("P1", &[spec("Red", "M", 5)])
            .await
            .unwrap();
        // Two lines of 3 against stock 5 must fail as a combined demand of
        // 6, not pass as two independent checks.
        let err = inventory
            .decrement(&[
                StockDeduction {
                    variant_key: "P1_red_m".into(),
                    quantity: 3,
                },
                StockDeduction {
                    variant_key: "P1_red_m".into(),
                    quantity: 3,
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientStock { requested: 6, .. }));
        let view = inventory.stock_level("P1", "Red", "M").await.unwrap();
        assert_eq!(view.stock_level, 5);
    }

    #[tokio::test]
    async fn release_restores_deducted_stock() {
        let (inventory, _) = inventory();
        inventory
            .initialize_stock("P1", &[spec("Red", "M", 5)])
            .await
            .unwrap();
        let deductions = vec![StockDeduction {
            variant_key: "P1_red_m".into(),
            quantity: 4,
        }];
        inventory.decrement(&deductions).await.unwrap();
        inventory.release(&deductions).await.unwrap();
        let view = inventory.stock_level("P1", "Red", "M").await.unwrap();
        assert_eq!(view.stock_level, 5);
    }
}

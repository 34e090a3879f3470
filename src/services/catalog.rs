//! Product catalog: admin CRUD plus the product-with-live-stock read view.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{NewProduct, Product, ProductPatch, ProductWithInventory, VariantSpec};
use crate::error::{Error, Result};
use crate::store::ProductStore;

use super::inventory::Inventory;

#[derive(Clone)]
pub struct Catalog {
    products: Arc<dyn ProductStore>,
    inventory: Inventory,
}

impl Catalog {
    pub fn new(products: Arc<dyn ProductStore>, inventory: Inventory) -> Self {
        Self {
            products,
            inventory,
        }
    }

    pub async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::now_v7().to_string(),
            name: new.name,
            category: new.category,
            base_price: new.base_price,
            sale_price: new.sale_price,
            discount_label: new.discount_label,
            colors: new.colors,
            sizes: new.sizes,
            images: new.images,
            created_at: now,
            updated_at: now,
        };
        let specs = if new.variants.is_empty() {
            vec![VariantSpec::default_variant(0)]
        } else {
            new.variants
        };
        self.products.insert(&product).await?;
        let stocked = self.inventory.initialize_stock(&product.id, &specs).await?;
        tracing::info!(product_id = %product.id, variants = stocked, "product created");
        Ok(product)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Product>> {
        self.products.get(id).await
    }

    pub async fn get_required(&self, id: &str) -> Result<Product> {
        self.products
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("product", id))
    }

    /// Read view with live stock joined in from the inventory records.
    pub async fn with_inventory(&self, id: &str) -> Result<ProductWithInventory> {
        let product = self.get_required(id).await?;
        let inventory = self.inventory.product_stock(id).await?;
        Ok(ProductWithInventory { product, inventory })
    }

    pub async fn update(&self, id: &str, patch: ProductPatch) -> Result<Product> {
        let mut product = self.get_required(id).await?;
        patch.apply(&mut product);
        self.products.update(&product).await?;
        Ok(product)
    }

    /// Deletes the product, then its variants. The two steps are not one
    /// transaction; a failure in between leaves orphaned variant rows for a
    /// reconciliation sweep, never a sellable product without stock records.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.products.delete(id).await? {
            return Err(Error::not_found("product", id));
        }
        let removed = self.inventory.clear_product(id).await?;
        tracing::info!(product_id = %id, variants = removed, "product deleted");
        Ok(())
    }

    pub async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Product>, u64)> {
        self.products.list(page.max(1), per_page.clamp(1, 100)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn catalog() -> Catalog {
        let store = Arc::new(MemoryStore::new());
        Catalog::new(store.clone(), Inventory::new(store))
    }

    fn new_product(variants: Vec<VariantSpec>) -> NewProduct {
        NewProduct {
            name: "Linen Shirt".into(),
            category: "shirts".into(),
            base_price: 99900,
            sale_price: None,
            discount_label: None,
            colors: vec![],
            sizes: vec![],
            images: vec![],
            variants,
        }
    }

    #[tokio::test]
    async fn create_stocks_every_combination() {
        let catalog = catalog();
        let product = catalog
            .create_product(new_product(vec![
                VariantSpec {
                    color: "Red".into(),
                    size: "M".into(),
                    stock_level: 5,
                },
                VariantSpec {
                    color: "Red".into(),
                    size: "L".into(),
                    stock_level: 3,
                },
            ]))
            .await
            .unwrap();
        let view = catalog.with_inventory(&product.id).await.unwrap();
        assert_eq!(view.inventory.len(), 2);
    }

    #[tokio::test]
    async fn create_without_variants_stocks_a_default_one() {
        let catalog = catalog();
        let product = catalog.create_product(new_product(vec![])).await.unwrap();
        let view = catalog.with_inventory(&product.id).await.unwrap();
        assert_eq!(view.inventory.len(), 1);
        assert_eq!(view.inventory[0].color, "Default");
        assert_eq!(view.inventory[0].stock_level, 0);
    }

    #[tokio::test]
    async fn delete_clears_the_variants_too() {
        let catalog = catalog();
        let product = catalog
            .create_product(new_product(vec![VariantSpec {
                color: "Red".into(),
                size: "M".into(),
                stock_level: 5,
            }]))
            .await
            .unwrap();
        catalog.delete(&product.id).await.unwrap();
        assert!(catalog.get(&product.id).await.unwrap().is_none());
        assert!(matches!(
            catalog.with_inventory(&product.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let catalog = catalog();
        assert!(matches!(
            catalog.get_required("nope").await,
            Err(Error::NotFound { .. })
        ));
    }
}

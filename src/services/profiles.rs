//! User profiles: the embedded cart and address book, and the live
//! price/availability join the checkout flow consumes.
//!
//! Every mutation is a read-modify-write of a whole embedded list under the
//! user document's revision guard: read the list at a revision, compute the
//! next list in memory, write it back only if the revision still matches.
//! A handful of bounced attempts means a genuinely contended document and
//! surfaces as `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::domain::cart::UNAVAILABLE_NAME;
use crate::domain::{
    address, cart, derive_variant_key, Address, AddressInput, CartLineItem, EnrichedCartLine,
    UserProfile,
};
use crate::error::{Error, Result};
use crate::store::UserStore;

use super::catalog::Catalog;
use super::inventory::Inventory;

const RMW_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCart {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub selected_color: String,
    #[validate(length(min = 1))]
    pub selected_size: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Clone)]
pub struct Profiles {
    users: Arc<dyn UserStore>,
    catalog: Catalog,
    inventory: Inventory,
}

impl Profiles {
    pub fn new(users: Arc<dyn UserStore>, catalog: Catalog, inventory: Inventory) -> Self {
        Self {
            users,
            catalog,
            inventory,
        }
    }

    pub async fn ensure_user(
        &self,
        uid: &str,
        email: Option<String>,
        display_name: Option<String>,
    ) -> Result<UserProfile> {
        if uid.trim().is_empty() {
            return Err(Error::validation("uid must not be empty"));
        }
        self.users.upsert(uid, email, display_name).await
    }

    pub async fn find_user(&self, uid: &str) -> Result<UserProfile> {
        Ok(self
            .users
            .find(uid)
            .await?
            .ok_or_else(|| Error::not_found("user", uid))?
            .profile)
    }

    /// The raw cart joined against the live catalog and inventory. Lines are
    /// re-priced on every read; a vanished product stays in the list, marked
    /// unavailable, so the caller decides what to do with it.
    pub async fn fetch_cart(&self, uid: &str) -> Result<Vec<EnrichedCartLine>> {
        let profile = self.find_user(uid).await?;
        let mut lines = Vec::with_capacity(profile.cart.len());
        for item in &profile.cart {
            lines.push(self.enrich(item).await?);
        }
        Ok(lines)
    }

    async fn enrich(&self, item: &CartLineItem) -> Result<EnrichedCartLine> {
        let Some(product) = self.catalog.get(&item.product_id).await? else {
            return Ok(EnrichedCartLine {
                id: item.id.clone(),
                product_id: item.product_id.clone(),
                name: UNAVAILABLE_NAME.into(),
                selected_color: item.selected_color.clone(),
                selected_size: item.selected_size.clone(),
                quantity: item.quantity,
                unit_price: 0,
                line_total: 0,
                image: None,
                stock_level: 0,
                available: false,
                added_at: item.added_at,
            });
        };
        let unit_price = product.effective_price();
        let stock = self
            .inventory
            .stock_level(&item.product_id, &item.selected_color, &item.selected_size)
            .await?;
        Ok(EnrichedCartLine {
            id: item.id.clone(),
            product_id: item.product_id.clone(),
            name: product.name,
            selected_color: item.selected_color.clone(),
            selected_size: item.selected_size.clone(),
            quantity: item.quantity,
            unit_price,
            line_total: unit_price * i64::from(item.quantity),
            image: product.images.first().cloned(),
            stock_level: stock.stock_level,
            available: stock.stock_level >= item.quantity,
            added_at: item.added_at,
        })
    }

    pub async fn add_to_cart(&self, uid: &str, request: AddToCart) -> Result<Vec<EnrichedCartLine>> {
        request.validate()?;
        // The product must exist at add time; availability is rechecked at
        // read time and authoritatively at checkout.
        self.catalog.get_required(&request.product_id).await?;
        let line = CartLineItem {
            id: derive_variant_key(
                &request.product_id,
                &request.selected_color,
                &request.selected_size,
            )?,
            product_id: request.product_id.trim().to_string(),
            selected_color: request.selected_color,
            selected_size: request.selected_size,
            quantity: request.quantity,
            added_at: Utc::now(),
        };
        self.mutate_cart(uid, |items| Ok(cart::upsert_line(items, line.clone())))
            .await?;
        self.fetch_cart(uid).await
    }

    pub async fn update_cart_item(
        &self,
        uid: &str,
        item_id: &str,
        quantity: i32,
    ) -> Result<Vec<EnrichedCartLine>> {
        self.mutate_cart(uid, |items| cart::set_quantity(items, item_id, quantity))
            .await?;
        self.fetch_cart(uid).await
    }

    pub async fn remove_cart_item(&self, uid: &str, item_id: &str) -> Result<Vec<EnrichedCartLine>> {
        self.mutate_cart(uid, |items| cart::remove_line(items, item_id))
            .await?;
        self.fetch_cart(uid).await
    }

    pub async fn clear_cart(&self, uid: &str) -> Result<()> {
        self.mutate_cart(uid, |_| Ok(Vec::new())).await
    }

    pub async fn list_addresses(&self, uid: &str) -> Result<Vec<Address>> {
        Ok(self.find_user(uid).await?.addresses)
    }

    pub async fn add_address(&self, uid: &str, input: AddressInput) -> Result<Vec<Address>> {
        input.validate()?;
        self.mutate_addresses(uid, move |list| address::add(list, input.clone()))
            .await?;
        self.list_addresses(uid).await
    }

    pub async fn update_address(
        &self,
        uid: &str,
        address_id: &str,
        input: AddressInput,
    ) -> Result<Vec<Address>> {
        input.validate()?;
        self.mutate_addresses(uid, move |list| {
            address::update(list, address_id, input.clone())
        })
        .await?;
        self.list_addresses(uid).await
    }

    pub async fn delete_address(&self, uid: &str, address_id: &str) -> Result<Vec<Address>> {
        self.mutate_addresses(uid, |list| address::remove(list, address_id))
            .await?;
        self.list_addresses(uid).await
    }

    async fn mutate_cart<F>(&self, uid: &str, compute: F) -> Result<()>
    where
        F: Fn(&[CartLineItem]) -> Result<Vec<CartLineItem>>,
    {
        for _ in 0..RMW_ATTEMPTS {
            let versioned = self
                .users
                .find(uid)
                .await?
                .ok_or_else(|| Error::not_found("user", uid))?;
            let next = compute(&versioned.profile.cart)?;
            if self.users.replace_cart(uid, versioned.rev, &next).await? {
                return Ok(());
            }
        }
        Err(Error::Conflict)
    }

    async fn mutate_addresses<F>(&self, uid: &str, compute: F) -> Result<()>
    where
        F: Fn(&[Address]) -> Result<Vec<Address>>,
    {
        for _ in 0..RMW_ATTEMPTS {
            let versioned = self
                .users
                .find(uid)
                .await?
                .ok_or_else(|| Error::not_found("user", uid))?;
            let next = compute(&versioned.profile.addresses)?;
            if self
                .users
                .replace_addresses(uid, versioned.rev, &next)
                .await?
            {
                return Ok(());
            }
        }
        Err(Error::Conflict)
    }
}

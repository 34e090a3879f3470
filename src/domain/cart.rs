//! Cart line items and the pure list mutations behind the cart endpoints.
//!
//! Cart lines live embedded in the user document and never cache price or
//! name; those are joined in at read time (see `services::profiles`). The
//! mutation helpers here compute the next embedded list from the current one;
//! the store layer writes the whole list back under the document revision
//! guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name substituted for cart lines whose product has disappeared.
pub const UNAVAILABLE_NAME: &str = "No longer available";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLineItem {
    /// The line id is the variant key, which also dedupes lines: one line
    /// per (product, color, size).
    pub id: String,
    pub product_id: String,
    pub selected_color: String,
    pub selected_size: String,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

/// Cart line joined with the live product and stock at read time.
#[derive(Clone, Debug, Serialize)]
pub struct EnrichedCartLine {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub selected_color: String,
    pub selected_size: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub line_total: i64,
    pub image: Option<String>,
    pub stock_level: i32,
    pub available: bool,
    pub added_at: DateTime<Utc>,
}

/// Adds `line` to the list, merging quantities into an existing line with the
/// same variant key.
pub fn upsert_line(items: &[CartLineItem], line: CartLineItem) -> Vec<CartLineItem> {
    let mut next = items.to_vec();
    match next.iter_mut().find(|existing| existing.id == line.id) {
        Some(existing) => existing.quantity += line.quantity,
        None => next.push(line),
    }
    next
}

/// Sets the quantity of an existing line; 0 removes it.
pub fn set_quantity(items: &[CartLineItem], item_id: &str, quantity: i32) -> Result<Vec<CartLineItem>> {
    if quantity < 0 {
        return Err(Error::validation("quantity cannot be negative"));
    }
    if !items.iter().any(|line| line.id == item_id) {
        return Err(Error::not_found("cart item", item_id));
    }
    let mut next = items.to_vec();
    if quantity == 0 {
        next.retain(|line| line.id != item_id);
    } else if let Some(line) = next.iter_mut().find(|line| line.id == item_id) {
        line.quantity = quantity;
    }
    Ok(next)
}

pub fn remove_line(items: &[CartLineItem], item_id: &str) -> Result<Vec<CartLineItem>> {
    let mut next = items.to_vec();
    let before = next.len();
    next.retain(|line| line.id != item_id);
    if next.len() == before {
        return Err(Error::not_found("cart item", item_id));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, quantity: i32) -> CartLineItem {
        CartLineItem {
            id: id.into(),
            product_id: "P1".into(),
            selected_color: "Red".into(),
            selected_size: "M".into(),
            quantity,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_merges_same_variant() {
        let items = upsert_line(&[], line("P1_red_m", 2));
        let items = upsert_line(&items, line("P1_red_m", 1));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
    }

    #[test]
    fn upsert_keeps_distinct_variants_apart() {
        let items = upsert_line(&[], line("P1_red_m", 2));
        let items = upsert_line(&items, line("P1_red_l", 1));
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn zero_quantity_removes_the_line() {
        let items = upsert_line(&[], line("P1_red_m", 2));
        let items = set_quantity(&items, "P1_red_m", 0).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn updating_a_missing_line_is_not_found() {
        assert!(matches!(
            set_quantity(&[], "P1_red_m", 2),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            remove_line(&[], "P1_red_m"),
            Err(Error::NotFound { .. })
        ));
    }
}

//! Address book: at most three addresses per user, exactly one default
//! whenever the list is non-empty.
//!
//! Like the cart, the list is embedded in the user document and mutated by
//! whole-list rewrites. The helpers here compute the next list and keep the
//! default invariant; `resolve_shipping` is the checkout-side lookup.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result};

pub const MAX_ADDRESSES: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub label: Option<String>,
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AddressInput {
    pub label: Option<String>,
    #[validate(length(min = 1))]
    pub recipient: String,
    #[validate(length(min = 1))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(min = 1))]
    pub country: String,
    pub phone: Option<String>,
    /// Only honored on update; a freshly added address is default only when
    /// the list was empty.
    #[serde(default)]
    pub is_default: bool,
}

impl AddressInput {
    fn into_address(self, id: String, is_default: bool) -> Address {
        Address {
            id,
            label: self.label,
            recipient: self.recipient,
            line1: self.line1,
            line2: self.line2,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            country: self.country,
            phone: self.phone,
            is_default,
        }
    }
}

/// Re-establishes the exactly-one-default invariant. The first flagged
/// address wins; with none flagged, the first entry is promoted.
fn normalize_default(list: &mut [Address]) {
    let chosen = list.iter().position(|a| a.is_default).unwrap_or(0);
    for (idx, address) in list.iter_mut().enumerate() {
        address.is_default = idx == chosen;
    }
}

pub fn add(list: &[Address], input: AddressInput) -> Result<Vec<Address>> {
    if list.len() >= MAX_ADDRESSES {
        return Err(Error::AddressLimitReached);
    }
    let mut next = list.to_vec();
    let address = input.into_address(Uuid::new_v4().to_string(), next.is_empty());
    next.push(address);
    normalize_default(&mut next);
    Ok(next)
}

pub fn update(list: &[Address], address_id: &str, input: AddressInput) -> Result<Vec<Address>> {
    let mut next = list.to_vec();
    let slot = next
        .iter_mut()
        .find(|a| a.id == address_id)
        .ok_or_else(|| Error::not_found("address", address_id))?;
    let was_default = slot.is_default;
    let make_default = input.is_default || was_default;
    *slot = input.into_address(address_id.to_string(), make_default);
    if make_default {
        // Setting the default unsets every other address in the same write.
        for address in next.iter_mut() {
            if address.id != address_id {
                address.is_default = false;
            }
        }
    }
    normalize_default(&mut next);
    Ok(next)
}

pub fn remove(list: &[Address], address_id: &str) -> Result<Vec<Address>> {
    if !list.iter().any(|a| a.id == address_id) {
        return Err(Error::not_found("address", address_id));
    }
    if list.len() <= 1 {
        return Err(Error::MustKeepOneAddress);
    }
    let mut next = list.to_vec();
    next.retain(|a| a.id != address_id);
    normalize_default(&mut next);
    Ok(next)
}

/// Picks the order's shipping address: the requested id when given, else the
/// default, else the first entry.
pub fn resolve_shipping(list: &[Address], requested_id: Option<&str>) -> Result<Address> {
    if let Some(id) = requested_id {
        if list.is_empty() {
            return Err(Error::NoShippingAddress);
        }
        return list
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("address", id));
    }
    list.iter()
        .find(|a| a.is_default)
        .or_else(|| list.first())
        .cloned()
        .ok_or(Error::NoShippingAddress)
}

//! Domain model: products, variants, carts, addresses, orders, coupons.

pub mod address;
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;
pub mod user;
pub mod variant;

pub use address::{Address, AddressInput};
pub use cart::{CartLineItem, EnrichedCartLine};
pub use coupon::{Coupon, Discount, NewCoupon};
pub use order::{Order, OrderItem, OrderStatus};
pub use product::{ColorOption, NewProduct, Product, ProductPatch, ProductWithInventory};
pub use user::UserProfile;
pub use variant::{derive_variant_key, StockView, VariantRecord, VariantSpec};

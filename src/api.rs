//! HTTP surface: thin handlers that validate a request, call one service
//! method, and return JSON.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::domain::{
    Address, AddressInput, Coupon, EnrichedCartLine, NewCoupon, NewProduct, Order, OrderStatus,
    Product, ProductPatch, ProductWithInventory, StockView, UserProfile,
};
use crate::error::Result;
use crate::services::{AddToCart, Catalog, Inventory, OrderRequest, OrderService, Profiles};
use crate::store::CouponStore;

use std::sync::Arc;

use chrono::Utc;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub inventory: Inventory,
    pub profiles: Profiles,
    pub orders: OrderService,
    pub coupons: Arc<dyn CouponStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route(
            "/api/v1/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/v1/products/:id/stock", get(get_stock))
        .route("/api/v1/users/:uid", put(upsert_user).get(get_user))
        .route(
            "/api/v1/users/:uid/cart",
            get(get_cart).post(add_to_cart).delete(clear_cart),
        )
        .route(
            "/api/v1/users/:uid/cart/:item_id",
            put(update_cart_item).delete(remove_cart_item),
        )
        .route(
            "/api/v1/users/:uid/addresses",
            get(list_addresses).post(add_address),
        )
        .route(
            "/api/v1/users/:uid/addresses/:address_id",
            put(update_address).delete(delete_address),
        )
        .route(
            "/api/v1/users/:uid/orders",
            get(list_orders).post(create_order),
        )
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/coupons", get(list_coupons).post(create_coupon))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "loomcart" }))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
struct PaginatedResponse<T> {
    data: Vec<T>,
    total: u64,
    page: u32,
}

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);
    let (data, total) = state.catalog.list(page, per_page).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    request.validate()?;
    let product = state.catalog.create_product(request).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductWithInventory>> {
    Ok(Json(state.catalog.with_inventory(&id).await?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    patch.validate()?;
    Ok(Json(state.catalog.update(&id, patch).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.catalog.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct StockQuery {
    color: String,
    size: String,
}

async fn get_stock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StockQuery>,
) -> Result<Json<StockView>> {
    Ok(Json(
        state
            .inventory
            .stock_level(&id, &query.color, &query.size)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
struct UpsertUser {
    email: Option<String>,
    display_name: Option<String>,
}

async fn upsert_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<UpsertUser>,
) -> Result<Json<UserProfile>> {
    Ok(Json(
        state
            .profiles
            .ensure_user(&uid, request.email, request.display_name)
            .await?,
    ))
}

async fn get_user(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.profiles.find_user(&uid).await?))
}

async fn get_cart(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<EnrichedCartLine>>> {
    Ok(Json(state.profiles.fetch_cart(&uid).await?))
}

async fn add_to_cart(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<AddToCart>,
) -> Result<(StatusCode, Json<Vec<EnrichedCartLine>>)> {
    let cart = state.profiles.add_to_cart(&uid, request).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

#[derive(Debug, Deserialize)]
struct UpdateCartItem {
    quantity: i32,
}

async fn update_cart_item(
    State(state): State<AppState>,
    Path((uid, item_id)): Path<(String, String)>,
    Json(request): Json<UpdateCartItem>,
) -> Result<Json<Vec<EnrichedCartLine>>> {
    Ok(Json(
        state
            .profiles
            .update_cart_item(&uid, &item_id, request.quantity)
            .await?,
    ))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Path((uid, item_id)): Path<(String, String)>,
) -> Result<Json<Vec<EnrichedCartLine>>> {
    Ok(Json(state.profiles.remove_cart_item(&uid, &item_id).await?))
}

async fn clear_cart(State(state): State<AppState>, Path(uid): Path<String>) -> Result<StatusCode> {
    state.profiles.clear_cart(&uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_addresses(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(state.profiles.list_addresses(&uid).await?))
}

async fn add_address(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<AddressInput>,
) -> Result<(StatusCode, Json<Vec<Address>>)> {
    let addresses = state.profiles.add_address(&uid, request).await?;
    Ok((StatusCode::CREATED, Json(addresses)))
}

async fn update_address(
    State(state): State<AppState>,
    Path((uid, address_id)): Path<(String, String)>,
    Json(request): Json<AddressInput>,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(
        state
            .profiles
            .update_address(&uid, &address_id, request)
            .await?,
    ))
}

async fn delete_address(
    State(state): State<AppState>,
    Path((uid, address_id)): Path<(String, String)>,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(state.profiles.delete_address(&uid, &address_id).await?))
}

async fn create_order(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.orders.create_order(&uid, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.orders.orders_for_customer(&uid).await?))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>> {
    Ok(Json(state.orders.get_order(&id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateOrderStatus {
    status: OrderStatus,
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderStatus>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders.update_status(&id, request.status).await?))
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(request): Json<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>)> {
    request.validate()?;
    let coupon = request.into_coupon(Utc::now())?;
    state.coupons.upsert(&coupon).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn list_coupons(State(state): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(state.coupons.list().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use axum::response::IntoResponse;

    #[test]
    fn business_errors_map_to_400_with_a_code() {
        let response = Error::EmptyCart.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = Error::InsufficientStock {
            variant_key: "P1_red_m".into(),
            requested: 3,
            available: 1,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lookup_failures_map_to_404() {
        let response = Error::not_found("product", "P9").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

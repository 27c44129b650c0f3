//! HTTP surface

pub mod dto;
pub mod error;
pub mod handlers;

use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::engine::GroupBuyEngine;

#[derive(Clone)] pub struct AppState { pub engine: Arc<GroupBuyEngine> }

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/products/:id/group-buy", get(handlers::active_group_buy).post(handlers::propose))
        .route("/api/v1/group-buys/:id", get(handlers::get_group_buy))
        .route("/api/v1/group-buys/:id/commit", post(handlers::commit))
        .route("/api/v1/group-buys/:id/approve", post(handlers::approve))
        .route("/api/v1/group-buys/:id/reject", post(handlers::reject))
        .route("/api/v1/group-buys/:id/advance", post(handlers::advance))
        .route("/api/v1/quotes", post(handlers::quote))
        .route("/api/v1/shipping-rates", get(handlers::shipping_rates))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

// src/lib.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Json, Router,
};
use utoipa::OpenApi;

pub mod common;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use crate::{config::AppState, docs::ApiDoc, middleware::auth::tenant_guard};

/// Monta o router completo. Usado pelo `main` e pelos testes HTTP.
pub fn build_router(app_state: AppState) -> Router {
    // Rotas do núcleo: tenant + Bearer obrigatórios
    let checkout_routes = Router::new()
        .route("/api/checkout", post(handlers::checkout::checkout))
        .route("/api/checkout/intent", post(handlers::payments::create_intent))
        .route("/api/checkout/confirm", post(handlers::payments::confirm_payment))
        .route("/api/checkout/refund/{order_id}", post(handlers::payments::refund_order))
        .route("/api/orders/{order_id}", get(handlers::checkout::get_order));

    let inventory_routes = Router::new()
        .route(
            "/api/inventory/{product_id}/{location_id}",
            get(handlers::inventory::get_stock).put(handlers::inventory::upsert_levels),
        )
        .route("/api/inventory/restock", post(handlers::inventory::restock))
        .route("/api/inventory/transfers", post(handlers::inventory::transfer_stock));

    let admin_routes = Router::new()
        .route(
            "/api/users/{user_id}/locations/{location_id}",
            put(handlers::users::assign_location),
        )
        .route(
            "/api/payments/exceptions",
            get(handlers::payments::list_capture_exceptions),
        );

    let guarded = Router::new()
        .merge(checkout_routes)
        .merge(inventory_routes)
        .merge(admin_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            tenant_guard,
        ));

    // Rotas públicas: o webhook se autentica pela assinatura
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/api/webhooks/payments", post(handlers::payments::payment_webhook))
        .merge(guarded)
        .with_state(app_state)
}

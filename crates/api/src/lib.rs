//! HTTP API server for the storefront order engine.
//!
//! Exposes the cart, checkout, order and staff endpoints plus the payment
//! webhook, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, SharedStore};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/cart",
            get(routes::cart::get)
                .post(routes::cart::add_item)
                .delete(routes::cart::clear),
        )
        .route(
            "/cart/lines/{id}",
            patch(routes::cart::update_line).delete(routes::cart::remove_line),
        )
        .route("/cart/total", get(routes::cart::total))
        .route("/checkout", post(routes::checkout::start))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route(
            "/admin/orders/{id}/status",
            post(routes::admin::update_status),
        )
        .route("/admin/items/{id}/stock", put(routes::admin::set_stock))
        .route(
            "/items/{id}/restock-subscriptions",
            post(routes::subscriptions::subscribe),
        )
        .route("/webhooks/payment", post(routes::webhooks::payment))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

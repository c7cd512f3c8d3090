//! HTTP API for the storefront.
//!
//! Exposes the catalog, cart, checkout, payment and admin report endpoints
//! over axum, with structured logging (tracing) and Prometheus metrics.
//! Writes go through the `checkout` workflows; list and report endpoints read
//! the `projections` views after a catch-up.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{
    CartManager, DomainServices, InMemoryPaymentGateway, OrderLifecycle, TracingNotifier,
};
use domain::{Clock, SystemClock};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{CustomerOrdersView, InventoryView, OrderStatsView, ProjectionProcessor};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// The lifecycle as wired by the server: bundled gateway, log notifier.
pub type Lifecycle<S> = OrderLifecycle<S, InMemoryPaymentGateway, TracingNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub lifecycle: Lifecycle<S>,
    pub carts: CartManager<S>,
    pub services: DomainServices<S>,
    /// Handle on the gateway the lifecycle uses; both share state.
    pub gateway: InMemoryPaymentGateway,
    pub processor: ProjectionProcessor<S>,
    pub orders_view: CustomerOrdersView,
    pub stats_view: OrderStatsView,
    pub inventory_view: InventoryView,
}

/// Builds application state over `store` with the system clock.
pub fn create_state<S: EventStore + Clone + 'static>(store: S, config: &Config) -> Arc<AppState<S>> {
    create_state_with_clock(store, config, Arc::new(SystemClock))
}

/// Builds application state with an explicit clock.
pub fn create_state_with_clock<S: EventStore + Clone + 'static>(
    store: S,
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Arc<AppState<S>> {
    let services = DomainServices::with_settings(store.clone(), clock, config.service_settings());
    let gateway = InMemoryPaymentGateway::new(config.webhook_secret.clone());
    let notifier = TracingNotifier::new(config.enable_email, config.enable_sms);
    let lifecycle = OrderLifecycle::new(services.clone(), gateway.clone(), notifier)
        .with_policy(config.checkout_policy());

    let orders_view = CustomerOrdersView::new();
    let stats_view = OrderStatsView::new();
    let inventory_view = InventoryView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(orders_view.clone()));
    processor.register(Box::new(stats_view.clone()));
    processor.register(Box::new(inventory_view.clone()));

    Arc::new(AppState {
        lifecycle,
        carts: CartManager::new(services.clone()),
        services,
        gateway,
        processor,
        orders_view,
        stats_view,
        inventory_view,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{admin, cart, coupons, health, orders, payments, products};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check::<S>))
        // Catalog
        .route("/products", post(products::create::<S>))
        .route("/products/{id}", get(products::get::<S>))
        .route("/products/{id}/restock", post(products::restock::<S>))
        .route("/products/{id}/price", put(products::change_price::<S>))
        .route("/coupons", post(coupons::create::<S>))
        .route("/coupons/{code}", get(coupons::get::<S>))
        .route("/coupons/{code}/deactivate", post(coupons::deactivate::<S>))
        // Cart
        .route("/cart", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/cart/items", post(cart::add_item::<S>))
        .route(
            "/cart/items/{product_id}",
            put(cart::update_item::<S>).delete(cart::remove_item::<S>),
        )
        .route(
            "/cart/coupon",
            post(cart::apply_coupon::<S>).delete(cart::remove_coupon::<S>),
        )
        // Orders
        .route("/orders", post(orders::checkout::<S>).get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route(
            "/orders/{id}/return",
            post(orders::request_return::<S>).put(orders::update_return::<S>),
        )
        .route("/orders/{id}/status", put(orders::update_status::<S>))
        // Payments
        .route("/payments/intent", post(payments::create_intent::<S>))
        .route("/payments/confirm", post(payments::confirm::<S>))
        .route("/payments/webhook", post(payments::webhook::<S>))
        .route("/payments/refund", post(payments::refund::<S>))
        // Reports
        .route("/admin/orders", get(admin::orders::<S>))
        .route("/admin/orders/stats", get(admin::order_stats::<S>))
        .route("/admin/inventory", get(admin::inventory::<S>))
        .route("/admin/inventory/low-stock", get(admin::low_stock::<S>))
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

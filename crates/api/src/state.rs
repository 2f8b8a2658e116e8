//! Shared application state.

use std::sync::Arc;

use domain::{CartService, InventoryListener, InventoryService, OrderService};
use payments::{CheckoutService, CheckoutSettings, PaymentGateway, SignatureVerifier, WebhookHandler};
use store::Store;

/// Store handle shared by every service.
pub type SharedStore = Arc<dyn Store>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: SharedStore,
    pub carts: CartService<SharedStore>,
    pub orders: Arc<OrderService<SharedStore>>,
    pub inventory: InventoryService<SharedStore>,
    pub checkout: CheckoutService<SharedStore>,
    pub webhooks: WebhookHandler<SharedStore>,
}

impl AppState {
    /// Wires every service against one store.
    ///
    /// `listener` receives committed inventory changes from stock edits and
    /// cancellations.
    pub fn new(
        store: SharedStore,
        listener: Arc<dyn InventoryListener>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
        settings: CheckoutSettings,
    ) -> Self {
        let orders = Arc::new(OrderService::new(store.clone(), listener.clone()));

        Self {
            carts: CartService::new(store.clone()),
            inventory: InventoryService::new(store.clone(), listener),
            checkout: CheckoutService::new(orders.clone(), gateway, settings),
            webhooks: WebhookHandler::new(orders.clone(), verifier),
            orders,
            store,
        }
    }
}

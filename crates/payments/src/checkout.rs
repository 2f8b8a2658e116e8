//! Checkout orchestration: pending order, gateway session, correlation id.

use std::sync::Arc;

use common::{AddressId, OrderId, UserId};
use domain::OrderService;
use store::{Order, OrderLine, Store};

use crate::currency::Currency;
use crate::error::Result;
use crate::gateway::{CheckoutLine, CheckoutRequest, CheckoutSession, PaymentGateway};

/// Settings shared by every checkout.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: Currency,
    /// Public storefront root the gateway redirects back to.
    pub public_base_url: String,
}

impl CheckoutSettings {
    fn success_url(&self, order_id: OrderId) -> String {
        format!(
            "{}/checkout/success?order_id={order_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    fn cancel_url(&self, order_id: OrderId) -> String {
        format!(
            "{}/checkout/cancel?order_id={order_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

/// A pending order with the session that will pay for it.
#[derive(Debug, Clone)]
pub struct StartedCheckout {
    pub order: Order,
    pub session: CheckoutSession,
}

/// Turns a cart into a pending order and opens the gateway session for it.
pub struct CheckoutService<S: Store> {
    orders: Arc<OrderService<S>>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

impl<S: Store> CheckoutService<S> {
    pub fn new(
        orders: Arc<OrderService<S>>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            orders,
            gateway,
            settings,
        }
    }

    fn checkout_line(&self, line: &OrderLine) -> CheckoutLine {
        let (name, image_url) = match &line.snapshot {
            Some(snapshot) => (snapshot.name.clone(), snapshot.image_url.clone()),
            None => (format!("Item {}", line.item_id), None),
        };
        CheckoutLine {
            name,
            unit_amount: self.settings.currency.to_minor_units(line.unit_price),
            quantity: line.quantity,
            image_url,
        }
    }

    /// Starts checkout for the user's cart.
    ///
    /// If the gateway fails the order stays `Pending` without a session and can
    /// be cancelled or retried.
    #[tracing::instrument(skip(self, customer_email))]
    pub async fn start_checkout(
        &self,
        user_id: UserId,
        address_id: AddressId,
        customer_email: &str,
    ) -> Result<StartedCheckout> {
        let order = self.orders.create_pending_order(user_id, address_id).await?;

        let request = CheckoutRequest {
            order_id: order.id,
            lines: order.lines.iter().map(|line| self.checkout_line(line)).collect(),
            success_url: self.settings.success_url(order.id),
            cancel_url: self.settings.cancel_url(order.id),
            customer_email: customer_email.to_string(),
            currency: self.settings.currency.clone(),
        };

        let session = match self.gateway.create_checkout_session(&request).await {
            Ok(session) => session,
            Err(err) => {
                metrics::counter!("checkout_sessions_total", "result" => "failed").increment(1);
                tracing::error!(order_id = %order.id, error = %err, "Failed to open checkout session");
                return Err(err);
            }
        };

        let order = self
            .orders
            .attach_payment_session(order.id, &session.session_id)
            .await?;

        metrics::counter!("checkout_sessions_total", "result" => "opened").increment(1);
        tracing::info!(
            order_id = %order.id,
            session_id = %session.session_id,
            "Checkout session opened"
        );

        Ok(StartedCheckout { order, session })
    }
}

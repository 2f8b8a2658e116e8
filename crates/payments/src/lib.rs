//! Payments: the gateway port, checkout orchestration and signed webhooks.
//!
//! [`CheckoutService`] creates a pending order and opens a hosted checkout
//! session through a [`PaymentGateway`]. When the customer pays, the gateway
//! calls back and [`WebhookHandler`] verifies the signature before confirming
//! the order exactly once.

pub mod checkout;
pub mod currency;
pub mod error;
pub mod gateway;
pub mod http_gateway;
pub mod signature;
pub mod webhook;

pub use checkout::{CheckoutService, CheckoutSettings, StartedCheckout};
pub use currency::Currency;
pub use error::{PaymentError, Result, SignatureError, WebhookError};
pub use gateway::{
    CheckoutLine, CheckoutRequest, CheckoutSession, InMemoryPaymentGateway, PaymentGateway,
};
pub use http_gateway::{HttpGatewayConfig, HttpPaymentGateway};
pub use signature::{DEFAULT_TOLERANCE, SignatureVerifier};
pub use webhook::{CHECKOUT_COMPLETED, WebhookHandler, WebhookOutcome};

//! Payment gateway port and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::currency::Currency;
use crate::error::{PaymentError, Result};

/// One purchasable line shown on the hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub name: String,
    /// Price per unit in the currency's minor units.
    pub unit_amount: i64,
    pub quantity: u32,
    pub image_url: Option<String>,
}

/// Request to open a hosted checkout session for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub order_id: OrderId,
    pub lines: Vec<CheckoutLine>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
    pub currency: Currency,
}

impl CheckoutRequest {
    /// Amount the gateway will charge, in minor units.
    pub fn amount(&self) -> i64 {
        self.lines
            .iter()
            .map(|line| line.unit_amount * i64::from(line.quantity))
            .sum()
    }
}

/// A hosted checkout session opened by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

/// Trait for opening hosted checkout sessions.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session the customer is redirected to.
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    requests: Vec<CheckoutRequest>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory payment gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later session request fail until reset.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Requests received so far, in order.
    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.state.read().await.requests.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut state = self.state.write().await;
        state.requests.push(request.clone());

        if state.fail_on_create {
            return Err(PaymentError::Gateway("Checkout session declined".to_string()));
        }

        state.next_id += 1;
        let session_id = format!("cs_test_{:04}", state.next_id);
        let redirect_url = format!("https://checkout.test/pay/{session_id}");

        Ok(CheckoutSession {
            session_id,
            redirect_url,
        })
    }
}

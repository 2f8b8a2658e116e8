//! Hosted-checkout gateway reached over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{PaymentError, Result};
use crate::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};

/// Connection settings for the hosted-checkout API.
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// API root, e.g. `"https://api.gateway.example"`.
    pub base_url: String,
    /// Secret API key sent as a bearer token.
    pub secret_key: String,
}

/// Payment gateway that opens sessions through a form-encoded REST API.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    config: HttpGatewayConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

impl HttpPaymentGateway {
    #[must_use]
    pub fn new(config: HttpGatewayConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v1/checkout/sessions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

/// Flattens a request into the gateway's bracketed form fields.
fn form_fields(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut fields = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer_email".to_string(), request.customer_email.clone()),
        ("client_reference_id".to_string(), request.order_id.to_string()),
        ("metadata[order_id]".to_string(), request.order_id.to_string()),
    ];

    for (index, line) in request.lines.iter().enumerate() {
        let prefix = format!("line_items[{index}]");
        fields.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
        fields.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.code().to_string(),
        ));
        fields.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.to_string(),
        ));
        fields.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.name.clone(),
        ));
        if let Some(image_url) = &line.image_url {
            fields.push((
                format!("{prefix}[price_data][product_data][images][0]"),
                image_url.clone(),
            ));
        }
    }

    fields
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let response = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.config.secret_key)
            .form(&form_fields(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, "Gateway rejected checkout session");
            return Err(PaymentError::GatewayStatus { status, body });
        }

        let parsed: SessionResponse = response.json().await?;
        tracing::debug!(session_id = %parsed.id, "Checkout session opened");

        Ok(CheckoutSession {
            session_id: parsed.id,
            redirect_url: parsed.url,
        })
    }
}

//! Payment gateway webhook endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the `t=...,v1=...` signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// POST /webhooks/payment
///
/// The raw body is verified before it is parsed. Anything that was accepted,
/// including events for unknown orders, is acknowledged with an empty 200.
#[tracing::instrument(skip_all)]
pub async fn payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.handle(signature, &body).await?;
    tracing::info!(outcome = outcome.as_str(), "Webhook handled");

    Ok(StatusCode::OK)
}

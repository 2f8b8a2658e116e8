//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, DomainError, InventoryError, OrderError};
use payments::{PaymentError, WebhookError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No acting user on the request.
    Unauthorized(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Checkout could not be started.
    Payment(PaymentError),
    /// Webhook delivery was rejected or failed.
    Webhook(WebhookError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Webhook(err) => webhook_error_to_response(err),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Cart(cart_err) => match cart_err {
            CartError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
            CartError::ItemNotFound { .. }
            | CartError::ServiceNotFound { .. }
            | CartError::LineNotFound { .. } => StatusCode::NOT_FOUND,
            CartError::ProductUnavailable { .. } | CartError::InsufficientStock { .. } => {
                StatusCode::CONFLICT
            }
        },
        DomainError::Order(order_err) => match order_err {
            OrderError::EmptyCart | OrderError::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
            OrderError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
            OrderError::ProductUnavailable { .. }
            | OrderError::ServiceUnavailable { .. }
            | OrderError::InsufficientStock { .. }
            | OrderError::InvalidTransition { .. } => StatusCode::CONFLICT,
        },
        DomainError::Inventory(inventory_err) => match inventory_err {
            InventoryError::ItemNotFound { .. } => StatusCode::NOT_FOUND,
            InventoryError::NegativeQuantity { .. } | InventoryError::InvalidEmail { .. } => {
                StatusCode::BAD_REQUEST
            }
        },
        DomainError::ConcurrentModification { .. } => StatusCode::CONFLICT,
        DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    (domain_status(&err), err.to_string())
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::Domain(domain_err) => domain_error_to_response(domain_err),
        PaymentError::Gateway(_) | PaymentError::GatewayStatus { .. } | PaymentError::Http(_) => {
            (StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, String) {
    match &err {
        WebhookError::Signature(_) | WebhookError::Payload(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        // A 5xx makes the gateway redeliver; confirmation is idempotent.
        WebhookError::Confirm(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Webhook(err)
    }
}

#[cfg(test)]
mod tests {
    use common::{CartLineId, CatalogItemId, OrderId, OrderStatus};
    use payments::SignatureError;
    use store::StoreError;

    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn user_correctable_errors_are_client_errors() {
        assert_eq!(
            status_of(DomainError::from(OrderError::EmptyCart).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::from(CartError::InvalidQuantity { quantity: 0 }).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                DomainError::from(CartError::InsufficientStock {
                    item_id: CatalogItemId::new(),
                    requested: 2,
                    available: 1,
                })
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn missing_resources_are_not_found() {
        assert_eq!(
            status_of(
                DomainError::from(OrderError::OrderNotFound {
                    order_id: OrderId::new()
                })
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                DomainError::from(CartError::LineNotFound {
                    line_id: CartLineId::new()
                })
                .into()
            ),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn conflicts() {
        assert_eq!(
            status_of(
                DomainError::from(OrderError::InvalidTransition {
                    from: OrderStatus::Shipped,
                    to: OrderStatus::Pending,
                })
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                DomainError::ConcurrentModification {
                    entity: "order",
                    id: "1".to_string()
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn payment_errors() {
        assert_eq!(
            status_of(PaymentError::Gateway("declined".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(PaymentError::Domain(OrderError::EmptyCart.into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn webhook_errors() {
        assert_eq!(
            status_of(WebhookError::Signature(SignatureError::Mismatch).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                WebhookError::Confirm(DomainError::Store(StoreError::Unavailable(
                    "down".to_string()
                )))
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

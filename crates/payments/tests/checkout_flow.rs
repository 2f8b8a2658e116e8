//! Checkout and webhook tests against the in-memory store and gateway.

use std::sync::Arc;

use common::{AddressId, CatalogItemId, Money, OrderStatus, UserId};
use domain::{
    CartService, DomainError, NoopInventoryListener, OrderError, OrderService,
};
use payments::{
    CheckoutService, CheckoutSettings, Currency, DEFAULT_TOLERANCE, InMemoryPaymentGateway,
    PaymentError, SignatureError, SignatureVerifier, WebhookError, WebhookHandler,
    WebhookOutcome,
};
use store::{Address, CatalogItem, CatalogVariant, InMemoryStore, Store};

const SECRET: &str = "whsec_checkout_tests";

struct Harness {
    store: InMemoryStore,
    carts: CartService<InMemoryStore>,
    orders: Arc<OrderService<InMemoryStore>>,
    gateway: InMemoryPaymentGateway,
    checkout: CheckoutService<InMemoryStore>,
    webhooks: WebhookHandler<InMemoryStore>,
    user: UserId,
    address: AddressId,
    item: CatalogItemId,
}

async fn harness(stock: Option<i32>) -> Harness {
    let store = InMemoryStore::new();
    let user = UserId::new();
    let item = CatalogItem {
        id: CatalogItemId::new(),
        name: "Round Tortoise".to_string(),
        slug: "round-tortoise".to_string(),
        price: Money::from_major(120),
        is_active: true,
        stock_quantity: stock,
        primary_image_url: Some("https://cdn.example.com/round.jpg".to_string()),
        variant: CatalogVariant::Frame {
            material: "acetate".to_string(),
            frame_type: "full-rim".to_string(),
            color: Some("tortoise".to_string()),
        },
    };
    let address = Address {
        id: AddressId::new(),
        user_id: user,
        recipient: "Ada Lovelace".to_string(),
        line1: "12 Analytical Row".to_string(),
        city: "London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country: "GB".to_string(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_catalog_item(&item).await.unwrap();
    tx.insert_address(&address).await.unwrap();
    tx.commit().await.unwrap();

    let orders = Arc::new(OrderService::new(
        store.clone(),
        Arc::new(NoopInventoryListener),
    ));
    let gateway = InMemoryPaymentGateway::new();
    let checkout = CheckoutService::new(
        orders.clone(),
        Arc::new(gateway.clone()),
        CheckoutSettings {
            currency: Currency::from_code("usd"),
            public_base_url: "https://shop.example.com/".to_string(),
        },
    );
    let webhooks = WebhookHandler::new(
        orders.clone(),
        SignatureVerifier::new(SECRET, DEFAULT_TOLERANCE).unwrap(),
    );

    Harness {
        carts: CartService::new(store.clone()),
        store,
        orders,
        gateway,
        checkout,
        webhooks,
        user,
        address: address.id,
        item: item.id,
    }
}

fn completed_event(session_id: &str, payment_intent: &str) -> Vec<u8> {
    serde_json::json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "payment_intent": payment_intent,
            }
        }
    })
    .to_string()
    .into_bytes()
}

fn sign(body: &[u8]) -> String {
    SignatureVerifier::new(SECRET, DEFAULT_TOLERANCE)
        .unwrap()
        .sign(chrono::Utc::now().timestamp(), body)
}

mod start_checkout {
    use super::*;

    #[tokio::test]
    async fn opens_session_and_records_it_on_the_order() {
        let h = harness(Some(5)).await;
        h.carts.add_item(h.user, h.item, 2, None, None).await.unwrap();

        let started = h
            .checkout
            .start_checkout(h.user, h.address, "ada@example.com")
            .await
            .unwrap();

        assert_eq!(started.session.session_id, "cs_test_0001");
        assert_eq!(started.order.status, OrderStatus::Pending);
        assert_eq!(
            started.order.payment_session_id.as_deref(),
            Some("cs_test_0001")
        );

        let requests = h.gateway.requests().await;
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.order_id, started.order.id);
        assert_eq!(request.customer_email, "ada@example.com");
        assert_eq!(request.lines.len(), 1);
        assert_eq!(request.lines[0].name, "Round Tortoise");
        assert_eq!(request.lines[0].unit_amount, 12_000);
        assert_eq!(request.lines[0].quantity, 2);
        assert_eq!(request.amount(), started.order.total_amount.cents());
        assert_eq!(
            request.success_url,
            format!(
                "https://shop.example.com/checkout/success?order_id={}",
                started.order.id
            )
        );

        // Stock is untouched until payment.
        assert_eq!(h.store.stock_quantity(h.item).await, Some(5));
    }

    #[tokio::test]
    async fn gateway_failure_leaves_a_cancellable_pending_order() {
        let h = harness(Some(5)).await;
        h.carts.add_item(h.user, h.item, 1, None, None).await.unwrap();
        h.gateway.set_fail_on_create(true).await;

        let err = h
            .checkout
            .start_checkout(h.user, h.address, "ada@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(_)));

        let request = &h.gateway.requests().await[0];
        let order = h.orders.get_order(request.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.payment_session_id.is_none());

        let cancelled = h.orders.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn empty_cart_never_reaches_the_gateway() {
        let h = harness(Some(5)).await;

        let err = h
            .checkout
            .start_checkout(h.user, h.address, "ada@example.com")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::Domain(DomainError::Order(OrderError::EmptyCart))
        ));
        assert!(h.gateway.requests().await.is_empty());
        assert_eq!(h.store.order_count().await, 0);
    }
}

mod webhook {
    use super::*;

    async fn checked_out(stock: Option<i32>) -> (Harness, String) {
        let h = harness(stock).await;
        h.carts.add_item(h.user, h.item, 1, None, None).await.unwrap();
        let started = h
            .checkout
            .start_checkout(h.user, h.address, "ada@example.com")
            .await
            .unwrap();
        (h, started.session.session_id)
    }

    #[tokio::test]
    async fn completed_checkout_confirms_the_order() {
        let (h, session_id) = checked_out(Some(5)).await;
        let body = completed_event(&session_id, "pi_123");

        let outcome = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();

        let WebhookOutcome::Confirmed { order_id } = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        let order = h.orders.get_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_id.as_deref(), Some("pi_123"));
        assert_eq!(h.store.stock_quantity(h.item).await, Some(4));
        assert!(h.carts.get_cart(h.user).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn redelivery_debits_stock_once() {
        let (h, session_id) = checked_out(Some(5)).await;
        let body = completed_event(&session_id, "pi_123");

        h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();
        let second = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();

        assert!(matches!(second, WebhookOutcome::AlreadyProcessed { .. }));
        assert_eq!(h.store.stock_quantity(h.item).await, Some(4));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn simultaneous_deliveries_debit_stock_once() {
        let (h, session_id) = checked_out(Some(5)).await;
        let body = completed_event(&session_id, "pi_123");
        let header = sign(&body);

        let (first, second) = tokio::join!(
            h.webhooks.handle(Some(&header), &body),
            h.webhooks.handle(Some(&header), &body),
        );
        let outcomes = [first.unwrap(), second.unwrap()];

        let confirmed = outcomes
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::Confirmed { .. }))
            .count();
        let redelivered = outcomes
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::AlreadyProcessed { .. }))
            .count();
        assert_eq!((confirmed, redelivered), (1, 1));
        assert_eq!(h.store.stock_quantity(h.item).await, Some(4));
    }

    #[tokio::test]
    async fn bad_signature_changes_nothing() {
        let (h, session_id) = checked_out(Some(5)).await;
        let body = completed_event(&session_id, "pi_123");
        let forged = SignatureVerifier::new("whsec_forged", DEFAULT_TOLERANCE)
            .unwrap()
            .sign(chrono::Utc::now().timestamp(), &body);

        let err = h.webhooks.handle(Some(&forged), &body).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Signature(SignatureError::Mismatch)
        ));

        let err = h.webhooks.handle(None, &body).await.unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Signature(SignatureError::MissingHeader)
        ));

        let order = h.orders.find_by_payment_session(&session_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(h.store.stock_quantity(h.item).await, Some(5));
    }

    #[tokio::test]
    async fn unknown_session_is_acknowledged() {
        let (h, _) = checked_out(Some(5)).await;
        let body = completed_event("cs_unknown", "pi_999");

        let outcome = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::OrderLookupMiss {
                session_id: "cs_unknown".to_string()
            }
        );
        assert_eq!(h.store.stock_quantity(h.item).await, Some(5));
    }

    #[tokio::test]
    async fn other_event_types_are_ignored() {
        let (h, _) = checked_out(Some(5)).await;
        let body = serde_json::json!({
            "type": "checkout.session.expired",
            "data": { "object": { "id": "cs_test_0001" } }
        })
        .to_string()
        .into_bytes();

        let outcome = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "checkout.session.expired".to_string()
            }
        );
    }

    #[tokio::test]
    async fn verified_but_unreadable_payload_is_rejected() {
        let (h, _) = checked_out(Some(5)).await;
        let body = b"not json".to_vec();

        let err = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap_err();
        assert!(matches!(err, WebhookError::Payload(_)));
    }

    #[tokio::test]
    async fn payment_for_cancelled_order_is_not_applied() {
        let (h, session_id) = checked_out(Some(5)).await;
        let order = h.orders.find_by_payment_session(&session_id).await.unwrap().unwrap();
        h.orders.cancel_order(order.id).await.unwrap();
        let body = completed_event(&session_id, "pi_late");

        let outcome = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::OrderCancelled { order_id: order.id });
        assert_eq!(
            h.orders.get_order(order.id).await.unwrap().status,
            OrderStatus::Cancelled
        );
        assert_eq!(h.store.stock_quantity(h.item).await, Some(5));
    }

    #[tokio::test]
    async fn failed_confirmation_rolls_back_and_can_be_retried() {
        let (h, session_id) = checked_out(Some(5)).await;
        let body = completed_event(&session_id, "pi_123");
        h.store.fail_next_commit();

        let err = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap_err();
        assert!(matches!(err, WebhookError::Confirm(_)));
        assert_eq!(h.store.stock_quantity(h.item).await, Some(5));

        let outcome = h.webhooks.handle(Some(&sign(&body)), &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Confirmed { .. }));
        assert_eq!(h.store.stock_quantity(h.item).await, Some(4));
    }
}

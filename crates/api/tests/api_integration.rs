//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{AddressId, CatalogItemId, Money, ServiceId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{RestockQueue, RestockReceiver};
use payments::{
    CheckoutSettings, Currency, DEFAULT_TOLERANCE, InMemoryPaymentGateway, SignatureVerifier,
};
use serde_json::{Value, json};
use store::{Address, CatalogItem, CatalogVariant, InMemoryStore, ServiceAddOn, Store};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_api_tests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: Router,
    store: InMemoryStore,
    gateway: InMemoryPaymentGateway,
    restocks: RestockReceiver,
    user: UserId,
    address: AddressId,
    item: CatalogItemId,
    service: ServiceId,
}

/// Item priced 100 with `stock` on hand, a 20 service add-on and one address.
async fn setup(stock: Option<i32>) -> TestApp {
    let store = InMemoryStore::new();
    let user = UserId::new();
    let item = CatalogItem {
        id: CatalogItemId::new(),
        name: "Wayfarer".to_string(),
        slug: "wayfarer".to_string(),
        price: Money::from_major(100),
        is_active: true,
        stock_quantity: stock,
        primary_image_url: None,
        variant: CatalogVariant::Frame {
            material: "acetate".to_string(),
            frame_type: "full-rim".to_string(),
            color: Some("black".to_string()),
        },
    };
    let service = ServiceAddOn {
        id: ServiceId::new(),
        name: "Lens fitting".to_string(),
        price: Money::from_major(20),
    };
    let address = Address {
        id: AddressId::new(),
        user_id: user,
        recipient: "Alan Turing".to_string(),
        line1: "2 Bletchley Park".to_string(),
        city: "Milton Keynes".to_string(),
        postal_code: "MK3 6EB".to_string(),
        country: "GB".to_string(),
    };

    let mut tx = store.begin().await.unwrap();
    tx.insert_catalog_item(&item).await.unwrap();
    tx.insert_service_add_on(&service).await.unwrap();
    tx.insert_address(&address).await.unwrap();
    tx.commit().await.unwrap();

    let (queue, restocks) = RestockQueue::bounded(8);
    let gateway = InMemoryPaymentGateway::new();
    let state = Arc::new(AppState::new(
        Arc::new(store.clone()),
        Arc::new(queue),
        Arc::new(gateway.clone()),
        SignatureVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE).unwrap(),
        CheckoutSettings {
            currency: Currency::default(),
            public_base_url: "https://shop.example.com".to_string(),
        },
    ));

    TestApp {
        app: api::create_app(state, get_metrics_handle()),
        store,
        gateway,
        restocks,
        user,
        address: address.id,
        item: item.id,
        service: service.id,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        send(&self.app, request).await
    }

    async fn as_user(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, Some(self.user), body).await
    }

    async fn add_to_cart(&self, quantity: i32, with_service: bool) -> (StatusCode, Value) {
        let mut body = json!({ "item_id": self.item, "quantity": quantity });
        if with_service {
            body["service_id"] = json!(self.service);
        }
        self.as_user("POST", "/cart", Some(body)).await
    }

    async fn checkout(&self) -> (StatusCode, Value) {
        self.as_user(
            "POST",
            "/checkout",
            Some(json!({ "address_id": self.address, "email": "alan@example.com" })),
        )
        .await
    }

    async fn webhook(&self, body: &Value, signature: Option<String>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/payment")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("payment-signature", signature);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        send(&self.app, request).await
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn completed(session_id: &str) -> Value {
    json!({
        "type": "checkout.session.completed",
        "data": { "object": { "id": session_id, "payment_intent": "pi_api_1" } }
    })
}

fn sign(body: &Value) -> String {
    SignatureVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
        .unwrap()
        .sign(chrono::Utc::now().timestamp(), body.to_string().as_bytes())
}

#[tokio::test]
async fn test_health_check() {
    let t = setup(None).await;

    let (status, json) = t.call("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup(None).await;

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

mod cart {
    use super::*;

    #[tokio::test]
    async fn requires_a_user() {
        let t = setup(Some(5)).await;

        let (status, json) = t.call("GET", "/cart", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["error"].as_str().is_some());

        let request = Request::builder()
            .uri("/cart")
            .header("x-user-id", "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_cart_before_first_add() {
        let t = setup(Some(5)).await;

        let (status, json) = t.as_user("GET", "/cart", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["cart_id"].is_null());
        assert_eq!(json["lines"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn add_merge_and_quote() {
        let t = setup(Some(5)).await;

        let (status, json) = t.add_to_cart(1, true).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["lines"].as_array().unwrap().len(), 1);

        let (_, json) = t.add_to_cart(1, true).await;
        let lines = json["lines"].as_array().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["quantity"], 2);

        let (status, json) = t.as_user("GET", "/cart/total", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_cents"], 24_000);
    }

    #[tokio::test]
    async fn prescriptions_keep_lines_apart() {
        let t = setup(Some(5)).await;
        let body = |sph: f64| {
            json!({
                "item_id": t.item,
                "quantity": 1,
                "prescription": { "sph": sph, "cyl": -0.5 }
            })
        };

        t.as_user("POST", "/cart", Some(body(-1.25))).await;
        let (_, json) = t.as_user("POST", "/cart", Some(body(-2.0))).await;

        let lines = json["lines"].as_array().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["prescription"]["sph"], -1.25);
    }

    #[tokio::test]
    async fn rejects_bad_quantities_and_missing_stock() {
        let t = setup(Some(1)).await;

        let (status, json) = t.add_to_cart(0, false).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("quantity"));

        let (status, _) = t.add_to_cart(2, false).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = t
            .as_user(
                "POST",
                "/cart",
                Some(json!({ "item_id": CatalogItemId::new(), "quantity": 1 })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_and_remove_lines() {
        let t = setup(Some(10)).await;
        let (_, json) = t.add_to_cart(1, false).await;
        let line_id = json["lines"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = t
            .as_user(
                "PATCH",
                &format!("/cart/lines/{line_id}"),
                Some(json!({ "quantity": 4 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["lines"][0]["quantity"], 4);

        // Another user cannot touch the line.
        let (status, _) = t
            .call(
                "DELETE",
                &format!("/cart/lines/{line_id}"),
                Some(UserId::new()),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = t
            .as_user("DELETE", &format!("/cart/lines/{line_id}"), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, json) = t.as_user("GET", "/cart", None).await;
        assert_eq!(json["lines"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn clear_empties_the_cart() {
        let t = setup(Some(10)).await;
        t.add_to_cart(3, false).await;

        let (status, _) = t.as_user("DELETE", "/cart", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, json) = t.as_user("GET", "/cart/total", None).await;
        assert_eq!(json["total_cents"], 0);
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn happy_path_from_cart_to_paid_order() {
        let t = setup(Some(5)).await;
        t.add_to_cart(1, true).await;

        let (status, json) = t.checkout().await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["total_cents"], 12_000);
        let order_id = json["order_id"].as_str().unwrap().to_string();
        let session_id = json["session_id"].as_str().unwrap().to_string();
        assert!(json["redirect_url"].as_str().unwrap().contains(&session_id));

        let (_, order) = t.as_user("GET", &format!("/orders/{order_id}"), None).await;
        assert_eq!(order["status"], "Pending");
        assert_eq!(order["lines"][0]["unit_price_cents"], 12_000);
        assert_eq!(order["lines"][0]["name"], "Wayfarer");
        assert_eq!(t.store.stock_quantity(t.item).await, Some(5));

        let event = completed(&session_id);
        let (status, body) = t.webhook(&event, Some(sign(&event))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());

        let (_, order) = t.as_user("GET", &format!("/orders/{order_id}"), None).await;
        assert_eq!(order["status"], "Paid");
        assert_eq!(order["payment_id"], "pi_api_1");
        assert_eq!(t.store.stock_quantity(t.item).await, Some(4));

        let (_, cart) = t.as_user("GET", "/cart", None).await;
        assert_eq!(cart["lines"].as_array().unwrap().len(), 0);

        // Redelivery is acknowledged without a second debit.
        let (status, _) = t.webhook(&event, Some(sign(&event))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(t.store.stock_quantity(t.item).await, Some(4));
    }

    #[tokio::test]
    async fn empty_cart_is_a_bad_request() {
        let t = setup(Some(5)).await;

        let (status, json) = t.checkout().await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Order error: Cart is empty");
    }

    #[tokio::test]
    async fn insufficient_stock_creates_no_order() {
        let t = setup(Some(3)).await;
        t.add_to_cart(3, false).await;
        // Stock sells out between add and checkout.
        let (status, _) = t
            .call(
                "PUT",
                &format!("/admin/items/{}/stock", t.item),
                None,
                Some(json!({ "quantity": 0 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = t.checkout().await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(t.store.order_count().await, 0);
        assert_eq!(t.store.order_line_count().await, 0);
    }

    #[tokio::test]
    async fn gateway_outage_is_a_bad_gateway() {
        let t = setup(Some(5)).await;
        t.add_to_cart(1, false).await;
        t.gateway.set_fail_on_create(true).await;

        let (status, json) = t.checkout().await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"].as_str().is_some());
        assert_eq!(t.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn address_of_another_user_is_rejected() {
        let t = setup(Some(5)).await;
        let stranger = UserId::new();
        t.call(
            "POST",
            "/cart",
            Some(stranger),
            Some(json!({ "item_id": t.item, "quantity": 1 })),
        )
        .await;

        let (status, _) = t
            .call(
                "POST",
                "/checkout",
                Some(stranger),
                Some(json!({ "address_id": t.address, "email": "x@example.com" })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod webhooks {
    use super::*;

    #[tokio::test]
    async fn bad_signature_is_rejected_with_an_error_body() {
        let t = setup(Some(5)).await;
        t.add_to_cart(1, false).await;
        let (_, json) = t.checkout().await;
        let event = completed(json["session_id"].as_str().unwrap());

        let (status, body) = t.webhook(&event, Some("t=1,v1=00".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());

        let (status, _) = t.webhook(&event, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(t.store.stock_quantity(t.item).await, Some(5));
    }

    #[tokio::test]
    async fn unmatched_session_is_acknowledged() {
        let t = setup(Some(5)).await;
        let event = completed("cs_nobody");

        let (status, _) = t.webhook(&event, Some(sign(&event))).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn failed_confirmation_asks_for_redelivery() {
        let t = setup(Some(5)).await;
        t.add_to_cart(1, false).await;
        let (_, json) = t.checkout().await;
        let event = completed(json["session_id"].as_str().unwrap());
        t.store.fail_next_commit();

        let (status, _) = t.webhook(&event, Some(sign(&event))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(t.store.stock_quantity(t.item).await, Some(5));

        let (status, _) = t.webhook(&event, Some(sign(&event))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(t.store.stock_quantity(t.item).await, Some(4));
    }
}

mod orders {
    use super::*;

    async fn pending_order(t: &TestApp) -> String {
        t.add_to_cart(1, false).await;
        let (_, json) = t.checkout().await;
        json["order_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn other_users_cannot_see_or_cancel() {
        let t = setup(Some(5)).await;
        let order_id = pending_order(&t).await;
        let stranger = Some(UserId::new());

        let (status, _) = t
            .call("GET", &format!("/orders/{order_id}"), stranger, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = t
            .call("POST", &format!("/orders/{order_id}/cancel"), stranger, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_pending_then_cancel_again() {
        let t = setup(Some(5)).await;
        let order_id = pending_order(&t).await;

        let (status, json) = t
            .as_user("POST", &format!("/orders/{order_id}/cancel"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Cancelled");

        let (status, _) = t
            .as_user("POST", &format!("/orders/{order_id}/cancel"), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_and_unknown_ids() {
        let t = setup(Some(5)).await;

        let (status, _) = t.as_user("GET", "/orders/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = t
            .as_user("GET", &format!("/orders/{}", UserId::new()), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod admin {
    use super::*;

    async fn paid_order(t: &TestApp) -> String {
        t.add_to_cart(2, false).await;
        let (_, json) = t.checkout().await;
        let event = completed(json["session_id"].as_str().unwrap());
        t.webhook(&event, Some(sign(&event))).await;
        json["order_id"].as_str().unwrap().to_string()
    }

    async fn set_status(t: &TestApp, order_id: &str, status: &str) -> (StatusCode, Value) {
        t.call(
            "POST",
            &format!("/admin/orders/{order_id}/status"),
            None,
            Some(json!({ "status": status })),
        )
        .await
    }

    #[tokio::test]
    async fn status_moves_one_step_at_a_time() {
        let t = setup(Some(5)).await;
        let order_id = paid_order(&t).await;

        let (status, json) = set_status(&t, &order_id, "confirmed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Confirmed");

        let (status, _) = set_status(&t, &order_id, "Delivered").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = set_status(&t, &order_id, "teleported").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cancelling_a_paid_order_restores_stock_and_notifies() {
        let mut t = setup(Some(2)).await;
        let order_id = paid_order(&t).await;
        assert_eq!(t.store.stock_quantity(t.item).await, Some(0));

        let (status, json) = set_status(&t, &order_id, "Cancelled").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Cancelled");
        assert_eq!(t.store.stock_quantity(t.item).await, Some(2));
        assert_eq!(t.restocks.try_recv().map(|job| job.item_id), Some(t.item));
    }

    #[tokio::test]
    async fn stock_edit_reports_restock() {
        let mut t = setup(Some(0)).await;

        let (status, json) = t
            .call(
                "PUT",
                &format!("/admin/items/{}/stock", t.item),
                None,
                Some(json!({ "quantity": 10 })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["previous"], 0);
        assert_eq!(json["current"], 10);
        assert_eq!(json["restocked"], true);
        assert!(t.restocks.try_recv().is_some());

        let (status, _) = t
            .call(
                "PUT",
                &format!("/admin/items/{}/stock", t.item),
                None,
                Some(json!({ "quantity": -1 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod subscriptions {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_validate_email() {
        let t = setup(Some(0)).await;
        let uri = format!("/items/{}/restock-subscriptions", t.item);

        let (status, json) = t
            .as_user("POST", &uri, Some(json!({ "email": "alan@example.com" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["email"], "alan@example.com");

        let (status, _) = t
            .as_user("POST", &uri, Some(json!({ "email": "not-an-email" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = t
            .as_user(
                "POST",
                &format!("/items/{}/restock-subscriptions", CatalogItemId::new()),
                Some(json!({ "email": "alan@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

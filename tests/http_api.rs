mod support;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use checkout_engine::{build_router, services::payment_gateway::sign_webhook_payload};

use support::{World, WEBHOOK_SECRET};

fn router(world: &World) -> Router {
    build_router(world.state.clone())
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authed(world: &World, user_id: uuid::Uuid, method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-tenant-id", world.tenant_id.to_string())
        .header(header::AUTHORIZATION, format!("Bearer {}", world.token(user_id)))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let world = World::new().await;

    let response = router(&world)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (status, doc) = send(
        router(&world),
        Request::get("/api/docs/openapi.json").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/checkout"].is_object());
    let webhook = &doc["paths"]["/api/webhooks/payments"]["post"];
    assert!(webhook["requestBody"]["content"]["application/json"].is_object());
}

#[tokio::test]
async fn core_routes_require_tenant_then_bearer() {
    let world = World::new().await;

    let (status, body) = send(
        router(&world),
        Request::post("/api/checkout")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TENANT_IDENTIFIER_MISSING");

    let (status, body) = send(
        router(&world),
        Request::post("/api/checkout")
            .header("x-tenant-id", world.tenant_id.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");

    let (status, body) = send(
        router(&world),
        Request::get(format!("/api/orders/{}", uuid::Uuid::new_v4()))
            .header("x-tenant-id", uuid::Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TENANT_NOT_FOUND");
}

#[tokio::test]
async fn cash_checkout_returns_the_order_in_snake_case() {
    let world = World::new().await;
    world.set_stock(world.product_id, 10).await;

    let (status, body) = send(
        router(&world),
        authed(
            &world,
            world.cashier_id,
            "POST",
            "/api/checkout",
            json!({
                "location_id": world.location_id,
                "items": [{ "product_id": world.product_id, "quantity": 3 }],
                "payment_method": "cash",
                "discount_amount": 2.0
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["payment_method"], "cash");
    assert_eq!(body["total_amount"].as_f64(), Some(13.0));
    assert_eq!(body["lines"].as_array().map(Vec::len), Some(1));
    assert_eq!(world.stock(world.product_id).await, 7);

    // O mesmo pedido volta pelo GET
    let order_id = body["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(
        router(&world),
        Request::get(format!("/api/orders/{order_id}?tenantId={}", world.tenant_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", world.token(world.cashier_id)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], body["id"]);
}

#[tokio::test]
async fn oversell_is_a_conflict_with_details() {
    let world = World::new().await;
    world.set_stock(world.product_id, 2).await;

    let (status, body) = send(
        router(&world),
        authed(
            &world,
            world.cashier_id,
            "POST",
            "/api/checkout",
            json!({
                "location_id": world.location_id,
                "items": [{ "product_id": world.product_id, "quantity": 3 }],
                "payment_method": "cash"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["details"]["product_id"], world.product_id.to_string());
    assert_eq!(body["details"]["requested"], 3);
    assert_eq!(body["details"]["available"], 2);
    assert_eq!(world.stock(world.product_id).await, 2);
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_touching_stock() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;

    let (status, body) = send(
        router(&world),
        authed(
            &world,
            world.cashier_id,
            "POST",
            "/api/checkout",
            json!({
                "location_id": world.location_id,
                "items": [],
                "payment_method": "cash",
                "discount_amount": -1.0
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["details"]["items"].is_array());
    assert!(body["details"]["discount_amount"].is_array());
    assert_eq!(world.stock(world.product_id).await, 5);
}

#[tokio::test]
async fn card_checkout_is_accepted_with_an_intent() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;

    let (status, body) = send(
        router(&world),
        authed(
            &world,
            world.cashier_id,
            "POST",
            "/api/checkout",
            json!({
                "location_id": world.location_id,
                "items": [{ "product_id": world.product_id, "quantity": 4 }],
                "payment_method": "card"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["intent_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(body["amount"].as_f64(), Some(20.0));
    assert_eq!(world.stock(world.product_id).await, 5);
}

#[tokio::test]
async fn outsider_gets_location_access_denied() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;

    let (status, body) = send(
        router(&world),
        authed(
            &world,
            world.outsider_id,
            "POST",
            "/api/checkout",
            json!({
                "location_id": world.location_id,
                "items": [{ "product_id": world.product_id, "quantity": 1 }],
                "payment_method": "cash"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "LOCATION_ACCESS_DENIED");
}

#[tokio::test]
async fn error_messages_follow_accept_language() {
    let world = World::new().await;

    let (_, body) = send(
        router(&world),
        Request::get(format!("/api/orders/{}", uuid::Uuid::new_v4()))
            .header(header::ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body["error"], "O cabeçalho X-Tenant-ID é obrigatório.");
}

#[tokio::test]
async fn webhook_checks_signature_then_always_acknowledges() {
    let world = World::new().await;
    let payload = json!({
        "id": "evt_http_1",
        "type": "charge.dispute.created",
        "data": { "object": {
            "id": "ch_1",
            "payment_intent": "pi_1",
            "metadata": { "tenant_id": world.tenant_id.to_string() }
        } }
    })
    .to_string();

    let webhook = |body: String, signature: Option<String>| {
        let mut builder = Request::post("/api/webhooks/payments");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    };
    let now = chrono::Utc::now().timestamp();

    let (status, body) = send(router(&world), webhook(payload.clone(), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_WEBHOOK_SIGNATURE");

    let forged = sign_webhook_payload(payload.as_bytes(), "whsec_outro", now).unwrap();
    let (status, _) = send(router(&world), webhook(payload.clone(), Some(forged))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let signed = sign_webhook_payload(payload.as_bytes(), WEBHOOK_SECRET, now).unwrap();
    let (status, body) = send(router(&world), webhook(payload.clone(), Some(signed.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    // Reenvio do mesmo evento também é 200
    let (status, _) = send(router(&world), webhook(payload, Some(signed))).await;
    assert_eq!(status, StatusCode::OK);

    // Autêntico mas ilegível: 200 para o gateway parar de reenviar
    let garbage = "não é json".to_string();
    let signed = sign_webhook_payload(garbage.as_bytes(), WEBHOOK_SECRET, now).unwrap();
    let (status, _) = send(router(&world), webhook(garbage, Some(signed))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn capture_exceptions_are_for_auditors_only() {
    let world = World::new().await;

    let (status, body) = send(
        router(&world),
        authed(&world, world.cashier_id, "GET", "/api/payments/exceptions", Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = send(
        router(&world),
        authed(&world, world.admin_id, "GET", "/api/payments/exceptions", Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn restock_quantity_is_bounded_at_the_edge() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;

    let (status, body) = send(
        router(&world),
        authed(
            &world,
            world.admin_id,
            "POST",
            "/api/inventory/restock",
            json!({
                "product_id": world.product_id,
                "location_id": world.location_id,
                "quantity": i32::MAX
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["details"]["quantity"].is_array());
    assert_eq!(world.stock(world.product_id).await, 5);
}

#[tokio::test]
async fn idempotency_key_header_dedupes_card_checkouts() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;

    let card_checkout = |key: &str| {
        let mut request = authed(
            &world,
            world.cashier_id,
            "POST",
            "/api/checkout",
            json!({
                "location_id": world.location_id,
                "items": [{ "product_id": world.product_id, "quantity": 1 }],
                "payment_method": "card"
            }),
        );
        request.headers_mut().insert("idempotency-key", key.parse().unwrap());
        request
    };

    let (status, first) = send(router(&world), card_checkout("pedido-77")).await;
    assert_eq!(status, StatusCode::ACCEPTED, "body: {first}");
    let (_, retried) = send(router(&world), card_checkout("pedido-77")).await;
    assert_eq!(retried["intent_id"], first["intent_id"]);

    let (_, other) = send(router(&world), card_checkout("pedido-78")).await;
    assert_ne!(other["intent_id"], first["intent_id"]);

    let (status, body) = send(router(&world), card_checkout(&"x".repeat(201))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn tenant_id_in_query_is_percent_decoded() {
    let world = World::new().await;
    let encoded = world.tenant_id.to_string().replace('-', "%2D");

    let (status, body) = send(
        router(&world),
        Request::get(format!("/api/orders/{}?tenantId={encoded}", uuid::Uuid::new_v4()))
            .header(header::AUTHORIZATION, format!("Bearer {}", world.token(world.cashier_id)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    // O tenant foi resolvido; só o pedido é que não existe
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ORDER_NOT_FOUND");
}

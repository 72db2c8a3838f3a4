mod support;

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use checkout_engine::{
    common::error::AppError,
    db::InventoryLedger,
    models::{
        inventory::StockMovementReason,
        orders::{CartItem, CartRequest, OrderStatus, PaymentMethod},
    },
    services::checkout_service::CheckoutOutcome,
};

use support::{dec, seed_customer, seed_product, FailingOrders, RacingLedger, World};

fn cart(world: &World, items: &[(Uuid, i32)], discount: &str) -> CartRequest {
    CartRequest {
        location_id: world.location_id,
        customer_id: None,
        items: items
            .iter()
            .map(|(product_id, quantity)| CartItem { product_id: *product_id, quantity: *quantity })
            .collect(),
        discount_amount: dec(discount),
    }
}

#[tokio::test]
async fn cash_sale_decrements_stock_and_completes_order() {
    let world = World::new().await;
    world.set_stock(world.product_id, 10).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let outcome = world
        .state
        .checkout_service
        .checkout(&tenant, &cashier, &cart(&world, &[(world.product_id, 3)], "2.00"), PaymentMethod::Cash)
        .await
        .unwrap();

    let CheckoutOutcome::Committed(order) = outcome else {
        panic!("cash sale must commit immediately");
    };
    assert_eq!(order.order.total_amount, dec("13.00"));
    assert_eq!(order.order.discount_amount, dec("2.00"));
    assert_eq!(order.order.status, OrderStatus::Completed);
    assert_eq!(order.order.payment_status, None);
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].unit_price, dec("5.00"));
    assert_eq!(order.lines[0].line_total, dec("15.00"));
    assert_eq!(world.stock(world.product_id).await, 7);

    let movements = world.store.movements_for_order(&tenant, order.order.id).await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].reason, StockMovementReason::Sale);
    assert_eq!(movements[0].quantity_changed, -3);
}

#[tokio::test]
async fn digital_wallet_settles_like_cash_without_gateway() {
    let world = World::new().await;
    world.set_stock(world.product_id, 4).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let outcome = world
        .state
        .checkout_service
        .checkout(&tenant, &cashier, &cart(&world, &[(world.product_id, 1)], "0"), PaymentMethod::Digital)
        .await
        .unwrap();

    let CheckoutOutcome::Committed(order) = outcome else {
        panic!("digital sale must commit immediately");
    };
    assert_eq!(order.order.payment_method, PaymentMethod::Digital);
    assert_eq!(order.order.payment_intent_id, None);
    assert_eq!(world.stock(world.product_id).await, 3);
}

#[tokio::test]
async fn oversell_is_rejected_and_nothing_changes() {
    let world = World::new().await;
    world.set_stock(world.product_id, 2).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let err = world
        .state
        .checkout_service
        .checkout(&tenant, &cashier, &cart(&world, &[(world.product_id, 3)], "0"), PaymentMethod::Cash)
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientStock { product_id, product_name, requested, available } => {
            assert_eq!(product_id, world.product_id);
            assert_eq!(product_name.as_deref(), Some("Café Torrado 500g"));
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(world.stock(world.product_id).await, 2);
}

#[tokio::test]
async fn card_checkout_opens_intent_without_touching_stock() {
    let world = World::new().await;
    world.set_stock(world.product_id, 10).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let outcome = world
        .state
        .checkout_service
        .checkout(&tenant, &cashier, &cart(&world, &[(world.product_id, 4)], "0"), PaymentMethod::Card)
        .await
        .unwrap();

    let CheckoutOutcome::PaymentRequired(handle) = outcome else {
        panic!("card sale must wait for payment");
    };
    assert_eq!(handle.amount, dec("20.00"));
    assert_eq!(handle.currency, "usd");
    assert!(!handle.client_secret.is_empty());
    assert_eq!(world.stock(world.product_id).await, 10);
}

#[tokio::test]
async fn duplicate_cart_lines_are_merged() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let outcome = world
        .state
        .checkout_service
        .checkout(
            &tenant,
            &cashier,
            &cart(&world, &[(world.product_id, 2), (world.product_id, 1)], "0"),
            PaymentMethod::Cash,
        )
        .await
        .unwrap();

    let CheckoutOutcome::Committed(order) = outcome else {
        panic!("cash sale must commit immediately");
    };
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].quantity, 3);
    assert_eq!(world.stock(world.product_id).await, 2);
}

#[tokio::test]
async fn discount_larger_than_subtotal_floors_total_at_zero() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let outcome = world
        .state
        .checkout_service
        .checkout(&tenant, &cashier, &cart(&world, &[(world.product_id, 1)], "9.00"), PaymentMethod::Cash)
        .await
        .unwrap();

    let CheckoutOutcome::Committed(order) = outcome else {
        panic!("cash sale must commit immediately");
    };
    assert_eq!(order.order.total_amount, Decimal::ZERO);
}

#[tokio::test]
async fn failed_order_write_restores_every_decrement() {
    let world = World::build(|store, stores| {
        stores.orders = Arc::new(FailingOrders { inner: store.clone() });
    })
    .await;
    let second = seed_product(&world.store, world.tenant_id, "Filtro de Papel", "3.50");
    world.set_stock(world.product_id, 5).await;
    world.set_stock(second, 8).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let err = world
        .state
        .checkout_service
        .checkout(
            &tenant,
            &cashier,
            &cart(&world, &[(world.product_id, 2), (second, 3)], "0"),
            PaymentMethod::Cash,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InternalServerError(_)), "got {err:?}");
    assert_eq!(world.stock(world.product_id).await, 5);
    assert_eq!(world.stock(second).await, 8);
}

#[tokio::test]
async fn losing_the_race_on_a_later_line_restores_earlier_lines() {
    let mut racing = None;
    let world = World::build(|store, stores| {
        let ledger = Arc::new(RacingLedger::new(store.clone()));
        racing = Some(ledger.clone());
        stores.ledger = ledger;
    })
    .await;
    let racing = racing.unwrap();

    let contested = seed_product(&world.store, world.tenant_id, "Leite Integral", "4.20");
    world.set_stock(world.product_id, 5).await;
    world.set_stock(contested, 1).await;
    racing.contest(contested);

    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let err = world
        .state
        .checkout_service
        .checkout(
            &tenant,
            &cashier,
            &cart(&world, &[(world.product_id, 2), (contested, 1)], "0"),
            PaymentMethod::Cash,
        )
        .await
        .unwrap_err();

    match err {
        AppError::InsufficientStock { product_id, product_name, .. } => {
            assert_eq!(product_id, contested);
            assert_eq!(product_name.as_deref(), Some("Leite Integral"));
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(world.stock(world.product_id).await, 5);
}

#[tokio::test]
async fn failed_compensation_is_reported_as_fatal() {
    let mut racing = None;
    let world = World::build(|store, stores| {
        let ledger = Arc::new(RacingLedger::new(store.clone()));
        racing = Some(ledger.clone());
        stores.ledger = ledger;
    })
    .await;
    let racing = racing.unwrap();

    let contested = seed_product(&world.store, world.tenant_id, "Leite Integral", "4.20");
    world.set_stock(world.product_id, 5).await;
    world.set_stock(contested, 1).await;
    racing.contest(contested);
    racing.refuse_increments();

    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let err = world
        .state
        .checkout_service
        .checkout(
            &tenant,
            &cashier,
            &cart(&world, &[(world.product_id, 2), (contested, 1)], "0"),
            PaymentMethod::Cash,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CompensationFailed(_)), "got {err:?}");
    assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn invalid_carts_are_rejected_before_any_write() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;
    let checkout = &world.state.checkout_service;

    let empty = cart(&world, &[], "0");
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &empty, PaymentMethod::Cash).await,
        Err(AppError::InvalidQuantity(0))
    ));

    let zero_qty = cart(&world, &[(world.product_id, 0)], "0");
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &zero_qty, PaymentMethod::Cash).await,
        Err(AppError::InvalidQuantity(0))
    ));

    // Linhas repetidas cuja soma não cabe numa quantidade
    let overflowing = cart(&world, &[(world.product_id, i32::MAX), (world.product_id, 1)], "0");
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &overflowing, PaymentMethod::Cash).await,
        Err(AppError::InvalidQuantity(_))
    ));
    let overflowing = cart(&world, &[(world.product_id, 999_999), (world.product_id, 2)], "0");
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &overflowing, PaymentMethod::Cash).await,
        Err(AppError::InvalidQuantity(2))
    ));

    let negative_discount = cart(&world, &[(world.product_id, 1)], "-1.00");
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &negative_discount, PaymentMethod::Cash).await,
        Err(AppError::InvalidAmount(_))
    ));

    let unknown_product = cart(&world, &[(Uuid::new_v4(), 1)], "0");
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &unknown_product, PaymentMethod::Cash).await,
        Err(AppError::ProductNotFound(_))
    ));

    let mut unknown_customer = cart(&world, &[(world.product_id, 1)], "0");
    unknown_customer.customer_id = Some(Uuid::new_v4());
    assert!(matches!(
        checkout.checkout(&tenant, &cashier, &unknown_customer, PaymentMethod::Cash).await,
        Err(AppError::CustomerNotFound(_))
    ));

    assert_eq!(world.stock(world.product_id).await, 5);
}

#[tokio::test]
async fn known_customer_is_attached_to_order() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;
    let customer_id = seed_customer(&world.store, world.tenant_id);
    let tenant = world.tenant().await;
    let cashier = world.actor(world.cashier_id).await;

    let mut request = cart(&world, &[(world.product_id, 1)], "0");
    request.customer_id = Some(customer_id);

    let CheckoutOutcome::Committed(order) = world
        .state
        .checkout_service
        .checkout(&tenant, &cashier, &request, PaymentMethod::Cash)
        .await
        .unwrap()
    else {
        panic!("cash sale must commit immediately");
    };
    assert_eq!(order.order.customer_id, Some(customer_id));
}

#[tokio::test]
async fn cashier_without_assignment_cannot_sell_at_location() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;
    let tenant = world.tenant().await;
    let outsider = world.actor(world.outsider_id).await;

    let err = world
        .state
        .checkout_service
        .checkout(&tenant, &outsider, &cart(&world, &[(world.product_id, 1)], "0"), PaymentMethod::Cash)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::LocationAccessDenied(id) if id == world.location_id));
    assert_eq!(world.stock(world.product_id).await, 5);
}

#[tokio::test]
async fn admin_sells_at_any_location_and_reads_order_back() {
    let world = World::new().await;
    world.set_stock(world.product_id, 5).await;
    let tenant = world.tenant().await;
    let admin = world.actor(world.admin_id).await;

    let CheckoutOutcome::Committed(order) = world
        .state
        .checkout_service
        .checkout(&tenant, &admin, &cart(&world, &[(world.product_id, 1)], "0"), PaymentMethod::Cash)
        .await
        .unwrap()
    else {
        panic!("cash sale must commit immediately");
    };

    let fetched = world
        .state
        .checkout_service
        .get_order(&tenant, &admin, order.order.id)
        .await
        .unwrap();
    assert_eq!(fetched.order.id, order.order.id);
    assert_eq!(fetched.lines.len(), 1);
}

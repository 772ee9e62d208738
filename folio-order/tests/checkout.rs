mod common;

use common::{dec, request, Harness, ScriptedNumbers};
use folio_catalog::{CartOwner, DiscountType, MAX_LINE_QUANTITY};
use folio_core::repository::{CartRepository, CouponRepository, OrderRepository};
use folio_core::{CoreError, OrderStatus, RejectReason};
use folio_order::OrderCoordinator;
use folio_store::CheckoutSettings;
use rust_decimal::Decimal;
use std::sync::Arc;

#[tokio::test]
async fn test_checkout_snapshots_every_line() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let emma = h.book("Emma", 850).await;
    let cart = h.cart_with(&[(&dune, 2), (&emma, 3)]).await;
    let owner = cart.owner.clone();

    let order = h.coordinator.checkout(cart, &request()).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.total_quantity(), 5);
    assert_eq!(order.subtotal, dec(5550));
    assert_eq!(order.total_amount, order.subtotal - order.discount_amount + order.shipping_cost);
    assert!(order.order_number.starts_with("OLR"));

    let stored = h.reload(&order).await;
    assert_eq!(stored.items[0].book_title, "Dune");
    assert_eq!(stored.items[1].price, dec(850));

    // Cart is emptied once the order exists
    let cart = h.store.find_cart(&owner).await.unwrap().unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_empty_cart_rejected() {
    let h = Harness::new();
    let cart = h.cart_with(&[]).await;

    let err = h.coordinator.checkout(cart, &request()).await.unwrap_err();

    assert!(matches!(err, CoreError::ValidationError { reason: RejectReason::EmptyCart, .. }));
    assert!(h.store.list_orders(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_uses_current_catalog_price() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let cart = h.cart_with(&[(&dune, 1)]).await;
    assert_eq!(cart.items[0].price_at_addition, dec(1500));

    h.store.set_book_price(dune.id, dec(1200)).await.unwrap();
    let order = h.coordinator.checkout(cart, &request()).await.unwrap();

    assert_eq!(order.items[0].price, dec(1200));
    assert_eq!(order.total_amount, dec(1200));

    // Later catalog changes never touch the snapshot
    h.store.set_book_price(dune.id, dec(9900)).await.unwrap();
    assert_eq!(h.reload(&order).await.items[0].price, dec(1200));
}

#[tokio::test]
async fn test_book_removed_from_catalog_fails_checkout() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let cart = h.cart_with(&[(&dune, 1)]).await;
    h.store.remove_book(dune.id).await;

    let err = h.coordinator.checkout(cart, &request()).await.unwrap_err();

    assert!(matches!(err, CoreError::NotFoundError(_)));
}

#[tokio::test]
async fn test_percentage_coupon_capped_and_redeemed() {
    let h = Harness::new();
    let atlas = h.book("Atlas", 10000).await;
    let mut coupon = h.coupon("TENOFF", DiscountType::Percentage, Decimal::from(10)).await;
    coupon.max_discount_amount = Some(dec(500));
    h.store.save_coupon(&coupon).await.unwrap();

    let mut cart = h.cart_with(&[(&atlas, 1)]).await;
    let summary = h.carts.apply_coupon(&cart.owner, "tenoff").await.unwrap();
    assert_eq!(summary.discount, dec(500));
    // Applying never counts as a use
    assert_eq!(h.store.get_coupon(coupon.id).await.unwrap().unwrap().usage_count, 0);

    cart = h.carts.resolve(&cart.owner, None).await.unwrap();
    let order = h.coordinator.checkout(cart, &request()).await.unwrap();

    assert_eq!(order.discount_amount, dec(500));
    assert_eq!(order.total_amount, dec(9500));
    assert_eq!(order.coupon_id, Some(coupon.id));
    assert_eq!(h.store.get_coupon(coupon.id).await.unwrap().unwrap().usage_count, 1);
    assert_eq!(h.store.coupon_usages(coupon.id).await.len(), 1);
}

#[tokio::test]
async fn test_percentage_over_hundred_keeps_total_identity() {
    let settings = CheckoutSettings {
        shipping_cost: dec(350),
        ..CheckoutSettings::default()
    };
    let h = Harness::with(settings, Arc::new(folio_order::SandboxGateway::new("http://localhost")));
    let atlas = h.book("Atlas", 10000).await;
    h.coupon("GENEROUS", DiscountType::Percentage, Decimal::from(150)).await;

    let cart = h.cart_with(&[(&atlas, 1)]).await;
    let summary = h.carts.apply_coupon(&cart.owner, "GENEROUS").await.unwrap();
    assert_eq!(summary.discount, dec(10000));

    let cart = h.carts.resolve(&cart.owner, None).await.unwrap();
    let order = h.coordinator.checkout(cart, &request()).await.unwrap();

    assert_eq!(order.subtotal, dec(10000));
    assert_eq!(order.discount_amount, order.subtotal);
    assert_eq!(order.total_amount, order.subtotal - order.discount_amount + order.shipping_cost);
    assert_eq!(order.total_amount, dec(350));
}

#[tokio::test]
async fn test_cart_quantity_overflow_rejected() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let owner = CartOwner::Anonymous("sess-overflow".to_string());

    h.carts.add(&owner, dune.id, MAX_LINE_QUANTITY, false).await.unwrap();
    let err = h.carts.add(&owner, dune.id, 1, false).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError { reason: RejectReason::InvalidQuantity, .. }));

    let err = h.carts.add(&owner, dune.id, u32::MAX, true).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError { reason: RejectReason::InvalidQuantity, .. }));

    // The stored line is untouched
    let cart = h.store.find_cart(&owner).await.unwrap().unwrap();
    assert_eq!(cart.total_items(), MAX_LINE_QUANTITY);
}

#[tokio::test]
async fn test_coupon_below_minimum_is_not_redeemed() {
    let h = Harness::new();
    let emma = h.book("Emma", 850).await;
    let mut coupon = h.coupon("BIG", DiscountType::Fixed, dec(500)).await;
    coupon.min_purchase_amount = Some(dec(2000));
    h.store.save_coupon(&coupon).await.unwrap();

    let cart = h.cart_with(&[(&emma, 1)]).await;
    h.carts.apply_coupon(&cart.owner, "BIG").await.unwrap();
    let cart = h.carts.resolve(&cart.owner, None).await.unwrap();

    let order = h.coordinator.checkout(cart, &request()).await.unwrap();

    assert_eq!(order.discount_amount, Decimal::ZERO);
    assert!(order.coupon_id.is_none());
    assert_eq!(h.store.get_coupon(coupon.id).await.unwrap().unwrap().usage_count, 0);
}

#[tokio::test]
async fn test_exhausted_coupon_dropped_at_commit() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let coupon = h.coupon("LAST", DiscountType::Fixed, dec(300)).await;

    let cart = h.cart_with(&[(&dune, 1)]).await;
    h.carts.apply_coupon(&cart.owner, "LAST").await.unwrap();
    let cart = h.carts.resolve(&cart.owner, None).await.unwrap();

    // Someone else used the last redemption after it was applied
    let mut spent = coupon.clone();
    spent.usage_limit = Some(1);
    spent.usage_count = 1;
    h.store.save_coupon(&spent).await.unwrap();

    let order = h.coordinator.checkout(cart, &request()).await.unwrap();

    assert_eq!(order.discount_amount, Decimal::ZERO);
    assert_eq!(order.total_amount, dec(1500));
    assert!(order.coupon_id.is_none());
    assert_eq!(h.store.get_coupon(coupon.id).await.unwrap().unwrap().usage_count, 1);
}

#[tokio::test]
async fn test_per_user_limit_drops_discount_on_second_order() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let coupon = h.coupon("ONCE", DiscountType::Fixed, dec(200)).await;
    let owner = CartOwner::Authenticated(uuid::Uuid::new_v4());

    for expected_discount in [dec(200), Decimal::ZERO] {
        h.carts.add(&owner, dune.id, 1, false).await.unwrap();
        h.carts.apply_coupon(&owner, "ONCE").await.unwrap();
        let cart = h.carts.resolve(&owner, None).await.unwrap();

        let order = h.coordinator.checkout(cart, &request()).await.unwrap();

        assert_eq!(order.discount_amount, expected_discount);
        assert_eq!(order.customer.user_id, owner.user_id());
    }
    assert_eq!(h.store.get_coupon(coupon.id).await.unwrap().unwrap().usage_count, 1);
}

#[tokio::test]
async fn test_shipping_cost_from_settings() {
    let settings = CheckoutSettings {
        shipping_cost: dec(350),
        ..CheckoutSettings::default()
    };
    let h = Harness::with(settings, Arc::new(folio_order::SandboxGateway::new("http://localhost")));
    let dune = h.book("Dune", 1500).await;

    let order = h.place_order(&[(&dune, 1)]).await;

    assert_eq!(order.shipping_cost, dec(350));
    assert_eq!(order.total_amount, dec(1850));
}

fn coordinator_with_numbers(h: &Harness, numbers: &[&str], attempts: u32) -> OrderCoordinator {
    let settings = CheckoutSettings {
        order_number_attempts: attempts,
        ..CheckoutSettings::default()
    };
    OrderCoordinator::new(h.store.clone(), h.store.clone(), h.store.clone(), h.store.clone(), settings)
        .with_number_source(Arc::new(ScriptedNumbers::new(numbers)))
}

#[tokio::test]
async fn test_order_number_collision_retried() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let coordinator = coordinator_with_numbers(&h, &["OLR260101000011", "OLR260101000011", "OLR260101000012"], 5);

    let first = coordinator.checkout(h.cart_with(&[(&dune, 1)]).await, &request()).await.unwrap();
    let second = coordinator.checkout(h.cart_with(&[(&dune, 1)]).await, &request()).await.unwrap();

    assert_eq!(first.order_number, "OLR260101000011");
    assert_eq!(second.order_number, "OLR260101000012");
}

#[tokio::test]
async fn test_order_number_collisions_past_bound_conflict() {
    let h = Harness::new();
    let dune = h.book("Dune", 1500).await;
    let coordinator = coordinator_with_numbers(&h, &["OLR1", "OLR1", "OLR1", "OLR1"], 3);

    coordinator.checkout(h.cart_with(&[(&dune, 1)]).await, &request()).await.unwrap();
    let err = coordinator
        .checkout(h.cart_with(&[(&dune, 1)]).await, &request())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ConflictError(_)));
    assert_eq!(h.store.list_orders(None).await.unwrap().len(), 1);
}

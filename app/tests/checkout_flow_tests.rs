mod common;

use common::*;
use doce_flow::PipelineResult;
use serial_test::serial;
use uuid::Uuid;

use doce_sonho::errors::AppError;
use doce_sonho::models::{ActivityKind, CartItemRef, DeliveryOption, FlashLevel, PendingState, ProductPatch};
use doce_sonho::services::cart_reconciler::reconcile_cart;
use doce_sonho::services::cart_store::PersistedCartStore;
use doce_sonho::services::payment_gateway::{PaymentOutcome, PreferenceStrategy, FEE_ITEM_ID};
use doce_sonho::services::session::SessionHandle;
use doce_sonho::store::{ActivityLog, CartRepository, Catalog, OrderLedger, PendingCheckouts};

#[tokio::test]
#[serial]
async fn pickup_checkout_totals_fifty_five_without_fee_line() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();

  let (result, ctx) = h.checkout(&session, user, pickup()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.subtotal_cents, 5500);
  assert_eq!(guard.delivery_fee_cents, 0);
  assert_eq!(guard.total_cents, 5500);
  assert_eq!(guard.strategy_used, Some(PreferenceStrategy::Full));
  assert!(guard.payment_link.is_some());

  let requests = h.gateway.requests();
  assert_eq!(requests.len(), 1);
  assert!(requests[0].1.items.iter().all(|i| i.id != FEE_ITEM_ID));

  let pending = guard.pending.clone().unwrap();
  assert_eq!(session.pending_checkout(), Some(pending.checkout_ref));
  let stored = h.store.pending(pending.checkout_ref).await.unwrap().unwrap();
  assert_eq!(stored.total_cents, 5500);
  assert_eq!(stored.delivery, DeliveryOption::Pickup);
  assert_eq!(stored.state, PendingState::AwaitingPayment);
  assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
#[serial]
async fn delivery_checkout_adds_the_fee() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();

  let (result, ctx) = h.checkout(&session, user, delivery_to_home()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.delivery_fee_cents, 1200);
  assert_eq!(guard.total_cents, 6700);
  let pending = guard.pending.clone().unwrap();
  assert_eq!(pending.address.as_ref().unwrap().district, "Centro");

  let (_, request) = &h.gateway.requests()[0];
  let fee = request.items.iter().find(|i| i.id == FEE_ITEM_ID).unwrap();
  assert_eq!(fee.quantity, 1);
  assert!((fee.unit_price - 12.0).abs() < f64::EPSILON);
}

#[tokio::test]
#[serial]
async fn delivery_without_address_is_rejected_before_anything_is_stored() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();
  let mut form = delivery_to_home();
  form.district = None;

  let (result, ctx) = h.checkout(&session, user, form).await;

  assert!(matches!(result, Err(AppError::Validation(_))));
  assert!(ctx.read().pending.is_none());
  assert!(session.pending_checkout().is_none());
  assert!(h.gateway.requests().is_empty());
}

#[tokio::test]
#[serial]
async fn empty_cart_stops_with_an_error_flash() {
  let h = harness();
  let session = SessionHandle::new_session();

  let (result, _) = h.checkout(&session, Uuid::new_v4(), pickup()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  let flashes = session.take_flashes();
  assert_eq!(flashes.len(), 1);
  assert_eq!(flashes[0].level, FlashLevel::Error);
  assert_eq!(flashes[0].message, "Seu carrinho está vazio!");
}

#[tokio::test]
#[serial]
async fn deactivated_product_is_dropped_with_one_notice() {
  let h = harness();
  let user = Uuid::new_v4();
  let (product, cake) = h.reference_cart(user).await;

  let mut stale = h.store.product(product.id).await.unwrap().unwrap();
  ProductPatch {
    active: Some(false),
    ..ProductPatch::default()
  }
  .apply(&mut stale, chrono::Utc::now());
  h.store.update_product(&stale).await.unwrap();

  let cart = PersistedCartStore::new(h.store.clone(), user);
  let outcome = reconcile_cart(&cart, h.store.as_ref(), Some(user)).await.unwrap();

  assert_eq!(outcome.notices.len(), 1);
  assert_eq!(outcome.subtotal_cents, 2500);
  assert_eq!(outcome.lines.len(), 1);
  assert_eq!(outcome.lines[0].item, CartItemRef::CustomCake(cake.id));
  let remaining = h.store.cart_lines(user).await.unwrap();
  assert_eq!(remaining.len(), 1);

  // A second pass finds nothing left to report.
  let again = reconcile_cart(&cart, h.store.as_ref(), Some(user)).await.unwrap();
  assert!(again.notices.is_empty());
}

#[tokio::test]
#[serial]
async fn oversized_lines_are_clamped_at_checkout() {
  let h = harness();
  let user = Uuid::new_v4();
  let product = h.product("Beijinho", 400).await;
  h.put_in_cart(user, CartItemRef::Product(product.id), 25, 400).await;
  let session = SessionHandle::new_session();

  let (result, ctx) = h.checkout(&session, user, pickup()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().subtotal_cents, 4000);
  assert_eq!(h.store.cart_lines(user).await.unwrap()[0].quantity, 10);
  assert!(session.take_flashes().iter().any(|f| f.level == FlashLevel::Warning));
}

#[tokio::test]
#[serial]
async fn gateway_falls_back_full_then_simplified_then_minimal() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  h.gateway.fail_next(2);
  let session = SessionHandle::new_session();

  let (result, ctx) = h.checkout(&session, user, delivery_to_home()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.strategy_used, Some(PreferenceStrategy::Minimal));
  assert_eq!(guard.failed_attempts.len(), 2);

  let requests = h.gateway.requests();
  let checkout_ref = guard.pending.as_ref().unwrap().checkout_ref;
  let keys: Vec<String> = requests.iter().map(|(k, _)| k.clone()).collect();
  assert_eq!(
    keys,
    vec![
      format!("{}-full", checkout_ref),
      format!("{}-simplified", checkout_ref),
      format!("{}-minimal", checkout_ref),
    ]
  );
  assert!(requests[0].1.notification_url.is_some());
  assert!(requests[1].1.notification_url.is_none());
  assert_eq!(requests[2].1.items.len(), 1);
  assert!((requests[2].1.items[0].unit_price - 67.0).abs() < f64::EPSILON);
  assert!(requests.iter().all(|(_, r)| r.external_reference == checkout_ref.to_string()));
}

#[tokio::test]
#[serial]
async fn total_gateway_failure_leaves_no_order_and_no_pending_record() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  h.gateway.fail_next(3);
  let session = SessionHandle::new_session();

  let (result, ctx) = h.checkout(&session, user, pickup()).await;

  assert!(matches!(result, Err(AppError::Payment(_))));
  assert!(ctx.read().pending.is_none());
  assert!(session.pending_checkout().is_none());
  assert_eq!(h.store.order_count(), 0);

  let (key, _) = &h.gateway.requests()[0];
  let checkout_ref: Uuid = key.trim_end_matches("-full").parse().unwrap();
  assert!(h.store.pending(checkout_ref).await.unwrap().is_none());
  let activity = h.store.recent(10).await.unwrap();
  assert!(activity.iter().any(|a| a.kind == ActivityKind::CheckoutFailed));
  // The cart survives for another attempt.
  assert_eq!(h.store.cart_lines(user).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn approved_payment_writes_one_order_and_empties_the_cart() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();
  let (result, ctx) = h.checkout(&session, user, delivery_to_home()).await;
  result.unwrap();
  let pending = ctx.read().pending.clone().unwrap();

  let (result, cb) = h.payment_callback(Some(&session), PaymentOutcome::Approved, None).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = cb.read();
  assert!(guard.created);
  let order = guard.order.clone().unwrap();
  assert_eq!(order.order.checkout_ref, pending.checkout_ref);
  assert_eq!(order.order.total_cents, 6700);
  assert_eq!(order.order.delivery_fee_cents, 1200);
  assert_eq!(order.order.payment_id.as_deref(), Some("pay-1"));
  assert_eq!(order.lines.len(), pending.lines.len());
  for line in &pending.lines {
    let written = order.lines.iter().find(|l| l.item_id == line.item.id()).unwrap();
    assert_eq!(written.quantity, line.quantity);
    assert_eq!(written.unit_price_cents, line.unit_price_cents);
  }
  assert_eq!(guard.flash.as_ref().unwrap().level, FlashLevel::Success);
  assert!(guard.notified);

  assert_eq!(h.store.order_count(), 1);
  assert!(h.store.cart_lines(user).await.unwrap().is_empty());
  assert!(h.store.pending(pending.checkout_ref).await.unwrap().is_none());
  assert!(session.pending_checkout().is_none());
  assert_eq!(h.mailer.sent().len(), 1);
  let activity = h.store.recent(10).await.unwrap();
  assert!(activity.iter().any(|a| a.kind == ActivityKind::PaymentApproved));
}

#[tokio::test]
#[serial]
async fn replayed_approval_creates_no_second_order() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();
  let (_, ctx) = h.checkout(&session, user, pickup()).await;
  let checkout_ref = ctx.read().pending.as_ref().unwrap().checkout_ref;

  let (first, _) = h
    .payment_callback(Some(&session), PaymentOutcome::Approved, Some(checkout_ref))
    .await;
  first.unwrap();
  let (second, replay) = h.payment_callback(None, PaymentOutcome::Approved, Some(checkout_ref)).await;

  assert_eq!(second.unwrap(), PipelineResult::Completed);
  let guard = replay.read();
  assert!(guard.is_replay());
  assert!(!guard.created);
  assert!(!guard.notified);
  assert_eq!(guard.order.as_ref().unwrap().order.checkout_ref, checkout_ref);
  assert_eq!(h.store.order_count(), 1);
  assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
#[serial]
async fn pending_payment_keeps_the_record_until_a_later_approval() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();
  let (_, ctx) = h.checkout(&session, user, pickup()).await;
  let checkout_ref = ctx.read().pending.as_ref().unwrap().checkout_ref;

  let (result, cb) = h.payment_callback(Some(&session), PaymentOutcome::Pending, None).await;
  result.unwrap();
  assert_eq!(cb.read().flash.as_ref().unwrap().level, FlashLevel::Info);
  let held = h.store.pending(checkout_ref).await.unwrap().unwrap();
  assert_eq!(held.state, PendingState::AwaitingSettlement);
  assert_eq!(h.store.order_count(), 0);
  assert_eq!(h.store.cart_lines(user).await.unwrap().len(), 2);

  let (result, later) = h.payment_callback(None, PaymentOutcome::Approved, Some(checkout_ref)).await;
  result.unwrap();
  assert!(later.read().created);
  assert_eq!(h.store.order_count(), 1);
  assert!(h.store.pending(checkout_ref).await.unwrap().is_none());
  assert!(h.store.order_by_checkout_ref(checkout_ref).await.unwrap().is_some());
}

#[tokio::test]
#[serial]
async fn rejected_payment_discards_the_record_and_keeps_the_cart() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();
  let (_, ctx) = h.checkout(&session, user, pickup()).await;
  let checkout_ref = ctx.read().pending.as_ref().unwrap().checkout_ref;

  let (result, cb) = h.payment_callback(Some(&session), PaymentOutcome::Rejected, None).await;

  result.unwrap();
  assert_eq!(cb.read().flash.as_ref().unwrap().level, FlashLevel::Warning);
  assert!(h.store.pending(checkout_ref).await.unwrap().is_none());
  assert_eq!(h.store.order_count(), 0);
  assert_eq!(h.store.cart_lines(user).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn callback_without_any_reference_stops_with_a_warning() {
  let h = harness();
  let session = SessionHandle::new_session();

  let (result, cb) = h.payment_callback(Some(&session), PaymentOutcome::Approved, None).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  assert_eq!(cb.read().flash.as_ref().unwrap().level, FlashLevel::Warning);
  assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
#[serial]
async fn declined_notification_keeps_the_checkout_for_a_retry() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = SessionHandle::new_session();
  let (_, ctx) = h.checkout(&session, user, pickup()).await;
  let checkout_ref = ctx.read().pending.as_ref().unwrap().checkout_ref;

  let (result, _) = h.payment_callback(None, PaymentOutcome::Rejected, Some(checkout_ref)).await;
  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let kept = h.store.pending(checkout_ref).await.unwrap().unwrap();
  assert_eq!(kept.state, PendingState::Declined);

  // Second card on the same link goes through.
  let (result, cb) = h.payment_callback(None, PaymentOutcome::Approved, Some(checkout_ref)).await;
  assert_eq!(result.unwrap(), PipelineResult::Completed);
  assert!(cb.read().created);
  assert_eq!(h.store.order_count(), 1);
  assert!(h.store.pending(checkout_ref).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn browser_returns_only_act_on_the_sessions_own_checkout() {
  let h = harness();
  let owner = Uuid::new_v4();
  h.reference_cart(owner).await;
  let session = SessionHandle::new_session();
  let (_, ctx) = h.checkout(&session, owner, pickup()).await;
  let checkout_ref = ctx.read().pending.as_ref().unwrap().checkout_ref;

  let stranger = SessionHandle::new_session();
  stranger.note_user(Some(Uuid::new_v4()));
  for outcome in [PaymentOutcome::Rejected, PaymentOutcome::Approved] {
    let (result, cb) = h.payment_callback(Some(&stranger), outcome, Some(checkout_ref)).await;
    assert_eq!(result.unwrap(), PipelineResult::Stopped);
    assert_eq!(cb.read().flash.as_ref().unwrap().level, FlashLevel::Warning);
  }
  assert!(h.store.pending(checkout_ref).await.unwrap().is_some());
  assert_eq!(h.store.order_count(), 0);
  assert_eq!(session.pending_checkout(), Some(checkout_ref));

  // The owner signed in on another browser may still settle it.
  let other_browser = SessionHandle::new_session();
  other_browser.note_user(Some(owner));
  let (result, cb) = h
    .payment_callback(Some(&other_browser), PaymentOutcome::Approved, Some(checkout_ref))
    .await;
  assert_eq!(result.unwrap(), PipelineResult::Completed);
  assert!(cb.read().created);
  assert_eq!(h.store.order_count(), 1);

  // Settled orders are not replayed to strangers either.
  let (result, _) = h
    .payment_callback(Some(&stranger), PaymentOutcome::Approved, Some(checkout_ref))
    .await;
  assert_eq!(result.unwrap(), PipelineResult::Stopped);
}

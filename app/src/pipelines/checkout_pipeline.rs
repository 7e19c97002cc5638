//! Checkout handoff: validate the cart and delivery choice, stash a
//! provisional record keyed by a fresh checkout reference, and obtain a
//! hosted payment link. No order is written here.

use crate::errors::AppError;
use crate::models::{
  format_brl, ActivityEntry, ActivityKind, DeliveryAddress, DeliveryOption, FlashLevel, PendingCheckout, PendingLine,
  PendingState,
};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::cart_reconciler::reconcile_cart;
use crate::services::cart_store::open_cart;
use crate::services::payment_gateway::{build_preference, CallbackUrls, PreferenceStrategy};
use chrono::Utc;
use doce_flow::{ContextData, Flows, Pipeline, PipelineControl};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

fn non_blank(value: &Option<String>) -> Option<String> {
  value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[instrument(name = "checkout::reconcile_cart", skip(ctx_data))]
async fn reconcile_checkout_cart(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (store, session, user_id) = {
    let guard = ctx_data.read();
    (guard.app_state.store.clone(), guard.session.clone(), guard.user_id)
  };

  let cart = open_cart(&store, &session, Some(user_id)).await?;
  let reconciliation = reconcile_cart(cart.as_ref(), store.as_ref(), Some(user_id)).await?;
  for notice in &reconciliation.notices {
    session.flash(FlashLevel::Warning, notice.clone());
  }

  if reconciliation.is_empty() {
    info!(%user_id, "Checkout refused: cart is empty.");
    session.flash(FlashLevel::Error, "Seu carrinho está vazio!");
    return Ok(PipelineControl::Stop);
  }

  let mut guard = ctx_data.write();
  guard.subtotal_cents = reconciliation.subtotal_cents;
  guard.reconciliation = Some(reconciliation);
  Ok(PipelineControl::Continue)
}

fn validate_delivery(ctx_data: &ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let form = ctx_data.read().form.clone();

  let delivery = DeliveryOption::parse(&form.delivery).ok_or_else(|| {
    warn!(delivery = %form.delivery, "Unknown delivery option.");
    AppError::Validation("Tipo de entrega inválido. Tente novamente.".to_string())
  })?;

  let address = match delivery {
    DeliveryOption::Pickup => None,
    DeliveryOption::Delivery => {
      match (non_blank(&form.street), non_blank(&form.postal_code), non_blank(&form.district)) {
        (Some(street), Some(postal_code), Some(district)) => Some(DeliveryAddress {
          street,
          postal_code,
          district,
          complement: non_blank(&form.complement),
        }),
        _ => {
          return Err(AppError::Validation(
            "Para entrega, é necessário informar rua, CEP e bairro.".to_string(),
          ))
        }
      }
    }
  };

  let mut guard = ctx_data.write();
  guard.delivery = Some(delivery);
  guard.address = address;
  Ok(PipelineControl::Continue)
}

fn compute_totals(ctx_data: &ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let mut guard = ctx_data.write();
  let fee = match guard.delivery {
    Some(DeliveryOption::Delivery) => guard.app_state.config.delivery_fee_cents,
    _ => 0,
  };
  let total = guard.subtotal_cents + fee;
  if total <= 0 {
    return Err(AppError::Validation(
      "Total do pedido inválido. Verifique os itens do carrinho.".to_string(),
    ));
  }
  guard.delivery_fee_cents = fee;
  guard.total_cents = total;
  info!(
    subtotal = %format_brl(guard.subtotal_cents),
    fee = %format_brl(fee),
    total = %format_brl(total),
    "Checkout totals computed."
  );
  Ok(PipelineControl::Continue)
}

#[instrument(name = "checkout::stash_pending", skip(ctx_data))]
async fn stash_pending_checkout(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (store, session, pending) = {
    let guard = ctx_data.read();
    let reconciliation = guard
      .reconciliation
      .as_ref()
      .ok_or_else(|| AppError::Internal("Checkout reached stash without a reconciled cart.".to_string()))?;
    let delivery = guard
      .delivery
      .ok_or_else(|| AppError::Internal("Checkout reached stash without a delivery option.".to_string()))?;
    let pending = PendingCheckout {
      checkout_ref: Uuid::new_v4(),
      user_id: guard.user_id,
      delivery,
      delivery_fee_cents: guard.delivery_fee_cents,
      address: guard.address.clone(),
      notes: non_blank(&guard.form.notes),
      contact_email: non_blank(&guard.form.contact_email),
      subtotal_cents: guard.subtotal_cents,
      total_cents: guard.total_cents,
      lines: reconciliation
        .lines
        .iter()
        .map(|l| PendingLine {
          item: l.item,
          name: l.name.clone(),
          quantity: l.quantity,
          unit_price_cents: l.unit_price_cents,
        })
        .collect(),
      state: PendingState::AwaitingPayment,
      created_at: Utc::now(),
    };
    (guard.app_state.store.clone(), guard.session.clone(), pending)
  };

  store.save_pending(&pending).await?;
  session.set_pending_checkout(Some(pending.checkout_ref));
  info!(checkout_ref = %pending.checkout_ref, "Pending checkout stored.");
  ctx_data.write().pending = Some(pending);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "checkout::request_payment_link", skip(ctx_data))]
async fn request_payment_link(ctx_data: ContextData<CheckoutCtxData>) -> Result<PipelineControl, AppError> {
  let (state, session, pending) = {
    let guard = ctx_data.read();
    let pending = guard
      .pending
      .clone()
      .ok_or_else(|| AppError::Internal("No pending checkout to pay for.".to_string()))?;
    (guard.app_state.clone(), guard.session.clone(), pending)
  };
  let urls = CallbackUrls::from_base(&state.config.app_base_url);

  for strategy in PreferenceStrategy::FALLBACK_ORDER {
    let request = build_preference(strategy, &pending, &urls, &state.config.currency_code);
    let idempotency_key = format!("{}-{}", pending.checkout_ref, strategy);
    match state.gateway.create_preference(&request, &idempotency_key).await {
      Ok(link) => {
        info!(%strategy, checkout_ref = %pending.checkout_ref, "Payment link obtained.");
        let mut guard = ctx_data.write();
        guard.payment_link = Some(link);
        guard.strategy_used = Some(strategy);
        return Ok(PipelineControl::Continue);
      }
      Err(e) => {
        warn!(%strategy, error = %e, "Preference strategy failed, trying the next one.");
        ctx_data.write().failed_attempts.push((strategy, e.to_string()));
      }
    }
  }

  error!(checkout_ref = %pending.checkout_ref, "Every preference strategy failed.");
  state.store.discard_pending(pending.checkout_ref).await?;
  session.set_pending_checkout(None);
  ctx_data.write().pending = None;
  state
    .store
    .record(&ActivityEntry::new(
      ActivityKind::CheckoutFailed,
      format!(
        "Falha ao gerar link de pagamento para checkout {} ({}).",
        pending.checkout_ref,
        format_brl(pending.total_cents)
      ),
      Some(pending.user_id),
    ))
    .await?;
  Err(AppError::Payment(
    "Erro ao processar pagamento. Tente novamente em alguns instantes.".to_string(),
  ))
}

pub fn register_checkout_pipeline(flows: &Flows<AppError>) {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("reconcile_checkout_cart", false, None),
    ("validate_delivery", false, None),
    ("compute_totals", false, None),
    ("stash_pending_checkout", false, None),
    ("request_payment_link", false, None),
  ]);

  p.on_root("reconcile_checkout_cart", reconcile_checkout_cart);
  p.on_root("validate_delivery", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move { validate_delivery(&ctx_data) })
  });
  p.on_root("compute_totals", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move { compute_totals(&ctx_data) })
  });
  p.on_root("stash_pending_checkout", stash_pending_checkout);
  p.on_root("request_payment_link", request_payment_link);

  flows.register_pipeline(p);
}

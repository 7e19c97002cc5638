//! Handles the gateway's verdict on a checkout, from the shopper's browser
//! redirect or from a server notification. Only an approved payment writes
//! an order; replays of an approval find the order already there.

use crate::errors::AppError;
use crate::models::{format_brl, ActivityEntry, ActivityKind, FlashLevel};
use crate::pipelines::contexts::{PaymentCallbackCtxData, SettlementCtxData};
use crate::pipelines::factories::{
  approved_settlement_factory, pending_settlement_pipeline, rejected_settlement_pipeline,
};
use crate::services::mailer::order_confirmation;
use crate::services::payment_gateway::PaymentOutcome;
use crate::services::session::SessionHandle;
use doce_flow::{ContextData, FlowError, Flows, Pipeline, PipelineControl, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_DATA_MISSING: &str = "Dados do pedido não encontrados. Tente finalizar a compra novamente.";

/// A browser return may only act on the checkout its session started or
/// on one owned by the session's user. Notifications carry no session.
fn session_may_settle(session: Option<&SessionHandle>, checkout_ref: Uuid, owner: Uuid) -> bool {
  session.map_or(true, |s| {
    s.pending_checkout() == Some(checkout_ref) || s.user_id() == Some(owner)
  })
}

#[instrument(name = "payment_callback::resolve_pending", skip(ctx_data))]
async fn resolve_pending_checkout(ctx_data: ContextData<PaymentCallbackCtxData>) -> Result<PipelineControl, AppError> {
  let (state, session, external_reference, payment_id) = {
    let guard = ctx_data.read();
    (
      guard.app_state.clone(),
      guard.session.clone(),
      guard.external_reference,
      guard.payment_id.clone(),
    )
  };

  let session_ref = session.as_ref().and_then(SessionHandle::pending_checkout);
  let Some(checkout_ref) = external_reference.or(session_ref) else {
    warn!("Payment callback without any checkout reference.");
    ctx_data.write().set_flash(FlashLevel::Warning, ORDER_DATA_MISSING);
    return Ok(PipelineControl::Stop);
  };

  let existing = state.store.order_by_checkout_ref(checkout_ref).await?;
  let pending = match existing {
    Some(_) => None,
    None => state.store.pending(checkout_ref).await?,
  };
  let owner = existing.as_ref().map(|o| o.user_id).or(pending.as_ref().map(|p| p.user_id));
  if let Some(owner) = owner {
    if !session_may_settle(session.as_ref(), checkout_ref, owner) {
      warn!(%checkout_ref, "Browser return for a checkout this session did not start.");
      ctx_data.write().set_flash(FlashLevel::Warning, ORDER_DATA_MISSING);
      return Ok(PipelineControl::Stop);
    }
  }
  if let Some(session) = session.as_ref().filter(|_| session_ref == Some(checkout_ref)) {
    session.set_pending_checkout(None);
  }
  ctx_data.write().checkout_ref = Some(checkout_ref);

  if let Some(existing) = existing {
    info!(%checkout_ref, order_id = %existing.id, "Checkout already settled; replay.");
    let order = state.store.order(existing.id).await?;
    let mut guard = ctx_data.write();
    guard.existing_order = Some(existing);
    guard.order = order;
    guard.set_flash(
      FlashLevel::Success,
      "Pagamento realizado com sucesso! Obrigado pela sua compra.",
    );
    return Ok(PipelineControl::Continue);
  }

  let Some(pending) = pending else {
    warn!(%checkout_ref, "No pending checkout for reference.");
    ctx_data.write().set_flash(FlashLevel::Warning, ORDER_DATA_MISSING);
    return Ok(PipelineControl::Stop);
  };

  let settlement = ContextData::new(SettlementCtxData {
    app_state: state,
    pending: pending.clone(),
    notification: session.is_none(),
    payment_id,
    order: None,
    created: false,
    flash: None,
  });
  let mut guard = ctx_data.write();
  guard.pending = Some(pending);
  guard.settlement = Some(settlement);
  Ok(PipelineControl::Continue)
}

fn settlement_of(main_ctx: ContextData<PaymentCallbackCtxData>) -> Result<ContextData<SettlementCtxData>, FlowError> {
  main_ctx.read().settlement.clone().ok_or_else(|| FlowError::ExtractorFailure {
    step_name: "settle_payment".to_string(),
    source: anyhow::anyhow!("settlement context was not prepared"),
  })
}

fn outcome_is(outcome: PaymentOutcome) -> impl Fn(ContextData<PaymentCallbackCtxData>) -> bool + Send + Sync + 'static {
  move |ctx: ContextData<PaymentCallbackCtxData>| ctx.read().outcome == outcome
}

#[instrument(name = "payment_callback::record_activity", skip(ctx_data))]
async fn record_payment_activity(ctx_data: ContextData<PaymentCallbackCtxData>) -> Result<PipelineControl, AppError> {
  let (store, outcome, pending, order) = {
    let guard = ctx_data.read();
    (
      guard.app_state.store.clone(),
      guard.outcome,
      guard.pending.clone(),
      guard.order.clone(),
    )
  };
  let Some(pending) = pending else {
    return Ok(PipelineControl::Continue);
  };

  let fee_note = if pending.delivery_fee_cents > 0 {
    format!(" (inclui frete de {})", format_brl(pending.delivery_fee_cents))
  } else {
    String::new()
  };
  let (kind, description) = match (outcome, &order) {
    (PaymentOutcome::Approved, Some(order)) => (
      ActivityKind::PaymentApproved,
      format!(
        "Pagamento aprovado para o pedido {}: {}{}.",
        order.order.id,
        format_brl(pending.total_cents),
        fee_note
      ),
    ),
    (PaymentOutcome::Approved, None) => return Ok(PipelineControl::Continue),
    (PaymentOutcome::Rejected, _) => (
      ActivityKind::PaymentFailed,
      format!("Pagamento recusado para o checkout {}.", pending.checkout_ref),
    ),
    (PaymentOutcome::Pending, _) => (
      ActivityKind::PaymentPending,
      format!(
        "Pagamento pendente para o checkout {}: {}{}.",
        pending.checkout_ref,
        format_brl(pending.total_cents),
        fee_note
      ),
    ),
  };
  store
    .record(&ActivityEntry::new(kind, description, Some(pending.user_id)))
    .await?;
  Ok(PipelineControl::Continue)
}

/// Mail failures are logged and never fail the settlement.
#[instrument(name = "payment_callback::notify_customer", skip(ctx_data))]
async fn notify_customer(ctx_data: ContextData<PaymentCallbackCtxData>) -> Result<PipelineControl, AppError> {
  let (state, order, contact) = {
    let guard = ctx_data.read();
    if guard.outcome != PaymentOutcome::Approved || !guard.created {
      return Ok(PipelineControl::Continue);
    }
    (
      guard.app_state.clone(),
      guard.order.clone(),
      guard.pending.as_ref().and_then(|p| p.contact_email.clone()),
    )
  };
  let (Some(order), Some(to)) = (order, contact) else {
    return Ok(PipelineControl::Continue);
  };

  let mail = order_confirmation(&order, &to, &state.config.mail_sender);
  match state.mailer.send(&mail).await {
    Ok(sent) => {
      info!(message_id = %sent.message_id, order_id = %order.order.id, "Confirmation mail sent.");
      ctx_data.write().notified = true;
    }
    Err(e) => warn!(error = %e, order_id = %order.order.id, "Confirmation mail failed."),
  }
  Ok(PipelineControl::Continue)
}

pub fn register_payment_callback_pipeline(flows: &Flows<AppError>) {
  let replay: SkipCondition<PaymentCallbackCtxData> =
    Arc::new(|ctx: ContextData<PaymentCallbackCtxData>| ctx.read().is_replay());

  let mut p = Pipeline::<PaymentCallbackCtxData, AppError>::new(&[
    ("resolve_pending_checkout", false, None),
    ("settle_payment", false, Some(replay.clone())),
    ("record_payment_activity", false, Some(replay.clone())),
    ("notify_customer", true, Some(replay)),
  ]);

  p.on_root("resolve_pending_checkout", resolve_pending_checkout);

  p.conditional_scopes_for_step("settle_payment")
    .add_dynamic_scope(approved_settlement_factory, settlement_of)
    .on_condition(outcome_is(PaymentOutcome::Approved))
    .add_static_scope(Arc::new(rejected_settlement_pipeline()), settlement_of)
    .on_condition(outcome_is(PaymentOutcome::Rejected))
    .add_static_scope(Arc::new(pending_settlement_pipeline()), settlement_of)
    .on_condition(outcome_is(PaymentOutcome::Pending))
    .if_no_scope_matches(PipelineControl::Stop)
    .finalize_conditional_step(false);

  p.after_root("settle_payment", |ctx_data: ContextData<PaymentCallbackCtxData>| {
    Box::pin(async move {
      let settlement = ctx_data.read().settlement.clone();
      if let Some(settlement) = settlement {
        let (order, created, flash) = {
          let sub = settlement.read();
          (sub.order.clone(), sub.created, sub.flash.clone())
        };
        let mut guard = ctx_data.write();
        guard.order = order;
        guard.created = created;
        if flash.is_some() {
          guard.flash = flash;
        }
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("record_payment_activity", record_payment_activity);
  p.on_root("notify_customer", notify_customer);

  flows.register_pipeline(p);
}

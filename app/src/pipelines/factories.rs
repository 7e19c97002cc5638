//! Settlement sub-pipelines, one per payment outcome. The callback pipeline
//! picks one through conditional scopes on its `settle_payment` step.

use crate::errors::AppError;
use crate::models::{FlashLevel, PendingState};
use crate::pipelines::contexts::{PaymentCallbackCtxData, SettlementCtxData};
use doce_flow::{ContextData, FlowError, Pipeline, PipelineControl};
use std::sync::Arc;
use tracing::{info, instrument};

/// Built per confirmation: writes the order, then reports to the shopper.
#[instrument(
  name = "factory::approved_settlement",
  skip(main_ctx_data),
  fields(checkout_ref = ?main_ctx_data.read().checkout_ref),
  err(Display)
)]
pub async fn approved_settlement_factory(
  main_ctx_data: ContextData<PaymentCallbackCtxData>,
) -> Result<Arc<Pipeline<SettlementCtxData, AppError>>, FlowError> {
  if main_ctx_data.read().pending.is_none() {
    return Err(FlowError::ConfigurationError {
      step_name: "settle_payment".to_string(),
      message: "approved settlement requires a pending checkout".to_string(),
    });
  }

  let mut p = Pipeline::<SettlementCtxData, AppError>::new(&[
    ("materialize_order", false, None),
    ("confirm_to_shopper", false, None),
  ]);

  p.on_root("materialize_order", |sub_ctx: ContextData<SettlementCtxData>| {
    Box::pin(async move {
      let (store, pending, payment_id) = {
        let guard = sub_ctx.read();
        (
          guard.app_state.store.clone(),
          guard.pending.clone(),
          guard.payment_id.clone(),
        )
      };
      let materialized = store.materialize_order(&pending, payment_id.as_deref()).await?;
      let created = materialized.was_created();
      info!(
        order_id = %materialized.order().order.id,
        checkout_ref = %pending.checkout_ref,
        created,
        "Order materialized."
      );
      let mut guard = sub_ctx.write();
      guard.created = created;
      guard.order = Some(materialized.into_order());
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("confirm_to_shopper", |sub_ctx: ContextData<SettlementCtxData>| {
    Box::pin(async move {
      sub_ctx.write().set_flash(
        FlashLevel::Success,
        "Pagamento realizado com sucesso! Obrigado pela sua compra.",
      );
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  Ok(Arc::new(p))
}

/// Rejected payment, no order. A notification only marks the record
/// declined; the browser's failure return discards it.
pub fn rejected_settlement_pipeline() -> Pipeline<SettlementCtxData, AppError> {
  let mut p = Pipeline::<SettlementCtxData, AppError>::new(&[("settle_rejection", false, None)]);
  p.on_root("settle_rejection", |sub_ctx: ContextData<SettlementCtxData>| {
    Box::pin(async move {
      let (store, mut pending, notification) = {
        let guard = sub_ctx.read();
        (guard.app_state.store.clone(), guard.pending.clone(), guard.notification)
      };
      let checkout_ref = pending.checkout_ref;
      if notification {
        if pending.state != PendingState::Declined {
          pending.state = PendingState::Declined;
          store.save_pending(&pending).await?;
        }
        info!(%checkout_ref, "Declined attempt noted; checkout kept for a retry.");
        sub_ctx.write().pending = pending;
      } else {
        store.discard_pending(checkout_ref).await?;
        info!(%checkout_ref, "Pending checkout discarded after rejected payment.");
      }
      sub_ctx.write().set_flash(
        FlashLevel::Warning,
        "Pagamento não foi aprovado. Tente novamente ou escolha outro método de pagamento.",
      );
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });
  p
}

/// Pending payment: keep the record so a later confirmation can settle it.
pub fn pending_settlement_pipeline() -> Pipeline<SettlementCtxData, AppError> {
  let mut p = Pipeline::<SettlementCtxData, AppError>::new(&[("hold_for_settlement", false, None)]);
  p.on_root("hold_for_settlement", |sub_ctx: ContextData<SettlementCtxData>| {
    Box::pin(async move {
      let (store, mut pending) = {
        let guard = sub_ctx.read();
        (guard.app_state.store.clone(), guard.pending.clone())
      };
      if pending.state != PendingState::AwaitingSettlement {
        pending.state = PendingState::AwaitingSettlement;
        store.save_pending(&pending).await?;
      }
      info!(checkout_ref = %pending.checkout_ref, "Payment pending; checkout held for settlement.");
      let mut guard = sub_ctx.write();
      guard.pending = pending;
      guard.set_flash(
        FlashLevel::Info,
        "Pagamento está pendente. Aguarde a confirmação ou tente novamente.",
      );
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });
  p
}

use crate::errors::AppError;
use crate::models::{ActivityEntry, ActivityKind, StatusChange};
use crate::pipelines::contexts::OrderStatusCtxData;
use doce_flow::{ContextData, Flows, Pipeline, PipelineControl};
use tracing::{info, warn};

pub fn register_order_status_pipeline(flows: &Flows<AppError>) {
  let mut p = Pipeline::<OrderStatusCtxData, AppError>::new(&[
    ("authorize_staff", false, None),
    ("load_order", false, None),
    ("check_transition", false, None),
    ("persist_status", false, None),
    ("record_status_activity", false, None),
  ]);

  p.on_root("authorize_staff", |ctx_data: ContextData<OrderStatusCtxData>| {
    Box::pin(async move {
      let (is_staff, staff_id) = {
        let guard = ctx_data.read();
        (guard.is_staff, guard.staff_id)
      };
      if !is_staff {
        warn!(%staff_id, "Status change attempted without staff role.");
        return Err(AppError::Forbidden("Acesso restrito à equipe.".to_string()));
      }
      Ok(PipelineControl::Continue)
    })
  });

  p.on_root("load_order", |ctx_data: ContextData<OrderStatusCtxData>| {
    Box::pin(async move {
      let (store, order_id) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), guard.order_id)
      };
      let order = store
        .order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pedido não encontrado.".to_string()))?;
      ctx_data.write().order = Some(order.order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // A request for the current status ends the run here.
  p.on_root("check_transition", |ctx_data: ContextData<OrderStatusCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let current = guard
        .order
        .as_ref()
        .map(|o| o.status)
        .ok_or_else(|| AppError::Internal("Order not loaded before transition check.".to_string()))?;
      let change = current.change_to(guard.requested)?;
      guard.change = Some(change);
      match change {
        StatusChange::Unchanged => Ok::<_, AppError>(PipelineControl::Stop),
        StatusChange::Changed { .. } => Ok(PipelineControl::Continue),
      }
    })
  });

  p.on_root("persist_status", |ctx_data: ContextData<OrderStatusCtxData>| {
    Box::pin(async move {
      let (store, order_id, requested, change) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), guard.order_id, guard.requested, guard.change)
      };
      let Some(StatusChange::Changed { from, .. }) = change else {
        return Err(AppError::Internal("Status written without a checked transition.".to_string()));
      };
      store.set_order_status(order_id, from, requested).await?;
      if let Some(order) = ctx_data.write().order.as_mut() {
        order.status = requested;
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("record_status_activity", |ctx_data: ContextData<OrderStatusCtxData>| {
    Box::pin(async move {
      let (store, staff_id, order_id, change, customer) = {
        let guard = ctx_data.read();
        (
          guard.app_state.store.clone(),
          guard.staff_id,
          guard.order_id,
          guard.change,
          guard.order.as_ref().map(|o| o.user_id),
        )
      };
      if let Some(StatusChange::Changed { from, to }) = change {
        let description = format!(
          "Pedido {} alterado de {} para {} por {}.",
          order_id,
          from.label(),
          to.label(),
          staff_id
        );
        store
          .record(&ActivityEntry::new(ActivityKind::OrderStatusChanged, description, customer))
          .await?;
        info!(%order_id, from = from.as_str(), to = to.as_str(), "Order status changed.");
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register_pipeline(p);
}

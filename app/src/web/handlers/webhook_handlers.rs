//! Server-to-server payment notifications.

use actix_web::{web, HttpResponse};
use doce_flow::ContextData;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::contexts::PaymentCallbackCtxData;
use crate::state::AppState;

/// Extracts the payment id from a notification body. `Ok(None)` for
/// notifications about anything other than payments.
pub fn payment_notification(body: &Value) -> Result<Option<String>, AppError> {
  let Some(object) = body.as_object() else {
    return Err(AppError::Validation("Notification body must be a JSON object.".to_string()));
  };
  let topic = object
    .get("type")
    .or_else(|| object.get("topic"))
    .and_then(Value::as_str)
    .unwrap_or_default();
  if topic != "payment" {
    return Ok(None);
  }
  let id = match object.get("data").and_then(|d| d.get("id")) {
    Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
    Some(Value::Number(n)) => n.to_string(),
    _ => return Err(AppError::Validation("Payment notification without data.id.".to_string())),
  };
  Ok(Some(id))
}

fn acknowledged(processed: bool) -> HttpResponse {
  HttpResponse::Ok().json(json!({ "received": true, "processed": processed }))
}

/// Looks the payment up at the gateway and settles the checkout it
/// references. Anything short of a malformed body is acknowledged with 200
/// so the gateway stops retrying.
#[instrument(name = "handler::payment_webhook", skip(app_state, body))]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
  let Some(payment_id) = payment_notification(&body)? else {
    info!("Ignoring non-payment notification.");
    return Ok(acknowledged(false));
  };

  let payment = match app_state.gateway.fetch_payment(&payment_id).await {
    Ok(payment) => payment,
    Err(e) => {
      warn!(%payment_id, error = %e, "Could not fetch notified payment.");
      return Ok(acknowledged(false));
    }
  };
  let Some(outcome) = payment.outcome() else {
    info!(%payment_id, status = %payment.status, "Payment status carries no settlement action.");
    return Ok(acknowledged(false));
  };
  let Some(reference) = payment
    .external_reference
    .as_deref()
    .and_then(|r| Uuid::parse_str(r.trim()).ok())
  else {
    warn!(%payment_id, "Notified payment has no usable external reference.");
    return Ok(acknowledged(false));
  };

  let ctx = ContextData::new(PaymentCallbackCtxData::new(
    app_state.get_ref().clone(),
    None,
    outcome,
    Some(reference),
    Some(payment.id.clone()),
  ));
  match app_state.flows.run(ctx.clone()).await {
    Ok(result) => {
      let guard = ctx.read();
      info!(
        %payment_id,
        checkout_ref = %reference,
        ?result,
        created = guard.created,
        replay = guard.is_replay(),
        "Payment notification settled."
      );
      Ok(acknowledged(true))
    }
    Err(e) => {
      warn!(%payment_id, error = %e, "Payment notification could not be settled.");
      Ok(acknowledged(false))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payment_ids_are_read_as_string_or_number() {
    let body = json!({ "type": "payment", "data": { "id": "123" } });
    assert_eq!(payment_notification(&body).unwrap(), Some("123".to_string()));
    let body = json!({ "topic": "payment", "data": { "id": 456 } });
    assert_eq!(payment_notification(&body).unwrap(), Some("456".to_string()));
  }

  #[test]
  fn other_topics_are_ignored() {
    let body = json!({ "type": "merchant_order", "data": { "id": "9" } });
    assert_eq!(payment_notification(&body).unwrap(), None);
  }

  #[test]
  fn malformed_payment_notifications_are_rejected() {
    assert!(matches!(payment_notification(&json!([1, 2])), Err(AppError::Validation(_))));
    assert!(matches!(
      payment_notification(&json!({ "type": "payment" })),
      Err(AppError::Validation(_))
    ));
  }
}

//! Browser return URLs of the hosted payment page.

use actix_web::{web, HttpResponse};
use doce_flow::{ContextData, PipelineResult};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::checkout_handlers::CART_PATH;
use crate::errors::AppError;
use crate::models::FlashLevel;
use crate::pipelines::contexts::PaymentCallbackCtxData;
use crate::services::payment_gateway::PaymentOutcome;
use crate::state::AppState;
use crate::web::extractors::{see_other, BrowserSession};

pub const ORDERS_PATH: &str = "/api/v1/orders";

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
  #[serde(default)]
  pub external_reference: Option<String>,
  #[serde(default)]
  pub payment_id: Option<String>,
  #[serde(default)]
  pub collection_id: Option<String>,
}

impl CallbackQuery {
  fn reference(&self) -> Option<Uuid> {
    self.external_reference.as_deref().and_then(|r| Uuid::parse_str(r.trim()).ok())
  }

  fn payment_id(&self) -> Option<String> {
    self
      .payment_id
      .clone()
      .or_else(|| self.collection_id.clone())
      .filter(|id| !id.trim().is_empty() && id != "null")
  }
}

/// The gateway decides the outcome whenever the return names a payment.
/// A success return without one waits for the server notification.
async fn verified_outcome(
  app_state: &AppState,
  query: &CallbackQuery,
  claimed: PaymentOutcome,
) -> Result<(PaymentOutcome, Option<Uuid>), AppError> {
  let reference = query.reference();
  let Some(payment_id) = query.payment_id() else {
    return Ok(match claimed {
      PaymentOutcome::Approved => (PaymentOutcome::Pending, reference),
      other => (other, reference),
    });
  };
  let payment = app_state.gateway.fetch_payment(&payment_id).await?;
  let outcome = payment.outcome().unwrap_or(PaymentOutcome::Pending);
  let paid_for = payment
    .external_reference
    .as_deref()
    .and_then(|r| Uuid::parse_str(r.trim()).ok());
  if paid_for.is_some() && reference.is_some() && paid_for != reference {
    warn!(%payment_id, "Return URL reference differs from the payment's; using the payment's.");
  }
  if outcome != claimed {
    info!(%payment_id, claimed = claimed.as_str(), actual = outcome.as_str(), "Gateway status overrides return URL.");
  }
  Ok((outcome, paid_for.or(reference)))
}

async fn handle_return(
  app_state: web::Data<AppState>,
  session: BrowserSession,
  query: CallbackQuery,
  claimed: PaymentOutcome,
) -> Result<HttpResponse, AppError> {
  let (outcome, reference) = match verified_outcome(&app_state, &query, claimed).await {
    Ok(verified) => verified,
    Err(e) => {
      error!(error = %e, claimed = claimed.as_str(), "Payment return could not be verified.");
      session
        .handle()
        .flash(FlashLevel::Error, "Erro ao processar confirmação de pagamento.");
      return session.commit(&app_state, see_other(CART_PATH)).await;
    }
  };
  let ctx = ContextData::new(PaymentCallbackCtxData::new(
    app_state.get_ref().clone(),
    Some(session.handle().clone()),
    outcome,
    reference,
    query.payment_id(),
  ));

  let location = match app_state.flows.run(ctx.clone()).await {
    Ok(result) => {
      let (flash, has_order, created, replay) = {
        let guard = ctx.read();
        (guard.flash.clone(), guard.order.is_some(), guard.created, guard.is_replay())
      };
      if let Some(flash) = flash {
        session.handle().flash(flash.level, flash.message);
      }
      info!(?result, created, replay, "Payment return handled.");
      if has_order && result == PipelineResult::Completed {
        ORDERS_PATH
      } else {
        CART_PATH
      }
    }
    Err(e) => {
      error!(error = %e, outcome = outcome.as_str(), "Payment return failed.");
      session
        .handle()
        .flash(FlashLevel::Error, "Erro ao processar confirmação de pagamento.");
      CART_PATH
    }
  };
  session.commit(&app_state, see_other(location)).await
}

#[instrument(name = "handler::payment_success", skip(app_state, session, query))]
pub async fn payment_success_handler(
  app_state: web::Data<AppState>,
  session: BrowserSession,
  query: web::Query<CallbackQuery>,
) -> Result<HttpResponse, AppError> {
  handle_return(app_state, session, query.into_inner(), PaymentOutcome::Approved).await
}

#[instrument(name = "handler::payment_failure", skip(app_state, session, query))]
pub async fn payment_failure_handler(
  app_state: web::Data<AppState>,
  session: BrowserSession,
  query: web::Query<CallbackQuery>,
) -> Result<HttpResponse, AppError> {
  handle_return(app_state, session, query.into_inner(), PaymentOutcome::Rejected).await
}

#[instrument(name = "handler::payment_pending", skip(app_state, session, query))]
pub async fn payment_pending_handler(
  app_state: web::Data<AppState>,
  session: BrowserSession,
  query: web::Query<CallbackQuery>,
) -> Result<HttpResponse, AppError> {
  handle_return(app_state, session, query.into_inner(), PaymentOutcome::Pending).await
}

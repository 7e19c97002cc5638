use actix_web::{web, HttpResponse};
use doce_flow::{ContextData, PipelineResult};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::errors::AppError;
use crate::models::FlashLevel;
use crate::pipelines::contexts::{CheckoutCtxData, CheckoutForm};
use crate::state::AppState;
use crate::web::extractors::{see_other, BrowserSession, SignedIn};

pub const CART_PATH: &str = "/api/v1/cart";

/// Checkout form as posted by the storefront. Portuguese field names from
/// the legacy form are accepted too.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutFormInput {
  #[serde(default, alias = "tipo_entrega")]
  pub delivery: String,
  #[serde(default, alias = "rua")]
  pub street: Option<String>,
  #[serde(default, alias = "cep")]
  pub postal_code: Option<String>,
  #[serde(default, alias = "bairro")]
  pub district: Option<String>,
  #[serde(default, alias = "complemento")]
  pub complement: Option<String>,
  #[serde(default, alias = "observacoes")]
  pub notes: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

impl From<CheckoutFormInput> for CheckoutForm {
  fn from(input: CheckoutFormInput) -> Self {
    CheckoutForm {
      delivery: input.delivery,
      street: input.street,
      postal_code: input.postal_code,
      district: input.district,
      complement: input.complement,
      notes: input.notes,
      contact_email: input.email,
    }
  }
}

/// Hands the cart over to the payment gateway. The browser is always
/// redirected: to the hosted payment page, or back to the cart with a flash.
#[instrument(
  name = "handler::start_checkout",
  skip(app_state, user, session, form),
  fields(user_id = %user.user_id)
)]
pub async fn start_checkout_handler(
  app_state: web::Data<AppState>,
  user: SignedIn,
  session: BrowserSession,
  form: web::Form<CheckoutFormInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(CheckoutCtxData::new(
    app_state.get_ref().clone(),
    session.handle().clone(),
    user.user_id,
    form.into_inner().into(),
  ));

  let response = match app_state.flows.run(ctx.clone()).await {
    Ok(PipelineResult::Completed) => {
      let (link, strategy) = {
        let guard = ctx.read();
        (guard.payment_link.clone(), guard.strategy_used)
      };
      match link {
        Some(link) => {
          info!(?strategy, "Redirecting shopper to the payment page.");
          see_other(&link.url)
        }
        None => {
          error!("Checkout completed without a payment link.");
          session.handle().flash(FlashLevel::Error, AppError::PipelineHaltedByHandler.user_message());
          see_other(CART_PATH)
        }
      }
    }
    Ok(PipelineResult::Stopped) => see_other(CART_PATH),
    Err(e) if e.is_user_facing() => {
      warn!(error = %e, "Checkout refused.");
      session.handle().flash(FlashLevel::Error, e.user_message());
      see_other(CART_PATH)
    }
    Err(e) => {
      error!(error = %e, "Checkout failed.");
      session.handle().flash(FlashLevel::Error, e.user_message());
      see_other(CART_PATH)
    }
  };
  session.commit(&app_state, response).await
}

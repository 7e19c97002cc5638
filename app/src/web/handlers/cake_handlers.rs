use actix_web::{web, HttpResponse};
use chrono::Utc;
use doce_flow::{ContextData, PipelineResult};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{format_brl, ActivityEntry, ActivityKind, CartItemRef, CustomCake, FlashLevel};
use crate::pipelines::contexts::AddToCartCtxData;
use crate::services::cake_builder::{price_cake, CakeRequest};
use crate::state::AppState;
use crate::web::extractors::{BrowserSession, SignedIn};

/// Builds, prices and stores a cake for the caller, then drops one of it
/// into their cart through the add-to-cart pipeline.
#[instrument(
  name = "handler::create_custom_cake",
  skip(app_state, user, session, body),
  fields(user_id = %user.user_id)
)]
pub async fn create_custom_cake_handler(
  app_state: web::Data<AppState>,
  user: SignedIn,
  session: BrowserSession,
  body: web::Json<CakeRequest>,
) -> Result<HttpResponse, AppError> {
  let request = body.into_inner();
  let priced = price_cake(&request)?;

  let cake = CustomCake {
    id: Uuid::new_v4(),
    owner_id: user.user_id,
    name: priced.name,
    base: request.base,
    fillings: request.fillings,
    topping: request.topping,
    finishes: request.finishes,
    notes: request.notes.filter(|n| !n.trim().is_empty()),
    price_cents: priced.price_cents,
    active: true,
    created_at: Utc::now(),
  };
  app_state.store.insert_custom_cake(&cake).await?;
  if let Err(e) = app_state
    .store
    .record(&ActivityEntry::new(
      ActivityKind::CustomCakeCreated,
      format!("{} criado por {}", cake.name, format_brl(cake.price_cents)),
      Some(user.user_id),
    ))
    .await
  {
    warn!(error = %e, "Could not record custom cake activity.");
  }
  info!(cake_id = %cake.id, price_cents = cake.price_cents, "Custom cake stored.");

  let ctx = ContextData::new(AddToCartCtxData::new(
    app_state.get_ref().clone(),
    session.handle().clone(),
    Some(user.user_id),
    CartItemRef::CustomCake(cake.id),
    1,
  ));
  match app_state.flows.run(ctx.clone()).await? {
    PipelineResult::Completed => {}
    PipelineResult::Stopped => return Err(AppError::PipelineHaltedByHandler),
  }
  let line = ctx.read().updated_line.clone();

  session
    .handle()
    .flash(FlashLevel::Success, "Bolo personalizado adicionado ao carrinho!");
  let price_display = format_brl(cake.price_cents);
  let response = HttpResponse::Created().json(json!({
    "cake": cake,
    "cartLine": line,
    "priceDisplay": price_display,
  }));
  session.commit(&app_state, response).await
}

#[instrument(name = "handler::list_custom_cakes", skip(app_state, user), fields(user_id = %user.user_id))]
pub async fn list_custom_cakes_handler(
  app_state: web::Data<AppState>,
  user: SignedIn,
) -> Result<HttpResponse, AppError> {
  let cakes = app_state.store.custom_cakes_for(user.user_id).await?;
  Ok(HttpResponse::Ok().json(cakes))
}

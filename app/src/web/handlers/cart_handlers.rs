use actix_web::{web, HttpResponse};
use doce_flow::{ContextData, PipelineResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{clamp_quantity, format_brl, CartItemRef, CartLine, ItemKind};
use crate::pipelines::contexts::AddToCartCtxData;
use crate::services::cart_reconciler::reconcile_cart;
use crate::services::cart_store::open_cart;
use crate::state::AppState;
use crate::web::extractors::{BrowserSession, Viewer};

fn parse_item(kind: &str, id: Uuid) -> Result<CartItemRef, AppError> {
  let kind = ItemKind::parse(kind).ok_or_else(|| AppError::Validation(format!("Tipo de item inválido: {}", kind)))?;
  Ok(CartItemRef::new(kind, id))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
  #[serde(default = "default_kind")]
  pub kind: String,
  pub id: Uuid,
  #[serde(default = "default_quantity")]
  pub quantity: i32,
}

fn default_kind() -> String {
  ItemKind::Product.as_str().to_string()
}

fn default_quantity() -> i32 {
  1
}

/// One requested quantity. Anything that is not a positive integer is
/// ignored rather than rejected.
#[derive(Debug, Deserialize)]
pub struct QuantityUpdate {
  pub kind: String,
  pub id: Uuid,
  pub quantity: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
  pub items: Vec<QuantityUpdate>,
}

fn requested_quantity(raw: &Value) -> Option<i32> {
  let parsed = match raw {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse::<i64>().ok(),
    _ => None,
  }?;
  if parsed <= 0 {
    return None;
  }
  Some(clamp_quantity(i32::try_from(parsed).unwrap_or(i32::MAX)))
}

#[instrument(name = "handler::view_cart", skip(app_state, viewer, session), fields(user_id = ?viewer.user_id))]
pub async fn view_cart_handler(
  app_state: web::Data<AppState>,
  viewer: Viewer,
  session: BrowserSession,
) -> Result<HttpResponse, AppError> {
  let cart = open_cart(&app_state.store, session.handle(), viewer.user_id).await?;
  let reconciliation = reconcile_cart(cart.as_ref(), app_state.store.as_ref(), viewer.user_id).await?;
  let flashes = session.handle().take_flashes();

  let response = HttpResponse::Ok().json(json!({
    "lines": reconciliation.lines,
    "subtotalCents": reconciliation.subtotal_cents,
    "subtotalDisplay": format_brl(reconciliation.subtotal_cents),
    "notices": reconciliation.notices,
    "flashes": flashes,
  }));
  session.commit(&app_state, response).await
}

#[instrument(
  name = "handler::add_to_cart",
  skip(app_state, viewer, session, body),
  fields(user_id = ?viewer.user_id, item_id = %body.id)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  viewer: Viewer,
  session: BrowserSession,
  body: web::Json<AddItemRequest>,
) -> Result<HttpResponse, AppError> {
  let item = parse_item(&body.kind, body.id)?;
  let ctx = ContextData::new(AddToCartCtxData::new(
    app_state.get_ref().clone(),
    session.handle().clone(),
    viewer.user_id,
    item,
    body.quantity,
  ));

  match app_state.flows.run(ctx.clone()).await {
    Ok(PipelineResult::Completed) => {
      let line = ctx.read().updated_line.clone();
      info!(%item, "Item added to cart.");
      let response = HttpResponse::Ok().json(json!({
        "message": "Item adicionado ao carrinho!",
        "line": line,
      }));
      session.commit(&app_state, response).await
    }
    Ok(PipelineResult::Stopped) => Err(AppError::PipelineHaltedByHandler),
    Err(e) => {
      debug!(error = %e, "Add to cart rejected.");
      Err(e)
    }
  }
}

/// Overwrites the quantity of lines already in the cart.
#[instrument(name = "handler::update_cart", skip(app_state, viewer, session, body), fields(user_id = ?viewer.user_id))]
pub async fn update_cart_handler(
  app_state: web::Data<AppState>,
  viewer: Viewer,
  session: BrowserSession,
  body: web::Json<UpdateCartRequest>,
) -> Result<HttpResponse, AppError> {
  let cart = open_cart(&app_state.store, session.handle(), viewer.user_id).await?;
  let lines = cart.lines().await?;

  let mut updated = 0usize;
  let mut ignored = 0usize;
  for update in &body.items {
    let Ok(item) = parse_item(&update.kind, update.id) else {
      ignored += 1;
      continue;
    };
    let (Some(quantity), Some(existing)) = (requested_quantity(&update.quantity), lines.iter().find(|l| l.item == item))
    else {
      ignored += 1;
      continue;
    };
    cart
      .put_line(&CartLine {
        item,
        quantity,
        unit_price_cents: existing.unit_price_cents,
      })
      .await?;
    updated += 1;
  }

  info!(updated, ignored, "Cart quantities updated.");
  let response = HttpResponse::Ok().json(json!({ "updated": updated, "ignored": ignored }));
  session.commit(&app_state, response).await
}

#[instrument(name = "handler::remove_from_cart", skip(app_state, viewer, session), fields(user_id = ?viewer.user_id))]
pub async fn remove_from_cart_handler(
  app_state: web::Data<AppState>,
  viewer: Viewer,
  session: BrowserSession,
  path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, AppError> {
  let (kind, id) = path.into_inner();
  let item = parse_item(&kind, id)?;
  let cart = open_cart(&app_state.store, session.handle(), viewer.user_id).await?;
  let removed = cart.lines().await?.iter().any(|l| l.item == item);
  cart.remove(item).await?;
  let response = HttpResponse::Ok().json(json!({ "removed": removed }));
  session.commit(&app_state, response).await
}

#[instrument(name = "handler::drain_flashes", skip(app_state, session))]
pub async fn drain_flashes_handler(
  app_state: web::Data<AppState>,
  session: BrowserSession,
) -> Result<HttpResponse, AppError> {
  let flashes = session.handle().take_flashes();
  let response = HttpResponse::Ok().json(flashes);
  session.commit(&app_state, response).await
}

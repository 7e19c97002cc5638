//! Back office: order management for staff, catalog management for admins.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use doce_flow::{ContextData, PipelineResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{NewProduct, OrderStatus, ProductPatch};
use crate::pipelines::contexts::OrderStatusCtxData;
use crate::state::AppState;
use crate::web::extractors::{AdminIdentity, SignedIn, StaffIdentity};

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
  #[serde(default)]
  pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
  pub status: String,
}

fn parse_status(raw: &str) -> Result<OrderStatus, AppError> {
  OrderStatus::parse(raw.trim()).ok_or_else(|| AppError::Validation(format!("Status inválido: {}", raw)))
}

#[instrument(name = "handler::admin_list_orders", skip(app_state, staff), fields(staff_id = %staff.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  staff: StaffIdentity,
  query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, AppError> {
  let status = match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
    Some(raw) => Some(parse_status(raw)?),
    None => None,
  };
  let orders = app_state.store.list_orders(status).await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::admin_order_detail", skip(app_state, staff), fields(staff_id = %staff.user_id))]
pub async fn order_detail_handler(
  app_state: web::Data<AppState>,
  staff: StaffIdentity,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .store
    .order(path.into_inner())
    .await?
    .ok_or_else(|| AppError::NotFound("Pedido não encontrado.".to_string()))?;
  Ok(HttpResponse::Ok().json(order))
}

/// Role checks for this route happen inside the status pipeline, so any
/// signed-in user reaches it.
#[instrument(
  name = "handler::admin_update_order_status",
  skip(app_state, user, body),
  fields(user_id = %user.user_id)
)]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  user: SignedIn,
  path: web::Path<Uuid>,
  body: web::Json<StatusUpdateRequest>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let requested = parse_status(&body.status)?;
  let ctx = ContextData::new(OrderStatusCtxData::new(
    app_state.get_ref().clone(),
    user.user_id,
    user.role.is_staff(),
    order_id,
    requested,
  ));

  let result = app_state.flows.run(ctx.clone()).await?;
  let changed = result == PipelineResult::Completed;
  let message = if changed {
    format!("Status do pedido atualizado para {}.", requested.label())
  } else {
    "O pedido já está com este status.".to_string()
  };
  let order = ctx.read().order.clone();
  Ok(HttpResponse::Ok().json(json!({
    "order": order,
    "changed": changed,
    "message": message,
  })))
}

#[instrument(name = "handler::admin_create_product", skip(app_state, admin, body), fields(admin_id = %admin.user_id))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  admin: AdminIdentity,
  body: web::Json<NewProduct>,
) -> Result<HttpResponse, AppError> {
  let new_product = body.into_inner();
  new_product.validate().map_err(AppError::Validation)?;
  let product = new_product.into_product(Utc::now());
  app_state.store.insert_product(&product).await?;
  info!(product_id = %product.id, "Product created.");
  Ok(HttpResponse::Created().json(product))
}

#[instrument(name = "handler::admin_update_product", skip(app_state, admin, body), fields(admin_id = %admin.user_id))]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  admin: AdminIdentity,
  path: web::Path<Uuid>,
  body: web::Json<ProductPatch>,
) -> Result<HttpResponse, AppError> {
  let patch = body.into_inner();
  patch.validate().map_err(AppError::Validation)?;
  let mut product = app_state
    .store
    .product(path.into_inner())
    .await?
    .ok_or_else(|| AppError::NotFound("Produto não encontrado.".to_string()))?;
  patch.apply(&mut product, Utc::now());
  app_state.store.update_product(&product).await?;
  info!(product_id = %product.id, active = product.active, "Product updated.");
  Ok(HttpResponse::Ok().json(product))
}

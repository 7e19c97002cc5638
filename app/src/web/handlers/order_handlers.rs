use actix_web::{web, HttpResponse};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::SignedIn;

#[instrument(name = "handler::my_orders", skip(app_state, user), fields(user_id = %user.user_id))]
pub async fn my_orders_handler(app_state: web::Data<AppState>, user: SignedIn) -> Result<HttpResponse, AppError> {
  let orders = app_state.store.orders_for_user(user.user_id).await?;
  Ok(HttpResponse::Ok().json(orders))
}

/// Someone else's order reads as missing.
#[instrument(name = "handler::my_order", skip(app_state, user), fields(user_id = %user.user_id))]
pub async fn my_order_handler(
  app_state: web::Data<AppState>,
  user: SignedIn,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  match app_state.store.order(path.into_inner()).await? {
    Some(order) if order.order.user_id == user.user_id => Ok(HttpResponse::Ok().json(order)),
    _ => Err(AppError::NotFound(
      "Pedido não encontrado ou você não tem permissão para visualizá-lo.".to_string(),
    )),
  }
}

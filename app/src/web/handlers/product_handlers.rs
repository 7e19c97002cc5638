use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
  #[serde(default, alias = "categoria")]
  pub category: Option<String>,
}

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ProductQuery>,
) -> Result<HttpResponse, AppError> {
  let category = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
  let products = app_state.store.list_products(category).await?;
  Ok(HttpResponse::Ok().json(products))
}

#[instrument(name = "handler::list_categories", skip(app_state))]
pub async fn list_categories_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let categories = app_state.store.categories().await?;
  Ok(HttpResponse::Ok().json(categories))
}

#[instrument(name = "handler::get_product", skip(app_state))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  match app_state.store.product(product_id).await? {
    Some(product) if product.active => Ok(HttpResponse::Ok().json(product)),
    _ => Err(AppError::NotFound("Produto não encontrado.".to_string())),
  }
}

use crate::errors::AppError;
use crate::models::{CartItemRef, MAX_LINE_QUANTITY};
use crate::pipelines::contexts::AddToCartCtxData;
use crate::services::cart_store::{add_quantity, open_cart};
use doce_flow::{ContextData, Flows, Pipeline, PipelineControl};
use tracing::{info, warn};

pub fn register_add_to_cart_pipeline(flows: &Flows<AppError>) {
  let mut p = Pipeline::<AddToCartCtxData, AppError>::new(&[
    ("validate_cart_input", false, None),
    ("resolve_catalog_item", false, None),
    ("merge_into_cart", false, None),
  ]);

  p.on_root("validate_cart_input", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (quantity, item, user_id) = {
        let guard = ctx_data.read();
        (guard.quantity, guard.item, guard.user_id)
      };

      if quantity <= 0 {
        warn!(quantity, "Add to cart: non-positive quantity.");
        return Err(AppError::Validation("A quantidade deve ser maior que zero.".to_string()));
      }
      if matches!(item, CartItemRef::CustomCake(_)) && user_id.is_none() {
        return Err(AppError::Auth(
          "Você precisa fazer login para adicionar este item ao carrinho.".to_string(),
        ));
      }
      if quantity > MAX_LINE_QUANTITY {
        ctx_data.write().quantity = MAX_LINE_QUANTITY;
      }
      Ok(PipelineControl::Continue)
    })
  });

  p.on_root("resolve_catalog_item", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (store, item, user_id) = {
        let guard = ctx_data.read();
        (guard.app_state.store.clone(), guard.item, guard.user_id)
      };

      let snapshot = store.snapshot(&[item]).await?;
      let entry = match snapshot.get(&item) {
        Some(entry) if entry.active => entry.clone(),
        _ => {
          info!(%item, "Add to cart: item missing or inactive.");
          return Err(AppError::NotFound("Produto não encontrado.".to_string()));
        }
      };
      if let Some(owner) = entry.owner_id {
        if Some(owner) != user_id {
          return Err(AppError::Forbidden(
            "Você não tem permissão para adicionar este bolo ao carrinho.".to_string(),
          ));
        }
      }

      ctx_data.write().catalog_entry = Some(entry);
      Ok(PipelineControl::Continue)
    })
  });

  p.on_root("merge_into_cart", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (store, session, user_id, item, quantity, price) = {
        let guard = ctx_data.read();
        let price = guard.catalog_entry.as_ref().map(|e| e.price_cents).ok_or_else(|| {
          AppError::Internal("Catalog entry missing when merging into cart.".to_string())
        })?;
        (
          guard.app_state.store.clone(),
          guard.session.clone(),
          guard.user_id,
          guard.item,
          guard.quantity,
          price,
        )
      };

      let cart = open_cart(&store, &session, user_id).await?;
      let lines = cart.lines().await?;
      let line = add_quantity(lines.iter().find(|l| l.item == item), item, quantity, price);
      cart.put_line(&line).await?;
      info!(%item, quantity = line.quantity, "Cart line updated.");

      {
        let mut guard = ctx_data.write();
        guard.cart = Some(cart);
        guard.updated_line = Some(line);
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  flows.register_pipeline(p);
}

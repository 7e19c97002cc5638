//! Storage seams. Every backend implements the full set of traits; the app
//! holds it as `Arc<dyn Storage>`.

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{
  ActivityEntry, CartItemRef, CartLine, CatalogEntry, CatalogSnapshot, CustomCake, NewProduct, Order, OrderStatus,
  OrderWithLines, PendingCheckout, Product, SessionState, CANCELLED_IS_FINAL,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Catalog: Send + Sync {
  /// Active products, optionally limited to one category, by name.
  async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>>;
  async fn categories(&self) -> Result<Vec<String>>;
  /// Any product, active or not.
  async fn product(&self, id: Uuid) -> Result<Option<Product>>;
  async fn insert_product(&self, product: &Product) -> Result<()>;
  async fn update_product(&self, product: &Product) -> Result<()>;

  async fn custom_cake(&self, id: Uuid) -> Result<Option<CustomCake>>;
  async fn insert_custom_cake(&self, cake: &CustomCake) -> Result<()>;
  /// The owner's active cakes, newest first.
  async fn custom_cakes_for(&self, owner_id: Uuid) -> Result<Vec<CustomCake>>;

  /// Live entries for the given references; unknown ones are left out.
  async fn snapshot(&self, refs: &[CartItemRef]) -> Result<CatalogSnapshot> {
    let mut snapshot = CatalogSnapshot::new();
    for item in refs {
      let entry = match item {
        CartItemRef::Product(id) => self.product(*id).await?.map(|p| CatalogEntry {
          name: p.name,
          price_cents: p.price_cents,
          active: p.active,
          owner_id: None,
        }),
        CartItemRef::CustomCake(id) => self.custom_cake(*id).await?.map(|c| CatalogEntry {
          name: c.name,
          price_cents: c.price_cents,
          active: c.active,
          owner_id: Some(c.owner_id),
        }),
      };
      if let Some(entry) = entry {
        snapshot.insert(*item, entry);
      }
    }
    Ok(snapshot)
  }
}

/// Persisted per-user cart.
#[async_trait]
pub trait CartRepository: Send + Sync {
  async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>>;
  /// Inserts or replaces the line for `line.item`.
  async fn upsert_cart_line(&self, user_id: Uuid, line: &CartLine) -> Result<()>;
  async fn delete_cart_line(&self, user_id: Uuid, item: CartItemRef) -> Result<()>;
  async fn clear_cart(&self, user_id: Uuid) -> Result<()>;
}

/// Provisional checkout records awaiting the gateway's verdict.
#[async_trait]
pub trait PendingCheckouts: Send + Sync {
  /// Inserts or replaces by `checkout_ref`.
  async fn save_pending(&self, pending: &PendingCheckout) -> Result<()>;
  async fn pending(&self, checkout_ref: Uuid) -> Result<Option<PendingCheckout>>;
  async fn discard_pending(&self, checkout_ref: Uuid) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum Materialized {
  Created(OrderWithLines),
  /// An order for this checkout reference was already written.
  AlreadyExisted(OrderWithLines),
}

impl Materialized {
  pub fn order(&self) -> &OrderWithLines {
    match self {
      Materialized::Created(o) | Materialized::AlreadyExisted(o) => o,
    }
  }

  pub fn into_order(self) -> OrderWithLines {
    match self {
      Materialized::Created(o) | Materialized::AlreadyExisted(o) => o,
    }
  }

  pub fn was_created(&self) -> bool {
    matches!(self, Materialized::Created(_))
  }
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
  /// Writes the order and its lines for a confirmed payment, empties the
  /// buyer's persisted cart and drops the pending record, all atomically.
  /// Idempotent on `pending.checkout_ref`.
  async fn materialize_order(&self, pending: &PendingCheckout, payment_id: Option<&str>) -> Result<Materialized>;
  async fn order(&self, order_id: Uuid) -> Result<Option<OrderWithLines>>;
  async fn order_by_checkout_ref(&self, checkout_ref: Uuid) -> Result<Option<Order>>;
  /// Newest first.
  async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
  /// Newest first.
  async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;
  /// Writes `status` only while the order still holds `expected`. A
  /// concurrent change in between is a `Validation` error and nothing is
  /// written.
  async fn set_order_status(&self, order_id: Uuid, expected: OrderStatus, status: OrderStatus) -> Result<()>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
  async fn record(&self, entry: &ActivityEntry) -> Result<()>;
  /// Newest first.
  async fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
  async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionState>>;
  async fn save_session(&self, session_id: Uuid, state: &SessionState) -> Result<()>;
}

pub trait Storage: Catalog + CartRepository + PendingCheckouts + OrderLedger + ActivityLog + SessionStore {}

impl<T> Storage for T where T: Catalog + CartRepository + PendingCheckouts + OrderLedger + ActivityLog + SessionStore {}

fn demo_catalog() -> Vec<NewProduct> {
  let item = |name: &str, description: &str, category: &str, price_cents: i64| NewProduct {
    name: name.to_string(),
    description: Some(description.to_string()),
    category: category.to_string(),
    price_cents,
  };
  vec![
    item("Bolo de Cenoura", "Com cobertura de chocolate.", "Bolos", 4500),
    item("Bolo Red Velvet", "Recheio de cream cheese.", "Bolos", 7900),
    item("Brigadeiro Gourmet", "Unidade, chocolate belga.", "Doces", 450),
    item("Beijinho", "Unidade, coco fresco.", "Doces", 400),
    item("Torta de Limão", "Massa amanteigada e merengue.", "Tortas", 6200),
    item("Cheesecake de Frutas Vermelhas", "Fatia.", "Tortas", 1800),
  ]
}

/// Inserts the demo catalog when the store has no products yet.
pub async fn seed_catalog(store: &dyn Storage) -> Result<usize> {
  if !store.categories().await?.is_empty() {
    tracing::info!("Catalog already populated, skipping seed.");
    return Ok(0);
  }
  let now = Utc::now();
  let mut inserted = 0;
  for new_product in demo_catalog() {
    store.insert_product(&new_product.into_product(now)).await?;
    inserted += 1;
  }
  tracing::info!(inserted, "Seeded demo catalog.");
  Ok(inserted)
}

/// Error for a conditional status write that found the order elsewhere.
pub(crate) fn status_moved(current: OrderStatus) -> AppError {
  match current {
    OrderStatus::Cancelled => AppError::Validation(CANCELLED_IS_FINAL.to_string()),
    _ => AppError::Validation(format!(
      "O pedido foi alterado para {} enquanto isso. Atualize e tente novamente.",
      current.label()
    )),
  }
}

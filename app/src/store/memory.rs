//! In-process backend. Used when no database is configured and by the tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::{ActivityLog, CartRepository, Catalog, Materialized, OrderLedger, PendingCheckouts, SessionStore, status_moved};
use crate::errors::{AppError, Result};
use crate::models::{
  ActivityEntry, CartItemRef, CartLine, CustomCake, Order, OrderLine, OrderStatus, OrderWithLines, PendingCheckout,
  Product, SessionState,
};

#[derive(Default)]
struct Inner {
  products: HashMap<Uuid, Product>,
  cakes: HashMap<Uuid, CustomCake>,
  carts: HashMap<Uuid, Vec<CartLine>>,
  pending: HashMap<Uuid, PendingCheckout>,
  orders: HashMap<Uuid, OrderWithLines>,
  orders_by_ref: HashMap<Uuid, Uuid>,
  activity: Vec<ActivityEntry>,
  sessions: HashMap<Uuid, SessionState>,
}

#[derive(Default)]
pub struct MemoryStore {
  inner: RwLock<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of orders written so far.
  pub fn order_count(&self) -> usize {
    self.inner.read().orders.len()
  }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
  orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
  orders
}

#[async_trait]
impl Catalog for MemoryStore {
  async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
    let inner = self.inner.read();
    let mut products: Vec<Product> = inner
      .products
      .values()
      .filter(|p| p.active && category.map_or(true, |c| p.category == c))
      .cloned()
      .collect();
    products.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(products)
  }

  async fn categories(&self) -> Result<Vec<String>> {
    let inner = self.inner.read();
    let set: BTreeSet<String> = inner
      .products
      .values()
      .filter(|p| p.active)
      .map(|p| p.category.clone())
      .collect();
    Ok(set.into_iter().collect())
  }

  async fn product(&self, id: Uuid) -> Result<Option<Product>> {
    Ok(self.inner.read().products.get(&id).cloned())
  }

  async fn insert_product(&self, product: &Product) -> Result<()> {
    self.inner.write().products.insert(product.id, product.clone());
    Ok(())
  }

  async fn update_product(&self, product: &Product) -> Result<()> {
    let mut inner = self.inner.write();
    match inner.products.get_mut(&product.id) {
      Some(existing) => {
        *existing = product.clone();
        Ok(())
      }
      None => Err(AppError::NotFound(format!("Produto {} não encontrado.", product.id))),
    }
  }

  async fn custom_cake(&self, id: Uuid) -> Result<Option<CustomCake>> {
    Ok(self.inner.read().cakes.get(&id).cloned())
  }

  async fn insert_custom_cake(&self, cake: &CustomCake) -> Result<()> {
    self.inner.write().cakes.insert(cake.id, cake.clone());
    Ok(())
  }

  async fn custom_cakes_for(&self, owner_id: Uuid) -> Result<Vec<CustomCake>> {
    let inner = self.inner.read();
    let mut cakes: Vec<CustomCake> = inner
      .cakes
      .values()
      .filter(|c| c.owner_id == owner_id && c.active)
      .cloned()
      .collect();
    cakes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(cakes)
  }
}

#[async_trait]
impl CartRepository for MemoryStore {
  async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>> {
    Ok(self.inner.read().carts.get(&user_id).cloned().unwrap_or_default())
  }

  async fn upsert_cart_line(&self, user_id: Uuid, line: &CartLine) -> Result<()> {
    let mut inner = self.inner.write();
    let lines = inner.carts.entry(user_id).or_default();
    match lines.iter_mut().find(|l| l.item == line.item) {
      Some(existing) => *existing = line.clone(),
      None => lines.push(line.clone()),
    }
    Ok(())
  }

  async fn delete_cart_line(&self, user_id: Uuid, item: CartItemRef) -> Result<()> {
    if let Some(lines) = self.inner.write().carts.get_mut(&user_id) {
      lines.retain(|l| l.item != item);
    }
    Ok(())
  }

  async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
    self.inner.write().carts.remove(&user_id);
    Ok(())
  }
}

#[async_trait]
impl PendingCheckouts for MemoryStore {
  async fn save_pending(&self, pending: &PendingCheckout) -> Result<()> {
    self.inner.write().pending.insert(pending.checkout_ref, pending.clone());
    Ok(())
  }

  async fn pending(&self, checkout_ref: Uuid) -> Result<Option<PendingCheckout>> {
    Ok(self.inner.read().pending.get(&checkout_ref).cloned())
  }

  async fn discard_pending(&self, checkout_ref: Uuid) -> Result<()> {
    self.inner.write().pending.remove(&checkout_ref);
    Ok(())
  }
}

#[async_trait]
impl OrderLedger for MemoryStore {
  async fn materialize_order(&self, pending: &PendingCheckout, payment_id: Option<&str>) -> Result<Materialized> {
    let mut inner = self.inner.write();
    if let Some(existing) = inner
      .orders_by_ref
      .get(&pending.checkout_ref)
      .and_then(|id| inner.orders.get(id))
    {
      return Ok(Materialized::AlreadyExisted(existing.clone()));
    }

    let now = Utc::now();
    let order_id = Uuid::new_v4();
    let order = Order {
      id: order_id,
      checkout_ref: pending.checkout_ref,
      user_id: pending.user_id,
      status: OrderStatus::Approved,
      delivery: pending.delivery,
      delivery_fee_cents: pending.delivery_fee_cents,
      address: pending.address.clone().map(sqlx::types::Json),
      notes: pending.notes.clone(),
      total_cents: pending.total_cents,
      payment_id: payment_id.map(str::to_string),
      created_at: now,
      updated_at: now,
    };
    let lines = pending
      .lines
      .iter()
      .map(|l| OrderLine {
        id: Uuid::new_v4(),
        order_id,
        item_kind: l.item.kind(),
        item_id: l.item.id(),
        name: l.name.clone(),
        quantity: l.quantity,
        unit_price_cents: l.unit_price_cents,
      })
      .collect();
    let written = OrderWithLines { order, lines };

    inner.orders.insert(order_id, written.clone());
    inner.orders_by_ref.insert(pending.checkout_ref, order_id);
    inner.carts.remove(&pending.user_id);
    inner.pending.remove(&pending.checkout_ref);
    Ok(Materialized::Created(written))
  }

  async fn order(&self, order_id: Uuid) -> Result<Option<OrderWithLines>> {
    Ok(self.inner.read().orders.get(&order_id).cloned())
  }

  async fn order_by_checkout_ref(&self, checkout_ref: Uuid) -> Result<Option<Order>> {
    let inner = self.inner.read();
    Ok(
      inner
        .orders_by_ref
        .get(&checkout_ref)
        .and_then(|id| inner.orders.get(id))
        .map(|o| o.order.clone()),
    )
  }

  async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let inner = self.inner.read();
    let orders = inner
      .orders
      .values()
      .filter(|o| o.order.user_id == user_id)
      .map(|o| o.order.clone())
      .collect();
    Ok(newest_first(orders))
  }

  async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
    let inner = self.inner.read();
    let orders = inner
      .orders
      .values()
      .filter(|o| status.map_or(true, |s| o.order.status == s))
      .map(|o| o.order.clone())
      .collect();
    Ok(newest_first(orders))
  }

  async fn set_order_status(&self, order_id: Uuid, expected: OrderStatus, status: OrderStatus) -> Result<()> {
    let mut inner = self.inner.write();
    match inner.orders.get_mut(&order_id) {
      Some(o) if o.order.status != expected => Err(status_moved(o.order.status)),
      Some(o) => {
        o.order.status = status;
        o.order.updated_at = Utc::now();
        Ok(())
      }
      None => Err(AppError::NotFound(format!("Pedido {} não encontrado.", order_id))),
    }
  }
}

#[async_trait]
impl ActivityLog for MemoryStore {
  async fn record(&self, entry: &ActivityEntry) -> Result<()> {
    self.inner.write().activity.push(entry.clone());
    Ok(())
  }

  async fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
    let inner = self.inner.read();
    Ok(inner.activity.iter().rev().take(limit).cloned().collect())
  }
}

#[async_trait]
impl SessionStore for MemoryStore {
  async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionState>> {
    Ok(self.inner.read().sessions.get(&session_id).cloned())
  }

  async fn save_session(&self, session_id: Uuid, state: &SessionState) -> Result<()> {
    self.inner.write().sessions.insert(session_id, state.clone());
    Ok(())
  }
}

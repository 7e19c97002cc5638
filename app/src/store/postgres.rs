//! Postgres backend over `sqlx`. Schema lives in `app/migrations`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ActivityLog, CartRepository, Catalog, Materialized, OrderLedger, PendingCheckouts, SessionStore, status_moved};
use crate::errors::{AppError, Result};
use crate::models::{
  ActivityEntry, CartItemRef, CartLine, CustomCake, ItemKind, Order, OrderLine, OrderStatus, OrderWithLines,
  PendingCheckout, Product, SessionState,
};

pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> Result<Self> {
    let pool = PgPool::connect(database_url).await?;
    Ok(Self::new(pool))
  }

  pub async fn migrate(&self) -> Result<()> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    tracing::info!("Database migrations applied.");
    Ok(())
  }
}

#[derive(FromRow)]
struct CartLineRow {
  item_kind: ItemKind,
  item_id: Uuid,
  quantity: i32,
  unit_price_cents: i64,
}

impl From<CartLineRow> for CartLine {
  fn from(row: CartLineRow) -> Self {
    CartLine {
      item: CartItemRef::new(row.item_kind, row.item_id),
      quantity: row.quantity,
      unit_price_cents: row.unit_price_cents,
    }
  }
}

async fn lines_of(tx: &mut Transaction<'static, Postgres>, order_id: Uuid) -> Result<Vec<OrderLine>> {
  let lines = sqlx::query_as::<_, OrderLine>(
    "SELECT id, order_id, item_kind, item_id, name, quantity, unit_price_cents
     FROM order_lines WHERE order_id = $1 ORDER BY name",
  )
  .bind(order_id)
  .fetch_all(&mut **tx)
  .await?;
  Ok(lines)
}

#[async_trait]
impl Catalog for PgStore {
  async fn list_products(&self, category: Option<&str>) -> Result<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(
      "SELECT * FROM products WHERE active AND ($1::text IS NULL OR category = $1) ORDER BY name",
    )
    .bind(category)
    .fetch_all(&self.pool)
    .await?;
    Ok(products)
  }

  async fn categories(&self) -> Result<Vec<String>> {
    let categories =
      sqlx::query_scalar::<_, String>("SELECT DISTINCT category FROM products WHERE active ORDER BY category")
        .fetch_all(&self.pool)
        .await?;
    Ok(categories)
  }

  async fn product(&self, id: Uuid) -> Result<Option<Product>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(product)
  }

  async fn insert_product(&self, p: &Product) -> Result<()> {
    sqlx::query(
      "INSERT INTO products (id, name, description, category, price_cents, active, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(p.id)
    .bind(&p.name)
    .bind(&p.description)
    .bind(&p.category)
    .bind(p.price_cents)
    .bind(p.active)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn update_product(&self, p: &Product) -> Result<()> {
    let result = sqlx::query(
      "UPDATE products SET name = $2, description = $3, category = $4, price_cents = $5, active = $6, updated_at = $7
       WHERE id = $1",
    )
    .bind(p.id)
    .bind(&p.name)
    .bind(&p.description)
    .bind(&p.category)
    .bind(p.price_cents)
    .bind(p.active)
    .bind(p.updated_at)
    .execute(&self.pool)
    .await?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound(format!("Produto {} não encontrado.", p.id)));
    }
    Ok(())
  }

  async fn custom_cake(&self, id: Uuid) -> Result<Option<CustomCake>> {
    let cake = sqlx::query_as::<_, CustomCake>("SELECT * FROM custom_cakes WHERE id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(cake)
  }

  async fn insert_custom_cake(&self, c: &CustomCake) -> Result<()> {
    sqlx::query(
      "INSERT INTO custom_cakes (id, owner_id, name, base, fillings, topping, finishes, notes, price_cents, active, created_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(c.id)
    .bind(c.owner_id)
    .bind(&c.name)
    .bind(&c.base)
    .bind(&c.fillings)
    .bind(&c.topping)
    .bind(&c.finishes)
    .bind(&c.notes)
    .bind(c.price_cents)
    .bind(c.active)
    .bind(c.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn custom_cakes_for(&self, owner_id: Uuid) -> Result<Vec<CustomCake>> {
    let cakes = sqlx::query_as::<_, CustomCake>(
      "SELECT * FROM custom_cakes WHERE owner_id = $1 AND active ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(cakes)
  }
}

#[async_trait]
impl CartRepository for PgStore {
  async fn cart_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>> {
    let rows = sqlx::query_as::<_, CartLineRow>(
      "SELECT item_kind, item_id, quantity, unit_price_cents FROM cart_lines WHERE user_id = $1 ORDER BY added_at",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(CartLine::from).collect())
  }

  async fn upsert_cart_line(&self, user_id: Uuid, line: &CartLine) -> Result<()> {
    sqlx::query(
      "INSERT INTO cart_lines (user_id, item_kind, item_id, quantity, unit_price_cents)
       VALUES ($1, $2, $3, $4, $5)
       ON CONFLICT (user_id, item_kind, item_id)
       DO UPDATE SET quantity = EXCLUDED.quantity, unit_price_cents = EXCLUDED.unit_price_cents",
    )
    .bind(user_id)
    .bind(line.item.kind())
    .bind(line.item.id())
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn delete_cart_line(&self, user_id: Uuid, item: CartItemRef) -> Result<()> {
    sqlx::query("DELETE FROM cart_lines WHERE user_id = $1 AND item_kind = $2 AND item_id = $3")
      .bind(user_id)
      .bind(item.kind())
      .bind(item.id())
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
      .bind(user_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[async_trait]
impl PendingCheckouts for PgStore {
  async fn save_pending(&self, pending: &PendingCheckout) -> Result<()> {
    sqlx::query(
      "INSERT INTO pending_checkouts (checkout_ref, user_id, payload, created_at)
       VALUES ($1, $2, $3, $4)
       ON CONFLICT (checkout_ref) DO UPDATE SET payload = EXCLUDED.payload",
    )
    .bind(pending.checkout_ref)
    .bind(pending.user_id)
    .bind(Json(pending))
    .bind(pending.created_at)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn pending(&self, checkout_ref: Uuid) -> Result<Option<PendingCheckout>> {
    let payload =
      sqlx::query_scalar::<_, Json<PendingCheckout>>("SELECT payload FROM pending_checkouts WHERE checkout_ref = $1")
        .bind(checkout_ref)
        .fetch_optional(&self.pool)
        .await?;
    Ok(payload.map(|Json(p)| p))
  }

  async fn discard_pending(&self, checkout_ref: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM pending_checkouts WHERE checkout_ref = $1")
      .bind(checkout_ref)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

#[async_trait]
impl OrderLedger for PgStore {
  async fn materialize_order(&self, pending: &PendingCheckout, payment_id: Option<&str>) -> Result<Materialized> {
    let mut tx = self.pool.begin().await?;
    let now = Utc::now();

    let inserted = sqlx::query_as::<_, Order>(
      "INSERT INTO orders (id, checkout_ref, user_id, status, delivery, delivery_fee_cents, address, notes,
                           total_cents, payment_id, created_at, updated_at)
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
       ON CONFLICT (checkout_ref) DO NOTHING
       RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(pending.checkout_ref)
    .bind(pending.user_id)
    .bind(OrderStatus::Approved)
    .bind(pending.delivery)
    .bind(pending.delivery_fee_cents)
    .bind(pending.address.as_ref().map(Json))
    .bind(&pending.notes)
    .bind(pending.total_cents)
    .bind(payment_id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(order) = inserted else {
      let existing = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE checkout_ref = $1")
        .bind(pending.checkout_ref)
        .fetch_one(&mut *tx)
        .await?;
      let lines = lines_of(&mut tx, existing.id).await?;
      sqlx::query("DELETE FROM pending_checkouts WHERE checkout_ref = $1")
        .bind(pending.checkout_ref)
        .execute(&mut *tx)
        .await?;
      tx.commit().await?;
      return Ok(Materialized::AlreadyExisted(OrderWithLines { order: existing, lines }));
    };

    for line in &pending.lines {
      sqlx::query(
        "INSERT INTO order_lines (id, order_id, item_kind, item_id, name, quantity, unit_price_cents)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
      )
      .bind(Uuid::new_v4())
      .bind(order.id)
      .bind(line.item.kind())
      .bind(line.item.id())
      .bind(&line.name)
      .bind(line.quantity)
      .bind(line.unit_price_cents)
      .execute(&mut *tx)
      .await?;
    }

    sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
      .bind(pending.user_id)
      .execute(&mut *tx)
      .await?;
    sqlx::query("DELETE FROM pending_checkouts WHERE checkout_ref = $1")
      .bind(pending.checkout_ref)
      .execute(&mut *tx)
      .await?;

    let lines = lines_of(&mut tx, order.id).await?;
    tx.commit().await?;
    Ok(Materialized::Created(OrderWithLines { order, lines }))
  }

  async fn order(&self, order_id: Uuid) -> Result<Option<OrderWithLines>> {
    let mut tx = self.pool.begin().await?;
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
      .bind(order_id)
      .fetch_optional(&mut *tx)
      .await?;
    let found = match order {
      Some(order) => {
        let lines = lines_of(&mut tx, order.id).await?;
        Some(OrderWithLines { order, lines })
      }
      None => None,
    };
    tx.commit().await?;
    Ok(found)
  }

  async fn order_by_checkout_ref(&self, checkout_ref: Uuid) -> Result<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE checkout_ref = $1")
      .bind(checkout_ref)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }

  async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?;
    Ok(orders)
  }

  async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(
      "SELECT * FROM orders WHERE ($1::order_status IS NULL OR status = $1) ORDER BY created_at DESC",
    )
    .bind(status)
    .fetch_all(&self.pool)
    .await?;
    Ok(orders)
  }

  async fn set_order_status(&self, order_id: Uuid, expected: OrderStatus, status: OrderStatus) -> Result<()> {
    let result = sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 AND status = $3")
      .bind(order_id)
      .bind(status)
      .bind(expected)
      .execute(&self.pool)
      .await?;
    if result.rows_affected() > 0 {
      return Ok(());
    }
    let current = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM orders WHERE id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    match current {
      Some(current) => Err(status_moved(current)),
      None => Err(AppError::NotFound(format!("Pedido {} não encontrado.", order_id))),
    }
  }
}

#[async_trait]
impl ActivityLog for PgStore {
  async fn record(&self, entry: &ActivityEntry) -> Result<()> {
    sqlx::query("INSERT INTO activity_log (id, kind, description, user_id, created_at) VALUES ($1, $2, $3, $4, $5)")
      .bind(entry.id)
      .bind(entry.kind)
      .bind(&entry.description)
      .bind(entry.user_id)
      .bind(entry.created_at)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn recent(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
    let entries = sqlx::query_as::<_, ActivityEntry>("SELECT * FROM activity_log ORDER BY created_at DESC LIMIT $1")
      .bind(i64::try_from(limit).unwrap_or(i64::MAX))
      .fetch_all(&self.pool)
      .await?;
    Ok(entries)
  }
}

#[async_trait]
impl SessionStore for PgStore {
  async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionState>> {
    let data = sqlx::query_scalar::<_, Json<SessionState>>("SELECT data FROM sessions WHERE id = $1")
      .bind(session_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(data.map(|Json(s)| s))
  }

  async fn save_session(&self, session_id: Uuid, state: &SessionState) -> Result<()> {
    sqlx::query(
      "INSERT INTO sessions (id, data, updated_at) VALUES ($1, $2, now())
       ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
    )
    .bind(session_id)
    .bind(Json(state))
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}

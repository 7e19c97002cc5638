//! One cart abstraction over two backings: the guest cart kept in the
//! session and the persisted per-user cart. The backing is picked once per
//! request.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::session::SessionHandle;
use crate::errors::Result;
use crate::models::cart::clamp_quantity;
use crate::models::{CartItemRef, CartLine};
use crate::store::Storage;

#[async_trait]
pub trait CartStore: Send + Sync {
  async fn lines(&self) -> Result<Vec<CartLine>>;
  /// Inserts the line or replaces the one for the same item.
  async fn put_line(&self, line: &CartLine) -> Result<()>;
  /// Removing an absent item is not an error.
  async fn remove(&self, item: CartItemRef) -> Result<()>;
  async fn clear(&self) -> Result<()>;
}

pub struct SessionCartStore {
  session: SessionHandle,
}

impl SessionCartStore {
  pub fn new(session: SessionHandle) -> Self {
    Self { session }
  }
}

#[async_trait]
impl CartStore for SessionCartStore {
  async fn lines(&self) -> Result<Vec<CartLine>> {
    Ok(self.session.guest_cart())
  }

  async fn put_line(&self, line: &CartLine) -> Result<()> {
    self.session.with(|s| {
      match s.guest_cart.iter().position(|l| l.item == line.item) {
        Some(idx) => {
          s.guest_cart[idx] = line.clone();
          let item = line.item;
          let mut seen = false;
          s.guest_cart.retain(|l| {
            if l.item != item {
              return true;
            }
            let keep = !seen;
            seen = true;
            keep
          });
        }
        None => s.guest_cart.push(line.clone()),
      }
    });
    Ok(())
  }

  async fn remove(&self, item: CartItemRef) -> Result<()> {
    self.session.with(|s| s.guest_cart.retain(|l| l.item != item));
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    self.session.with(|s| s.guest_cart.clear());
    Ok(())
  }
}

pub struct PersistedCartStore {
  store: Arc<dyn Storage>,
  user_id: Uuid,
}

impl PersistedCartStore {
  pub fn new(store: Arc<dyn Storage>, user_id: Uuid) -> Self {
    Self { store, user_id }
  }
}

#[async_trait]
impl CartStore for PersistedCartStore {
  async fn lines(&self) -> Result<Vec<CartLine>> {
    self.store.cart_lines(self.user_id).await
  }

  async fn put_line(&self, line: &CartLine) -> Result<()> {
    self.store.upsert_cart_line(self.user_id, line).await
  }

  async fn remove(&self, item: CartItemRef) -> Result<()> {
    self.store.delete_cart_line(self.user_id, item).await
  }

  async fn clear(&self) -> Result<()> {
    self.store.clear_cart(self.user_id).await
  }
}

/// Adds `quantity` of `item` to whatever the cart already holds, clamped.
pub fn add_quantity(existing: Option<&CartLine>, item: CartItemRef, quantity: i32, unit_price_cents: i64) -> CartLine {
  let current = existing.map_or(0, |l| l.quantity);
  CartLine {
    item,
    quantity: clamp_quantity(current.saturating_add(quantity)),
    unit_price_cents,
  }
}

/// Moves guest lines into the user's persisted cart, summing quantities.
/// Lines with a non-positive quantity are dropped. Returns the number of
/// guest lines moved.
pub async fn merge_guest_cart(store: &Arc<dyn Storage>, session: &SessionHandle, user_id: Uuid) -> Result<usize> {
  let guest = session.guest_cart();
  if guest.is_empty() {
    return Ok(0);
  }
  let mut merged: HashMap<CartItemRef, CartLine> = store
    .cart_lines(user_id)
    .await?
    .into_iter()
    .map(|l| (l.item, l))
    .collect();
  let mut touched = Vec::new();
  let mut moved = 0;
  for line in guest.iter().filter(|l| l.quantity > 0) {
    let next = add_quantity(merged.get(&line.item), line.item, line.quantity, line.unit_price_cents);
    merged.insert(line.item, next);
    if !touched.contains(&line.item) {
      touched.push(line.item);
    }
    moved += 1;
  }
  for item in &touched {
    if let Some(line) = merged.get(item) {
      store.upsert_cart_line(user_id, line).await?;
    }
  }
  session.replace_guest_cart(Vec::new());
  info!(%user_id, moved, "Guest cart merged into persisted cart.");
  Ok(moved)
}

/// Picks the cart backing for this request. Signed-in users get their
/// persisted cart, after any guest lines are folded into it.
pub async fn open_cart(
  store: &Arc<dyn Storage>,
  session: &SessionHandle,
  user_id: Option<Uuid>,
) -> Result<Arc<dyn CartStore>> {
  session.note_user(user_id);
  match user_id {
    Some(user_id) => {
      merge_guest_cart(store, session, user_id).await?;
      Ok(Arc::new(PersistedCartStore::new(store.clone(), user_id)))
    }
    None => Ok(Arc::new(SessionCartStore::new(session.clone()))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn line(item: CartItemRef, quantity: i32) -> CartLine {
    CartLine {
      item,
      quantity,
      unit_price_cents: 1000,
    }
  }

  #[tokio::test]
  async fn guest_lines_merge_with_clamp() {
    let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    let cake = CartItemRef::Product(Uuid::new_v4());
    let tart = CartItemRef::Product(Uuid::new_v4());
    store.upsert_cart_line(user, &line(cake, 7)).await.unwrap();

    let session = SessionHandle::new_session();
    session.replace_guest_cart(vec![line(cake, 5), line(tart, 2)]);

    let cart = open_cart(&store, &session, Some(user)).await.unwrap();
    let lines = cart.lines().await.unwrap();
    assert_eq!(lines.iter().find(|l| l.item == cake).unwrap().quantity, 10);
    assert_eq!(lines.iter().find(|l| l.item == tart).unwrap().quantity, 2);
    assert!(session.guest_cart().is_empty());
  }

  #[tokio::test]
  async fn duplicate_guest_lines_accumulate_and_empty_ones_are_dropped() {
    let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let user = Uuid::new_v4();
    let cake = CartItemRef::Product(Uuid::new_v4());
    let tart = CartItemRef::Product(Uuid::new_v4());
    store.upsert_cart_line(user, &line(cake, 1)).await.unwrap();

    let session = SessionHandle::new_session();
    session.replace_guest_cart(vec![line(cake, 2), line(cake, 3), line(tart, 0), line(tart, -4)]);

    let moved = merge_guest_cart(&store, &session, user).await.unwrap();
    assert_eq!(moved, 2);
    let lines = store.cart_lines(user).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].item, cake);
    assert_eq!(lines[0].quantity, 6);
    assert!(session.guest_cart().is_empty());
  }

  #[tokio::test]
  async fn session_cart_put_replaces_and_dedupes() {
    let session = SessionHandle::new_session();
    let item = CartItemRef::Product(Uuid::new_v4());
    session.replace_guest_cart(vec![line(item, 1), line(item, 2)]);
    let cart = SessionCartStore::new(session.clone());
    cart.put_line(&line(item, 4)).await.unwrap();
    assert_eq!(cart.lines().await.unwrap(), vec![line(item, 4)]);
    cart.remove(item).await.unwrap();
    cart.remove(item).await.unwrap();
    assert!(cart.lines().await.unwrap().is_empty());
  }
}

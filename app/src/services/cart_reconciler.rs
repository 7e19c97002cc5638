//! Validates stored cart lines against the live catalog before the cart is
//! shown or totalled, and writes the corrections back to the cart.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::cart_store::CartStore;
use crate::errors::Result;
use crate::models::{CartItemRef, CartLine, CatalogSnapshot, MAX_LINE_QUANTITY};
use crate::store::Catalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
  pub item: CartItemRef,
  pub name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
  pub line_total_cents: i64,
}

/// Write-back the reconciler asks of the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartFix {
  Remove(CartItemRef),
  Replace(CartLine),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
  pub lines: Vec<PricedLine>,
  pub subtotal_cents: i64,
  pub notices: Vec<String>,
  pub fixes: Vec<CartFix>,
}

impl Reconciliation {
  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }
}

/// Folds repeated entries for the same item into one, keeping the first
/// price snapshot.
fn merge_duplicates(lines: &[CartLine]) -> (Vec<CartLine>, Vec<CartItemRef>) {
  let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
  let mut duplicated = Vec::new();
  for line in lines {
    match merged.iter_mut().find(|m| m.item == line.item) {
      Some(existing) => {
        existing.quantity = existing.quantity.saturating_add(line.quantity);
        if !duplicated.contains(&line.item) {
          duplicated.push(line.item);
        }
      }
      None => merged.push(line.clone()),
    }
  }
  (merged, duplicated)
}

/// Pure reconciliation of `lines` against `snapshot` for `viewer`.
///
/// Afterwards every surviving line has a quantity in `1..=10`.
pub fn reconcile(lines: &[CartLine], snapshot: &CatalogSnapshot, viewer: Option<Uuid>) -> Reconciliation {
  let (merged, duplicated) = merge_duplicates(lines);
  let mut out = Reconciliation::default();

  for line in merged {
    if line.quantity <= 0 {
      out.fixes.push(CartFix::Remove(line.item));
      continue;
    }

    let Some(entry) = snapshot.get(&line.item) else {
      out.notices.push("Um item do seu carrinho não está mais disponível e foi removido.".to_string());
      out.fixes.push(CartFix::Remove(line.item));
      continue;
    };
    if !entry.active {
      out.notices.push(format!("{} não está mais disponível e foi removido do carrinho.", entry.name));
      out.fixes.push(CartFix::Remove(line.item));
      continue;
    }
    if let Some(owner) = entry.owner_id {
      if viewer != Some(owner) {
        out
          .notices
          .push(format!("{} pertence a outro cliente e foi removido do carrinho.", entry.name));
        out.fixes.push(CartFix::Remove(line.item));
        continue;
      }
    }

    let mut changed = duplicated.contains(&line.item);
    let mut quantity = line.quantity;
    if quantity > MAX_LINE_QUANTITY {
      out.notices.push(format!(
        "A quantidade de {} foi limitada a {} unidades.",
        entry.name, MAX_LINE_QUANTITY
      ));
      quantity = MAX_LINE_QUANTITY;
      changed = true;
    }
    if line.unit_price_cents != entry.price_cents {
      out.notices.push(format!(
        "O preço de {} foi atualizado para {}.",
        entry.name,
        crate::models::format_brl(entry.price_cents)
      ));
      changed = true;
    }
    if changed {
      out.fixes.push(CartFix::Replace(CartLine {
        item: line.item,
        quantity,
        unit_price_cents: entry.price_cents,
      }));
    }

    let line_total_cents = entry.price_cents * i64::from(quantity);
    out.subtotal_cents += line_total_cents;
    out.lines.push(PricedLine {
      item: line.item,
      name: entry.name.clone(),
      quantity,
      unit_price_cents: entry.price_cents,
      line_total_cents,
    });
  }
  out
}

/// Each item once, in first-seen order.
fn distinct_items(lines: &[CartLine]) -> Vec<CartItemRef> {
  let mut seen = HashSet::new();
  lines.iter().map(|l| l.item).filter(|item| seen.insert(*item)).collect()
}

/// Reads the cart, reconciles it against the catalog and applies the fixes.
#[instrument(name = "cart::reconcile", skip(cart, catalog))]
pub async fn reconcile_cart<C>(cart: &dyn CartStore, catalog: &C, viewer: Option<Uuid>) -> Result<Reconciliation>
where
  C: Catalog + ?Sized,
{
  let lines = cart.lines().await?;
  if lines.is_empty() {
    return Ok(Reconciliation::default());
  }
  let refs = distinct_items(&lines);
  let snapshot = catalog.snapshot(&refs).await?;
  let outcome = reconcile(&lines, &snapshot, viewer);

  for fix in &outcome.fixes {
    match fix {
      CartFix::Remove(item) => cart.remove(*item).await?,
      CartFix::Replace(line) => cart.put_line(line).await?,
    }
  }
  debug!(
    lines = outcome.lines.len(),
    fixes = outcome.fixes.len(),
    subtotal_cents = outcome.subtotal_cents,
    "Cart reconciled."
  );
  Ok(outcome)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::CatalogEntry;

  fn entry(name: &str, price_cents: i64, active: bool, owner_id: Option<Uuid>) -> CatalogEntry {
    CatalogEntry {
      name: name.to_string(),
      price_cents,
      active,
      owner_id,
    }
  }

  fn line(item: CartItemRef, quantity: i32, unit_price_cents: i64) -> CartLine {
    CartLine {
      item,
      quantity,
      unit_price_cents,
    }
  }

  #[test]
  fn product_and_cake_total_55() {
    let viewer = Uuid::new_v4();
    let product = CartItemRef::Product(Uuid::new_v4());
    let cake = CartItemRef::CustomCake(Uuid::new_v4());
    let mut snapshot = CatalogSnapshot::new();
    snapshot.insert(product, entry("Brigadeiro", 1000, true, None));
    snapshot.insert(cake, entry("Bolo", 2500, true, Some(viewer)));

    let out = reconcile(&[line(product, 3, 1000), line(cake, 1, 2500)], &snapshot, Some(viewer));
    assert_eq!(out.subtotal_cents, 5500);
    assert!(out.notices.is_empty());
    assert!(out.fixes.is_empty());
  }

  #[test]
  fn inactive_product_dropped_with_one_notice() {
    let kept = CartItemRef::Product(Uuid::new_v4());
    let gone = CartItemRef::Product(Uuid::new_v4());
    let mut snapshot = CatalogSnapshot::new();
    snapshot.insert(kept, entry("Beijinho", 400, true, None));
    snapshot.insert(gone, entry("Torta", 6200, false, None));

    let out = reconcile(&[line(kept, 2, 400), line(gone, 1, 6200)], &snapshot, None);
    assert_eq!(out.lines.len(), 1);
    assert_eq!(out.notices.len(), 1);
    assert_eq!(out.subtotal_cents, 800);
    assert_eq!(out.fixes, vec![CartFix::Remove(gone)]);
  }

  #[test]
  fn quantities_end_up_between_one_and_ten() {
    let a = CartItemRef::Product(Uuid::new_v4());
    let b = CartItemRef::Product(Uuid::new_v4());
    let c = CartItemRef::Product(Uuid::new_v4());
    let mut snapshot = CatalogSnapshot::new();
    for item in [a, b, c] {
      snapshot.insert(item, entry("Doce", 100, true, None));
    }

    let out = reconcile(&[line(a, 0, 100), line(b, 25, 100), line(c, -3, 100)], &snapshot, None);
    assert!(out.lines.iter().all(|l| (1..=MAX_LINE_QUANTITY).contains(&l.quantity)));
    assert_eq!(out.lines.len(), 1);
    assert_eq!(out.lines[0].quantity, 10);
    // Only the clamp is announced; non-positive lines are plain removals.
    assert_eq!(out.notices.len(), 1);
  }

  #[test]
  fn stale_price_is_refreshed() {
    let item = CartItemRef::Product(Uuid::new_v4());
    let mut snapshot = CatalogSnapshot::new();
    snapshot.insert(item, entry("Cheesecake", 1800, true, None));

    let out = reconcile(&[line(item, 2, 1500)], &snapshot, None);
    assert_eq!(out.subtotal_cents, 3600);
    assert_eq!(out.notices.len(), 1);
    assert_eq!(out.fixes, vec![CartFix::Replace(line(item, 2, 1800))]);
  }

  #[test]
  fn foreign_and_missing_items_are_dropped() {
    let cake = CartItemRef::CustomCake(Uuid::new_v4());
    let missing = CartItemRef::Product(Uuid::new_v4());
    let mut snapshot = CatalogSnapshot::new();
    snapshot.insert(cake, entry("Bolo", 9000, true, Some(Uuid::new_v4())));

    let out = reconcile(&[line(cake, 1, 9000), line(missing, 1, 100)], &snapshot, Some(Uuid::new_v4()));
    assert!(out.is_empty());
    assert_eq!(out.notices.len(), 2);
    assert_eq!(out.fixes.len(), 2);
  }

  #[test]
  fn duplicates_are_merged() {
    let item = CartItemRef::Product(Uuid::new_v4());
    let mut snapshot = CatalogSnapshot::new();
    snapshot.insert(item, entry("Brigadeiro", 450, true, None));

    let out = reconcile(&[line(item, 2, 450), line(item, 3, 450)], &snapshot, None);
    assert_eq!(out.lines.len(), 1);
    assert_eq!(out.lines[0].quantity, 5);
    assert_eq!(out.fixes, vec![CartFix::Replace(line(item, 5, 450))]);
  }

  #[test]
  fn interleaved_duplicates_are_looked_up_once() {
    let a = CartItemRef::Product(Uuid::new_v4());
    let b = CartItemRef::CustomCake(Uuid::new_v4());
    let lines = [line(a, 1, 100), line(b, 1, 100), line(a, 2, 100), line(b, 1, 100)];
    assert_eq!(distinct_items(&lines), vec![a, b]);
  }
}

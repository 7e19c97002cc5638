use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Upper bound for a single cart line.
pub const MAX_LINE_QUANTITY: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "item_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
  Product,
  CustomCake,
}

impl ItemKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ItemKind::Product => "product",
      ItemKind::CustomCake => "custom_cake",
    }
  }

  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "product" | "produto" => Some(ItemKind::Product),
      "custom_cake" | "bolo_personalizado" => Some(ItemKind::CustomCake),
      _ => None,
    }
  }
}

/// What a cart line points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartItemRef {
  Product(Uuid),
  CustomCake(Uuid),
}

impl CartItemRef {
  pub fn new(kind: ItemKind, id: Uuid) -> Self {
    match kind {
      ItemKind::Product => CartItemRef::Product(id),
      ItemKind::CustomCake => CartItemRef::CustomCake(id),
    }
  }

  pub fn kind(&self) -> ItemKind {
    match self {
      CartItemRef::Product(_) => ItemKind::Product,
      CartItemRef::CustomCake(_) => ItemKind::CustomCake,
    }
  }

  pub fn id(&self) -> Uuid {
    match self {
      CartItemRef::Product(id) | CartItemRef::CustomCake(id) => *id,
    }
  }
}

impl std::fmt::Display for CartItemRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.kind().as_str(), self.id())
  }
}

/// One cart entry with the price seen when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
  pub item: CartItemRef,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

/// Live catalog view of one referenced item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
  pub name: String,
  pub price_cents: i64,
  pub active: bool,
  /// Set for custom cakes.
  pub owner_id: Option<Uuid>,
}

/// Catalog entries for the items a cart references. Missing keys mean the
/// item no longer exists.
pub type CatalogSnapshot = HashMap<CartItemRef, CatalogEntry>;

pub fn clamp_quantity(quantity: i32) -> i32 {
  quantity.clamp(1, MAX_LINE_QUANTITY)
}

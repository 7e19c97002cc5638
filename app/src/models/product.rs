use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  pub description: Option<String>,
  pub category: String,
  pub price_cents: i64,
  /// Inactive products stay referenced by past orders but leave the catalog
  /// and are dropped from carts.
  pub active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
  pub name: String,
  pub description: Option<String>,
  pub category: String,
  pub price_cents: i64,
}

/// Partial update from the back office. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub category: Option<String>,
  pub price_cents: Option<i64>,
  pub active: Option<bool>,
}

impl NewProduct {
  pub fn validate(&self) -> Result<(), String> {
    if self.name.trim().is_empty() {
      return Err("O nome do produto é obrigatório.".to_string());
    }
    if self.category.trim().is_empty() {
      return Err("A categoria do produto é obrigatória.".to_string());
    }
    if self.price_cents <= 0 {
      return Err("O preço deve ser maior que zero.".to_string());
    }
    Ok(())
  }

  pub fn into_product(self, now: DateTime<Utc>) -> Product {
    Product {
      id: Uuid::new_v4(),
      name: self.name.trim().to_string(),
      description: self.description.filter(|d| !d.trim().is_empty()),
      category: self.category.trim().to_string(),
      price_cents: self.price_cents,
      active: true,
      created_at: now,
      updated_at: now,
    }
  }
}

impl ProductPatch {
  pub fn validate(&self) -> Result<(), String> {
    if matches!(&self.name, Some(n) if n.trim().is_empty()) {
      return Err("O nome do produto não pode ficar vazio.".to_string());
    }
    if matches!(self.price_cents, Some(p) if p <= 0) {
      return Err("O preço deve ser maior que zero.".to_string());
    }
    Ok(())
  }

  pub fn apply(self, product: &mut Product, now: DateTime<Utc>) {
    if let Some(name) = self.name {
      product.name = name.trim().to_string();
    }
    if let Some(description) = self.description {
      product.description = Some(description).filter(|d| !d.trim().is_empty());
    }
    if let Some(category) = self.category {
      product.category = category.trim().to_string();
    }
    if let Some(price) = self.price_cents {
      product.price_cents = price;
    }
    if let Some(active) = self.active {
      product.active = active;
    }
    product.updated_at = now;
  }
}

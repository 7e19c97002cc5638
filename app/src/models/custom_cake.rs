use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A cake assembled in the builder. It belongs to the customer who built
/// it and can only sit in that customer's cart.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomCake {
  pub id: Uuid,
  pub owner_id: Uuid,
  pub name: String,
  pub base: String,
  pub fillings: Vec<String>,
  pub topping: String,
  pub finishes: Vec<String>,
  pub notes: Option<String>,
  pub price_cents: i64,
  pub active: bool,
  pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
  PaymentApproved,
  PaymentFailed,
  PaymentPending,
  OrderStatusChanged,
  CheckoutFailed,
  CustomCakeCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEntry {
  pub id: Uuid,
  pub kind: ActivityKind,
  pub description: String,
  pub user_id: Option<Uuid>,
  pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
  pub fn new(kind: ActivityKind, description: impl Into<String>, user_id: Option<Uuid>) -> Self {
    Self {
      id: Uuid::new_v4(),
      kind,
      description: description.into(),
      user_id,
      created_at: Utc::now(),
    }
  }
}

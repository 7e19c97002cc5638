use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::cart::ItemKind;
use super::checkout::{DeliveryAddress, DeliveryOption};
use crate::errors::{AppError, Result};

pub const CANCELLED_IS_FINAL: &str = "Pedidos cancelados não podem ter o status alterado.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Approved,
  InPreparation,
  Ready,
  OutForDelivery,
  Delivered,
  Cancelled,
}

/// Result of asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
  Changed { from: OrderStatus, to: OrderStatus },
  Unchanged,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 7] = [
    OrderStatus::Pending,
    OrderStatus::Approved,
    OrderStatus::InPreparation,
    OrderStatus::Ready,
    OrderStatus::OutForDelivery,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Approved => "approved",
      OrderStatus::InPreparation => "in_preparation",
      OrderStatus::Ready => "ready",
      OrderStatus::OutForDelivery => "out_for_delivery",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  pub fn parse(raw: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|s| s.as_str() == raw.trim())
  }

  pub fn label(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "Pendente",
      OrderStatus::Approved => "Aprovado",
      OrderStatus::InPreparation => "Em preparo",
      OrderStatus::Ready => "Pronto",
      OrderStatus::OutForDelivery => "Saiu para entrega",
      OrderStatus::Delivered => "Entregue",
      OrderStatus::Cancelled => "Cancelado",
    }
  }

  /// Back-office transition rule: any status may move to any other, except
  /// that a cancelled order is final.
  pub fn change_to(self, next: OrderStatus) -> Result<StatusChange> {
    if self == OrderStatus::Cancelled && next != OrderStatus::Cancelled {
      return Err(AppError::Validation(CANCELLED_IS_FINAL.to_string()));
    }
    if self == next {
      return Ok(StatusChange::Unchanged);
    }
    Ok(StatusChange::Changed { from: self, to: next })
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub checkout_ref: Uuid,
  pub user_id: Uuid,
  pub status: OrderStatus,
  pub delivery: DeliveryOption,
  pub delivery_fee_cents: i64,
  pub address: Option<Json<DeliveryAddress>>,
  pub notes: Option<String>,
  pub total_cents: i64,
  pub payment_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderLine {
  pub id: Uuid,
  pub order_id: Uuid,
  pub item_kind: ItemKind,
  pub item_id: Uuid,
  pub name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithLines {
  #[serde(flatten)]
  pub order: Order,
  pub lines: Vec<OrderLine>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartItemRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_option", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOption {
  Pickup,
  Delivery,
}

impl DeliveryOption {
  /// Accepts the form values used by the storefront templates.
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_lowercase().as_str() {
      "pickup" | "retirada" => Some(DeliveryOption::Pickup),
      "delivery" | "frete" => Some(DeliveryOption::Delivery),
      _ => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      DeliveryOption::Pickup => "Retirada na loja",
      DeliveryOption::Delivery => "Entrega",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAddress {
  pub street: String,
  pub postal_code: String,
  pub district: String,
  pub complement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLine {
  pub item: CartItemRef,
  pub name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

impl PendingLine {
  pub fn line_total_cents(&self) -> i64 {
    self.unit_price_cents * i64::from(self.quantity)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
  /// The shopper was sent to the gateway and has not come back yet.
  AwaitingPayment,
  /// The gateway reported the payment as pending; a later confirmation may
  /// still settle it.
  AwaitingSettlement,
  /// A notification reported a declined attempt. The payment link stays
  /// usable, so an approval may still follow.
  Declined,
}

/// Everything needed to create the order once the gateway confirms payment.
/// Keyed by `checkout_ref`, which the gateway echoes back as
/// `external_reference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheckout {
  pub checkout_ref: Uuid,
  pub user_id: Uuid,
  pub delivery: DeliveryOption,
  pub delivery_fee_cents: i64,
  pub address: Option<DeliveryAddress>,
  pub notes: Option<String>,
  pub contact_email: Option<String>,
  pub subtotal_cents: i64,
  pub total_cents: i64,
  pub lines: Vec<PendingLine>,
  pub state: PendingState,
  pub created_at: DateTime<Utc>,
}

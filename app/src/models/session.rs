use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
  Success,
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
  pub level: FlashLevel,
  pub message: String,
}

/// Server-side session payload behind the `ds_session` cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
  #[serde(default)]
  pub user_id: Option<Uuid>,
  #[serde(default)]
  pub guest_cart: Vec<CartLine>,
  /// Checkout reference of the attempt currently at the gateway.
  #[serde(default)]
  pub pending_checkout: Option<Uuid>,
  #[serde(default)]
  pub flashes: Vec<Flash>,
}

impl SessionState {
  pub fn flash(&mut self, level: FlashLevel, message: impl Into<String>) {
    self.flashes.push(Flash {
      level,
      message: message.into(),
    });
  }

  pub fn take_flashes(&mut self) -> Vec<Flash> {
    std::mem::take(&mut self.flashes)
  }
}

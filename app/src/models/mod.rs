//! Storefront entities. Money is always integer cents.

pub mod activity;
pub mod cart;
pub mod checkout;
pub mod custom_cake;
pub mod order;
pub mod product;
pub mod session;

pub use activity::{ActivityEntry, ActivityKind};
pub use cart::{clamp_quantity, CartItemRef, CartLine, CatalogEntry, CatalogSnapshot, ItemKind, MAX_LINE_QUANTITY};
pub use checkout::{DeliveryAddress, DeliveryOption, PendingCheckout, PendingLine, PendingState};
pub use custom_cake::CustomCake;
pub use order::{Order, OrderLine, OrderStatus, OrderWithLines, StatusChange, CANCELLED_IS_FINAL};
pub use product::{NewProduct, Product, ProductPatch};
pub use session::{Flash, FlashLevel, SessionState};

/// "R$ 67,00" style rendering used in flash messages and e-mails.
pub fn format_brl(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{}R$ {},{:02}", sign, abs / 100, abs % 100)
}

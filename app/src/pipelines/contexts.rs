//! Context data for every pipeline. Handlers receive these wrapped in
//! `doce_flow::ContextData`.

use doce_flow::ContextData;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
  CartItemRef, CartLine, CatalogEntry, DeliveryAddress, DeliveryOption, Flash, FlashLevel, Order, OrderStatus,
  OrderWithLines, PendingCheckout, StatusChange,
};
use crate::services::cart_reconciler::Reconciliation;
use crate::services::cart_store::CartStore;
use crate::services::payment_gateway::{PaymentLink, PaymentOutcome, PreferenceStrategy};
use crate::services::session::SessionHandle;
use crate::state::AppState;

// --- Add to cart ---

pub struct AddToCartCtxData {
  pub app_state: AppState,
  pub session: SessionHandle,
  pub user_id: Option<Uuid>,
  pub item: CartItemRef,
  pub quantity: i32,
  pub cart: Option<Arc<dyn CartStore>>,
  pub catalog_entry: Option<CatalogEntry>,
  pub updated_line: Option<CartLine>,
}

impl AddToCartCtxData {
  pub fn new(app_state: AppState, session: SessionHandle, user_id: Option<Uuid>, item: CartItemRef, quantity: i32) -> Self {
    Self {
      app_state,
      session,
      user_id,
      item,
      quantity,
      cart: None,
      catalog_entry: None,
      updated_line: None,
    }
  }
}

// --- Checkout handoff ---

/// Delivery details as submitted by the checkout form.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
  pub delivery: String,
  pub street: Option<String>,
  pub postal_code: Option<String>,
  pub district: Option<String>,
  pub complement: Option<String>,
  pub notes: Option<String>,
  pub contact_email: Option<String>,
}

pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub session: SessionHandle,
  pub user_id: Uuid,
  pub form: CheckoutForm,
  pub reconciliation: Option<Reconciliation>,
  pub delivery: Option<DeliveryOption>,
  pub address: Option<DeliveryAddress>,
  pub delivery_fee_cents: i64,
  pub subtotal_cents: i64,
  pub total_cents: i64,
  pub pending: Option<PendingCheckout>,
  pub payment_link: Option<PaymentLink>,
  pub strategy_used: Option<PreferenceStrategy>,
  /// Strategies that failed, with the gateway's complaint.
  pub failed_attempts: Vec<(PreferenceStrategy, String)>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, session: SessionHandle, user_id: Uuid, form: CheckoutForm) -> Self {
    Self {
      app_state,
      session,
      user_id,
      form,
      reconciliation: None,
      delivery: None,
      address: None,
      delivery_fee_cents: 0,
      subtotal_cents: 0,
      total_cents: 0,
      pending: None,
      payment_link: None,
      strategy_used: None,
      failed_attempts: Vec::new(),
    }
  }
}

// --- Payment callback ---

/// Sub-context for the outcome-specific settlement pipelines.
pub struct SettlementCtxData {
  pub app_state: AppState,
  pub pending: PendingCheckout,
  /// Reported by the gateway's server notification rather than a browser
  /// return.
  pub notification: bool,
  pub payment_id: Option<String>,
  pub order: Option<OrderWithLines>,
  pub created: bool,
  pub flash: Option<Flash>,
}

impl SettlementCtxData {
  pub fn set_flash(&mut self, level: FlashLevel, message: impl Into<String>) {
    self.flash = Some(Flash {
      level,
      message: message.into(),
    });
  }
}

pub struct PaymentCallbackCtxData {
  pub app_state: AppState,
  /// Absent for server-to-server notifications.
  pub session: Option<SessionHandle>,
  pub outcome: PaymentOutcome,
  pub external_reference: Option<Uuid>,
  pub payment_id: Option<String>,
  pub checkout_ref: Option<Uuid>,
  pub pending: Option<PendingCheckout>,
  /// Order already written for this reference by an earlier confirmation.
  pub existing_order: Option<Order>,
  pub settlement: Option<ContextData<SettlementCtxData>>,
  pub order: Option<OrderWithLines>,
  pub created: bool,
  pub notified: bool,
  pub flash: Option<Flash>,
}

impl PaymentCallbackCtxData {
  pub fn new(
    app_state: AppState,
    session: Option<SessionHandle>,
    outcome: PaymentOutcome,
    external_reference: Option<Uuid>,
    payment_id: Option<String>,
  ) -> Self {
    Self {
      app_state,
      session,
      outcome,
      external_reference,
      payment_id,
      checkout_ref: None,
      pending: None,
      existing_order: None,
      settlement: None,
      order: None,
      created: false,
      notified: false,
      flash: None,
    }
  }

  pub fn set_flash(&mut self, level: FlashLevel, message: impl Into<String>) {
    self.flash = Some(Flash {
      level,
      message: message.into(),
    });
  }

  pub fn is_replay(&self) -> bool {
    self.existing_order.is_some()
  }
}

// --- Back-office status change ---

pub struct OrderStatusCtxData {
  pub app_state: AppState,
  pub staff_id: Uuid,
  pub is_staff: bool,
  pub order_id: Uuid,
  pub requested: OrderStatus,
  pub order: Option<Order>,
  pub change: Option<StatusChange>,
}

impl OrderStatusCtxData {
  pub fn new(app_state: AppState, staff_id: Uuid, is_staff: bool, order_id: Uuid, requested: OrderStatus) -> Self {
    Self {
      app_state,
      staff_id,
      is_staff,
      order_id,
      requested,
      order: None,
      change: None,
    }
  }
}

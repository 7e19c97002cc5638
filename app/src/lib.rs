//! Doce Sonho storefront: catalog, carts, custom cakes, checkout through a
//! hosted payment gateway and the order ledger behind it.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::mailer::Mailer;
use crate::services::payment_gateway::PaymentGateway;
use crate::state::AppState;
use crate::store::Storage;
use doce_flow::Flows;

/// Wires the shared state and registers every pipeline.
pub fn build_app_state(
  config: Arc<AppConfig>,
  store: Arc<dyn Storage>,
  gateway: Arc<dyn PaymentGateway>,
  mailer: Arc<dyn Mailer>,
) -> AppState {
  let flows = Arc::new(Flows::<AppError>::new());
  pipelines::register_all_pipelines(&flows);
  AppState {
    store,
    flows,
    gateway,
    mailer,
    config,
  }
}

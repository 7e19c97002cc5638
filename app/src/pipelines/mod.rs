//! Every multi-step storefront flow, registered with the `Flows` registry
//! by context type.

use crate::errors::AppError;
use doce_flow::Flows;

pub mod contexts;
pub mod factories;

pub mod cart_pipeline;
pub mod checkout_pipeline;
pub mod order_status_pipeline;
pub mod payment_callback_pipeline;

pub fn register_all_pipelines(flows: &Flows<AppError>) {
  tracing::info!("Registering pipelines...");

  cart_pipeline::register_add_to_cart_pipeline(flows);
  checkout_pipeline::register_checkout_pipeline(flows);
  payment_callback_pipeline::register_payment_callback_pipeline(flows);
  order_status_pipeline::register_order_status_pipeline(flows);

  tracing::info!("All pipelines registered.");
}

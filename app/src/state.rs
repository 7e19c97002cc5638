use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::mailer::Mailer;
use crate::services::payment_gateway::PaymentGateway;
use crate::store::Storage;
use doce_flow::Flows;
use std::sync::Arc;

/// Everything a request or pipeline step needs, shared across workers.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Storage>,
  pub flows: Arc<Flows<AppError>>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub mailer: Arc<dyn Mailer>,
  pub config: Arc<AppConfig>,
}

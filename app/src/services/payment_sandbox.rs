//! Offline stand-in for the payment gateway. Used when no access token is
//! configured and by the tests, which script failures and payments on it.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::payment_gateway::{GatewayError, PaymentGateway, PaymentInfo, PaymentLink, PreferenceRequest};

pub const SANDBOX_CHECKOUT_URL: &str = "https://sandbox.docesonho.local/checkout";

#[derive(Default)]
struct SandboxState {
  failures_left: usize,
  requests: Vec<(String, PreferenceRequest)>,
  payments: HashMap<String, PaymentInfo>,
}

#[derive(Default)]
pub struct SandboxGateway {
  state: Mutex<SandboxState>,
}

impl SandboxGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// The next `count` preference requests fail with HTTP 503.
  pub fn fail_next(&self, count: usize) {
    self.state.lock().failures_left = count;
  }

  /// Every preference request received, with its idempotency key.
  pub fn requests(&self) -> Vec<(String, PreferenceRequest)> {
    self.state.lock().requests.clone()
  }

  /// Makes `fetch_payment(payment_id)` answer with the given status.
  pub fn register_payment(&self, payment_id: &str, status: &str, external_reference: Option<String>) {
    self.state.lock().payments.insert(
      payment_id.to_string(),
      PaymentInfo {
        id: payment_id.to_string(),
        status: status.to_string(),
        external_reference,
      },
    );
  }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
  #[instrument(name = "Sandbox::create_preference", skip(self, request), fields(external_reference = %request.external_reference))]
  async fn create_preference(
    &self,
    request: &PreferenceRequest,
    idempotency_key: &str,
  ) -> Result<PaymentLink, GatewayError> {
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let mut state = self.state.lock();
    state.requests.push((idempotency_key.to_string(), request.clone()));
    if state.failures_left > 0 {
      state.failures_left -= 1;
      warn!("Sandbox gateway refusing preference as scripted.");
      return Err(GatewayError::Service {
        status: 503,
        body: "sandbox unavailable".to_string(),
      });
    }
    if request.items.is_empty() || request.items.iter().any(|i| i.quantity <= 0 || i.unit_price <= 0.0) {
      return Err(GatewayError::Service {
        status: 400,
        body: "invalid items".to_string(),
      });
    }

    let preference_id = format!("sandbox-pref-{}", Uuid::new_v4().simple());
    info!(%preference_id, "Sandbox preference created.");
    Ok(PaymentLink {
      url: format!("{}?pref_id={}", SANDBOX_CHECKOUT_URL, preference_id),
      preference_id,
    })
  }

  async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError> {
    self
      .state
      .lock()
      .payments
      .get(payment_id)
      .cloned()
      .ok_or_else(|| GatewayError::Service {
        status: 404,
        body: format!("payment {} not found", payment_id),
      })
  }
}

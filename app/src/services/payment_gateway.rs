//! Hosted-checkout payment gateway (Mercado Pago preferences API).
//!
//! Checkout builds a preference with one of three strategies, from richest
//! to barest, and sends the shopper to the returned link. The gateway comes
//! back through the success/failure/pending URLs and, independently,
//! through the notification URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::models::{CartItemRef, DeliveryOption, PendingCheckout};

pub const STATEMENT_DESCRIPTOR: &str = "DOCE SONHO";
pub const FEE_ITEM_ID: &str = "taxa-entrega";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
  #[error("network error: {0}")]
  Network(String),
  #[error("service error: HTTP {status}: {body}")]
  Service { status: u16, body: String },
  #[error("parse error: {0}")]
  Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceStrategy {
  Full,
  Simplified,
  Minimal,
}

impl PreferenceStrategy {
  /// Order in which checkout tries the strategies.
  pub const FALLBACK_ORDER: [PreferenceStrategy; 3] =
    [PreferenceStrategy::Full, PreferenceStrategy::Simplified, PreferenceStrategy::Minimal];

  pub fn as_str(&self) -> &'static str {
    match self {
      PreferenceStrategy::Full => "full",
      PreferenceStrategy::Simplified => "simplified",
      PreferenceStrategy::Minimal => "minimal",
    }
  }
}

impl fmt::Display for PreferenceStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceItem {
  pub id: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub quantity: i32,
  pub unit_price: f64,
  pub currency_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackUrls {
  pub success: String,
  pub failure: String,
  pub pending: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRequest {
  pub items: Vec<PreferenceItem>,
  pub back_urls: BackUrls,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub auto_return: Option<String>,
  pub external_reference: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notification_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub statement_descriptor: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<serde_json::Value>,
}

/// Absolute URLs the gateway calls back on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
  pub back: BackUrls,
  pub notification: String,
}

impl CallbackUrls {
  pub fn from_base(app_base_url: &str) -> Self {
    let base = app_base_url.trim_end_matches('/');
    Self {
      back: BackUrls {
        success: format!("{}/api/v1/payments/success", base),
        failure: format!("{}/api/v1/payments/failure", base),
        pending: format!("{}/api/v1/payments/pending", base),
      },
      notification: format!("{}/api/v1/webhooks/payments", base),
    }
  }
}

/// Hosted payment page for one preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
  pub preference_id: String,
  pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
  Approved,
  Rejected,
  Pending,
}

impl PaymentOutcome {
  /// Maps a gateway payment status. Unknown statuses yield `None`.
  pub fn from_status(status: &str) -> Option<Self> {
    match status {
      "approved" => Some(PaymentOutcome::Approved),
      "rejected" | "cancelled" | "refunded" | "charged_back" => Some(PaymentOutcome::Rejected),
      "pending" | "in_process" | "in_mediation" | "authorized" => Some(PaymentOutcome::Pending),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentOutcome::Approved => "approved",
      PaymentOutcome::Rejected => "rejected",
      PaymentOutcome::Pending => "pending",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentInfo {
  pub id: String,
  pub status: String,
  #[serde(default)]
  pub external_reference: Option<String>,
}

impl PaymentInfo {
  pub fn outcome(&self) -> Option<PaymentOutcome> {
    PaymentOutcome::from_status(&self.status)
  }
}

fn to_decimal(cents: i64) -> f64 {
  cents as f64 / 100.0
}

fn line_description(item: &CartItemRef) -> String {
  match item {
    CartItemRef::Product(_) => "Produto da Doce Sonho".to_string(),
    CartItemRef::CustomCake(_) => "Bolo personalizado".to_string(),
  }
}

/// Builds the preference body for `strategy`.
pub fn build_preference(
  strategy: PreferenceStrategy,
  pending: &PendingCheckout,
  urls: &CallbackUrls,
  currency: &str,
) -> PreferenceRequest {
  let external_reference = pending.checkout_ref.to_string();
  let itemised = |with_description: bool| {
    let mut items: Vec<PreferenceItem> = pending
      .lines
      .iter()
      .map(|line| PreferenceItem {
        id: line.item.id().to_string(),
        title: line.name.clone(),
        description: with_description.then(|| line_description(&line.item)),
        quantity: line.quantity,
        unit_price: to_decimal(line.unit_price_cents),
        currency_id: currency.to_string(),
      })
      .collect();
    if pending.delivery == DeliveryOption::Delivery && pending.delivery_fee_cents > 0 {
      items.push(PreferenceItem {
        id: FEE_ITEM_ID.to_string(),
        title: "Taxa de entrega".to_string(),
        description: with_description.then(|| "Entrega no endereço cadastrado".to_string()),
        quantity: 1,
        unit_price: to_decimal(pending.delivery_fee_cents),
        currency_id: currency.to_string(),
      });
    }
    items
  };

  match strategy {
    PreferenceStrategy::Full => PreferenceRequest {
      items: itemised(true),
      back_urls: urls.back.clone(),
      auto_return: Some("approved".to_string()),
      external_reference,
      notification_url: Some(urls.notification.clone()),
      statement_descriptor: Some(STATEMENT_DESCRIPTOR.to_string()),
      metadata: Some(json!({
        "user_id": pending.user_id,
        "delivery_option": pending.delivery,
        "checkout_ref": pending.checkout_ref,
      })),
    },
    PreferenceStrategy::Simplified => PreferenceRequest {
      items: itemised(false),
      back_urls: urls.back.clone(),
      auto_return: None,
      external_reference,
      notification_url: None,
      statement_descriptor: None,
      metadata: None,
    },
    PreferenceStrategy::Minimal => PreferenceRequest {
      items: vec![PreferenceItem {
        id: external_reference.clone(),
        title: "Pedido Doce Sonho".to_string(),
        description: None,
        quantity: 1,
        unit_price: to_decimal(pending.total_cents),
        currency_id: currency.to_string(),
      }],
      back_urls: urls.back.clone(),
      auto_return: None,
      external_reference,
      notification_url: None,
      statement_descriptor: None,
      metadata: None,
    },
  }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  /// Registers a preference and returns the hosted payment link.
  async fn create_preference(
    &self,
    request: &PreferenceRequest,
    idempotency_key: &str,
  ) -> Result<PaymentLink, GatewayError>;

  async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError>;
}

#[derive(Deserialize)]
struct PreferenceResponse {
  id: String,
  #[serde(default)]
  init_point: Option<String>,
  #[serde(default)]
  sandbox_init_point: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
  id: serde_json::Value,
  status: String,
  #[serde(default)]
  external_reference: Option<String>,
}

/// REST client for the Mercado Pago API.
pub struct MercadoPagoClient {
  client: Client,
  base_url: String,
  access_token: String,
  use_sandbox_link: bool,
}

impl MercadoPagoClient {
  pub fn new(base_url: &str, access_token: &str, timeout: Duration, use_sandbox_link: bool) -> Result<Self, GatewayError> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| GatewayError::Network(e.to_string()))?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      access_token: access_token.to_string(),
      use_sandbox_link,
    })
  }

  /// `None` when no access token is configured.
  pub fn from_config(config: &AppConfig) -> Result<Option<Self>, GatewayError> {
    match &config.payment_access_token {
      Some(token) => Self::new(
        &config.payment_api_base_url,
        token,
        Duration::from_secs(config.payment_timeout_secs),
        config.payment_use_sandbox_link,
      )
      .map(Some),
      None => Ok(None),
    }
  }

  async fn checked(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Service {
      status: status.as_u16(),
      body,
    })
  }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
  #[instrument(name = "MercadoPago::create_preference", skip(self, request), fields(external_reference = %request.external_reference))]
  async fn create_preference(
    &self,
    request: &PreferenceRequest,
    idempotency_key: &str,
  ) -> Result<PaymentLink, GatewayError> {
    let response = self
      .client
      .post(format!("{}/checkout/preferences", self.base_url))
      .bearer_auth(&self.access_token)
      .header("X-Idempotency-Key", idempotency_key)
      .json(request)
      .send()
      .await
      .map_err(|e| GatewayError::Network(e.to_string()))?;
    let body: PreferenceResponse = Self::checked(response)
      .await?
      .json()
      .await
      .map_err(|e| GatewayError::Parse(e.to_string()))?;

    let url = if self.use_sandbox_link {
      body.sandbox_init_point.or(body.init_point)
    } else {
      body.init_point
    };
    match url {
      Some(url) => {
        info!(preference_id = %body.id, "Payment preference created.");
        Ok(PaymentLink {
          preference_id: body.id,
          url,
        })
      }
      None => {
        warn!(preference_id = %body.id, "Preference response carried no payment link.");
        Err(GatewayError::Parse("response without init_point".to_string()))
      }
    }
  }

  #[instrument(name = "MercadoPago::fetch_payment", skip(self))]
  async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError> {
    let response = self
      .client
      .get(format!("{}/v1/payments/{}", self.base_url, payment_id))
      .bearer_auth(&self.access_token)
      .send()
      .await
      .map_err(|e| GatewayError::Network(e.to_string()))?;
    let body: PaymentResponse = Self::checked(response)
      .await?
      .json()
      .await
      .map_err(|e| GatewayError::Parse(e.to_string()))?;
    let id = match body.id {
      serde_json::Value::String(s) => s,
      other => other.to_string(),
    };
    Ok(PaymentInfo {
      id,
      status: body.status,
      external_reference: body.external_reference,
    })
  }
}

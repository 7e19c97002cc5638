#![allow(dead_code)]

use chrono::Utc;
use doce_flow::{ContextData, PipelineResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

use doce_sonho::build_app_state;
use doce_sonho::config::AppConfig;
use doce_sonho::errors::AppError;
use doce_sonho::models::{CartItemRef, CartLine, CustomCake, NewProduct, Product};
use doce_sonho::pipelines::contexts::{CheckoutCtxData, CheckoutForm, PaymentCallbackCtxData};
use doce_sonho::services::mailer::LogMailer;
use doce_sonho::services::payment_gateway::PaymentOutcome;
use doce_sonho::services::payment_sandbox::SandboxGateway;
use doce_sonho::services::session::SessionHandle;
use doce_sonho::state::AppState;
use doce_sonho::store::{Catalog, CartRepository, MemoryStore};

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub const BASE_URL: &str = "http://loja.test";

pub fn test_config() -> AppConfig {
  let vars: HashMap<&str, &str> = [
    ("APP_BASE_URL", BASE_URL),
    ("DELIVERY_FEE_CENTS", "1200"),
    ("MAIL_SENDER", "pedidos@docesonho.test"),
  ]
  .into_iter()
  .collect();
  AppConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap()
}

/// Application state over the in-memory store and the sandbox gateway,
/// with handles to both for assertions and scripting.
pub struct Harness {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub gateway: Arc<SandboxGateway>,
  pub mailer: Arc<LogMailer>,
}

pub fn harness() -> Harness {
  setup_tracing();
  let store = Arc::new(MemoryStore::new());
  let gateway = Arc::new(SandboxGateway::new());
  let mailer = Arc::new(LogMailer::new());
  let state = build_app_state(Arc::new(test_config()), store.clone(), gateway.clone(), mailer.clone());
  Harness {
    state,
    store,
    gateway,
    mailer,
  }
}

impl Harness {
  pub async fn product(&self, name: &str, price_cents: i64) -> Product {
    let product = NewProduct {
      name: name.to_string(),
      description: None,
      category: "Doces".to_string(),
      price_cents,
    }
    .into_product(Utc::now());
    self.store.insert_product(&product).await.unwrap();
    product
  }

  pub async fn cake(&self, owner_id: Uuid, price_cents: i64) -> CustomCake {
    let cake = CustomCake {
      id: Uuid::new_v4(),
      owner_id,
      name: "Bolo Personalizado de Chocolate".to_string(),
      base: "chocolate".to_string(),
      fillings: vec!["brigadeiro".to_string()],
      topping: "ganache".to_string(),
      finishes: Vec::new(),
      notes: None,
      price_cents,
      active: true,
      created_at: Utc::now(),
    };
    self.store.insert_custom_cake(&cake).await.unwrap();
    cake
  }

  pub async fn put_in_cart(&self, user_id: Uuid, item: CartItemRef, quantity: i32, unit_price_cents: i64) {
    self
      .store
      .upsert_cart_line(
        user_id,
        &CartLine {
          item,
          quantity,
          unit_price_cents,
        },
      )
      .await
      .unwrap();
  }

  /// 10.00 x 3 plus a 25.00 custom cake.
  pub async fn reference_cart(&self, user_id: Uuid) -> (Product, CustomCake) {
    let product = self.product("Brigadeiro Gourmet", 1000).await;
    let cake = self.cake(user_id, 2500).await;
    self.put_in_cart(user_id, CartItemRef::Product(product.id), 3, 1000).await;
    self.put_in_cart(user_id, CartItemRef::CustomCake(cake.id), 1, 2500).await;
    (product, cake)
  }

  pub async fn checkout(
    &self,
    session: &SessionHandle,
    user_id: Uuid,
    form: CheckoutForm,
  ) -> (Result<PipelineResult, AppError>, ContextData<CheckoutCtxData>) {
    let ctx = ContextData::new(CheckoutCtxData::new(self.state.clone(), session.clone(), user_id, form));
    let result = self.state.flows.run(ctx.clone()).await;
    (result, ctx)
  }

  pub async fn payment_callback(
    &self,
    session: Option<&SessionHandle>,
    outcome: PaymentOutcome,
    reference: Option<Uuid>,
  ) -> (Result<PipelineResult, AppError>, ContextData<PaymentCallbackCtxData>) {
    let ctx = ContextData::new(PaymentCallbackCtxData::new(
      self.state.clone(),
      session.cloned(),
      outcome,
      reference,
      Some("pay-1".to_string()),
    ));
    let result = self.state.flows.run(ctx.clone()).await;
    (result, ctx)
  }
}

pub fn pickup() -> CheckoutForm {
  CheckoutForm {
    delivery: "retirada".to_string(),
    contact_email: Some("cliente@exemplo.com".to_string()),
    ..CheckoutForm::default()
  }
}

pub fn delivery_to_home() -> CheckoutForm {
  CheckoutForm {
    delivery: "frete".to_string(),
    street: Some("Rua das Flores, 10".to_string()),
    postal_code: Some("01000-000".to_string()),
    district: Some("Centro".to_string()),
    contact_email: Some("cliente@exemplo.com".to_string()),
    ..CheckoutForm::default()
  }
}

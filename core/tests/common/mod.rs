#![allow(dead_code)]

use doce_flow::{ContextData, FlowError, Handler, PipelineControl};
use once_cell::sync::Lazy;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;

/// Main context used across the engine tests: a kitchen ticket walking
/// through preparation stations.
#[derive(Clone, Debug, Default)]
pub struct Ticket {
  pub trail: Vec<String>,
  pub touched: i32,
  pub stop_at: Option<String>,
  pub station: Option<String>,
  pub note: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct OvenCtx {
  pub note: String,
  pub baked: bool,
}

#[derive(Clone, Debug, Default)]
pub struct IcingCtx {
  pub note: String,
  pub iced: bool,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum KitchenError {
  #[error("flow: {0}")]
  Flow(String),

  #[error("station failed: {0}")]
  Station(String),
}

impl From<FlowError> for KitchenError {
  fn from(e: FlowError) -> Self {
    KitchenError::Flow(format!("{:?}", e))
  }
}

pub fn stamp(step: &'static str) -> Handler<Ticket, KitchenError> {
  Box::new(move |ctx: ContextData<Ticket>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.touched += 1;
      guard.trail.push(step.to_string());
      if guard.stop_at.as_deref() == Some(step) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn burn(step: &'static str, why: &'static str) -> Handler<Ticket, KitchenError> {
  Box::new(move |ctx: ContextData<Ticket>| {
    Box::pin(async move {
      ctx.write().trail.push(step.to_string());
      Err(KitchenError::Station(why.to_string()))
    })
  })
}

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

pub static OVEN_RUNS: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static ICING_RUNS: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static FACTORY_CALLS: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  OVEN_RUNS.store(0, Ordering::SeqCst);
  ICING_RUNS.store(0, Ordering::SeqCst);
  FACTORY_CALLS.store(0, Ordering::SeqCst);
}

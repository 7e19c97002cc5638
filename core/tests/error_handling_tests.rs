mod common;

use common::*;
use doce_flow::{ContextData, FlowError, Pipeline, PipelineControl};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn handler_error_aborts_the_run() {
  setup_tracing();
  let mut p = Pipeline::<Ticket, KitchenError>::new(&[("mix", false, None), ("bake", false, None), ("box", false, None)]);
  p.on_root("mix", stamp("mix"));
  p.on_root("bake", burn("bake", "oven too hot"));
  p.on_root("box", stamp("box"));

  let ctx = ContextData::new(Ticket::default());
  let err = p.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, KitchenError::Station("oven too hot".into()));
  assert_eq!(ctx.read().trail, vec!["mix", "bake"]);
}

#[tokio::test]
#[serial]
async fn after_handler_error_is_reported() {
  setup_tracing();
  let mut p = Pipeline::<Ticket, KitchenError>::new(&[("bake", false, None)]);
  p.on_root("bake", stamp("bake"));
  p.after_root("bake", burn("inspect", "cracked top"));

  let err = p.run(ContextData::new(Ticket::default())).await.unwrap_err();
  assert_eq!(err, KitchenError::Station("cracked top".into()));
}

#[tokio::test]
#[serial]
async fn required_step_without_handlers_fails() {
  setup_tracing();
  let mut p = Pipeline::<Ticket, KitchenError>::new(&[("mix", false, None), ("bake", false, None)]);
  p.on_root("mix", stamp("mix"));

  let err = p.run(ContextData::new(Ticket::default())).await.unwrap_err();
  match err {
    KitchenError::Flow(msg) => assert!(msg.contains("HandlerMissing"), "unexpected: {msg}"),
    other => panic!("expected flow error, got {other:?}"),
  }
}

#[tokio::test]
#[serial]
async fn handler_error_types_convert_into_pipeline_error() {
  setup_tracing();
  let mut p = Pipeline::<Ticket, KitchenError>::new(&[("weigh", false, None)]);
  p.on_root("weigh", |_ctx: ContextData<Ticket>| async {
    Err::<PipelineControl, FlowError>(FlowError::Internal("scale offline".into()))
  });

  let err = p.run(ContextData::new(Ticket::default())).await.unwrap_err();
  match err {
    KitchenError::Flow(msg) => assert!(msg.contains("scale offline")),
    other => panic!("expected flow error, got {other:?}"),
  }
}

#[test]
fn anyhow_errors_become_handler_errors() {
  let e: FlowError = anyhow::anyhow!("flour shortage").into();
  assert!(matches!(e, FlowError::HandlerError { .. }));
  assert!(e.to_string().contains("flour shortage"));
}

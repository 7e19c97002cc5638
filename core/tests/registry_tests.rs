mod common;

use common::*;
use doce_flow::{ContextData, Flows, Pipeline, PipelineControl, PipelineResult};
use serial_test::serial;

#[derive(Debug, Default)]
struct Receipt {
  printed: bool,
}

#[tokio::test]
#[serial]
async fn runs_pipeline_registered_for_context_type() {
  setup_tracing();
  let flows = Flows::<KitchenError>::new();

  let mut tickets = Pipeline::<Ticket, KitchenError>::new(&[("mix", false, None)]);
  tickets.on_root("mix", stamp("mix"));
  flows.register_pipeline(tickets);

  let mut receipts = Pipeline::<Receipt, KitchenError>::new(&[("print", false, None)]);
  receipts.on_root("print", |ctx: ContextData<Receipt>| async move {
    ctx.write().printed = true;
    Ok::<_, KitchenError>(PipelineControl::Continue)
  });
  flows.register_pipeline(receipts);

  assert!(flows.is_registered::<Ticket>());
  assert!(flows.is_registered::<Receipt>());

  let ticket = ContextData::new(Ticket::default());
  assert_eq!(flows.run(ticket.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ticket.read().trail, vec!["mix"]);

  let receipt = ContextData::new(Receipt::default());
  flows.run(receipt.clone()).await.unwrap();
  assert!(receipt.read().printed);
}

#[tokio::test]
#[serial]
async fn unregistered_context_is_a_configuration_error() {
  setup_tracing();
  let flows = Flows::<KitchenError>::new();
  let err = flows.run(ContextData::new(Receipt::default())).await.unwrap_err();
  match err {
    KitchenError::Flow(msg) => assert!(msg.contains("ConfigurationError")),
    other => panic!("expected flow error, got {other:?}"),
  }
}

#[tokio::test]
#[serial]
async fn later_registration_replaces_earlier_one() {
  setup_tracing();
  let flows = Flows::<KitchenError>::new();

  let mut first = Pipeline::<Ticket, KitchenError>::new(&[("mix", false, None)]);
  first.on_root("mix", stamp("first"));
  flows.register_pipeline(first);

  let mut second = Pipeline::<Ticket, KitchenError>::new(&[("mix", false, None)]);
  second.on_root("mix", stamp("second"));
  flows.register_pipeline(second);

  let ctx = ContextData::new(Ticket::default());
  flows.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().trail, vec!["second"]);
}

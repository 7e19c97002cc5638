use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::definition::{Phase, Pipeline};
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// A step whose `skip_if` returns true is passed over. A step without any
  /// handler is skipped when optional and fails with
  /// `FlowError::HandlerMissing` otherwise. The first handler error aborts
  /// the run; the first `Stop` ends it with `PipelineResult::Stopped`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline run starting.");

    for (step_index, step) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "pipeline_step_execution",
        step_name = step.name.as_str(),
        step_index,
        optional = step.optional
      );

      if let Some(skip_if) = &step.skip_if {
        if skip_if(ctx_data.clone()) {
          event!(parent: &step_span, Level::INFO, "Step skipped by its skip condition.");
          continue;
        }
      }

      let has_handlers = [Phase::Before, Phase::On, Phase::After]
        .iter()
        .any(|phase| !self.handlers(*phase, &step.name).is_empty());

      if !has_handlers {
        if step.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Non-optional step has no handlers.");
        return Err(Err::from(FlowError::HandlerMissing {
          step_name: step.name.clone(),
        }));
      }

      for phase in [Phase::Before, Phase::On, Phase::After] {
        let control = self
          .run_phase(phase, &step.name, &ctx_data)
          .instrument(step_span.clone())
          .await?;
        if control == PipelineControl::Stop {
          event!(parent: &step_span, Level::INFO, ?phase, "Pipeline stopped by a handler.");
          return Ok(PipelineResult::Stopped);
        }
      }
      event!(parent: &step_span, Level::DEBUG, "Step finished.");
    }

    event!(Level::DEBUG, "Pipeline run completed.");
    Ok(PipelineResult::Completed)
  }

  async fn run_phase(&self, phase: Phase, step_name: &str, ctx_data: &ContextData<TData>) -> Result<PipelineControl, Err> {
    let span_name = match phase {
      Phase::Before => "before_handler",
      Phase::On => "on_handler",
      Phase::After => "after_handler",
    };
    for (handler_index, handler) in self.handlers(phase, step_name).iter().enumerate() {
      let handler_span = span!(Level::DEBUG, "handler", kind = span_name, handler_index);
      match handler(ctx_data.clone()).instrument(handler_span).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => return Ok(PipelineControl::Stop),
        Err(e) => {
          event!(Level::ERROR, error = %e, kind = span_name, "Handler failed.");
          return Err(e);
        }
      }
    }
    Ok(PipelineControl::Continue)
  }
}

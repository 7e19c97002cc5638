use crate::conditional::provider::PipelineProvider;
use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, instrument, Level};

pub(crate) type Extractor<TData, SData> =
  Arc<dyn Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static>;

pub(crate) type Condition<TData> = Arc<dyn Fn(ContextData<TData>) -> bool + Send + Sync + 'static>;

pub(crate) struct ConditionalScope<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) step_name: String,
  pub(crate) provider: Arc<dyn PipelineProvider<TData, SData, Err>>,
  pub(crate) extractor: Extractor<TData, SData>,
  pub(crate) condition: Condition<TData>,
}

/// Scope with its sub-context type erased, so one step can hold scopes over
/// different `SData`.
#[async_trait]
pub(crate) trait AnyConditionalScope<TData, Err>: Send + Sync
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn matches(&self, main_ctx_data: ContextData<TData>) -> bool;

  async fn execute(&self, main_ctx_data: ContextData<TData>) -> Result<PipelineControl, Err>;
}

#[async_trait]
impl<TData, SData, Err> AnyConditionalScope<TData, Err> for ConditionalScope<TData, SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn matches(&self, main_ctx_data: ContextData<TData>) -> bool {
    (self.condition)(main_ctx_data)
  }

  #[instrument(
    name = "ConditionalScope::execute",
    skip_all,
    fields(
      step_name = %self.step_name,
      scoped_context_type = %std::any::type_name::<SData>(),
    ),
    err(Display)
  )]
  async fn execute(&self, main_ctx_data: ContextData<TData>) -> Result<PipelineControl, Err> {
    let pipeline = self
      .provider
      .get_pipeline(main_ctx_data.clone())
      .await
      .map_err(|cause| {
        let enriched = match cause {
          FlowError::PipelineProviderFailure { source, .. } | FlowError::HandlerError { source } => {
            FlowError::PipelineProviderFailure {
              step_name: self.step_name.clone(),
              source,
            }
          }
          other => other,
        };
        Err::from(enriched)
      })?;

    let sub_ctx = (self.extractor)(main_ctx_data).map_err(|cause| {
      let enriched = match cause {
        FlowError::ExtractorFailure { source, .. } | FlowError::HandlerError { source } => FlowError::ExtractorFailure {
          step_name: self.step_name.clone(),
          source,
        },
        other => other,
      };
      Err::from(enriched)
    })?;

    event!(Level::DEBUG, "Running scoped pipeline.");
    match pipeline.run(sub_ctx).await? {
      PipelineResult::Completed => Ok(PipelineControl::Continue),
      PipelineResult::Stopped => {
        event!(Level::INFO, "Scoped pipeline stopped; stopping the main pipeline.");
        Ok(PipelineControl::Stop)
      }
    }
  }
}

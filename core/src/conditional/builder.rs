use crate::conditional::provider::{FunctionalPipelineProvider, PipelineProvider, StaticPipelineProvider};
use crate::conditional::scope::{AnyConditionalScope, ConditionalScope, Extractor};
use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use crate::core::handler::Handler;
use crate::error::FlowError;
use crate::pipeline::definition::Phase;
use crate::pipeline::Pipeline;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Collects the scopes of one step. Finish with `finalize_conditional_step`.
pub struct ConditionalScopeBuilder<'pipeline, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: &'pipeline mut Pipeline<TData, Err>,
  step_name: String,
  scopes: Vec<Arc<dyn AnyConditionalScope<TData, Err>>>,
  on_no_match: PipelineControl,
}

impl<'pipeline, TData, Err> ConditionalScopeBuilder<'pipeline, TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) fn new(pipeline: &'pipeline mut Pipeline<TData, Err>, step_name: String) -> Self {
    Self {
      pipeline,
      step_name,
      scopes: Vec::new(),
      on_no_match: PipelineControl::Continue,
    }
  }

  /// Scope backed by a pipeline built once, up front.
  pub fn add_static_scope<SData>(
    self,
    pipeline: Arc<Pipeline<SData, Err>>,
    extractor_fn: impl Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static,
  ) -> ConditionalScopeConfigurator<'pipeline, TData, SData, Err, StaticPipelineProvider<SData, Err>>
  where
    SData: 'static + Send + Sync,
  {
    ConditionalScopeConfigurator {
      builder: self,
      provider: Arc::new(StaticPipelineProvider::new(pipeline)),
      extractor: Arc::new(extractor_fn),
      _marker: PhantomData,
    }
  }

  /// Scope whose pipeline is produced by `pipeline_factory` each time it is chosen.
  pub fn add_dynamic_scope<SData, F, Fut>(
    self,
    pipeline_factory: F,
    extractor_fn: impl Fn(ContextData<TData>) -> Result<ContextData<SData>, FlowError> + Send + Sync + 'static,
  ) -> ConditionalScopeConfigurator<'pipeline, TData, SData, Err, FunctionalPipelineProvider<TData, SData, Err, F, Fut>>
  where
    SData: 'static + Send + Sync,
    F: Fn(ContextData<TData>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<Pipeline<SData, Err>>, FlowError>> + Send + 'static,
  {
    ConditionalScopeConfigurator {
      builder: self,
      provider: Arc::new(FunctionalPipelineProvider::new(pipeline_factory)),
      extractor: Arc::new(extractor_fn),
      _marker: PhantomData,
    }
  }

  /// Control returned when no condition holds. Defaults to `Continue`.
  pub fn if_no_scope_matches(mut self, behavior: PipelineControl) -> Self {
    self.on_no_match = behavior;
    self
  }

  /// Installs the dispatching `on` handler for the step, replacing any `on`
  /// handler registered before. When `optional` is true a failing scope is
  /// logged and the main pipeline continues.
  #[instrument(
    name = "ConditionalScopeBuilder::finalize_conditional_step",
    skip_all,
    fields(step_name = %self.step_name, num_scopes = self.scopes.len())
  )]
  pub fn finalize_conditional_step(self, optional: bool) {
    let scopes = Arc::new(self.scopes);
    let on_no_match = self.on_no_match;
    let step_name = self.step_name.clone();

    let dispatcher: Handler<TData, Err> = Box::new(move |ctx_data: ContextData<TData>| {
      let scopes = scopes.clone();
      let step_name = step_name.clone();
      Box::pin(async move {
        let chosen = scopes.iter().find(|scope| scope.matches(ctx_data.clone()));
        let Some(scope) = chosen else {
          event!(Level::DEBUG, %step_name, ?on_no_match, "No conditional scope matched.");
          return Ok(on_no_match);
        };
        match scope.execute(ctx_data).await {
          Ok(control) => Ok(control),
          Err(e) if optional => {
            event!(Level::WARN, %step_name, error = %e, "Optional conditional step failed; continuing.");
            Ok(PipelineControl::Continue)
          }
          Err(e) => Err(e),
        }
      })
    });

    self.pipeline.step_mut(&self.step_name).optional = optional;
    self
      .pipeline
      .handlers_mut(Phase::On)
      .insert(self.step_name.clone(), vec![dispatcher]);
    event!(Level::DEBUG, "Conditional step finalized.");
  }
}

/// Pending scope waiting for its condition.
pub struct ConditionalScopeConfigurator<'pipeline, TData, SData, Err, P>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  P: PipelineProvider<TData, SData, Err> + 'static,
{
  builder: ConditionalScopeBuilder<'pipeline, TData, Err>,
  provider: Arc<P>,
  extractor: Extractor<TData, SData>,
  _marker: PhantomData<fn() -> SData>,
}

impl<'pipeline, TData, SData, Err, P> ConditionalScopeConfigurator<'pipeline, TData, SData, Err, P>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  P: PipelineProvider<TData, SData, Err> + 'static,
{
  pub fn on_condition(
    mut self,
    condition_fn: impl Fn(ContextData<TData>) -> bool + Send + Sync + 'static,
  ) -> ConditionalScopeBuilder<'pipeline, TData, Err> {
    let scope = ConditionalScope::<TData, SData, Err> {
      step_name: self.builder.step_name.clone(),
      provider: self.provider,
      extractor: self.extractor,
      condition: Arc::new(condition_fn),
    };
    self.builder.scopes.push(Arc::new(scope));
    self.builder
  }
}

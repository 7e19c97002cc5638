//! `Flows<E>`: pipelines registered by context type and run on demand.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineResult;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[async_trait]
trait ErasedPipeline<AppErr>: Send + Sync
where
  AppErr: std::error::Error + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, AppErr>;
}

struct Registered<TData, HandlerErr, AppErr>
where
  TData: 'static + Send + Sync,
  HandlerErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: Arc<Pipeline<TData, HandlerErr>>,
  _marker: PhantomData<fn() -> AppErr>,
}

#[async_trait]
impl<TData, HandlerErr, AppErr> ErasedPipeline<AppErr> for Registered<TData, HandlerErr, AppErr>
where
  TData: 'static + Send + Sync,
  HandlerErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<HandlerErr> + From<FlowError> + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, AppErr> {
    let ctx = ctx.downcast::<ContextData<TData>>().map_err(|_| {
      AppErr::from(FlowError::TypeMismatch {
        step_name: "registry_dispatch".to_string(),
        expected_type: std::any::type_name::<ContextData<TData>>().to_string(),
      })
    })?;
    self.pipeline.run(*ctx).await.map_err(AppErr::from)
  }
}

/// Registry of pipelines keyed by their context data type. Running a
/// context picks the pipeline registered for that type; registering the
/// same type twice replaces the earlier pipeline.
pub struct Flows<AppErr = FlowError>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  registry: RwLock<HashMap<TypeId, Arc<dyn ErasedPipeline<AppErr>>>>,
}

impl<AppErr> Default for Flows<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<AppErr> Flows<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      registry: RwLock::new(HashMap::new()),
    }
  }

  pub fn register_pipeline<TData, HandlerErr>(&self, pipeline: Pipeline<TData, HandlerErr>)
  where
    TData: 'static + Send + Sync,
    HandlerErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
    AppErr: From<HandlerErr>,
  {
    event!(Level::DEBUG, context_type = %std::any::type_name::<TData>(), steps = ?pipeline.step_names(), "Registering pipeline.");
    let entry: Arc<dyn ErasedPipeline<AppErr>> = Arc::new(Registered::<TData, HandlerErr, AppErr> {
      pipeline: Arc::new(pipeline),
      _marker: PhantomData,
    });
    self.registry.write().insert(TypeId::of::<TData>(), entry);
  }

  pub fn is_registered<TData: 'static>(&self) -> bool {
    self.registry.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the pipeline registered for `TData`. An unregistered type is a
  /// `FlowError::ConfigurationError`.
  #[instrument(name = "Flows::run", skip_all, fields(context_type = %std::any::type_name::<TData>()), err(Display))]
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, AppErr>
  where
    TData: 'static + Send + Sync,
  {
    let runner = self.registry.read().get(&TypeId::of::<TData>()).cloned();
    let Some(runner) = runner else {
      let type_name = std::any::type_name::<TData>();
      event!(Level::ERROR, context_type = type_name, "No pipeline registered.");
      return Err(AppErr::from(FlowError::ConfigurationError {
        step_name: "Flows::run".to_string(),
        message: format!("No pipeline registered for {}", type_name),
      }));
    };
    runner.run_erased(Box::new(ctx_data)).await
  }
}

use crate::core::context_data::ContextData;
use crate::error::FlowError;
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Supplies the sub-pipeline for a conditional scope.
#[async_trait]
pub trait PipelineProvider<TData, SData, Err>: Send + Sync + 'static
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  async fn get_pipeline(&self, main_ctx_data: ContextData<TData>) -> Result<Arc<Pipeline<SData, Err>>, FlowError>;
}

/// Hands out the same prebuilt pipeline on every call.
pub struct StaticPipelineProvider<SData, Err>
where
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: Arc<Pipeline<SData, Err>>,
}

impl<SData, Err> StaticPipelineProvider<SData, Err>
where
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new(pipeline: Arc<Pipeline<SData, Err>>) -> Self {
    Self { pipeline }
  }
}

impl<SData, Err> Clone for StaticPipelineProvider<SData, Err>
where
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn clone(&self) -> Self {
    Self {
      pipeline: self.pipeline.clone(),
    }
  }
}

#[async_trait]
impl<TData, SData, Err> PipelineProvider<TData, SData, Err> for StaticPipelineProvider<SData, Err>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  async fn get_pipeline(&self, _main_ctx_data: ContextData<TData>) -> Result<Arc<Pipeline<SData, Err>>, FlowError> {
    Ok(self.pipeline.clone())
  }
}

/// Builds the sub-pipeline per run by calling an async factory.
pub struct FunctionalPipelineProvider<TData, SData, Err, F, Fut>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  F: Fn(ContextData<TData>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Arc<Pipeline<SData, Err>>, FlowError>> + Send + 'static,
{
  factory: F,
  _marker: PhantomData<fn() -> (TData, SData, Err)>,
}

impl<TData, SData, Err, F, Fut> FunctionalPipelineProvider<TData, SData, Err, F, Fut>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  F: Fn(ContextData<TData>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Arc<Pipeline<SData, Err>>, FlowError>> + Send + 'static,
{
  pub fn new(factory: F) -> Self {
    Self {
      factory,
      _marker: PhantomData,
    }
  }
}

#[async_trait]
impl<TData, SData, Err, F, Fut> PipelineProvider<TData, SData, Err> for FunctionalPipelineProvider<TData, SData, Err, F, Fut>
where
  TData: 'static + Send + Sync,
  SData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  F: Fn(ContextData<TData>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Arc<Pipeline<SData, Err>>, FlowError>> + Send + 'static,
{
  async fn get_pipeline(&self, main_ctx_data: ContextData<TData>) -> Result<Arc<Pipeline<SData, Err>>, FlowError> {
    (self.factory)(main_ctx_data).await.map_err(|cause| match cause {
      already @ FlowError::PipelineProviderFailure { .. } => already,
      other => FlowError::PipelineProviderFailure {
        step_name: format!("factory<{}>", std::any::type_name::<SData>()),
        source: anyhow::Error::new(other),
      },
    })
  }
}

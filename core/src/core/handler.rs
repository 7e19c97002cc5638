//! The boxed handler type stored for every step phase.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use std::future::Future;
use std::pin::Pin;

/// Future returned by a stored handler.
pub type HandlerFuture<Err> = Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>;

/// A step handler. It receives a clone of the shared context and decides
/// whether the pipeline continues.
///
/// Lock guards taken on the context must be released before the handler
/// awaits anything.
pub type Handler<TData, Err> = Box<dyn Fn(ContextData<TData>) -> HandlerFuture<Err> + Send + Sync>;

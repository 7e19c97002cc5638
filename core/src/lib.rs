//! doce_flow: small asynchronous step pipelines.
//!
//! Every multi-step flow of the storefront (adding to the cart, checkout
//! handoff, payment settlement, order status changes) is written as a
//! `Pipeline<TData, Err>`:
//!  - named steps with `before` / `on` / `after` handlers,
//!  - steps that can be optional or skipped by a predicate,
//!  - handlers that stop the run early with `PipelineControl::Stop`,
//!  - conditional scopes that hand a step over to a sub-pipeline chosen at
//!    run time,
//!  - a registry (`Flows`) that dispatches on the context data type.
//!
//! Context data is shared as `ContextData<T>` (an `Arc<parking_lot::RwLock<T>>`);
//! handlers take short read/write guards and drop them before awaiting.

pub mod conditional;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::handler::Handler;
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::conditional::builder::{ConditionalScopeBuilder, ConditionalScopeConfigurator};
pub use crate::conditional::provider::{PipelineProvider, StaticPipelineProvider};

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Flows;

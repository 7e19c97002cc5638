//! Conditional scopes: a step that hands its work to one of several
//! sub-pipelines, picked by predicates over the main context.
//!
//! Each scope pairs a `PipelineProvider` (static or built on demand), an
//! extractor producing the sub-context, and a condition. The first scope
//! whose condition holds runs; `if_no_scope_matches` decides what happens
//! when none does.

pub mod builder;
pub mod provider;
pub mod scope;

pub use builder::ConditionalScopeBuilder;
pub use provider::PipelineProvider;

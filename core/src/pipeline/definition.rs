use crate::conditional::builder::ConditionalScopeBuilder;
use crate::core::handler::Handler;
use crate::core::step::{SkipCondition, StepDef};
use crate::error::FlowError;
use std::collections::HashMap;

/// Which handler list a registration goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
  Before,
  On,
  After,
}

/// An ordered list of named steps over a context `TData`. Handlers return
/// `Result<PipelineControl, Err>`; engine failures reach callers as
/// `Err::from(FlowError)`.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Builds a pipeline from `(name, optional, skip_if)` triples, in run order.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef {
        name: (*name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  pub fn has_step(&self, step_name: &str) -> bool {
    self.steps.iter().any(|s| s.name == step_name)
  }

  /// Registering against an unknown step is a wiring mistake, not a runtime
  /// condition, so it panics at setup time.
  pub(crate) fn step_mut(&mut self, step_name: &str) -> &mut StepDef<TData> {
    match self.steps.iter_mut().find(|s| s.name == step_name) {
      Some(step) => step,
      None => panic!("{}", FlowError::StepNotFound {
        step_name: step_name.to_string()
      }),
    }
  }

  pub(crate) fn handlers_mut(&mut self, phase: Phase) -> &mut HashMap<String, Vec<Handler<TData, Err>>> {
    match phase {
      Phase::Before => &mut self.before,
      Phase::On => &mut self.on,
      Phase::After => &mut self.after,
    }
  }

  pub(crate) fn handlers(&self, phase: Phase, step_name: &str) -> &[Handler<TData, Err>] {
    let map = match phase {
      Phase::Before => &self.before,
      Phase::On => &self.on,
      Phase::After => &self.after,
    };
    map.get(step_name).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn set_optional(&mut self, step_name: &str, optional: bool) {
    self.step_mut(step_name).optional = optional;
  }

  pub fn set_skip_condition(&mut self, step_name: &str, skip_if: Option<SkipCondition<TData>>) {
    self.step_mut(step_name).skip_if = skip_if;
  }

  /// Starts configuring sub-pipelines for `step_name`. The step is appended
  /// if the pipeline does not declare it yet.
  pub fn conditional_scopes_for_step(&mut self, step_name: &str) -> ConditionalScopeBuilder<'_, TData, Err> {
    if !self.has_step(step_name) {
      self.steps.push(StepDef {
        name: step_name.to_string(),
        optional: false,
        skip_if: None,
      });
    }
    ConditionalScopeBuilder::new(self, step_name.to_string())
  }
}

use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Failures raised by the engine itself. Application error types embed this
/// through `From<FlowError>`.
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Extractor failed for step '{step_name}': {source}")]
  ExtractorFailure {
    step_name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Pipeline provider failed for step '{step_name}': {source}")]
  PipelineProviderFailure {
    step_name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Context type mismatch in '{step_name}' (expected {expected_type})")]
  TypeMismatch { step_name: String, expected_type: String },

  #[error("Handler failed: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Configuration error for '{step_name}': {message}")]
  ConfigurationError { step_name: String, message: String },

  #[error("Internal flow error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for FlowError {
  fn from(source: AnyhowError) -> Self {
    FlowError::HandlerError { source }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;

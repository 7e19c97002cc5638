use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::services::payment_gateway::GatewayError;
use doce_flow::FlowError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  /// Checkout could not obtain a payment link.
  #[error("Payment Processing Error: {0}")]
  Payment(String),

  #[error("Payment Gateway Error: {0}")]
  Gateway(#[from] GatewayError),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("Flow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),

  #[error("Pipeline execution was halted by a handler.")]
  PipelineHaltedByHandler,
}

impl AppError {
  /// Errors a shopper can act on; browser flows turn these into flash
  /// messages instead of error pages.
  pub fn is_user_facing(&self) -> bool {
    matches!(
      self,
      AppError::Validation(_) | AppError::Payment(_) | AppError::NotFound(_) | AppError::Forbidden(_)
    )
  }

  pub fn user_message(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::Payment(m) | AppError::NotFound(m) | AppError::Forbidden(m) => m.clone(),
      _ => "Não foi possível concluir a operação. Tente novamente.".to_string(),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<AppError>() {
      Ok(app_err) => app_err,
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(db_err) => AppError::Sqlx(db_err),
        Err(err) => AppError::Internal(err.to_string()),
      },
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
      AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
      AppError::PipelineHaltedByHandler => StatusCode::CONFLICT,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    tracing::error!(application_error = %self, "Responding with error");
    let body = match self {
      AppError::Validation(m) | AppError::Auth(m) | AppError::Forbidden(m) | AppError::NotFound(m) | AppError::Payment(m) => {
        json!({ "error": m })
      }
      AppError::Gateway(e) => json!({ "error": "Payment provider error", "detail": e.to_string() }),
      AppError::Config(m) => json!({ "error": "Configuration issue", "detail": m }),
      AppError::Sqlx(_) | AppError::Migrate(_) => json!({ "error": "Database operation failed" }),
      AppError::Workflow { source } => {
        tracing::error!(flow_error = ?source, "Workflow error details");
        json!({ "error": "Workflow processing error" })
      }
      AppError::Internal(_) => json!({ "error": "An internal error occurred" }),
      AppError::PipelineHaltedByHandler => json!({ "error": "Process halted by business rules." }),
    };
    HttpResponse::build(self.status_code()).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

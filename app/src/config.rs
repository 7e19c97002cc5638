use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Postgres URL. Without it the service runs on the in-memory store.
  pub database_url: Option<String>,
  pub run_migrations: bool,
  /// Absolute base used to build the gateway's return URLs.
  pub app_base_url: String,

  pub payment_access_token: Option<String>,
  pub payment_api_base_url: String,
  pub payment_use_sandbox_link: bool,
  pub payment_timeout_secs: u64,

  pub delivery_fee_cents: i64,
  pub currency_code: String,

  pub mail_sender: String,
  pub seed_db: bool,
  pub log_format: LogFormat,
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
  }

  /// Builds the configuration from any variable source; `from_env` passes
  /// the process environment.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let or_default = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

    let server_host = or_default("SERVER_HOST", "127.0.0.1");
    let server_port: u16 = parse_var("SERVER_PORT", &or_default("SERVER_PORT", "8080"))?;
    let database_url = lookup("DATABASE_URL");
    let run_migrations: bool = parse_var("RUN_MIGRATIONS", &or_default("RUN_MIGRATIONS", "true"))?;

    let app_base_url = lookup("APP_BASE_URL")
      .unwrap_or_else(|| format!("http://{}:{}", server_host, server_port))
      .trim_end_matches('/')
      .to_string();
    if !app_base_url.starts_with("http") {
      return Err(AppError::Config(format!(
        "APP_BASE_URL must be an absolute http(s) URL, got '{}'",
        app_base_url
      )));
    }

    let payment_access_token = lookup("PAYMENT_ACCESS_TOKEN");
    let payment_api_base_url = or_default("PAYMENT_API_BASE_URL", "https://api.mercadopago.com")
      .trim_end_matches('/')
      .to_string();
    let payment_use_sandbox_link: bool =
      parse_var("PAYMENT_USE_SANDBOX_LINK", &or_default("PAYMENT_USE_SANDBOX_LINK", "false"))?;
    let payment_timeout_secs: u64 = parse_var("PAYMENT_TIMEOUT_SECS", &or_default("PAYMENT_TIMEOUT_SECS", "15"))?;

    let delivery_fee_cents: i64 = parse_var("DELIVERY_FEE_CENTS", &or_default("DELIVERY_FEE_CENTS", "1200"))?;
    if delivery_fee_cents < 0 {
      return Err(AppError::Config("DELIVERY_FEE_CENTS cannot be negative".to_string()));
    }
    let currency_code = or_default("CURRENCY_CODE", "BRL").to_uppercase();

    let mail_sender = or_default("MAIL_SENDER", "pedidos@docesonho.com.br");
    let seed_db: bool = parse_var("SEED_DB", &or_default("SEED_DB", "false"))?;
    let log_format = match or_default("LOG_FORMAT", "pretty").to_lowercase().as_str() {
      "pretty" => LogFormat::Pretty,
      "json" => LogFormat::Json,
      other => return Err(AppError::Config(format!("Invalid LOG_FORMAT: {}", other))),
    };

    tracing::info!(
      database = database_url.is_some(),
      live_gateway = payment_access_token.is_some(),
      "Application configuration loaded."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      run_migrations,
      app_base_url,
      payment_access_token,
      payment_api_base_url,
      payment_use_sandbox_link,
      payment_timeout_secs,
      delivery_fee_cents,
      currency_code,
      mail_sender,
      seed_db,
      log_format,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
    let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    AppConfig::from_lookup(|name| vars.get(name).cloned())
  }

  #[test]
  fn defaults_apply_when_nothing_is_set() {
    let cfg = config_from(&[]).unwrap();
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.app_base_url, "http://127.0.0.1:8080");
    assert_eq!(cfg.delivery_fee_cents, 1200);
    assert_eq!(cfg.currency_code, "BRL");
    assert!(cfg.database_url.is_none());
    assert!(cfg.payment_access_token.is_none());
    assert_eq!(cfg.log_format, LogFormat::Pretty);
  }

  #[test]
  fn base_url_loses_trailing_slash() {
    let cfg = config_from(&[("APP_BASE_URL", "https://docesonho.com.br/")]).unwrap();
    assert_eq!(cfg.app_base_url, "https://docesonho.com.br");
  }

  #[test]
  fn invalid_values_are_config_errors() {
    assert!(matches!(config_from(&[("SERVER_PORT", "http")]), Err(AppError::Config(_))));
    assert!(matches!(config_from(&[("DELIVERY_FEE_CENTS", "-5")]), Err(AppError::Config(_))));
    assert!(matches!(config_from(&[("APP_BASE_URL", "docesonho.com.br")]), Err(AppError::Config(_))));
    assert!(matches!(config_from(&[("LOG_FORMAT", "xml")]), Err(AppError::Config(_))));
  }
}

use std::io;
use std::sync::Arc;

use actix_web::{web as actix_data, App, HttpServer};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use doce_sonho::config::{AppConfig, LogFormat};
use doce_sonho::services::mailer::{LogMailer, Mailer};
use doce_sonho::services::payment_gateway::{MercadoPagoClient, PaymentGateway};
use doce_sonho::services::payment_sandbox::SandboxGateway;
use doce_sonho::store::{seed_catalog, MemoryStore, PgStore, Storage};
use doce_sonho::web::configure_app_routes;
use doce_sonho::build_app_state;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Pretty => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
  tracing::error!(error = %err, "{}", context);
  io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  // The log format is itself configuration; a config failure logs pretty.
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      init_tracing(LogFormat::Pretty);
      return Err(startup_error("Failed to load application configuration", e));
    }
  };
  init_tracing(app_config.log_format);
  tracing::info!("Starting Doce Sonho storefront...");

  let store: Arc<dyn Storage> = match &app_config.database_url {
    Some(url) => {
      let pg = PgStore::connect(url)
        .await
        .map_err(|e| startup_error("Failed to connect to the database", e))?;
      tracing::info!("Successfully connected to the database.");
      if app_config.run_migrations {
        pg.migrate().await.map_err(|e| startup_error("Failed to run migrations", e))?;
      }
      Arc::new(pg)
    }
    None => {
      tracing::warn!("DATABASE_URL not set; using the in-memory store. Data is lost on restart.");
      Arc::new(MemoryStore::new())
    }
  };

  if app_config.seed_db {
    let seeded = seed_catalog(store.as_ref())
      .await
      .map_err(|e| startup_error("Failed to seed the catalog", e))?;
    tracing::info!(seeded, "Catalog seeding finished.");
  }

  let gateway: Arc<dyn PaymentGateway> = match MercadoPagoClient::from_config(&app_config)
    .map_err(|e| startup_error("Failed to build the payment gateway client", e))?
  {
    Some(client) => Arc::new(client),
    None => {
      tracing::warn!("PAYMENT_ACCESS_TOKEN not set; payments go through the sandbox gateway.");
      Arc::new(SandboxGateway::new())
    }
  };
  let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new());

  let app_state = build_app_state(app_config.clone(), store, gateway, mailer);
  tracing::info!("Pipelines registered.");

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}

//! cercle-api server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, wires the provider clients, and serves the HTTP
//! surface. Environment variables prefixed `CERCLE_` override file settings
//! (e.g. `CERCLE_PORT`, `CERCLE_IDENTITY__WEBHOOK_SECRET`).

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use cercle_api::{AppState, ServerConfig};
use cercle_core::signature::{SignatureScheme, WebhookVerifier};
use cercle_engine::{
  lifecycle::{Lifecycle, LifecycleConfig},
  metrics::Metrics,
  notify::LogNotifier,
  reconcile::Reconciler,
};
use cercle_providers::{
  IdentityClient, IdentityConfig, PaymentClient, PaymentConfig,
};
use cercle_store_sqlite::SqliteStore;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Cercle verification & payments server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CERCLE").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  // Provider clients.
  let identity = IdentityClient::new(IdentityConfig {
    base_url: server_cfg.identity.base_url.clone(),
    app_token: server_cfg.identity.app_token.clone(),
    secret_key: server_cfg.identity.secret_key.clone(),
    ..IdentityConfig::default()
  })
  .map_err(|e| anyhow::anyhow!("identity client: {e}"))?;

  let payments = PaymentClient::new(PaymentConfig {
    base_url: server_cfg.payment.base_url.clone(),
    api_key: server_cfg.payment.api_key.clone(),
    currency: server_cfg.payment.currency.clone(),
    ..PaymentConfig::default()
  })
  .map_err(|e| anyhow::anyhow!("payment client: {e}"))?;

  // Metrics registry: constructed once here, shared by both services.
  let metrics = Arc::new(Metrics::new());

  let reconciler = Arc::new(Reconciler::new(
    store.clone(),
    Arc::new(LogNotifier),
    metrics.clone(),
    WebhookVerifier::new(
      server_cfg.identity.webhook_secret.clone(),
      SignatureScheme::HexDigest,
      server_cfg.identity.signature_mode,
    ),
    WebhookVerifier::new(
      server_cfg.payment.webhook_secret.clone(),
      SignatureScheme::Stamped,
      server_cfg.payment.signature_mode,
    ),
  ));

  let lifecycle = Arc::new(Lifecycle::new(
    store,
    Arc::new(identity),
    Arc::new(payments),
    metrics.clone(),
    LifecycleConfig {
      level_name:       server_cfg.identity.level_name.clone(),
      token_ttl_secs:   server_cfg.identity.token_ttl_secs,
      min_amount_minor: server_cfg.payment.min_amount_minor,
      max_amount_minor: server_cfg.payment.max_amount_minor,
    },
  ));

  let state = AppState { reconciler, lifecycle, metrics };
  let app = cercle_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

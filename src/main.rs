use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use medrec_core::config::{
    admin_from_env_value, confirmation_delay_from_env_value, grant_duration_from_env_value,
    text_from_env_value,
};
use medrec_core::constants::{
    DEFAULT_ACCESS_PURPOSE, DEFAULT_CONTENT_DIR, DEFAULT_GRANT_DURATION_DAYS,
    DEFAULT_LEDGER_STATE_FILE, DEFAULT_RECORD_CATEGORY,
};
use medrec_core::{Address, ContentStoreService, CoreConfig, DevLedger};

/// Resolves the core configuration from the environment, once, at start-up.
fn resolve_config() -> anyhow::Result<CoreConfig> {
    let ledger_state = std::env::var("MEDREC_LEDGER_STATE")
        .unwrap_or_else(|_| DEFAULT_LEDGER_STATE_FILE.into());
    let content_dir =
        std::env::var("MEDREC_CONTENT_DIR").unwrap_or_else(|_| DEFAULT_CONTENT_DIR.into());

    let cfg = CoreConfig::new(
        text_from_env_value(
            std::env::var("MEDREC_RECORD_CATEGORY").ok(),
            DEFAULT_RECORD_CATEGORY,
        )?,
        text_from_env_value(
            std::env::var("MEDREC_ACCESS_PURPOSE").ok(),
            DEFAULT_ACCESS_PURPOSE,
        )?,
        grant_duration_from_env_value(
            std::env::var("MEDREC_GRANT_DURATION_DAYS").ok(),
            DEFAULT_GRANT_DURATION_DAYS,
        )?,
        PathBuf::from(content_dir),
    )?
    .with_ledger_state_path(PathBuf::from(ledger_state))
    .with_confirmation_delay(confirmation_delay_from_env_value(
        std::env::var("MEDREC_CONFIRMATION_DELAY_MS").ok(),
    )?)
    .with_admin(admin_from_env_value(std::env::var("MEDREC_ADMIN").ok())?);

    Ok(cfg)
}

/// Main entry point for the MedRec application
///
/// Opens the development ledger and the content store, then serves the REST API
/// (with Swagger UI at `/swagger-ui`).
///
/// # Environment Variables
/// - `MEDREC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MEDREC_LEDGER_STATE`: ledger state file (default: "ledger.yaml")
/// - `MEDREC_CONTENT_DIR`: content store directory (default: "content_store")
/// - `MEDREC_CONFIRMATION_DELAY_MS`: simulated block time (default: 0)
/// - `MEDREC_GRANT_DURATION_DAYS`: preselected grant duration of new sessions (default: 1)
/// - `MEDREC_ADMIN`: admin identity of a new ledger (default: the zero address)
///
/// # Errors
/// Returns an error if:
/// - the configuration is invalid,
/// - the ledger state or content store cannot be opened, or
/// - the server address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medrec=info".parse()?)
                .add_directive("medrec_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr: SocketAddr = std::env::var("MEDREC_REST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()?;

    let cfg = Arc::new(resolve_config()?);
    let ledger = DevLedger::open(&cfg, Address::ZERO)?;
    let content = ContentStoreService::new(cfg.content_store_dir())?;

    tracing::info!(
        "++ Ledger admin {}, content store at {}",
        ledger.admin()?,
        content.root_directory().display()
    );
    tracing::info!("++ Starting MedRec REST on {}", rest_addr);

    let app = router(AppState::new(cfg, ledger, Arc::new(content)));

    let listener = tokio::net::TcpListener::bind(rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Escrow engine process
//!
//! Loads `config/<env>.yaml`, opens the ledger store and runs the sweep
//! worker until Ctrl-C.
//!
//! ```text
//! ┌──────────┐    ┌──────────────┐    ┌──────────────┐
//! │  Config  │───▶│ LedgerStore  │───▶│ SweepWorker  │
//! │  (YAML)  │    │ (PG or mem)  │    │ (interval)   │
//! └──────────┘    └──────────────┘    └──────────────┘
//! ```

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use escrow_engine::breaker::BreakerRegistry;
use escrow_engine::clock::SystemClock;
use escrow_engine::config::AppConfig;
use escrow_engine::db::Database;
use escrow_engine::services::EscrowServices;
use escrow_engine::store::schema::init_schema;
use escrow_engine::store::{
    LedgerStore, MemoryDirectory, MemoryStore, PgStore, PgUserDirectory, UserDirectory,
};
use escrow_engine::sweeper::SweepWorker;
use escrow_engine::wallet::Argon2PinHasher;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

async fn open_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn LedgerStore>, Arc<dyn UserDirectory>)> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            init_schema(db.pool()).await.context("Failed to initialise schema")?;
            tracing::info!("Using PostgreSQL ledger store");
            Ok((
                Arc::new(PgStore::new(db.pool().clone())),
                Arc::new(PgUserDirectory::new(db.pool().clone())),
            ))
        }
        None => {
            tracing::warn!("No postgres_url configured, using in-memory ledger store");
            Ok((Arc::new(MemoryStore::new()), Arc::new(MemoryDirectory::new())))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env).with_context(|| format!("Failed to load config for env '{}'", env))?;
    let _log_guard = escrow_engine::logging::init_logging(&config);

    tracing::info!("Starting escrow engine in {} mode", env);

    for name in config.breakers.keys() {
        let breaker = BreakerRegistry::global().get_or_create(name, config.breaker(name));
        tracing::info!(
            breaker = %breaker.name(),
            max_failures = breaker.config().max_failures,
            reset_timeout_ms = breaker.config().reset_timeout_ms,
            "Circuit breaker registered"
        );
    }

    let (store, users) = open_store(&config).await?;
    let hasher = Arc::new(Argon2PinHasher::from_config(&config.pin)?);
    let services = EscrowServices::build(store, users, Arc::new(SystemClock), hasher, &config);

    let worker = SweepWorker::new(
        services.transfers.clone(),
        services.disputes.clone(),
        Duration::from_secs(config.sweeper.interval_secs.max(1)),
    );
    worker
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await;

    Ok(())
}

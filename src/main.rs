//! Match Scheduler - Main Entry Point
//!
//! Adaptive refresh scheduler worker process. Exposes no network listener
//! of its own; see `lib.rs` module docs for the scheduling core.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use match_scheduler::apiclient::ApiClient;
use match_scheduler::config::Config;
use match_scheduler::lifecycle;
use match_scheduler::ratelimit::RateLimiterRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        database_url = %config.redacted_database_url(),
        api_key = %config.redacted_api_key(),
        "starting match scheduler"
    );

    if !config.queue_enabled {
        info!("QUEUE_ENABLED is false; exiting without starting the scheduler");
        return Ok(());
    }

    let limiters = RateLimiterRegistry::new(config.rate_limits);
    let api = Arc::new(ApiClient::new(config.api_key.clone(), limiters)?);

    lifecycle::run(config, api).await?;

    info!("match scheduler shut down cleanly");
    Ok(())
}

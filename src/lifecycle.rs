//! Lifecycle Controller (§4.8).
//!
//! Owns startup validation, store connection with retry, the worker
//! status row, signal handling, and the timeout-bounded shutdown
//! pipeline.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::apiclient::MatchHistoryApi;
use crate::config::Config;
use crate::driver::SchedulerDriver;
use crate::queue::QueueSet;
use crate::store::Store;

const CONNECT_MAX_ATTEMPTS: u32 = 3;
const CONNECT_BASE_DELAY: Duration = Duration::from_secs(2);

const DRIVER_STOP_BUDGET: Duration = Duration::from_secs(5);
const POOL_CLOSE_BUDGET: Duration = Duration::from_secs(10);

/// Connects to the store with exponential-backoff retry, max 3 attempts,
/// base 2 s (§4.8).
pub async fn connect_store_with_retry(config: &Config) -> Result<Store, crate::store::StoreError> {
    let mut attempt = 0u32;
    loop {
        match Store::connect(
            &config.database_url,
            config.pool_min_connections,
            config.pool_max_connections,
            config.pool_acquire_timeout,
        )
        .await
        {
            Ok(store) => return Ok(store),
            Err(e) if attempt + 1 < CONNECT_MAX_ATTEMPTS => {
                let mut rng = rand::thread_rng();
                let jitter: f64 = rng.gen_range(0.8..=1.2);
                let delay = CONNECT_BASE_DELAY.mul_f64(2f64.powi(attempt as i32) * jitter);
                tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "store connect failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Runs the full lifecycle: connects, seeds the queue, starts the driver
/// in the background, waits for a shutdown signal, then drains within the
/// §4.8 timeout budgets.
pub async fn run<A>(config: Config, api: Arc<A>) -> anyhow::Result<()>
where
    A: MatchHistoryApi + 'static,
{
    let store = connect_store_with_retry(&config).await?;
    store.set_worker_running(true, true).await.ok();

    let queue = Arc::new(QueueSet::new());
    seed_queue(&store, &queue).await?;

    let driver = Arc::new(SchedulerDriver::new(
        Arc::clone(&api),
        store.clone(),
        Arc::clone(&queue),
        config.intervals,
        config.batch_size,
        config.default_start_time,
    ));
    let stop_handle = driver.stop_handle();

    let driver_task = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.run().await })
    };

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining scheduler");

    // Stage 1: signal the driver to stop and give it up to
    // DRIVER_STOP_BUDGET to finish its in-flight account and exit.
    stop_handle.store(false, Ordering::Relaxed);
    let abort_handle = driver_task.abort_handle();
    match tokio::time::timeout(DRIVER_STOP_BUDGET, driver_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "driver task panicked"),
        Err(_) => {
            // Stage 2: it didn't stop in time; cancel it outright.
            // Expected-cancel is not an error (§4.8 step 2).
            tracing::warn!("driver did not stop within budget, cancelling task");
            abort_handle.abort();
        }
    }

    if let Err(e) = store.set_worker_running(false, false).await {
        tracing::warn!(error = %e, "failed to write final worker status");
    }
    let _ = store.append_worker_activity_log("info", "scheduler shut down cleanly").await;

    if tokio::time::timeout(POOL_CLOSE_BUDGET, store.pool().close())
        .await
        .is_err()
    {
        tracing::warn!("store pool close exceeded budget; forcing shutdown to proceed");
    }

    Ok(())
}

async fn seed_queue(store: &Store, queue: &QueueSet) -> Result<(), crate::store::StoreError> {
    let accounts = store.list_active_accounts_with_activity().await?;
    let now = chrono::Utc::now();

    for row in accounts {
        let counters = crate::scorer::ActivityCounters {
            games_today: row.counters.games_today.max(0) as u32,
            games_last_3_days: row.counters.games_last_3_days.max(0) as u32,
            games_last_7_days: row.counters.games_last_7_days.max(0) as u32,
            last_match_at: row.account.last_match_at,
        };
        let score = crate::scorer::calculate_score(&counters, now);

        queue.add(crate::queue::Entry {
            puuid: row.account.puuid,
            game_name: row.account.game_name,
            tag: row.account.tag,
            player_id: row.account.player_id,
            region: crate::apiclient::regions::RegionCode::parse(&row.account.region)
                .unwrap_or(crate::apiclient::regions::RegionCode::Euw),
            score,
            tier: row.account.activity_tier,
            next_fetch_at: row.account.next_fetch_at.max(now),
            last_fetched_at: row.account.last_fetched_at,
            last_match_at: row.account.last_match_at,
            consecutive_empty_fetches: row.account.consecutive_empty_fetches,
        });
    }

    tracing::info!(count = queue.len(), "queue initialized from store");
    Ok(())
}

/// Waits for SIGINT or (on unix) SIGTERM (§4.8, §6).
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

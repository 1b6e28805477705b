//! Scheduler Driver (§4.7).
//!
//! One tick: pop a ready batch per region in parallel, then process each
//! region's batch sequentially (preserving that region's rate-limit
//! budget) while regions themselves run concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::apiclient::regions::RegionCode;
use crate::apiclient::MatchHistoryApi;
use crate::queue::QueueSet;
use crate::scorer::{ActivityCounters, IntervalTable};
use crate::store::Store;
use crate::worker;

const MIN_SLEEP: Duration = Duration::from_millis(100);
const MAX_SLEEP: Duration = Duration::from_secs(5);

/// Runs ticks until `running` is cleared, honoring §4.7's clamp-sleep
/// pacing and §5's per-region-serial/cross-region-parallel rule.
pub struct SchedulerDriver<A: MatchHistoryApi> {
    api: Arc<A>,
    store: Store,
    queue: Arc<QueueSet>,
    intervals: IntervalTable,
    batch_size: usize,
    default_start_time: i64,
    running: Arc<AtomicBool>,
}

impl<A: MatchHistoryApi + 'static> SchedulerDriver<A> {
    pub fn new(
        api: Arc<A>,
        store: Store,
        queue: Arc<QueueSet>,
        intervals: IntervalTable,
        batch_size: usize,
        default_start_time: i64,
    ) -> Self {
        Self {
            api,
            store,
            queue,
            intervals,
            batch_size,
            default_start_time,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clone of the stop flag the lifecycle controller can flip from
    /// outside the run loop.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Runs ticks until stopped. Each tick's region fan-out is a set of
    /// spawned tasks joined before the sleep, matching §4.7 step 4
    /// ("after all regions return").
    pub async fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            self.tick().await;

            if !self.running.load(Ordering::Relaxed) {
                break;
            }

            let sleep = self
                .queue
                .soonest_next_fetch()
                .map(|soonest| {
                    let delta = soonest.signed_duration_since(Utc::now());
                    delta.to_std().unwrap_or(Duration::ZERO)
                })
                .unwrap_or(MAX_SLEEP)
                .clamp(MIN_SLEEP, MAX_SLEEP);

            tokio::time::sleep(sleep).await;
        }
    }

    async fn tick(&self) {
        let regions = RegionCode::all();
        let mut handles = Vec::with_capacity(regions.len());

        for region in regions {
            let api = Arc::clone(&self.api);
            let store = self.store.clone();
            let queue = Arc::clone(&self.queue);
            let intervals = self.intervals;
            let batch_size = self.batch_size;
            let default_start_time = self.default_start_time;

            handles.push(tokio::spawn(async move {
                run_region_batch(
                    &api,
                    &store,
                    &queue,
                    region,
                    batch_size,
                    intervals,
                    default_start_time,
                )
                .await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "region task panicked");
            }
        }
    }
}

/// Processes one region's ready batch sequentially (§4.7 step 2).
async fn run_region_batch<A: MatchHistoryApi>(
    api: &A,
    store: &Store,
    queue: &QueueSet,
    region: RegionCode,
    batch_size: usize,
    intervals: IntervalTable,
    default_start_time: i64,
) {
    let now = Utc::now();
    let batch = queue.pop_ready(region, now, batch_size);
    if batch.is_empty() {
        return;
    }

    tracing::debug!(%region, count = batch.len(), "processing ready batch");

    for entry in batch {
        let outcome = worker::process_entry(
            api,
            store,
            |puuid| queue.is_tracked(puuid),
            default_start_time,
            &entry,
        )
        .await;

        // Fresh counters require a real per-account read (§4.1, §4.5); a
        // cycle with zero new matches never reads them and falls back to
        // plain decay in `reschedule`.
        let fresh_counters = if outcome.new_matches > 0 {
            let today = Utc::now().date_naive();
            match store.get_account_activity_data(&entry.puuid, today).await {
                Ok(row) => Some(ActivityCounters {
                    games_today: row.games_today.max(0) as u32,
                    games_last_3_days: row.games_last_3_days.max(0) as u32,
                    games_last_7_days: row.games_last_7_days.max(0) as u32,
                    last_match_at: outcome.latest_match_at,
                }),
                Err(e) => {
                    tracing::error!(error = %e, "failed to read fresh activity counters");
                    None
                }
            }
        } else {
            None
        };

        let puuid = entry.puuid.clone();
        let reschedule_now = Utc::now();
        queue.reschedule(
            entry,
            outcome.new_matches,
            fresh_counters,
            outcome.latest_match_at,
            &intervals,
            reschedule_now,
        );

        if let Some(updated) = queue.entry_snapshot(&puuid) {
            let _ = store
                .update_account_priority(
                    &updated.puuid,
                    updated.score,
                    updated.tier,
                    updated.next_fetch_at,
                    updated.consecutive_empty_fetches,
                )
                .await;
        }
    }
}

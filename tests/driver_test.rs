//! Scheduler driver integration test (§8 scenario 5: "parallel regions").
//!
//! Queues two regions with more ready accounts than fit in one batch and
//! asserts each region's batch is bounded by `batch_size` independently of
//! the other, mirroring the teacher's `tests/ratelimit_test.rs` style of
//! exercising real concurrency rather than mocking it away.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use match_scheduler::apiclient::error::ApiError;
use match_scheduler::apiclient::regions::RegionCode;
use match_scheduler::apiclient::{AccountByRiotId, LeagueEntry, MatchDetail, MatchHistoryApi};
use match_scheduler::driver::SchedulerDriver;
use match_scheduler::queue::{Entry, QueueSet};
use match_scheduler::scorer::{IntervalTable, Tier};
use match_scheduler::store::Store;
use sqlx::PgPool;

struct CountingApi {
    calls: Mutex<HashMap<RegionCode, u32>>,
}

impl CountingApi {
    fn new() -> Self {
        Self { calls: Mutex::new(HashMap::new()) }
    }

    fn count(&self, region: RegionCode) -> u32 {
        *self.calls.lock().unwrap().get(&region).unwrap_or(&0)
    }
}

impl MatchHistoryApi for CountingApi {
    async fn match_ids(
        &self,
        region: RegionCode,
        _puuid: &str,
        _queue_id: u32,
        _start_time: i64,
        _count: u32,
    ) -> Result<Vec<String>, ApiError> {
        *self.calls.lock().unwrap().entry(region).or_insert(0) += 1;
        Ok(vec![])
    }

    async fn match_detail(&self, _region: RegionCode, _match_id: &str) -> Result<MatchDetail, ApiError> {
        unreachable!("match_ids never returns an id in this scenario")
    }

    async fn league_entries(&self, _region: RegionCode, _puuid: &str) -> Result<Vec<LeagueEntry>, ApiError> {
        Ok(vec![])
    }

    async fn account_by_riot_id(
        &self,
        _region: RegionCode,
        _game_name: &str,
        _tag: &str,
    ) -> Result<AccountByRiotId, ApiError> {
        Ok(AccountByRiotId { puuid: String::new() })
    }
}

fn ready_entry(puuid: &str, region: RegionCode) -> Entry {
    Entry {
        puuid: puuid.to_string(),
        game_name: puuid.to_string(),
        tag: "TAG".to_string(),
        player_id: 1,
        region,
        score: 0.0,
        tier: Tier::Inactive,
        next_fetch_at: Utc::now() - chrono::Duration::seconds(1),
        last_fetched_at: None,
        last_match_at: None,
        consecutive_empty_fetches: 0,
    }
}

#[sqlx::test]
async fn parallel_regions_each_drain_their_own_batch(pool: PgPool) {
    let store = Store::from_pool(pool, 20);
    let queue = Arc::new(QueueSet::new());
    for i in 0..20 {
        queue.add(ready_entry(&format!("euw-{i}"), RegionCode::Euw));
        queue.add(ready_entry(&format!("na-{i}"), RegionCode::Na));
    }

    let api = Arc::new(CountingApi::new());
    let driver = Arc::new(SchedulerDriver::new(
        Arc::clone(&api),
        store,
        Arc::clone(&queue),
        IntervalTable::default(),
        20,
        0,
    ));
    let stop_handle = driver.stop_handle();

    let driver_task = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.run().await })
    };

    // One tick is enough to drain both regions' 20-account batches; give it
    // a moment, then stop the driver before its next (far-future) tick.
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop_handle.store(false, Ordering::Relaxed);

    // The driver may already be asleep inside its clamped inter-tick sleep
    // (up to 5s); give it enough budget to wake, see the flag, and exit.
    tokio::time::timeout(Duration::from_secs(8), driver_task)
        .await
        .expect("driver did not stop in time")
        .expect("driver task panicked");

    assert_eq!(api.count(RegionCode::Euw), 20, "every ready euw account was processed");
    assert_eq!(api.count(RegionCode::Na), 20, "every ready na account was processed");
    assert_eq!(api.count(RegionCode::Kr), 0);
    assert_eq!(api.count(RegionCode::Br), 0);
}

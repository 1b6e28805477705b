//! Relational store (§3, §4.4).
//!
//! Pools connections with `sqlx::PgPoolOptions` the way the teacher's
//! `db::connect` does, but adds an explicit `tokio::sync::Semaphore` sized
//! five below the pool's max so a burst of concurrent region ticks queues
//! in-process rather than starving the pool's own connection waiters.

pub mod error;
pub mod models;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub use error::StoreError;
pub use models::*;

const SEMAPHORE_HEADROOM: u32 = 5;

/// A checked-out transaction plus the semaphore permit that bounds it.
/// Dropping without calling [`StoreTransaction::commit`] rolls back.
pub struct StoreTransaction {
    _permit: OwnedSemaphorePermit,
    pub tx: Transaction<'static, Postgres>,
}

impl StoreTransaction {
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::classify)
    }
}

/// Handle to the connection pool plus the in-process concurrency gate.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    semaphore: Arc<Semaphore>,
}

impl Store {
    /// Connects with the given bounds, running pending migrations before
    /// returning (§6 ambient stack, grounded on the teacher's
    /// `db::connect` + `db::run_migrations` pairing).
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(StoreError::classify)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::classify(sqlx::Error::Migrate(Box::new(e))))?;

        let permits = max_connections.saturating_sub(SEMAPHORE_HEADROOM).max(1);
        Ok(Self {
            pool,
            semaphore: Arc::new(Semaphore::new(permits as usize)),
        })
    }

    /// Wraps an already-open pool, skipping migrations. Used by tests that
    /// stand up their own schema.
    pub fn from_pool(pool: PgPool, max_connections: u32) -> Self {
        let permits = max_connections.saturating_sub(SEMAPHORE_HEADROOM).max(1);
        Self {
            pool,
            semaphore: Arc::new(Semaphore::new(permits as usize)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Acquires a semaphore permit and begins a transaction. Callers
    /// `commit()` explicitly; dropping the value rolls back (§4.4: "all
    /// writes for a single match happen inside one transaction").
    pub async fn begin(&self) -> Result<StoreTransaction, StoreError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        let tx = self.pool.begin().await.map_err(StoreError::classify)?;
        Ok(StoreTransaction { _permit: permit, tx })
    }

    /// Acquires a permit for a single non-transactional operation.
    async fn permit(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }

    pub async fn list_active_accounts_with_activity(
        &self,
    ) -> Result<Vec<AccountWithActivity>, StoreError> {
        let _permit = self.permit().await;
        queries::list_active_accounts_with_activity(&self.pool)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn update_account_priority(
        &self,
        puuid: &str,
        score: f64,
        tier: ActivityTier,
        next_fetch_at: chrono::DateTime<chrono::Utc>,
        consecutive_empty_fetches: i32,
    ) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::update_account_priority(
            &self.pool,
            puuid,
            score,
            tier,
            next_fetch_at,
            consecutive_empty_fetches,
        )
        .await
        .map_err(StoreError::classify)
    }

    pub async fn match_exists(&self, match_id: &str) -> Result<bool, StoreError> {
        let _permit = self.permit().await;
        queries::match_exists(&self.pool, match_id)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn get_account_activity_data(
        &self,
        puuid: &str,
        today: chrono::NaiveDate,
    ) -> Result<ActivityCounterRow, StoreError> {
        let _permit = self.permit().await;
        queries::get_account_activity_data(&self.pool, puuid, today)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn update_account_last_match(
        &self,
        puuid: &str,
        latest_match_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::update_account_last_match(&self.pool, puuid, latest_match_at)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn recent_outcomes(&self, puuid: &str, limit: i64) -> Result<Vec<bool>, StoreError> {
        let _permit = self.permit().await;
        queries::recent_outcomes(&self.pool, puuid, limit)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn upsert_streak(&self, streak: &StreakRecord) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::upsert_streak(&self.pool, streak)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn upsert_champion_aggregate(&self, agg: &ChampionAggregate) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::upsert_champion_aggregate(&self.pool, agg)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn upsert_synergy_batch(
        &self,
        puuid: &str,
        peers: &[(String, SynergyDelta)],
    ) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::upsert_synergy_batch(&self.pool, puuid, peers)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn upsert_today_rank_only(
        &self,
        puuid: &str,
        date: chrono::NaiveDate,
        rank_tier: Option<&str>,
        rank_division: Option<&str>,
        league_points: Option<i32>,
    ) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::upsert_today_rank_only(&self.pool, puuid, date, rank_tier, rank_division, league_points)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn set_worker_current_account(&self, tag: Option<&str>) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::set_worker_current_account(&self.pool, tag)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn set_worker_running(&self, is_running: bool, reset_counters: bool) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::set_worker_running(&self.pool, is_running, reset_counters)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn record_worker_error(&self, message: &str) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::record_worker_error(&self.pool, message)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn increment_worker_session_counters(
        &self,
        accounts_delta: i64,
        matches_delta: i64,
    ) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::increment_worker_session_counters(&self.pool, accounts_delta, matches_delta)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn get_worker_status(&self) -> Result<WorkerStatus, StoreError> {
        let _permit = self.permit().await;
        queries::get_worker_status(&self.pool)
            .await
            .map_err(StoreError::classify)
    }

    pub async fn append_worker_activity_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        let _permit = self.permit().await;
        queries::append_worker_activity_log(&self.pool, level, message)
            .await
            .map_err(StoreError::classify)
    }
}

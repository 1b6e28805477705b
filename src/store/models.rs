//! Store row types (§3).
//!
//! Mirrors the teacher's `db/models.rs`: one `#[derive(FromRow)]` struct per
//! table, doc comment per field, `chrono` timestamps, `sqlx::Type` enums for
//! Postgres-native enum columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub use crate::scorer::Tier as ActivityTier;

/// An external game account eligible for scheduling.
///
/// Only accounts with a non-null `puuid` belonging to an active player are
/// surfaced by the store's bulk read (§3 invariant).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    /// Opaque 78-character external account identifier; primary key.
    pub puuid: String,
    /// Riot ID game name.
    pub game_name: String,
    /// Riot ID tag line.
    pub tag: String,
    /// Region code (`EUW`, `NA`, `KR`, `BR`).
    pub region: String,
    /// Internal player id this account belongs to.
    pub player_id: i64,
    /// Timestamp of the most recent observed match.
    pub last_match_at: Option<DateTime<Utc>>,
    /// Timestamp the scheduler last acted on this account.
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Current activity score in `[0, 100]`.
    pub activity_score: f64,
    /// Current activity tier, a pure function of `activity_score`.
    pub activity_tier: ActivityTier,
    /// Consecutive empty fetches since the last non-empty one.
    pub consecutive_empty_fetches: i32,
    /// When the scheduler should next poll this account.
    pub next_fetch_at: DateTime<Utc>,
}

/// The activity-counter projection read alongside each [`Account`] for
/// score recomputation (§4.4: "bulk read ... with the activity-counter
/// projection").
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct ActivityCounterRow {
    pub games_today: i32,
    pub games_last_3_days: i32,
    pub games_last_7_days: i32,
}

/// An account row joined with its activity-counter projection, as returned
/// by the bulk account read.
#[derive(Debug, Clone)]
pub struct AccountWithActivity {
    pub account: Account,
    pub counters: ActivityCounterRow,
}

/// A match, immutable after insert, deduplicated on `match_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i32,
    pub queue_id: i32,
    pub version: String,
}

/// One participant's stat line in a match. Exactly ten rows exist per
/// match (§3 invariant).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ParticipantStat {
    pub match_id: String,
    pub puuid: String,
    pub champion_id: i32,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub cs: i32,
    pub vision_score: i32,
    pub damage_dealt: i32,
    pub gold_earned: i32,
    /// Normalized via [`crate::worker::normalize_role`]; `None` allowed.
    pub role: Option<String>,
    pub team_id: i32,
    pub win: bool,
}

/// One row per account; current streak is signed, `abs <= 100`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StreakRecord {
    pub puuid: String,
    pub current_streak: i32,
    pub best_streak: i32,
    pub best_streak_start: Option<DateTime<Utc>>,
    pub best_streak_end: Option<DateTime<Utc>>,
    pub worst_streak: i32,
    pub worst_streak_start: Option<DateTime<Utc>>,
    pub worst_streak_end: Option<DateTime<Utc>>,
}

/// One row per (account, champion).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChampionAggregate {
    pub puuid: String,
    pub champion_id: i32,
    pub games: i32,
    pub wins: i32,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
}

/// One row per ordered pair (account, peer) of tracked accounts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SynergyEdge {
    pub puuid: String,
    pub peer_puuid: String,
    pub games_together: i32,
    pub wins_together: i32,
    pub games_against: i32,
    pub wins_against: i32,
}

/// One per-match increment to a synergy edge, batched by the caller into a
/// single array-parameterized upsert (§4.4 invariant).
#[derive(Debug, Clone, Copy)]
pub struct SynergyDelta {
    pub together: bool,
    pub win: bool,
}

/// The process-wide singleton worker status row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub is_running: bool,
    pub current_account_tag: Option<String>,
    pub session_accounts_processed: i64,
    pub session_matches_ingested: i64,
    pub last_error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            current_account_tag: None,
            session_accounts_processed: 0,
            session_matches_ingested: 0,
            last_error_message: None,
            updated_at: Utc::now(),
        }
    }
}

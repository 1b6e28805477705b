//! Queue entry type (§4.5).

use chrono::{DateTime, Utc};

use crate::apiclient::regions::RegionCode;
use crate::scorer::Tier;

/// A scheduled account, ordered by `next_fetch_at` for the per-region
/// min-heap. Equality and hashing are on `puuid` alone so the same entry
/// can be looked up regardless of how its priority fields have moved.
#[derive(Debug, Clone)]
pub struct Entry {
    pub puuid: String,
    pub game_name: String,
    pub tag: String,
    pub player_id: i64,
    pub region: RegionCode,
    pub score: f64,
    pub tier: Tier,
    pub next_fetch_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_match_at: Option<DateTime<Utc>>,
    pub consecutive_empty_fetches: i32,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.puuid == other.puuid
    }
}

impl Eq for Entry {}

impl std::hash::Hash for Entry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.puuid.hash(state);
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.next_fetch_at.cmp(&other.next_fetch_at)
    }
}

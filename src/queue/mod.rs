//! Per-region priority queues (§4.5).
//!
//! One min-heap per region keyed by `next_fetch_at`, guarded by its own
//! `Mutex` so regions never contend with each other, plus a process-wide
//! `puuid -> Entry` index (`dashmap`, following the teacher's presence-map
//! convention) that holds the canonical, current copy of every entry.
//!
//! Heap nodes only carry a `(next_fetch_at, puuid)` pair. Rescheduling an
//! entry doesn't touch the heap in place — it pushes a new node and leaves
//! the old one behind as a "stale" duplicate. `pop_ready` discards stale
//! duplicates by comparing the popped timestamp against the index's
//! current value for that puuid (lazy deletion), so the heap never needs
//! a decrease-key operation.

pub mod entry;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::apiclient::regions::RegionCode;
use crate::scorer::{self, IntervalTable, TierThresholds};
pub use entry::Entry;

struct RegionQueue {
    heap: Mutex<BinaryHeap<Reverse<(DateTime<Utc>, String)>>>,
}

impl RegionQueue {
    fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }
}

/// The full set of per-region queues plus the cross-region puuid index.
pub struct QueueSet {
    regions: DashMap<RegionCode, RegionQueue>,
    index: DashMap<String, Entry>,
}

impl Default for QueueSet {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueSet {
    pub fn new() -> Self {
        Self {
            regions: DashMap::new(),
            index: DashMap::new(),
        }
    }

    fn region_queue(
        &self,
        region: RegionCode,
    ) -> dashmap::mapref::one::RefMut<'_, RegionCode, RegionQueue> {
        self.regions.entry(region).or_insert_with(RegionQueue::new)
    }

    /// Seeds the queue from a full account snapshot, e.g. at startup
    /// (§4.5 `initialize`).
    pub fn add(&self, entry: Entry) {
        let rq = self.region_queue(entry.region);
        rq.heap
            .lock()
            .expect("queue mutex poisoned")
            .push(Reverse((entry.next_fetch_at, entry.puuid.clone())));
        self.index.insert(entry.puuid.clone(), entry);
    }

    /// Pops up to `max_count` entries for `region` whose `next_fetch_at`
    /// is at or before `now`, atomically under the region's single lock so
    /// no two callers can claim the same entry (§4.5 invariant).
    pub fn pop_ready(&self, region: RegionCode, now: DateTime<Utc>, max_count: usize) -> Vec<Entry> {
        let Some(rq) = self.regions.get(&region) else {
            return Vec::new();
        };
        let mut heap = rq.heap.lock().expect("queue mutex poisoned");
        let mut out = Vec::with_capacity(max_count);

        while out.len() < max_count {
            let Some(Reverse((ts, puuid))) = heap.peek().cloned() else {
                break;
            };
            if ts > now {
                break;
            }
            heap.pop();

            match self.index.get(&puuid) {
                Some(current) if current.next_fetch_at == ts => {
                    out.push(current.clone());
                }
                _ => {
                    // Stale duplicate left behind by a prior reschedule; drop it.
                }
            }
        }
        out
    }

    /// Applies the outcome of one fetch cycle to an entry: recomputes its
    /// score/tier/interval and pushes a fresh heap node (§4.5: "if
    /// `new_matches_count > 0` and fresh counters were read, invoke the full
    /// formula; else apply `boost(new_matches_count)` or `decay()`" — never
    /// both on the same cycle).
    pub fn reschedule(
        &self,
        mut entry: Entry,
        new_matches: u32,
        fresh_counters: Option<scorer::ActivityCounters>,
        latest_match_at: Option<DateTime<Utc>>,
        intervals: &IntervalTable,
        now: DateTime<Utc>,
    ) {
        if new_matches == 0 {
            entry.consecutive_empty_fetches = entry.consecutive_empty_fetches.saturating_add(1);
            entry.score = scorer::decay(entry.score);
        } else {
            entry.consecutive_empty_fetches = 0;
            entry.last_match_at = latest_match_at.or(entry.last_match_at).or(Some(now));
            entry.score = match fresh_counters {
                Some(counters) => scorer::calculate_score(&counters, now),
                None => scorer::boost(entry.score, new_matches),
            };
        }

        entry.tier = TierThresholds::default().tier_for(entry.score);
        entry.last_fetched_at = Some(now);

        let tier_intervals = intervals.for_tier(entry.tier);
        let interval = scorer::next_interval(
            tier_intervals,
            entry.consecutive_empty_fetches.max(0) as u32,
        );
        entry.next_fetch_at = now
            + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());

        let rq = self.region_queue(entry.region);
        rq.heap
            .lock()
            .expect("queue mutex poisoned")
            .push(Reverse((entry.next_fetch_at, entry.puuid.clone())));
        self.index.insert(entry.puuid.clone(), entry);
    }

    /// The earliest `next_fetch_at` across every region's canonical
    /// entries, used to size the driver's sleep between ticks (§4.7).
    pub fn soonest_next_fetch(&self) -> Option<DateTime<Utc>> {
        self.index.iter().map(|e| e.next_fetch_at).min()
    }

    /// A snapshot of the current canonical entry for `puuid`, if tracked.
    #[must_use]
    pub fn entry_snapshot(&self, puuid: &str) -> Option<Entry> {
        self.index.get(puuid).map(|e| e.clone())
    }

    /// `true` if `puuid` belongs to a currently tracked (queued) account,
    /// used by the ingestion worker to decide which match participants
    /// earn a synergy edge (§4.6 step "transactional ingest").
    #[must_use]
    pub fn is_tracked(&self, puuid: &str) -> bool {
        self.index.contains_key(puuid)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::Tier;
    use chrono::TimeZone;

    fn entry(puuid: &str, region: RegionCode, secs: i64) -> Entry {
        Entry {
            puuid: puuid.to_string(),
            game_name: "g".into(),
            tag: "t".into(),
            player_id: 1,
            region,
            score: 50.0,
            tier: Tier::Active,
            next_fetch_at: Utc.timestamp_opt(secs, 0).unwrap(),
            last_fetched_at: None,
            last_match_at: None,
            consecutive_empty_fetches: 0,
        }
    }

    #[test]
    fn pop_ready_respects_max_count_and_time() {
        let qs = QueueSet::new();
        qs.add(entry("a", RegionCode::Euw, 100));
        qs.add(entry("b", RegionCode::Euw, 200));
        qs.add(entry("c", RegionCode::Euw, 300));

        let now = Utc.timestamp_opt(250, 0).unwrap();
        let popped = qs.pop_ready(RegionCode::Euw, now, 10);
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].puuid, "a");
        assert_eq!(popped[1].puuid, "b");
    }

    #[test]
    fn pop_ready_never_returns_the_same_entry_twice() {
        let qs = QueueSet::new();
        qs.add(entry("a", RegionCode::Euw, 100));
        let now = Utc.timestamp_opt(200, 0).unwrap();

        let first = qs.pop_ready(RegionCode::Euw, now, 10);
        assert_eq!(first.len(), 1);
        let second = qs.pop_ready(RegionCode::Euw, now, 10);
        assert!(second.is_empty());
    }

    #[test]
    fn regions_are_independent() {
        let qs = QueueSet::new();
        qs.add(entry("a", RegionCode::Euw, 100));
        qs.add(entry("b", RegionCode::Na, 100));

        let now = Utc.timestamp_opt(200, 0).unwrap();
        assert_eq!(qs.pop_ready(RegionCode::Euw, now, 10).len(), 1);
        assert_eq!(qs.pop_ready(RegionCode::Kr, now, 10).len(), 0);
    }

    #[test]
    fn reschedule_leaves_no_reachable_stale_duplicate() {
        let qs = QueueSet::new();
        let e = entry("a", RegionCode::Euw, 100);
        qs.add(e.clone());

        let intervals = IntervalTable::default();
        let now = Utc.timestamp_opt(100, 0).unwrap();
        qs.reschedule(e, 1, None, Some(now), &intervals, now);

        // The original (100s) node is now stale; pop_ready at t=100 must not
        // return anything because the canonical entry moved into the future.
        let popped = qs.pop_ready(RegionCode::Euw, now, 10);
        assert!(popped.is_empty());
    }

    #[test]
    fn reschedule_with_fresh_counters_uses_the_full_formula_alone() {
        let qs = QueueSet::new();
        let mut e = entry("a", RegionCode::Euw, 100);
        e.score = 10.0;
        qs.add(e.clone());

        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let counters = scorer::ActivityCounters {
            games_today: 8,
            games_last_3_days: 22,
            games_last_7_days: 50,
            last_match_at: Some(now),
        };
        qs.reschedule(e, 2, Some(counters), Some(now), &IntervalTable::default(), now);

        let updated = qs.entry_snapshot("a").unwrap();
        let full_formula_score = scorer::calculate_score(&counters, now);
        assert_eq!(updated.score, full_formula_score, "boost must not stack on top of the full formula");
    }

    #[test]
    fn reschedule_without_fresh_counters_boosts_the_prior_score() {
        let qs = QueueSet::new();
        let mut e = entry("a", RegionCode::Euw, 100);
        e.score = 10.0;
        qs.add(e.clone());

        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        qs.reschedule(e, 2, None, Some(now), &IntervalTable::default(), now);

        let updated = qs.entry_snapshot("a").unwrap();
        assert_eq!(updated.score, 20.0, "boost(+5 per match, capped at +20) applied to the prior score alone");
    }

    #[test]
    fn reschedule_on_empty_fetch_only_decays_and_ignores_fresh_counters() {
        let qs = QueueSet::new();
        let mut e = entry("a", RegionCode::Euw, 100);
        e.score = 50.0;
        qs.add(e.clone());

        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let counters = scorer::ActivityCounters {
            games_today: 8,
            games_last_3_days: 22,
            games_last_7_days: 50,
            last_match_at: Some(now),
        };
        // Even if fresh counters were somehow passed in, an empty fetch must
        // only decay the prior score, never apply the full formula.
        qs.reschedule(e, 0, Some(counters), None, &IntervalTable::default(), now);

        let updated = qs.entry_snapshot("a").unwrap();
        assert_eq!(updated.score, 47.5, "decay() applies 0.95x to the prior score regardless of fresh_counters");
        assert_eq!(updated.consecutive_empty_fetches, 1);
    }
}

//! Activity Scorer
//!
//! Pure, side-effect-free mapping from an account's recent activity counters
//! to a score in `[0, 100]`, and from a score to a coarse [`Tier`]. Nothing
//! in this module touches the network or the store; every function is a
//! plain computation over its arguments and (where needed) the current
//! wall-clock time, so it can be exercised directly in unit tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse activity classification used to choose a refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_tier", rename_all = "lowercase")]
pub enum Tier {
    VeryActive,
    Active,
    Moderate,
    Inactive,
}

impl Tier {
    /// Stable string form used in logs and the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VeryActive => "very_active",
            Self::Active => "active",
            Self::Moderate => "moderate",
            Self::Inactive => "inactive",
        }
    }
}

/// Tier thresholds, validated strictly descending with a positive floor.
///
/// Loaded once at startup from configuration; see
/// [`TierThresholds::validate`].
#[derive(Debug, Clone, Copy)]
pub struct TierThresholds {
    pub very_active: f64,
    pub active: f64,
    pub moderate: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            very_active: 70.0,
            active: 40.0,
            moderate: 20.0,
        }
    }
}

impl TierThresholds {
    /// Validates the thresholds per spec: strictly descending, moderate > 0,
    /// all <= 100.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.moderate > 0.0) {
            return Err("moderate threshold must be strictly positive".into());
        }
        if !(self.very_active > self.active && self.active > self.moderate) {
            return Err(
                "tier thresholds must be strictly descending: very_active > active > moderate"
                    .into(),
            );
        }
        if self.very_active > 100.0 || self.active > 100.0 || self.moderate > 100.0 {
            return Err("tier thresholds must be <= 100".into());
        }
        Ok(())
    }

    #[must_use]
    pub fn tier_for(&self, score: f64) -> Tier {
        if score >= self.very_active {
            Tier::VeryActive
        } else if score >= self.active {
            Tier::Active
        } else if score >= self.moderate {
            Tier::Moderate
        } else {
            Tier::Inactive
        }
    }
}

/// Inputs to the score formula. A `None` `last_match_at` contributes zero
/// to the recency component.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityCounters {
    pub games_today: u32,
    pub games_last_3_days: u32,
    pub games_last_7_days: u32,
    pub last_match_at: Option<DateTime<Utc>>,
}

/// Computes the activity score (`§4.1`) against the current wall-clock time.
#[must_use]
pub fn calculate_score(counters: &ActivityCounters, now: DateTime<Utc>) -> f64 {
    let today_component = f64::from(counters.games_today * 10).min(35.0);
    let three_day_component = f64::from(counters.games_last_3_days * 2).min(20.0);

    let recency_component = match counters.last_match_at {
        Some(last) => {
            let hours_since = now.signed_duration_since(last).num_seconds().max(0) as f64 / 3600.0;
            30.0 * (-hours_since / 12.0).exp()
        }
        None => 0.0,
    };

    let weekly_component = if counters.games_last_7_days > 0 {
        (f64::from(counters.games_last_7_days) / 7.0 * 3.0).min(15.0)
    } else {
        0.0
    };

    let total = today_component + three_day_component + recency_component + weekly_component;
    total.clamp(0.0, 100.0)
}

/// Applies the empty-fetch decay: a 5% reduction, used only when fresh
/// counters are unavailable (§4.1).
#[must_use]
pub fn decay(score: f64) -> f64 {
    (score * 0.95).max(0.0)
}

/// Applies the successful-fetch boost: `+5` per new match, capped at `+20`,
/// used only when fresh counters are unavailable (§4.1).
#[must_use]
pub fn boost(score: f64, new_matches: u32) -> f64 {
    let increment = f64::from(new_matches * 5).min(20.0);
    (score + increment).min(100.0)
}

/// Per-tier base and max refresh intervals (minutes in configuration,
/// converted to `Duration` here).
#[derive(Debug, Clone, Copy)]
pub struct TierIntervals {
    pub base: Duration,
    pub max: Duration,
}

/// Base/max interval table for all four tiers (§4.5 defaults).
#[derive(Debug, Clone, Copy)]
pub struct IntervalTable {
    pub very_active: TierIntervals,
    pub active: TierIntervals,
    pub moderate: TierIntervals,
    pub inactive: TierIntervals,
}

impl Default for IntervalTable {
    fn default() -> Self {
        Self {
            very_active: TierIntervals {
                base: Duration::from_secs(3 * 60),
                max: Duration::from_secs(5 * 60),
            },
            active: TierIntervals {
                base: Duration::from_secs(15 * 60),
                max: Duration::from_secs(30 * 60),
            },
            moderate: TierIntervals {
                base: Duration::from_secs(60 * 60),
                max: Duration::from_secs(120 * 60),
            },
            inactive: TierIntervals {
                base: Duration::from_secs(240 * 60),
                max: Duration::from_secs(360 * 60),
            },
        }
    }
}

impl IntervalTable {
    /// Validates `base <= cap` and `base > 0` for every tier. A
    /// non-descending progression across tiers only warrants a warning, not
    /// a hard failure (logged by the caller), per spec.
    pub fn validate(&self) -> Result<(), String> {
        for (name, t) in [
            ("very_active", self.very_active),
            ("active", self.active),
            ("moderate", self.moderate),
            ("inactive", self.inactive),
        ] {
            if t.base.is_zero() {
                return Err(format!("{name} base interval must be > 0"));
            }
            if t.base > t.max {
                return Err(format!("{name} base interval must be <= max interval"));
            }
        }
        Ok(())
    }

    /// `true` if the canonical descending-by-tier configuration doesn't
    /// hold; the caller should log a warning (not fail startup) when this
    /// returns `true`.
    #[must_use]
    pub fn is_non_canonical_order(&self) -> bool {
        !(self.very_active.base <= self.active.base
            && self.active.base <= self.moderate.base
            && self.moderate.base <= self.inactive.base)
    }

    #[must_use]
    pub fn for_tier(&self, tier: Tier) -> TierIntervals {
        match tier {
            Tier::VeryActive => self.very_active,
            Tier::Active => self.active,
            Tier::Moderate => self.moderate,
            Tier::Inactive => self.inactive,
        }
    }
}

/// Computes the next refresh interval for a tier given the current run of
/// consecutive empty fetches (§4.5).
#[must_use]
pub fn next_interval(intervals: TierIntervals, consecutive_empty_fetches: u32) -> Duration {
    let interval = if consecutive_empty_fetches > 0 {
        let backoff_factor = 2u32.saturating_pow(consecutive_empty_fetches).min(8);
        intervals.base.saturating_mul(backoff_factor)
    } else {
        intervals.base
    };
    interval.min(intervals.max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn score_is_always_in_bounds() {
        let counters = ActivityCounters {
            games_today: 50,
            games_last_3_days: 50,
            games_last_7_days: 50,
            last_match_at: Some(now()),
        };
        let score = calculate_score(&counters, now());
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn zero_activity_scores_zero() {
        let counters = ActivityCounters::default();
        assert_eq!(calculate_score(&counters, now()), 0.0);
    }

    #[test]
    fn active_grinder_scores_very_active() {
        // §8 scenario 1
        let counters = ActivityCounters {
            games_today: 8,
            games_last_3_days: 22,
            games_last_7_days: 50,
            last_match_at: Some(now() - ChronoDuration::minutes(15)),
        };
        let score = calculate_score(&counters, now());
        assert!(score >= 80.0, "expected score >= 80, got {score}");
        assert_eq!(TierThresholds::default().tier_for(score), Tier::VeryActive);
    }

    #[test]
    fn dormant_account_scores_zero_and_inactive() {
        // §8 scenario 2
        let counters = ActivityCounters::default();
        let score = calculate_score(&counters, now());
        assert_eq!(score, 0.0);
        assert_eq!(TierThresholds::default().tier_for(score), Tier::Inactive);
    }

    #[test]
    fn tier_boundaries_are_half_open() {
        let t = TierThresholds::default();
        assert_eq!(t.tier_for(70.0), Tier::VeryActive);
        assert_eq!(t.tier_for(69.999), Tier::Active);
        assert_eq!(t.tier_for(40.0), Tier::Active);
        assert_eq!(t.tier_for(20.0), Tier::Moderate);
        assert_eq!(t.tier_for(19.999), Tier::Inactive);
    }

    #[test]
    fn thresholds_validate_rejects_non_descending() {
        let bad = TierThresholds {
            very_active: 40.0,
            active: 40.0,
            moderate: 20.0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn thresholds_validate_rejects_non_positive_moderate() {
        let bad = TierThresholds {
            very_active: 70.0,
            active: 40.0,
            moderate: 0.0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn decay_never_increases_and_floors_at_zero() {
        assert!(decay(50.0) <= 50.0);
        assert_eq!(decay(0.0), 0.0);
    }

    #[test]
    fn boost_never_decreases_and_caps_at_100_and_20() {
        assert!(boost(50.0, 0) >= 50.0);
        assert_eq!(boost(95.0, 100), 100.0);
        // boost increments cap at +20 regardless of k
        assert_eq!(boost(0.0, 100), 20.0);
    }

    #[test]
    fn crossed_tier_boost_picks_new_tier_interval() {
        // §8 scenario 4
        let score = 38.0;
        let boosted = boost(score, 5);
        assert_eq!(boosted, 58.0);
        let t = TierThresholds::default();
        assert_eq!(t.tier_for(score), Tier::Moderate);
        assert_eq!(t.tier_for(boosted), Tier::Active);
    }

    #[test]
    fn interval_caps_at_max_after_repeated_empty_fetches() {
        // §8 scenario 2: inactive tier, 5 consecutive empty fetches
        let intervals = IntervalTable::default().inactive;
        let interval = next_interval(intervals, 5);
        assert_eq!(interval, Duration::from_secs(360 * 60));
    }

    #[test]
    fn interval_never_exceeds_max_and_never_decreases_with_backoff() {
        let intervals = TierIntervals {
            base: Duration::from_secs(60),
            max: Duration::from_secs(600),
        };
        let mut prev = next_interval(intervals, 0);
        for n in 1..10 {
            let cur = next_interval(intervals, n);
            assert!(cur >= prev);
            assert!(cur <= intervals.max);
            prev = cur;
        }
    }

    #[test]
    fn interval_table_validates_base_le_max() {
        let mut table = IntervalTable::default();
        table.active.base = Duration::from_secs(31 * 60);
        assert!(table.validate().is_err());
    }
}

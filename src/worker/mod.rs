//! Ingestion Worker (§4.6).
//!
//! Given one ready [`Entry`], fetches its new matches through the API
//! client, ingests each transactionally, and recomputes aggregates. Errors
//! are isolated per account: nothing here ever propagates past
//! [`process_entry`]'s [`ProcessOutcome`] return value — every failure path
//! is logged and folds into "zero new matches" for the reschedule step the
//! caller performs.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};

use crate::apiclient::error::ApiError;
use crate::apiclient::{MatchDetail, MatchHistoryApi, ParticipantPayload, RANKED_SOLO_QUEUE};
use crate::queue::Entry;
use crate::store::{ChampionAggregate, ParticipantStat, Store, StreakRecord, SynergyDelta};

/// Outcome of one [`process_entry`] call: how many matches were genuinely
/// new this cycle, and the maximum `start_time` among them (§4.6 step 7).
/// `latest_match_at` is `None` whenever `new_matches == 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOutcome {
    pub new_matches: u32,
    pub latest_match_at: Option<DateTime<Utc>>,
}

/// Normalizes a raw role string through the fixed map (§4.6): `JUNGLE` ->
/// `JGL`, `MIDDLE` -> `MID`, `BOTTOM` -> `ADC`, `UTILITY` -> `SUP`; `TOP`
/// and anything else pass through unchanged.
#[must_use]
pub fn normalize_role(role: &str) -> String {
    match role {
        "JUNGLE" => "JGL".to_string(),
        "MIDDLE" => "MID".to_string(),
        "BOTTOM" => "ADC".to_string(),
        "UTILITY" => "SUP".to_string(),
        other => other.to_string(),
    }
}

/// Ingests a `Vec<bool>` of newest-first win/loss outcomes into a
/// [`StreakRecord`]. `abs(current_streak) <= 100` by construction since the
/// caller never passes more than 100 outcomes (§3, §4.4).
#[must_use]
pub fn streak_from_outcomes(puuid: &str, outcomes: &[bool]) -> StreakRecord {
    let mut current = 0i32;
    if let Some(&first) = outcomes.first() {
        let mut n = 0i32;
        for &win in outcomes {
            if win == first {
                n += 1;
            } else {
                break;
            }
        }
        current = if first { n } else { -n };
    }

    let mut best = 0i32;
    let mut worst = 0i32;
    let mut run = 0i32;
    let mut run_is_win = true;
    for &win in outcomes.iter().rev() {
        if run == 0 {
            run = 1;
            run_is_win = win;
        } else if win == run_is_win {
            run += 1;
        } else {
            run = 1;
            run_is_win = win;
        }
        if run_is_win {
            best = best.max(run);
        } else {
            worst = worst.max(run);
        }
    }

    StreakRecord {
        puuid: puuid.to_string(),
        current_streak: current,
        best_streak: best,
        best_streak_start: None,
        best_streak_end: None,
        worst_streak: -worst,
        worst_streak_start: None,
        worst_streak_end: None,
    }
}

/// Runs the §4.6 algorithm for one ready entry, returning how many matches
/// were genuinely new and the maximum timestamp among them. Never returns
/// an error: every failure path is handled in place per §4.6's per-account
/// error semantics and folds into a 0-new-matches outcome so the caller can
/// always proceed to `reschedule`.
pub async fn process_entry<A: MatchHistoryApi>(
    api: &A,
    store: &Store,
    is_tracked: impl Fn(&str) -> bool,
    default_start_time: i64,
    entry: &Entry,
) -> ProcessOutcome {
    let _ = store.set_worker_current_account(Some(&entry.tag)).await;

    let lower_bound = entry
        .last_match_at
        .map(|t| t.timestamp())
        .filter(|&ts| ts > default_start_time)
        .unwrap_or(default_start_time);

    let match_ids = match api
        .match_ids(entry.region, &entry.puuid, RANKED_SOLO_QUEUE, lower_bound, 100)
        .await
    {
        Ok(ids) => ids,
        Err(ApiError::NotFound) => {
            tracing::debug!(puuid_prefix = %prefix(&entry.puuid), "account not found upstream");
            let _ = store.set_worker_current_account(None).await;
            return ProcessOutcome::default();
        }
        Err(ApiError::RateLimited { retries }) => {
            tracing::warn!(puuid_prefix = %prefix(&entry.puuid), retries, "rate limited fetching match ids");
            let _ = store.set_worker_current_account(None).await;
            return ProcessOutcome::default();
        }
        Err(e) => {
            tracing::error!(puuid_prefix = %prefix(&entry.puuid), error = %e, "transport error fetching match ids");
            let _ = store.record_worker_error(&e.to_string()).await;
            let _ = store.set_worker_current_account(None).await;
            return ProcessOutcome::default();
        }
    };

    let mut new_matches = 0u32;
    let mut affected_dates: HashSet<NaiveDate> = HashSet::new();
    let mut latest_start: Option<DateTime<Utc>> = None;

    for match_id in &match_ids {
        match store.match_exists(match_id).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(match_id, error = %e, "store error checking match existence");
                continue;
            }
        }

        let detail = match api.match_detail(entry.region, match_id).await {
            Ok(d) => d,
            Err(ApiError::NotFound) => {
                tracing::debug!(match_id, "match not found upstream");
                continue;
            }
            Err(ApiError::RateLimited { retries }) => {
                tracing::warn!(match_id, retries, "rate limited fetching match detail");
                continue;
            }
            Err(e) => {
                tracing::error!(match_id, error = %e, "transport error fetching match detail");
                continue;
            }
        };

        match ingest_match(store, &entry.puuid, &detail, &is_tracked).await {
            Ok(()) => {
                new_matches += 1;
                affected_dates.insert(detail.start_time.date_naive());
                latest_start = Some(latest_start.map_or(detail.start_time, |prev| prev.max(detail.start_time)));
            }
            Err(e) => {
                tracing::error!(match_id, error = %e, "ingest transaction rolled back");
            }
        }
    }

    let today = Utc::now().date_naive();
    match api.league_entries(entry.region, &entry.puuid).await {
        Ok(entries) => {
            let solo = entries.iter().find(|e| e.queue_type == "RANKED_SOLO_5x5");
            let _ = store
                .upsert_today_rank_only(
                    &entry.puuid,
                    today,
                    solo.map(|e| e.tier.as_str()),
                    solo.map(|e| e.rank.as_str()),
                    solo.map(|e| e.league_points),
                )
                .await;
        }
        Err(e) => {
            tracing::debug!(puuid_prefix = %prefix(&entry.puuid), error = %e, "league entries lookup failed");
        }
    }

    for date in affected_dates.iter().filter(|d| **d != today) {
        let _ = store.upsert_today_rank_only(&entry.puuid, *date, None, None, None).await;
    }

    let latest_match_at = if new_matches > 0 {
        match store.recent_outcomes(&entry.puuid, 100).await {
            Ok(outcomes) => {
                let streak = streak_from_outcomes(&entry.puuid, &outcomes);
                let _ = store.upsert_streak(&streak).await;
            }
            Err(e) => tracing::error!(error = %e, "failed to recompute streak"),
        }

        // §4.6 step 7: last_match_at is the maximum over every match
        // processed this cycle, never regressing past its prior value.
        let latest = latest_start
            .into_iter()
            .chain(entry.last_match_at)
            .max();
        if let Some(latest) = latest {
            let _ = store.update_account_last_match(&entry.puuid, latest).await;
        }
        latest
    } else {
        None
    };

    let _ = store.increment_worker_session_counters(1, i64::from(new_matches)).await;
    let _ = store.set_worker_current_account(None).await;
    ProcessOutcome { new_matches, latest_match_at }
}

/// One match's transactional ingest (§4.6 "Transactional ingest of one
/// match"). Any error anywhere in this function rolls the whole
/// transaction back: no match row, no participant rows, no synergy
/// increments survive a partial failure (§8 scenario 6).
async fn ingest_match<A>(
    store: &Store,
    tracked_puuid: &str,
    detail: &MatchDetail,
    is_tracked: &A,
) -> Result<(), crate::store::StoreError>
where
    A: Fn(&str) -> bool,
{
    let mut tx = store.begin().await?;

    sqlx_insert_match(&mut tx.tx, detail).await?;

    for participant in &detail.participants {
        sqlx_insert_participant(&mut tx.tx, &detail.match_id, participant).await?;
    }

    let me = detail
        .participants
        .iter()
        .find(|p| p.puuid == tracked_puuid)
        .ok_or_else(|| {
            crate::store::StoreError::classify(sqlx::Error::RowNotFound)
        })?;

    let mut peers: Vec<(String, SynergyDelta)> = Vec::new();
    for other in &detail.participants {
        if other.puuid == tracked_puuid || !is_tracked(&other.puuid) {
            continue;
        }
        let together = other.team_id == me.team_id;
        peers.push((other.puuid.clone(), SynergyDelta { together, win: me.win }));
    }
    if !peers.is_empty() {
        crate::store::queries::upsert_synergy_batch(&mut *tx.tx, tracked_puuid, &peers).await?;
    }

    let champion_agg = ChampionAggregate {
        puuid: tracked_puuid.to_string(),
        champion_id: me.champion_id,
        games: 1,
        wins: i32::from(me.win),
        kills: me.kills,
        deaths: me.deaths,
        assists: me.assists,
    };
    crate::store::queries::upsert_champion_aggregate(&mut *tx.tx, &champion_agg).await?;

    let date = detail.start_time.date_naive();
    crate::store::queries::upsert_daily_aggregate(
        &mut *tx.tx,
        tracked_puuid,
        date,
        1,
        i32::from(me.win),
        me.kills,
        me.deaths,
        me.assists,
        None,
        None,
        None,
    )
    .await?;

    tx.commit().await
}

async fn sqlx_insert_match(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    detail: &MatchDetail,
) -> Result<(), crate::store::StoreError> {
    let m = crate::store::Match {
        match_id: detail.match_id.clone(),
        start_time: detail.start_time,
        duration_seconds: detail.duration_seconds,
        queue_id: detail.queue_id,
        version: detail.version.clone(),
    };
    crate::store::queries::insert_match_if_absent(&mut **tx, &m)
        .await
        .map_err(crate::store::StoreError::classify)
}

async fn sqlx_insert_participant(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    match_id: &str,
    p: &ParticipantPayload,
) -> Result<(), crate::store::StoreError> {
    let stat = ParticipantStat {
        match_id: match_id.to_string(),
        puuid: p.puuid.clone(),
        champion_id: p.champion_id,
        kills: p.kills,
        deaths: p.deaths,
        assists: p.assists,
        cs: p.cs,
        vision_score: p.vision_score,
        damage_dealt: p.damage_dealt,
        gold_earned: p.gold_earned,
        role: p.role.as_deref().map(normalize_role),
        team_id: p.team_id,
        win: p.win,
    };
    crate::store::queries::insert_participant_stat_if_absent(&mut **tx, &stat)
        .await
        .map_err(crate::store::StoreError::classify)
}

fn prefix(puuid: &str) -> &str {
    puuid.get(0..8).unwrap_or(puuid)
}

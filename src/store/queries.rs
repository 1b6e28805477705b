//! Runtime store queries (§4.4).
//!
//! Written against `sqlx::query`/`query_as` with bound parameters rather
//! than the `query!` macro, the same convention the teacher's
//! `db/queries.rs` documents: no live `DATABASE_URL` is required to build
//! this crate.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgExecutor;

use super::models::{
    Account, AccountWithActivity, ActivityCounterRow, ChampionAggregate, Match, ParticipantStat,
    StreakRecord, SynergyDelta, WorkerStatus,
};
use super::ActivityTier;

/// Bulk read of every active, puuid-bearing account with its
/// activity-counter projection (§4.4, §4.5 `initialize`).
pub async fn list_active_accounts_with_activity<'e>(
    exec: impl PgExecutor<'e>,
) -> Result<Vec<AccountWithActivity>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct Row {
        puuid: String,
        game_name: String,
        tag: String,
        region: String,
        player_id: i64,
        last_match_at: Option<DateTime<Utc>>,
        last_fetched_at: Option<DateTime<Utc>>,
        activity_score: f64,
        activity_tier: ActivityTier,
        consecutive_empty_fetches: i32,
        next_fetch_at: DateTime<Utc>,
        games_today: i32,
        games_last_3_days: i32,
        games_last_7_days: i32,
    }

    let rows = sqlx::query_as::<_, Row>(
        r"
        SELECT a.puuid, a.game_name, a.tag, a.region, a.player_id,
               a.last_match_at, a.last_fetched_at, a.activity_score,
               a.activity_tier, a.consecutive_empty_fetches, a.next_fetch_at,
               COALESCE(c.games_today, 0) AS games_today,
               COALESCE(c.games_last_3_days, 0) AS games_last_3_days,
               COALESCE(c.games_last_7_days, 0) AS games_last_7_days
        FROM accounts a
        JOIN players p ON p.id = a.player_id
        LEFT JOIN account_activity_counters c ON c.puuid = a.puuid
        WHERE a.puuid IS NOT NULL AND p.is_active
        ",
    )
    .fetch_all(exec)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| AccountWithActivity {
            account: Account {
                puuid: r.puuid,
                game_name: r.game_name,
                tag: r.tag,
                region: r.region,
                player_id: r.player_id,
                last_match_at: r.last_match_at,
                last_fetched_at: r.last_fetched_at,
                activity_score: r.activity_score,
                activity_tier: r.activity_tier,
                consecutive_empty_fetches: r.consecutive_empty_fetches,
                next_fetch_at: r.next_fetch_at,
            },
            counters: ActivityCounterRow {
                games_today: r.games_today,
                games_last_3_days: r.games_last_3_days,
                games_last_7_days: r.games_last_7_days,
            },
        })
        .collect())
}

/// Persists the scheduler's view of one account's priority fields.
pub async fn update_account_priority<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    score: f64,
    tier: ActivityTier,
    next_fetch_at: DateTime<Utc>,
    consecutive_empty_fetches: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        UPDATE accounts
        SET activity_score = $2, activity_tier = $3, next_fetch_at = $4,
            consecutive_empty_fetches = $5, last_fetched_at = now()
        WHERE puuid = $1
        ",
    )
    .bind(puuid)
    .bind(score)
    .bind(tier)
    .bind(next_fetch_at)
    .bind(consecutive_empty_fetches)
    .execute(exec)
    .await?;
    Ok(())
}

/// `true` if a match row with this id already exists.
pub async fn match_exists<'e>(exec: impl PgExecutor<'e>, match_id: &str) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM matches WHERE match_id = $1)")
            .bind(match_id)
            .fetch_one(exec)
            .await?;
    Ok(exists)
}

/// Inserts a match row if one with the same id doesn't already exist.
/// Idempotent under duplicate id (§3).
pub async fn insert_match_if_absent<'e>(exec: impl PgExecutor<'e>, m: &Match) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO matches (match_id, start_time, duration_seconds, queue_id, version)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (match_id) DO NOTHING
        ",
    )
    .bind(&m.match_id)
    .bind(m.start_time)
    .bind(m.duration_seconds)
    .bind(m.queue_id)
    .bind(&m.version)
    .execute(exec)
    .await?;
    Ok(())
}

/// Inserts a per-participant stat row if absent, idempotent on
/// `(match_id, puuid)` (§3, §4.4).
pub async fn insert_participant_stat_if_absent<'e>(
    exec: impl PgExecutor<'e>,
    stat: &ParticipantStat,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO participant_stats
            (match_id, puuid, champion_id, kills, deaths, assists, cs,
             vision_score, damage_dealt, gold_earned, role, team_id, win)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (match_id, puuid) DO NOTHING
        ",
    )
    .bind(&stat.match_id)
    .bind(&stat.puuid)
    .bind(stat.champion_id)
    .bind(stat.kills)
    .bind(stat.deaths)
    .bind(stat.assists)
    .bind(stat.cs)
    .bind(stat.vision_score)
    .bind(stat.damage_dealt)
    .bind(stat.gold_earned)
    .bind(&stat.role)
    .bind(stat.team_id)
    .bind(stat.win)
    .execute(exec)
    .await?;
    Ok(())
}

/// Upserts a daily aggregate row. Null fields (rank/LP) never overwrite an
/// existing non-null value (§4.4).
#[allow(clippy::too_many_arguments)]
pub async fn upsert_daily_aggregate<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    date: NaiveDate,
    games_delta: i32,
    wins_delta: i32,
    kills_delta: i32,
    deaths_delta: i32,
    assists_delta: i32,
    rank_tier: Option<&str>,
    rank_division: Option<&str>,
    league_points: Option<i32>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO daily_aggregates
            (puuid, date, games, wins, kills, deaths, assists,
             rank_tier, rank_division, league_points)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (puuid, date) DO UPDATE SET
            games = daily_aggregates.games + EXCLUDED.games,
            wins = daily_aggregates.wins + EXCLUDED.wins,
            kills = daily_aggregates.kills + EXCLUDED.kills,
            deaths = daily_aggregates.deaths + EXCLUDED.deaths,
            assists = daily_aggregates.assists + EXCLUDED.assists,
            rank_tier = COALESCE(EXCLUDED.rank_tier, daily_aggregates.rank_tier),
            rank_division = COALESCE(EXCLUDED.rank_division, daily_aggregates.rank_division),
            league_points = COALESCE(EXCLUDED.league_points, daily_aggregates.league_points)
        ",
    )
    .bind(puuid)
    .bind(date)
    .bind(games_delta)
    .bind(wins_delta)
    .bind(kills_delta)
    .bind(deaths_delta)
    .bind(assists_delta)
    .bind(rank_tier)
    .bind(rank_division)
    .bind(league_points)
    .execute(exec)
    .await?;
    Ok(())
}

/// Reads real per-account activity counters by summing `daily_aggregates`
/// games over rolling windows ending on `today`, grounded on the original's
/// `get_account_activity_data` join over its daily-stats table. Used after a
/// fetch that actually ingested new matches, never as a stand-in for the
/// cycle's own match count (§4.1, §4.5).
pub async fn get_account_activity_data<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    today: NaiveDate,
) -> Result<ActivityCounterRow, sqlx::Error> {
    let row: (i32, i32, i32) = sqlx::query_as(
        r"
        SELECT
            COALESCE(SUM(games) FILTER (WHERE date = $2), 0)::INT AS games_today,
            COALESCE(SUM(games) FILTER (WHERE date > $2 - INTERVAL '3 days'), 0)::INT AS games_last_3_days,
            COALESCE(SUM(games) FILTER (WHERE date > $2 - INTERVAL '7 days'), 0)::INT AS games_last_7_days
        FROM daily_aggregates
        WHERE puuid = $1
        ",
    )
    .bind(puuid)
    .bind(today)
    .fetch_one(exec)
    .await?;

    Ok(ActivityCounterRow {
        games_today: row.0,
        games_last_3_days: row.1,
        games_last_7_days: row.2,
    })
}

/// Sets `last_match_at` to the maximum processed-match timestamp for this
/// cycle (§4.6 step 7). Never called when a cycle ingests zero new matches.
pub async fn update_account_last_match<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    latest_match_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET last_match_at = $2 WHERE puuid = $1")
        .bind(puuid)
        .bind(latest_match_at)
        .execute(exec)
        .await?;
    Ok(())
}

/// Fetches the last `limit` match outcomes (win/loss, newest first) for an
/// account, used to recompute its streak.
pub async fn recent_outcomes<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    limit: i64,
) -> Result<Vec<bool>, sqlx::Error> {
    let rows: Vec<(bool,)> = sqlx::query_as(
        r"
        SELECT ps.win
        FROM participant_stats ps
        JOIN matches m ON m.match_id = ps.match_id
        WHERE ps.puuid = $1
        ORDER BY m.start_time DESC
        LIMIT $2
        ",
    )
    .bind(puuid)
    .bind(limit)
    .fetch_all(exec)
    .await?;
    Ok(rows.into_iter().map(|(win,)| win).collect())
}

/// Overwrites the streak record for an account from a freshly computed
/// value. Monotone in the sense that best/worst are only ever widened by
/// the caller before this is invoked.
pub async fn upsert_streak<'e>(exec: impl PgExecutor<'e>, streak: &StreakRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO streaks
            (puuid, current_streak, best_streak, best_streak_start, best_streak_end,
             worst_streak, worst_streak_start, worst_streak_end)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (puuid) DO UPDATE SET
            current_streak = EXCLUDED.current_streak,
            best_streak = EXCLUDED.best_streak,
            best_streak_start = EXCLUDED.best_streak_start,
            best_streak_end = EXCLUDED.best_streak_end,
            worst_streak = EXCLUDED.worst_streak,
            worst_streak_start = EXCLUDED.worst_streak_start,
            worst_streak_end = EXCLUDED.worst_streak_end
        ",
    )
    .bind(&streak.puuid)
    .bind(streak.current_streak)
    .bind(streak.best_streak)
    .bind(streak.best_streak_start)
    .bind(streak.best_streak_end)
    .bind(streak.worst_streak)
    .bind(streak.worst_streak_start)
    .bind(streak.worst_streak_end)
    .execute(exec)
    .await?;
    Ok(())
}

/// Upserts a champion aggregate, summing counters.
pub async fn upsert_champion_aggregate<'e>(
    exec: impl PgExecutor<'e>,
    agg: &ChampionAggregate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO champion_aggregates (puuid, champion_id, games, wins, kills, deaths, assists)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (puuid, champion_id) DO UPDATE SET
            games = champion_aggregates.games + EXCLUDED.games,
            wins = champion_aggregates.wins + EXCLUDED.wins,
            kills = champion_aggregates.kills + EXCLUDED.kills,
            deaths = champion_aggregates.deaths + EXCLUDED.deaths,
            assists = champion_aggregates.assists + EXCLUDED.assists
        ",
    )
    .bind(&agg.puuid)
    .bind(agg.champion_id)
    .bind(agg.games)
    .bind(agg.wins)
    .bind(agg.kills)
    .bind(agg.deaths)
    .bind(agg.assists)
    .execute(exec)
    .await?;
    Ok(())
}

/// Batched synergy upsert: one statement per ingested match, arrays of
/// peer puuids and deltas as inputs rather than one statement per peer
/// (§4.4 invariant).
pub async fn upsert_synergy_batch<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    peers: &[(String, SynergyDelta)],
) -> Result<(), sqlx::Error> {
    if peers.is_empty() {
        return Ok(());
    }

    let peer_puuids: Vec<String> = peers.iter().map(|(p, _)| p.clone()).collect();
    let games_together: Vec<i32> = peers
        .iter()
        .map(|(_, d)| i32::from(d.together))
        .collect();
    let wins_together: Vec<i32> = peers
        .iter()
        .map(|(_, d)| i32::from(d.together && d.win))
        .collect();
    let games_against: Vec<i32> = peers
        .iter()
        .map(|(_, d)| i32::from(!d.together))
        .collect();
    let wins_against: Vec<i32> = peers
        .iter()
        .map(|(_, d)| i32::from(!d.together && d.win))
        .collect();

    sqlx::query(
        r"
        INSERT INTO synergy_edges (puuid, peer_puuid, games_together, wins_together, games_against, wins_against)
        SELECT $1, p, gt, wt, ga, wa
        FROM UNNEST($2::text[], $3::int[], $4::int[], $5::int[], $6::int[]) AS t(p, gt, wt, ga, wa)
        ON CONFLICT (puuid, peer_puuid) DO UPDATE SET
            games_together = synergy_edges.games_together + EXCLUDED.games_together,
            wins_together = synergy_edges.wins_together + EXCLUDED.wins_together,
            games_against = synergy_edges.games_against + EXCLUDED.games_against,
            wins_against = synergy_edges.wins_against + EXCLUDED.wins_against
        ",
    )
    .bind(puuid)
    .bind(&peer_puuids)
    .bind(&games_together)
    .bind(&wins_together)
    .bind(&games_against)
    .bind(&wins_against)
    .execute(exec)
    .await?;
    Ok(())
}

/// Sets the account currently being processed on the worker status row.
/// Best-effort: callers should ignore errors (§4.6 step 1).
pub async fn set_worker_current_account<'e>(
    exec: impl PgExecutor<'e>,
    tag: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE worker_status SET current_account_tag = $1, updated_at = now()")
        .bind(tag)
        .execute(exec)
        .await?;
    Ok(())
}

/// Flips the singleton worker status row's `is_running` flag and resets
/// session counters when starting.
pub async fn set_worker_running<'e>(
    exec: impl PgExecutor<'e>,
    is_running: bool,
    reset_counters: bool,
) -> Result<(), sqlx::Error> {
    if reset_counters {
        sqlx::query(
            r"
            UPDATE worker_status
            SET is_running = $1, current_account_tag = NULL,
                session_accounts_processed = 0, session_matches_ingested = 0,
                last_error_message = NULL, updated_at = now()
            ",
        )
        .bind(is_running)
        .execute(exec)
        .await?;
    } else {
        sqlx::query(
            "UPDATE worker_status SET is_running = $1, current_account_tag = NULL, updated_at = now()",
        )
        .bind(is_running)
        .execute(exec)
        .await?;
    }
    Ok(())
}

/// Records the last error message on the worker status row.
pub async fn record_worker_error<'e>(exec: impl PgExecutor<'e>, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE worker_status SET last_error_message = $1, updated_at = now()")
        .bind(message)
        .execute(exec)
        .await?;
    Ok(())
}

/// Increments the session counters by the given deltas.
pub async fn increment_worker_session_counters<'e>(
    exec: impl PgExecutor<'e>,
    accounts_delta: i64,
    matches_delta: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        UPDATE worker_status
        SET session_accounts_processed = session_accounts_processed + $1,
            session_matches_ingested = session_matches_ingested + $2,
            updated_at = now()
        ",
    )
    .bind(accounts_delta)
    .bind(matches_delta)
    .execute(exec)
    .await?;
    Ok(())
}

/// Reads the singleton worker status row.
pub async fn get_worker_status<'e>(exec: impl PgExecutor<'e>) -> Result<WorkerStatus, sqlx::Error> {
    sqlx::query_as::<_, WorkerStatus>("SELECT * FROM worker_status LIMIT 1")
        .fetch_one(exec)
        .await
}

/// Appends one line to the worker activity log (§4.4, §6).
pub async fn append_worker_activity_log<'e>(
    exec: impl PgExecutor<'e>,
    level: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO worker_activity_log (level, message) VALUES ($1, $2)")
        .bind(level)
        .bind(message)
        .execute(exec)
        .await?;
    Ok(())
}

/// Upserts (puuid, `date`) today's daily aggregate independent of any
/// matches processed this cycle — used when a fetch yields zero new
/// matches but a fresh rank snapshot is still available (§4.6 step 5).
pub async fn upsert_today_rank_only<'e>(
    exec: impl PgExecutor<'e>,
    puuid: &str,
    date: NaiveDate,
    rank_tier: Option<&str>,
    rank_division: Option<&str>,
    league_points: Option<i32>,
) -> Result<(), sqlx::Error> {
    upsert_daily_aggregate(
        exec,
        puuid,
        date,
        0,
        0,
        0,
        0,
        0,
        rank_tier,
        rank_division,
        league_points,
    )
    .await
}


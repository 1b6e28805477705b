//! Integration tests for the ingestion worker's transactional per-match
//! idempotency (§8 scenario 6), run against a real Postgres via
//! `#[sqlx::test]` the way the teacher's `db/tests.rs` exercises its own
//! queries.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use match_scheduler::apiclient::error::ApiError;
use match_scheduler::apiclient::regions::RegionCode;
use match_scheduler::apiclient::{
    AccountByRiotId, LeagueEntry, MatchDetail, MatchHistoryApi, ParticipantPayload,
};
use match_scheduler::queue::Entry;
use match_scheduler::scorer::Tier;
use match_scheduler::store::Store;
use match_scheduler::worker;
use sqlx::PgPool;

const TRACKED_PUUID: &str = "tracked-puuid-0000000000000000000000000000000000000000000000000000";

struct FakeApi {
    match_detail_calls: AtomicUsize,
}

impl MatchHistoryApi for FakeApi {
    async fn match_ids(
        &self,
        _region: RegionCode,
        _puuid: &str,
        _queue_id: u32,
        _start_time: i64,
        _count: u32,
    ) -> Result<Vec<String>, ApiError> {
        Ok(vec!["MATCH_1".to_string()])
    }

    async fn match_detail(&self, _region: RegionCode, match_id: &str) -> Result<MatchDetail, ApiError> {
        self.match_detail_calls.fetch_add(1, Ordering::SeqCst);
        Ok(sample_match_detail(match_id))
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
        Ok(AccountByRiotId { puuid: TRACKED_PUUID.to_string() })
    }
}

fn sample_match_detail(match_id: &str) -> MatchDetail {
    let mut participants = vec![ParticipantPayload {
        puuid: TRACKED_PUUID.to_string(),
        champion_id: 1,
        kills: 5,
        deaths: 2,
        assists: 7,
        cs: 150,
        vision_score: 20,
        damage_dealt: 12_000,
        gold_earned: 9_000,
        role: Some("MIDDLE".to_string()),
        team_id: 100,
        win: true,
    }];
    for i in 1..10 {
        participants.push(ParticipantPayload {
            puuid: format!("other-{i}"),
            champion_id: i,
            kills: 1,
            deaths: 1,
            assists: 1,
            cs: 100,
            vision_score: 10,
            damage_dealt: 5_000,
            gold_earned: 5_000,
            role: Some("TOP".to_string()),
            team_id: if i < 5 { 100 } else { 200 },
            win: i < 5,
        });
    }
    MatchDetail {
        match_id: match_id.to_string(),
        start_time: Utc::now(),
        duration_seconds: 1_800,
        queue_id: 420,
        version: "14.1.1".to_string(),
        participants,
    }
}

fn sample_entry() -> Entry {
    Entry {
        puuid: TRACKED_PUUID.to_string(),
        game_name: "Tracked".to_string(),
        tag: "NA1".to_string(),
        player_id: 1,
        region: RegionCode::Na,
        score: 0.0,
        tier: Tier::Inactive,
        next_fetch_at: Utc::now(),
        last_fetched_at: None,
        last_match_at: None,
        consecutive_empty_fetches: 0,
    }
}

#[sqlx::test]
async fn ingesting_the_same_match_twice_is_idempotent(pool: PgPool) {
    let store = Store::from_pool(pool, 20);
    let api = FakeApi { match_detail_calls: AtomicUsize::new(0) };
    let entry = sample_entry();

    let first = worker::process_entry(&api, &store, |_| false, 0, &entry).await;
    assert_eq!(first.new_matches, 1, "first pass should ingest the one new match");
    assert!(first.latest_match_at.is_some());

    let second = worker::process_entry(&api, &store, |_| false, 0, &entry).await;
    assert_eq!(second.new_matches, 0, "second pass sees match_exists=true and ingests nothing new");
    assert!(second.latest_match_at.is_none());

    assert_eq!(
        api.match_detail_calls.load(Ordering::SeqCst),
        1,
        "match detail is only fetched once, the second pass skips it via match_exists"
    );

    let (match_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM matches")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(match_count, 1);

    let (participant_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM participant_stats WHERE match_id = 'MATCH_1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(participant_count, 10);

    let (games,): (i32,) =
        sqlx::query_as("SELECT games FROM champion_aggregates WHERE puuid = $1 AND champion_id = 1")
            .bind(TRACKED_PUUID)
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(games, 1, "champion aggregate is incremented exactly once, not twice");
}

#[sqlx::test]
async fn tracked_co_participants_earn_a_synergy_edge(pool: PgPool) {
    let store = Store::from_pool(pool, 20);
    let api = FakeApi { match_detail_calls: AtomicUsize::new(0) };
    let entry = sample_entry();

    // `other-1..4` share the tracked account's team; mark exactly one as
    // tracked so a synergy edge gets written for that pair only.
    let outcome = worker::process_entry(&api, &store, |p| p == "other-1", 0, &entry).await;
    assert_eq!(outcome.new_matches, 1);

    let (games_together, wins_together): (i32, i32) = sqlx::query_as(
        "SELECT games_together, wins_together FROM synergy_edges WHERE puuid = $1 AND peer_puuid = 'other-1'",
    )
    .bind(TRACKED_PUUID)
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_eq!(games_together, 1);
    assert_eq!(wins_together, 1, "tracked puuid won, and other-1 was on the same team");

    let untracked_edge: Option<(i32,)> =
        sqlx::query_as("SELECT games_together FROM synergy_edges WHERE puuid = $1 AND peer_puuid = 'other-2'")
            .bind(TRACKED_PUUID)
            .fetch_optional(store.pool())
            .await
            .unwrap();
    assert!(untracked_edge.is_none(), "untracked co-participants never earn a synergy edge");
}

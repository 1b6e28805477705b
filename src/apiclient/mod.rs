//! External match-history API client (§4.3).
//!
//! A thin interface over match-id listing, match detail fetch, rank lookup,
//! and Riot-ID resolution, wrapped by the region's rate limiter and the
//! retry policy in [`retry`]. Every outbound call goes through
//! [`ApiClient::request_json`], which is the single place status codes are
//! turned into the [`ApiError`] taxonomy.

pub mod error;
pub mod regions;
pub mod retry;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ratelimit::{Endpoint, RateLimiterRegistry};
use error::{ApiError, RetryableOutcome};
use regions::RegionCode;

/// Default total request timeout.
pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// League queue id for ranked solo/duo, the only queue the ingestion
/// worker polls (§4.6).
pub const RANKED_SOLO_QUEUE: u32 = 420;

/// Ten-participant match detail, as returned by `match(match_id)`.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchDetail {
    pub match_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i32,
    pub queue_id: i32,
    pub version: String,
    pub participants: Vec<ParticipantPayload>,
}

/// One participant's stat line within a match.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantPayload {
    pub puuid: String,
    pub champion_id: i32,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub cs: i32,
    pub vision_score: i32,
    pub damage_dealt: i32,
    pub gold_earned: i32,
    pub role: Option<String>,
    pub team_id: i32,
    pub win: bool,
}

/// One ranked-queue standing, as returned by `league_entries(puuid)`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueEntry {
    pub queue_type: String,
    pub tier: String,
    pub rank: String,
    pub league_points: i32,
}

/// Riot-ID resolution result.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountByRiotId {
    pub puuid: String,
}

/// The match-history API surface the ingestion worker depends on.
///
/// Implemented once, over HTTP, by [`ApiClient`]; kept as a trait so tests
/// can substitute a fake without standing up a real HTTP server when a
/// wiremock instance would be overkill.
pub trait MatchHistoryApi: Send + Sync {
    fn match_ids(
        &self,
        region: RegionCode,
        puuid: &str,
        queue_id: u32,
        start_time: i64,
        count: u32,
    ) -> impl std::future::Future<Output = Result<Vec<String>, ApiError>> + Send;

    fn match_detail(
        &self,
        region: RegionCode,
        match_id: &str,
    ) -> impl std::future::Future<Output = Result<MatchDetail, ApiError>> + Send;

    fn league_entries(
        &self,
        region: RegionCode,
        puuid: &str,
    ) -> impl std::future::Future<Output = Result<Vec<LeagueEntry>, ApiError>> + Send;

    fn account_by_riot_id(
        &self,
        region: RegionCode,
        game_name: &str,
        tag: &str,
    ) -> impl std::future::Future<Output = Result<AccountByRiotId, ApiError>> + Send;
}

/// HTTP-backed implementation of [`MatchHistoryApi`].
///
/// Security contract (§4.3): the API key and full response bodies never
/// appear in logs. Only method, path, status, and timing are logged.
pub struct ApiClient {
    http: reqwest::Client,
    api_key: String,
    limiters: RateLimiterRegistry,
}

impl ApiClient {
    pub fn new(api_key: String, limiters: RateLimiterRegistry) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TOTAL_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key,
            limiters,
        })
    }

    /// Performs one rate-limited, retried GET against `url`, decoding the
    /// JSON body as `T` on success.
    async fn request_json<T: for<'de> Deserialize<'de>>(
        &self,
        region: RegionCode,
        endpoint: Endpoint,
        url: &str,
    ) -> Result<T, ApiError> {
        retry::with_retry(|| async {
            self.limiters.acquire(region, endpoint).await;

            let start = std::time::Instant::now();
            let response = match self
                .http
                .get(url)
                .header("X-Api-Key", &self.api_key)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    return RetryableOutcome::Terminal(ApiError::Request(e.to_string()));
                }
            };
            let status = response.status();
            let elapsed = start.elapsed();

            tracing::debug!(
                method = "GET",
                path = %redact_path(url),
                status = status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "external API request"
            );

            if status == reqwest::StatusCode::NOT_FOUND {
                return RetryableOutcome::Terminal(ApiError::NotFound);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                return RetryableOutcome::RateLimited { retry_after };
            }

            if !status.is_success() {
                let message = status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string();
                return RetryableOutcome::Terminal(ApiError::TransportError {
                    status: Some(status.as_u16()),
                    message,
                });
            }

            match response.json::<T>().await {
                Ok(value) => RetryableOutcome::Success(value),
                Err(e) => RetryableOutcome::Terminal(ApiError::TransportError {
                    status: Some(500),
                    message: format!("invalid JSON response: {e}"),
                }),
            }
        })
        .await
    }
}

/// Strips query parameters (which may carry tokens) before logging a URL.
fn redact_path(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

impl MatchHistoryApi for ApiClient {
    async fn match_ids(
        &self,
        region: RegionCode,
        puuid: &str,
        queue_id: u32,
        start_time: i64,
        count: u32,
    ) -> Result<Vec<String>, ApiError> {
        let url = format!(
            "https://{routing}.api.riotgames.com/lol/match/v5/matches/by-puuid/{puuid}/ids?queue={queue_id}&startTime={start_time}&count={count}",
            routing = region.routing_region(),
        );
        self.request_json(region, Endpoint::MatchIds, &url).await
    }

    async fn match_detail(&self, region: RegionCode, match_id: &str) -> Result<MatchDetail, ApiError> {
        let url = format!(
            "https://{routing}.api.riotgames.com/lol/match/v5/matches/{match_id}",
            routing = region.routing_region(),
        );
        self.request_json(region, Endpoint::MatchDetail, &url).await
    }

    async fn league_entries(&self, region: RegionCode, puuid: &str) -> Result<Vec<LeagueEntry>, ApiError> {
        let url = format!(
            "https://{host}/lol/league/v4/entries/by-puuid/{puuid}",
            host = region.platform_host(),
        );
        self.request_json(region, Endpoint::LeagueEntries, &url).await
    }

    async fn account_by_riot_id(
        &self,
        region: RegionCode,
        game_name: &str,
        tag: &str,
    ) -> Result<AccountByRiotId, ApiError> {
        let url = format!(
            "https://{routing}.api.riotgames.com/riot/account/v1/accounts/by-riot-id/{game_name}/{tag}",
            routing = region.routing_region(),
        );
        self.request_json(region, Endpoint::AccountByRiotId, &url).await
    }
}

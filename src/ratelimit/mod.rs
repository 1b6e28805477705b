//! Rate limiting.
//!
//! One coupled short/long sliding-window limiter per region-endpoint pair
//! (§4.2), created lazily and cached in a [`dashmap::DashMap`] so every
//! caller for the same region+endpoint shares the same windows.

mod sliding_window;

pub use sliding_window::{SimpleLimiter, SlidingWindowLimiter, DEFAULT_LONG_LIMIT, DEFAULT_SHORT_LIMIT};

use std::sync::Arc;

use dashmap::DashMap;

use crate::apiclient::regions::RegionCode;

/// The logical endpoint family a request belongs to, for per-endpoint
/// limiter keying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    MatchIds,
    MatchDetail,
    LeagueEntries,
    AccountByRiotId,
}

/// Rate limiter configuration, validated at startup.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub short_limit: u32,
    pub long_limit: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            short_limit: DEFAULT_SHORT_LIMIT,
            long_limit: DEFAULT_LONG_LIMIT,
        }
    }
}

impl RateLimiterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.short_limit == 0 || self.long_limit == 0 {
            return Err("rate limiter limits must be > 0".into());
        }
        Ok(())
    }
}

/// Registry of per-region-endpoint limiters, shared by all tasks of the
/// owning region (§5: "a region's rate limiter is shared only by tasks for
/// that region").
#[derive(Default)]
pub struct RateLimiterRegistry {
    config: RateLimiterConfig,
    limiters: DashMap<(RegionCode, Endpoint), Arc<SlidingWindowLimiter>>,
}

impl RateLimiterRegistry {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            limiters: DashMap::new(),
        }
    }

    /// Returns (creating if absent) the limiter for a region-endpoint pair.
    #[must_use]
    pub fn get(&self, region: RegionCode, endpoint: Endpoint) -> Arc<SlidingWindowLimiter> {
        Arc::clone(
            self.limiters
                .entry((region, endpoint))
                .or_insert_with(|| {
                    Arc::new(SlidingWindowLimiter::new(
                        self.config.short_limit,
                        self.config.long_limit,
                    ))
                })
                .value(),
        )
    }

    /// Blocks the caller until the region-endpoint limiter admits the
    /// request.
    pub async fn acquire(&self, region: RegionCode, endpoint: Endpoint) {
        self.get(region, endpoint).acquire().await;
    }
}

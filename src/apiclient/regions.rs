//! Region routing tables (§6), grounded in the original `RiotAPIService`
//! `REGIONS` / `ROUTING_REGIONS` maps.

use std::fmt;

/// A fine-grained regional code as stored on the Account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionCode {
    Euw,
    Na,
    Kr,
    Br,
}

impl RegionCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Euw => "EUW",
            Self::Na => "NA",
            Self::Kr => "KR",
            Self::Br => "BR",
        }
    }

    /// The regional API host used for platform-scoped endpoints
    /// (summoner, league).
    #[must_use]
    pub const fn platform_host(self) -> &'static str {
        match self {
            Self::Euw => "euw1.api.riotgames.com",
            Self::Na => "na1.api.riotgames.com",
            Self::Kr => "kr.api.riotgames.com",
            Self::Br => "br1.api.riotgames.com",
        }
    }

    /// The coarse routing region used for account/match-v5 endpoints.
    #[must_use]
    pub const fn routing_region(self) -> &'static str {
        match self {
            Self::Euw => "europe",
            Self::Na => "americas",
            Self::Kr => "asia",
            Self::Br => "americas",
        }
    }

    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "EUW" | "EUW1" => Some(Self::Euw),
            "NA" | "NA1" => Some(Self::Na),
            "KR" => Some(Self::Kr),
            "BR" | "BR1" => Some(Self::Br),
            _ => None,
        }
    }

    /// All regions the scheduler knows how to poll, for fan-out.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Euw, Self::Na, Self::Kr, Self::Br]
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Routing strategies.
//!
//! A strategy decides which upstreams see a call and how their outcomes are merged:
//!
//! | Strategy | Upstreams | Behavior |
//! |----------|-----------|----------|
//! | `NAIVE` | exactly 1 | forwards to the only upstream |
//! | `RACE` | 2 or more | fans out to all, first successful body wins |
//! | `FALLBACK` | 2 or more | tries upstreams in order, skipping ones cooling down after a failure |
//!
//! Upstream counts are checked when the running configuration is built; a
//! strategy never sees an incompatible upstream set at call time.

pub mod fallback;
pub mod naive;
pub mod race;

pub use fallback::FallbackStrategy;
pub use naive::NaiveStrategy;
pub use race::RaceStrategy;

use crate::{types::Call, upstream::UpstreamError};
use bytes::Bytes;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Terminal outcome of a strategy that produced no response body.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The race did not settle within its global deadline.
    #[error("timeout error")]
    Timeout,

    #[error("all upstream requests are failed")]
    AllUpstreamsFailed,

    /// Every upstream was unhealthy or failed within the attempt budget.
    #[error("no valid upstream")]
    NoValidUpstream,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Strategy name as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Naive,
    Race,
    Fallback,
}

impl StrategyKind {
    /// Returns a description of the violated requirement when `count` upstreams
    /// cannot drive this strategy.
    #[must_use]
    pub fn upstream_count_error(self, count: usize) -> Option<&'static str> {
        match self {
            Self::Naive if count != 1 => Some("naive proxy strategy require exact 1 upstream"),
            Self::Race if count < 2 => Some("race proxy strategy require more than 1 upstream"),
            Self::Fallback if count < 2 => {
                Some("fallback proxy strategy require more than 1 upstream")
            }
            _ => None,
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NAIVE" => Ok(Self::Naive),
            "RACE" => Ok(Self::Race),
            "FALLBACK" => Ok(Self::Fallback),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Naive => "NAIVE",
            Self::Race => "RACE",
            Self::Fallback => "FALLBACK",
        })
    }
}

/// A built strategy bound to its upstream set.
#[derive(Debug)]
pub enum Strategy {
    Naive(NaiveStrategy),
    Race(RaceStrategy),
    Fallback(FallbackStrategy),
}

impl Strategy {
    /// Routes one call.
    ///
    /// # Errors
    ///
    /// Returns the strategy's terminal error; see [`StrategyError`].
    pub async fn handle(&self, call: &Call) -> Result<Bytes, StrategyError> {
        match self {
            Self::Naive(strategy) => strategy.handle(call).await,
            Self::Race(strategy) => strategy.handle(call).await,
            Self::Fallback(strategy) => strategy.handle(call).await,
        }
    }

    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Naive(_) => StrategyKind::Naive,
            Self::Race(_) => StrategyKind::Race,
            Self::Fallback(_) => StrategyKind::Fallback,
        }
    }
}

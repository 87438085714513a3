//! Contains the client side of the statistics provider.
//! [StatsProvider] is the narrow interface the rest of the crate depends on, and
//! [rescuetime::RescueTimeClient] is its implementation over the RescueTime analytic API.

pub mod efficiency;
pub mod pacing;
pub mod rescuetime;

use std::fmt::Display;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

/// A row exactly as the provider returns it. For hourly data the first field is an ISO
/// datetime string.
pub type RawRow = Vec<Value>;

/// Hourly reports the provider can produce. Categories and subcategories are stored together
/// with activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HourlyKind {
    Activities,
    Categories,
    Subcategories,
    Productivity,
}

impl HourlyKind {
    /// Order in which reports are concatenated into a stored activities file.
    pub const ACTIVITY_SOURCES: [HourlyKind; 3] = [
        HourlyKind::Subcategories,
        HourlyKind::Categories,
        HourlyKind::Activities,
    ];

    /// Value of the `restrict_kind` parameter understood by the provider.
    pub fn restrict_kind(&self) -> &'static str {
        match self {
            HourlyKind::Activities => "activities",
            HourlyKind::Categories => "overview",
            HourlyKind::Subcategories => "category",
            HourlyKind::Productivity => "productivity",
        }
    }
}

impl Display for HourlyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HourlyKind::Activities => write!(f, "activities"),
            HourlyKind::Categories => write!(f, "categories"),
            HourlyKind::Subcategories => write!(f, "subcategories"),
            HourlyKind::Productivity => write!(f, "productivity"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request to the provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Provider answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Provider rate limit exceeded")]
    RateLimited,
    #[error("Provider rejected the API key: {0}")]
    Unauthorized(String),
    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether trying the same request again later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::RateLimited => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Unauthorized(_) | ProviderError::Decode(_) => false,
        }
    }
}

/// Interface for fetching statistics. Implementations are expected to pace their own calls,
/// callers only guarantee they never issue two calls at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Hourly rows of `kind` for a single day.
    async fn fetch_hourly(
        &self,
        kind: HourlyKind,
        date: NaiveDate,
    ) -> Result<Vec<RawRow>, ProviderError>;

    /// Daily productivity ranking, rows of `[rank, seconds, people, score]`.
    async fn fetch_daily_productivity(&self, date: NaiveDate)
        -> Result<Vec<RawRow>, ProviderError>;
}

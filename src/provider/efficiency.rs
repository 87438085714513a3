use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::{
    storage::entities::{MalformedRow, ProductivityScore},
    utils::percentage::{ratio_percentage, Percentage},
};

use super::{ProviderError, RawRow, StatsProvider};

#[derive(Debug, Error)]
pub enum EfficiencyError {
    #[error("No time was tracked on {0}")]
    NoTrackedTime(NaiveDate),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Malformed productivity ranking: {0}")]
    Malformed(#[from] MalformedRow),
}

/// Seconds spent in each productivity bucket during a day.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProductivityBuckets {
    seconds: [i64; 5],
}

impl ProductivityBuckets {
    fn index(score: ProductivityScore) -> usize {
        (score.value() + 2) as usize
    }

    pub fn add(&mut self, score: ProductivityScore, seconds: i64) {
        self.seconds[Self::index(score)] += seconds;
    }

    pub fn with(mut self, score: ProductivityScore, seconds: i64) -> Self {
        self.add(score, seconds);
        self
    }

    pub fn get(&self, score: ProductivityScore) -> i64 {
        self.seconds[Self::index(score)]
    }

    pub fn total(&self) -> i64 {
        self.seconds.iter().sum()
    }

    /// Builds buckets from rank rows of `[rank, seconds, people, score]`.
    pub fn from_rank_rows(rows: &[RawRow]) -> Result<Self, MalformedRow> {
        let mut buckets = Self::default();
        for row in rows {
            let seconds = integer_at(row, 1, "duration")?;
            let score = ProductivityScore::try_from(integer_at(row, 3, "score")?)?;
            buckets.add(score, seconds);
        }
        Ok(buckets)
    }

    /// Weighted share of productive time, from 0 for only very distracting time to 100 for only
    /// very productive time, rounded to two decimals. `None` when nothing was tracked.
    pub fn efficiency(&self) -> Option<Percentage> {
        let weighted: f64 = ProductivityScore::ALL
            .iter()
            .map(|score| self.get(*score) as f64 * score.efficiency_weight())
            .sum();
        ratio_percentage(weighted, self.total() as f64).map(Percentage::rounded)
    }
}

fn integer_at(row: &[Value], index: usize, name: &'static str) -> Result<i64, MalformedRow> {
    let value = row.get(index).ok_or(MalformedRow::MissingField(name))?;
    value.as_i64().ok_or_else(|| MalformedRow::WrongType {
        name,
        value: value.clone(),
    })
}

/// Efficiency percentage of a single day as computed from the provider's daily ranking.
pub async fn fetch_productivity_efficiency(
    provider: &(impl StatsProvider + ?Sized),
    date: NaiveDate,
) -> Result<Percentage, EfficiencyError> {
    let rows = provider.fetch_daily_productivity(date).await?;
    let buckets = ProductivityBuckets::from_rank_rows(&rows)?;
    buckets
        .efficiency()
        .ok_or(EfficiencyError::NoTrackedTime(date))
}

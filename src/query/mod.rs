//! Read side of the cache. Every query looks at the reporting day in progress at a given moment,
//! see [window::window_slices].

pub mod window;

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::storage::{
    entities::{ActivityRow, HourlyRow, InvalidScore, ProductivityRow, ProductivityScore, RecordKind},
    record_storage::{StatsStorage, StorageError},
};

use window::{window_slices, DeadlineHour};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Deadline hour must be between 0 and 23, got {0}")]
    InvalidDeadlineHour(u32),
    #[error(transparent)]
    InvalidScore(#[from] InvalidScore),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Productivity buckets a query is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSet(BTreeSet<ProductivityScore>);

impl ScoreSet {
    pub fn all() -> Self {
        ProductivityScore::ALL.into()
    }

    /// Builds a set from raw integers, rejecting anything outside -2..=2.
    pub fn from_values(values: impl IntoIterator<Item = i64>) -> Result<Self, QueryError> {
        values
            .into_iter()
            .map(|v| ProductivityScore::try_from(v).map_err(QueryError::from))
            .collect()
    }

    pub fn contains(&self, score: ProductivityScore) -> bool {
        self.0.contains(&score)
    }
}

impl From<ProductivityScore> for ScoreSet {
    fn from(value: ProductivityScore) -> Self {
        Self(BTreeSet::from([value]))
    }
}

impl<const N: usize> From<[ProductivityScore; N]> for ScoreSet {
    fn from(value: [ProductivityScore; N]) -> Self {
        Self(BTreeSet::from(value))
    }
}

impl FromIterator<ProductivityScore> for ScoreSet {
    fn from_iter<T: IntoIterator<Item = ProductivityScore>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Answers questions about the reporting day in progress at `as_of`.
#[derive(Debug, Clone)]
pub struct StatsQuery {
    storage: StatsStorage,
    deadline: DeadlineHour,
    as_of: NaiveDateTime,
}

impl StatsQuery {
    pub fn new(storage: StatsStorage, deadline: DeadlineHour, as_of: NaiveDateTime) -> Self {
        Self {
            storage,
            deadline,
            as_of,
        }
    }

    /// Rows of `kind` inside the window. Files that don't exist or can't be parsed contribute
    /// nothing.
    pub async fn window_rows<R: HourlyRow + DeserializeOwned>(
        &self,
        kind: RecordKind,
    ) -> Result<Vec<R>, QueryError> {
        let mut rows = vec![];
        for slice in window_slices(self.deadline, self.as_of) {
            let day = self
                .storage
                .read_rows_lenient::<R>(slice.date, kind)
                .await?;
            debug!(
                "Read {} {kind} rows for {}, keeping hours {:?}",
                day.len(),
                slice.date,
                slice.hours
            );
            rows.extend(
                day.into_iter()
                    .filter(|row| slice.contains(row.date(), row.hour())),
            );
        }
        Ok(rows)
    }

    /// Activity, category or subcategory rows whose label equals `name`, ignoring case.
    pub async fn activity_rows(&self, name: &str) -> Result<Vec<ActivityRow>, QueryError> {
        let name = name.to_lowercase();
        let rows = self
            .window_rows::<ActivityRow>(RecordKind::Activities)
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| row.label.to_lowercase() == name)
            .collect())
    }

    /// Seconds spent on `name`, 0 when there is no such activity.
    pub async fn activity_seconds(&self, name: &str) -> Result<i64, QueryError> {
        Ok(total_duration(&self.activity_rows(name).await?))
    }

    pub async fn productivity_rows(
        &self,
        scores: impl Into<ScoreSet>,
    ) -> Result<Vec<ProductivityRow>, QueryError> {
        let scores = scores.into();
        let rows = self
            .window_rows::<ProductivityRow>(RecordKind::Productivity)
            .await?;
        Ok(rows
            .into_iter()
            .filter(|row| scores.contains(row.score))
            .collect())
    }

    pub async fn productivity_seconds(
        &self,
        scores: impl Into<ScoreSet>,
    ) -> Result<i64, QueryError> {
        Ok(total_duration(&self.productivity_rows(scores).await?))
    }

    /// Everything tracked in the window, whatever its productivity.
    pub async fn total_tracked_seconds(&self) -> Result<i64, QueryError> {
        self.productivity_seconds(ScoreSet::all()).await
    }
}

pub fn total_duration(rows: &[impl HourlyRow]) -> i64 {
    rows.iter().map(HourlyRow::duration).sum()
}

//! Keeps the on-disk cache in line with the provider. The engine walks a range of dates, skips
//! records that are already complete and re-fetches the rest one call at a time.

use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    provider::{HourlyKind, ProviderError, RawRow, StatsProvider},
    storage::{
        entities::{ActivityRow, HourlyRow, MalformedRow, ProductivityRow, RecordKind},
        record_storage::{StatsStorage, StorageError},
    },
    utils::time::{date_range, freshness_threshold},
};

/// How many times a record is fetched when the provider keeps returning data that can't be
/// parsed, before the record is skipped.
pub const MAX_MALFORMED_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetching {kind} for {date} failed: {source}")]
    Provider {
        date: NaiveDate,
        kind: RecordKind,
        #[source]
        source: ProviderError,
    },
    #[error("Provider returned malformed {kind} for {date}: {source}")]
    Malformed {
        date: NaiveDate,
        kind: RecordKind,
        #[source]
        source: MalformedRow,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of a [SyncEngine::synchronize] run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub written: Vec<(NaiveDate, RecordKind)>,
    pub skipped_fresh: usize,
    /// Records skipped after the provider kept returning unusable data.
    pub malformed: Vec<SyncError>,
    /// Records the provider couldn't deliver.
    pub failed: Vec<SyncError>,
    pub complete_through: Option<NaiveDate>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty() && self.failed.is_empty()
    }

    pub fn problems(&self) -> impl Iterator<Item = &SyncError> {
        self.failed.iter().chain(self.malformed.iter())
    }
}

pub struct SyncEngine<P> {
    provider: P,
    storage: StatsStorage,
}

impl<P: StatsProvider> SyncEngine<P> {
    pub fn new(provider: P, storage: StatsStorage) -> Self {
        Self { provider, storage }
    }

    pub fn storage(&self) -> &StatsStorage {
        &self.storage
    }

    /// Brings every record between `start` and `end` (inclusive) up to date as seen at `as_of`.
    ///
    /// A record the provider can't deliver doesn't stop the run, it ends up in the report. Only
    /// storage failures and a rejected API key abort it. `start` is expected to be the first date
    /// of the cache, since the persisted cursor describes the cache from its beginning.
    #[instrument(skip(self))]
    pub async fn synchronize(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        as_of: NaiveDateTime,
    ) -> Result<SyncReport, SyncError> {
        let mut cursor = self.storage.load_cursor().await?;
        let mut report = SyncReport::default();
        let mut contiguous = cursor
            .complete_through
            .map_or(true, |through| start <= through + chrono::Days::new(1));
        let mut complete_through = None;

        for date in date_range(start, end) {
            let mut day_complete = true;
            for kind in RecordKind::ALL {
                if self.storage.is_complete(&cursor, date, kind).await? {
                    debug!("{kind} for {date} is up to date");
                    report.skipped_fresh += 1;
                    continue;
                }

                match self.sync_record(date, kind).await {
                    Ok(rows) => {
                        info!("Stored {rows} {kind} rows for {date}");
                        report.written.push((date, kind));
                    }
                    Err(
                        e @ SyncError::Provider {
                            source: ProviderError::Unauthorized(_),
                            ..
                        },
                    ) => {
                        error!("Aborting synchronization: {e}");
                        return Err(e);
                    }
                    Err(e @ SyncError::Provider { .. }) => {
                        error!("{e}");
                        day_complete = false;
                        report.failed.push(e);
                    }
                    Err(e @ SyncError::Malformed { .. }) => {
                        warn!("Skipping record: {e}");
                        day_complete = false;
                        report.malformed.push(e);
                    }
                    Err(e) => return Err(e),
                }
            }

            contiguous = contiguous && day_complete && freshness_threshold(date) <= as_of;
            if contiguous {
                complete_through = Some(date);
            }
        }

        if let Some(through) = complete_through {
            if cursor.advance(through, as_of) {
                self.storage.save_cursor(&cursor).await?;
                info!("Cache is complete through {through}");
            }
        }
        report.complete_through = cursor.complete_through;
        Ok(report)
    }

    /// Fetches and stores a single record, returning the number of rows written.
    async fn sync_record(&self, date: NaiveDate, kind: RecordKind) -> Result<usize, SyncError> {
        match kind {
            RecordKind::Activities => {
                let rows = fetch_bounded(date, kind, || self.fetch_activities(date)).await?;
                self.storage.write_rows(date, kind, &rows).await?;
                Ok(rows.len())
            }
            RecordKind::Productivity => {
                let rows = fetch_bounded(date, kind, || self.fetch_productivity(date)).await?;
                self.storage.write_rows(date, kind, &rows).await?;
                Ok(rows.len())
            }
        }
    }

    async fn fetch_hourly(
        &self,
        source: HourlyKind,
        date: NaiveDate,
        kind: RecordKind,
    ) -> Result<Vec<RawRow>, SyncError> {
        self.provider
            .fetch_hourly(source, date)
            .await
            .map_err(|source| SyncError::Provider { date, kind, source })
    }

    /// Subcategories, categories and activities of a day, in that order.
    async fn fetch_activities(&self, date: NaiveDate) -> Result<Vec<ActivityRow>, SyncError> {
        let mut rows = vec![];
        for source in HourlyKind::ACTIVITY_SOURCES {
            let raw = self
                .fetch_hourly(source, date, RecordKind::Activities)
                .await?;
            rows.extend(convert_rows(
                date,
                RecordKind::Activities,
                raw,
                ActivityRow::from_provider,
            )?);
        }
        Ok(rows)
    }

    async fn fetch_productivity(&self, date: NaiveDate) -> Result<Vec<ProductivityRow>, SyncError> {
        let raw = self
            .fetch_hourly(HourlyKind::Productivity, date, RecordKind::Productivity)
            .await?;
        convert_rows(
            date,
            RecordKind::Productivity,
            raw,
            ProductivityRow::from_provider,
        )
    }
}

/// Repeats `fetch` while it yields malformed data, up to [MAX_MALFORMED_ATTEMPTS] times.
async fn fetch_bounded<R, F, Fut>(
    date: NaiveDate,
    kind: RecordKind,
    fetch: F,
) -> Result<Vec<R>, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<R>, SyncError>>,
{
    let mut attempt = 1;
    loop {
        match fetch().await {
            Err(e @ SyncError::Malformed { .. }) if attempt < MAX_MALFORMED_ATTEMPTS => {
                warn!("Attempt {attempt} for {kind} on {date} returned unusable data: {e}");
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn convert_rows<R: HourlyRow>(
    date: NaiveDate,
    kind: RecordKind,
    raw: Vec<RawRow>,
    parse: fn(RawRow) -> Result<R, MalformedRow>,
) -> Result<Vec<R>, SyncError> {
    raw.into_iter()
        .map(|row| {
            let row = parse(row)?;
            if row.date() != date {
                return Err(MalformedRow::ForeignDate {
                    expected: date,
                    found: row.date(),
                });
            }
            Ok(row)
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SyncError::Malformed { date, kind, source })
}

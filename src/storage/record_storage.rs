use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_record_name, freshness_threshold};

use super::entities::RecordKind;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed record file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Couldn't encode rows for {path:?}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// A file is complete once it has been written after the provider finished aggregating the day.
/// Files that don't exist are never fresh.
pub fn is_fresh_at(date: NaiveDate, modified: Option<NaiveDateTime>) -> bool {
    modified.is_some_and(|modified| modified >= freshness_threshold(date))
}

/// Filesystem cache of daily statistics, laid out as `<root>/<year>/<YYYYMMDD>_<kind>.json`.
#[derive(Debug, Clone)]
pub struct StatsStorage {
    root: PathBuf,
}

impl StatsStorage {
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, date: NaiveDate, kind: RecordKind) -> PathBuf {
        self.root
            .join(date.format("%Y").to_string())
            .join(format!("{}_{}.json", date_to_record_name(date), kind))
    }

    /// Local modification time of a record file, `None` when it doesn't exist.
    pub async fn modified(
        &self,
        date: NaiveDate,
        kind: RecordKind,
    ) -> Result<Option<NaiveDateTime>, StorageError> {
        let path = self.record_path(date, kind);
        match fs::metadata(&path).await {
            Ok(metadata) => {
                let modified = metadata.modified().map_err(StorageError::io(&path))?;
                Ok(Some(DateTime::<Local>::from(modified).naive_local()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path)(e)),
        }
    }

    pub async fn is_fresh(&self, date: NaiveDate, kind: RecordKind) -> Result<bool, StorageError> {
        Ok(is_fresh_at(date, self.modified(date, kind).await?))
    }

    pub async fn exists(&self, date: NaiveDate, kind: RecordKind) -> Result<bool, StorageError> {
        Ok(self.modified(date, kind).await?.is_some())
    }

    /// Replaces the record file with `rows`.
    pub async fn write_rows<R: Serialize>(
        &self,
        date: NaiveDate,
        kind: RecordKind,
        rows: &[R],
    ) -> Result<(), StorageError> {
        let path = self.record_path(date, kind);
        let buffer = serde_json::to_vec(rows).map_err(|source| StorageError::Encode {
            path: path.clone(),
            source,
        })?;
        write_atomically(&path, &buffer).await
    }

    /// Reads a record file. A missing file reads as no rows.
    pub async fn read_rows<R: DeserializeOwned>(
        &self,
        date: NaiveDate,
        kind: RecordKind,
    ) -> Result<Vec<R>, StorageError> {
        let path = self.record_path(date, kind);
        debug!("Extracting {path:?}");
        let contents = match read_shared(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StorageError::io(&path)(e)),
        };

        serde_json::from_slice(&contents).map_err(|source| StorageError::Malformed { path, source })
    }

    /// Same as [StatsStorage::read_rows] but a corrupted file reads as no rows.
    pub async fn read_rows_lenient<R: DeserializeOwned>(
        &self,
        date: NaiveDate,
        kind: RecordKind,
    ) -> Result<Vec<R>, StorageError> {
        match self.read_rows(date, kind).await {
            Err(StorageError::Malformed { path, source }) => {
                warn!("Ignoring record file {path:?} that couldn't be parsed: {source}");
                Ok(vec![])
            }
            result => result,
        }
    }
}

async fn read_shared(path: &Path) -> Result<Vec<u8>, std::io::Error> {
    let mut file = File::open(path).await?;
    file.lock_shared()?;
    let mut contents = vec![];
    let result = file.read_to_end(&mut contents).await;
    file.unlock_async().await?;
    result.map(|_| contents)
}

/// Writes into a sibling temporary file and renames it over `path`, so that a crash never leaves a
/// truncated record behind.
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(StorageError::io(parent))?;
    }

    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = PathBuf::from(temporary);

    let written: std::io::Result<()> = async {
        let mut file = File::create(&temporary).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        fs::rename(&temporary, path).await
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&temporary).await {
            warn!("Couldn't remove temporary file {temporary:?}: {cleanup}");
        }
        return Err(StorageError::io(path)(e));
    }
    Ok(())
}

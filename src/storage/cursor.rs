use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{
    entities::RecordKind,
    record_storage::{write_atomically, StatsStorage, StorageError},
};

const CURSOR_FILE: &str = "sync_state.json";

/// Remembers up to which date the cache is known to be complete. Used next to file modification
/// times, which can be unreliable after clock changes or copying the cache around.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Every date up to and including this one was synced after its data became final.
    pub complete_through: Option<NaiveDate>,
    /// When the cursor was last moved.
    pub updated_at: Option<NaiveDateTime>,
}

impl SyncCursor {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.complete_through.is_some_and(|through| date <= through)
    }

    /// Moves the cursor forward. Never moves it back.
    pub fn advance(&mut self, through: NaiveDate, as_of: NaiveDateTime) -> bool {
        if self.covers(through) {
            return false;
        }
        self.complete_through = Some(through);
        self.updated_at = Some(as_of);
        true
    }
}

impl StatsStorage {
    /// Loads the cursor. A missing or unreadable cursor is the same as an empty one.
    pub async fn load_cursor(&self) -> Result<SyncCursor, StorageError> {
        let path = self.root().join(CURSOR_FILE);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SyncCursor::default()),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        match serde_json::from_str(&contents) {
            Ok(cursor) => Ok(cursor),
            Err(e) => {
                warn!("Sync cursor {path:?} is corrupted, starting from scratch: {e}");
                Ok(SyncCursor::default())
            }
        }
    }

    pub async fn save_cursor(&self, cursor: &SyncCursor) -> Result<(), StorageError> {
        let path = self.root().join(CURSOR_FILE);
        let buffer = serde_json::to_vec_pretty(cursor).map_err(|source| StorageError::Encode {
            path: path.clone(),
            source,
        })?;
        write_atomically(&path, &buffer).await
    }

    /// A record needs no re-fetch if it was written after its day became final, or if the cursor
    /// says so and the file is still there.
    pub async fn is_complete(
        &self,
        cursor: &SyncCursor,
        date: NaiveDate,
        kind: RecordKind,
    ) -> Result<bool, StorageError> {
        if cursor.covers(date) && self.exists(date, kind).await? {
            return Ok(true);
        }
        self.is_fresh(date, kind).await
    }
}

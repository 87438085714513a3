//!  Storage is organized through [record_storage::StatsStorage].
//!  The basic idea is:
//!   - There is a root directory with one subdirectory per year.
//!   - Every day has two record files, `YYYYMMDD_activities.json` and
//!     `YYYYMMDD_productivity.json`, each holding a JSON array of hourly rows.
//!   - Files are only ever replaced as a whole, never appended to.
//!   - A small `sync_state.json` next to the year directories remembers how far the cache is
//!     known to be complete.

pub mod cursor;
pub mod entities;
pub mod record_storage;

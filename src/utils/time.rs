
use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Hours after the start of a day at which its statistics are considered final upstream, that is
/// 02:00 of the following day.
pub const FRESHNESS_GRACE_HOURS: i64 = 26;

/// This is the standard way of converting a date to a file name prefix in rescuesync.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Format used by the provider for query parameters and by stored rows.
pub fn date_to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Moment from which a file written for `date` holds the complete day.
pub fn freshness_threshold(date: NaiveDate) -> NaiveDateTime {
    NaiveDateTime::new(date, NaiveTime::MIN) + Duration::hours(FRESHNESS_GRACE_HOURS)
}

/// Returns dates between start (inclusive) and end (inclusive).
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(1))
        .expect("Beginning of time should never happen")
}

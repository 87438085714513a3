use std::{fmt::Display, ops::Range, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::utils::time::previous_day;

use super::QueryError;

/// Hour at which a reporting day starts. With a deadline hour of 18 the "day" runs from 18:00 to
/// 18:00 the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeadlineHour(u32);

impl DeadlineHour {
    pub const MIDNIGHT: DeadlineHour = DeadlineHour(0);

    pub fn new(hour: u32) -> Result<Self, QueryError> {
        if hour < 24 {
            Ok(Self(hour))
        } else {
            Err(QueryError::InvalidDeadlineHour(hour))
        }
    }

    pub fn hour(&self) -> u32 {
        self.0
    }
}

impl Display for DeadlineHour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00", self.0)
    }
}

impl FromStr for DeadlineHour {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeadlineHour::new(s.trim().parse::<u32>()?)?)
    }
}

/// Hours of a single day's record that belong to a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySlice {
    pub date: NaiveDate,
    pub hours: Range<u32>,
}

impl DaySlice {
    pub fn contains(&self, date: NaiveDate, hour: u32) -> bool {
        self.date == date && self.hours.contains(&hour)
    }
}

/// Splits the reporting day that is in progress at `as_of` into per-file slices.
///
/// Once the deadline hour has passed the window is the rest of today. Before it, the window is
/// the evening of yesterday followed by the morning of today.
pub fn window_slices(deadline: DeadlineHour, as_of: NaiveDateTime) -> Vec<DaySlice> {
    let today = as_of.date();
    let start = deadline.hour();
    if as_of.hour() >= start {
        vec![DaySlice {
            date: today,
            hours: start..24,
        }]
    } else {
        vec![
            DaySlice {
                date: previous_day(today),
                hours: start..24,
            },
            DaySlice {
                date: today,
                hours: 0..start,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

    use super::{window_slices, DaySlice, DeadlineHour};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_deadline_hour_bounds() {
        assert!(DeadlineHour::new(23).is_ok());
        assert!(DeadlineHour::new(24).is_err());
        assert!("25".parse::<DeadlineHour>().is_err());
        assert!("-1".parse::<DeadlineHour>().is_err());
        assert_eq!("18".parse::<DeadlineHour>().unwrap().hour(), 18);
    }

    #[test]
    fn test_midnight_is_whole_day() {
        for hour in 0..24 {
            let slices = window_slices(DeadlineHour::MIDNIGHT, at(2, hour));
            assert_eq!(
                slices,
                vec![DaySlice {
                    date: at(2, 0).date(),
                    hours: 0..24
                }]
            );
        }
    }

    #[test]
    fn test_slice_contains() {
        let slice = DaySlice {
            date: at(1, 0).date(),
            hours: 18..24,
        };
        assert!(slice.contains(at(1, 0).date(), 18));
        assert!(slice.contains(at(1, 0).date(), 23));
        assert!(!slice.contains(at(1, 0).date(), 17));
        assert!(!slice.contains(at(2, 0).date(), 20));
    }

    #[test]
    fn test_after_deadline() {
        let slices = window_slices(DeadlineHour::new(18).unwrap(), at(2, 21));
        assert_eq!(
            slices,
            vec![DaySlice {
                date: at(2, 0).date(),
                hours: 18..24
            }]
        );
    }

    #[test]
    fn test_before_deadline() {
        let slices = window_slices(DeadlineHour::new(18).unwrap(), at(2, 17));
        assert_eq!(
            slices,
            vec![
                DaySlice {
                    date: at(1, 0).date(),
                    hours: 18..24
                },
                DaySlice {
                    date: at(2, 0).date(),
                    hours: 0..18
                },
            ]
        );
    }

    #[test]
    fn test_before_deadline_crosses_year() {
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(3, 30, 0)
            .unwrap();
        let slices = window_slices(DeadlineHour::new(6).unwrap(), as_of);
        assert_eq!(slices[0].date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    /// For every deadline and time of day, the slices cover every hour elapsed since the
    /// current cycle started, exactly once.
    #[test]
    fn test_slices_cover_elapsed_hours_once() {
        for deadline in 0..24 {
            let deadline = DeadlineHour::new(deadline).unwrap();
            for hour in 0..24 {
                let as_of = at(2, hour) + Duration::minutes(30);
                let slices = window_slices(deadline, as_of);

                let covered = slices
                    .iter()
                    .flat_map(|slice| slice.hours.clone().map(move |h| slice.date.and_hms_opt(h, 0, 0).unwrap()))
                    .filter(|slot| *slot <= as_of)
                    .collect::<Vec<_>>();
                let unique = covered.iter().collect::<BTreeSet<_>>();
                assert_eq!(unique.len(), covered.len());

                let cycle_start = if as_of.hour() >= deadline.hour() {
                    at(2, deadline.hour())
                } else {
                    at(1, deadline.hour())
                };
                let mut expected = vec![];
                let mut slot = cycle_start;
                while slot <= as_of {
                    expected.push(slot);
                    slot += Duration::hours(1);
                }
                assert_eq!(covered, expected, "deadline {deadline}, as of {as_of}");
                assert!(expected.len() <= 24);
            }
        }
    }
}

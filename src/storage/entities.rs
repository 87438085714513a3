use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::time::date_to_iso;

/// Kinds of record files kept on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Activities,
    Productivity,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Activities, RecordKind::Productivity];

    pub fn file_suffix(&self) -> &'static str {
        match self {
            RecordKind::Activities => "activities",
            RecordKind::Productivity => "productivity",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_suffix())
    }
}

/// Productivity bucket as reported by RescueTime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProductivityScore {
    VeryDistracting = -2,
    Distracting = -1,
    Neutral = 0,
    Productive = 1,
    VeryProductive = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Productivity score must be between -2 and 2, got {0}")]
pub struct InvalidScore(pub i64);

impl ProductivityScore {
    pub const ALL: [ProductivityScore; 5] = [
        ProductivityScore::VeryDistracting,
        ProductivityScore::Distracting,
        ProductivityScore::Neutral,
        ProductivityScore::Productive,
        ProductivityScore::VeryProductive,
    ];

    pub fn value(self) -> i64 {
        self as i64
    }

    /// Weight of the bucket in the efficiency percentage.
    pub fn efficiency_weight(self) -> f64 {
        match self {
            ProductivityScore::VeryDistracting => 0.,
            ProductivityScore::Distracting => 0.25,
            ProductivityScore::Neutral => 0.5,
            ProductivityScore::Productive => 0.75,
            ProductivityScore::VeryProductive => 1.,
        }
    }
}

impl TryFrom<i64> for ProductivityScore {
    type Error = InvalidScore;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -2 => Ok(ProductivityScore::VeryDistracting),
            -1 => Ok(ProductivityScore::Distracting),
            0 => Ok(ProductivityScore::Neutral),
            1 => Ok(ProductivityScore::Productive),
            2 => Ok(ProductivityScore::VeryProductive),
            v => Err(InvalidScore(v)),
        }
    }
}

impl std::str::FromStr for ProductivityScore {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProductivityScore::try_from(s.trim().parse::<i64>()?)?)
    }
}

/// Problems with a single row, either straight from the provider or read back from disk.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedRow {
    #[error("row is missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{name}` has unexpected value {value}")]
    WrongType { name: &'static str, value: Value },
    #[error("unparseable timestamp {0:?}")]
    BadTimestamp(String),
    #[error("row dated {found} inside a record for {expected}")]
    ForeignDate {
        expected: NaiveDate,
        found: NaiveDate,
    },
    #[error(transparent)]
    Score(#[from] InvalidScore),
}

const PROVIDER_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Replaces the leading ISO timestamp of a provider row with `date, hour`, keeping every other
/// field as is. This gives hourly rows of all kinds the same leading shape.
pub fn normalize_row(raw: Vec<Value>) -> Result<Vec<Value>, MalformedRow> {
    let mut fields = raw.into_iter();
    let timestamp = match fields.next() {
        Some(Value::String(s)) => s,
        Some(value) => {
            return Err(MalformedRow::WrongType {
                name: "timestamp",
                value,
            })
        }
        None => return Err(MalformedRow::MissingField("timestamp")),
    };
    let moment = NaiveDateTime::parse_from_str(&timestamp, PROVIDER_TIMESTAMP_FORMAT)
        .map_err(|_| MalformedRow::BadTimestamp(timestamp.clone()))?;

    let mut normalized = vec![
        Value::from(date_to_iso(moment.date())),
        Value::from(moment.hour()),
    ];
    normalized.extend(fields);
    Ok(normalized)
}

/// Sequential reader over the positional fields of a row.
struct RowFields {
    fields: std::vec::IntoIter<Value>,
}

impl RowFields {
    fn new(fields: Vec<Value>) -> Self {
        Self {
            fields: fields.into_iter(),
        }
    }

    fn next(&mut self, name: &'static str) -> Result<Value, MalformedRow> {
        self.fields.next().ok_or(MalformedRow::MissingField(name))
    }

    fn date(&mut self) -> Result<NaiveDate, MalformedRow> {
        match self.next("date")? {
            Value::String(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| MalformedRow::BadTimestamp(s)),
            value => Err(MalformedRow::WrongType {
                name: "date",
                value,
            }),
        }
    }

    fn hour(&mut self) -> Result<u32, MalformedRow> {
        let value = self.next("hour")?;
        match value.as_u64() {
            Some(hour) if hour < 24 => Ok(hour as u32),
            _ => Err(MalformedRow::WrongType {
                name: "hour",
                value,
            }),
        }
    }

    fn integer(&mut self, name: &'static str) -> Result<i64, MalformedRow> {
        let value = self.next(name)?;
        value
            .as_i64()
            .ok_or(MalformedRow::WrongType { name, value })
    }

    fn string(&mut self, name: &'static str) -> Result<String, MalformedRow> {
        match self.next(name)? {
            Value::String(s) => Ok(s),
            value => Err(MalformedRow::WrongType { name, value }),
        }
    }

    fn rest(self) -> Vec<Value> {
        self.fields.collect()
    }
}

/// Common view over stored hourly rows, used when windowing and summing.
pub trait HourlyRow {
    fn date(&self) -> NaiveDate;
    fn hour(&self) -> u32;
    /// Time spent in seconds.
    fn duration(&self) -> i64;
}

/// One hour of time spent on an activity, category or subcategory.
/// Stored as `[date, hour, seconds, people, label, ...extra]`; for activities `extra` carries the
/// provider's category and productivity columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct ActivityRow {
    pub date: NaiveDate,
    pub hour: u32,
    pub duration: i64,
    pub people: i64,
    pub label: String,
    pub extra: Vec<Value>,
}

impl ActivityRow {
    pub fn from_provider(raw: Vec<Value>) -> Result<Self, MalformedRow> {
        normalize_row(raw)?.try_into()
    }
}

impl TryFrom<Vec<Value>> for ActivityRow {
    type Error = MalformedRow;

    fn try_from(value: Vec<Value>) -> Result<Self, Self::Error> {
        let mut fields = RowFields::new(value);
        Ok(ActivityRow {
            date: fields.date()?,
            hour: fields.hour()?,
            duration: fields.integer("duration")?,
            people: fields.integer("people")?,
            label: fields.string("label")?,
            extra: fields.rest(),
        })
    }
}

impl From<ActivityRow> for Vec<Value> {
    fn from(row: ActivityRow) -> Self {
        let mut values = vec![
            Value::from(date_to_iso(row.date)),
            Value::from(row.hour),
            Value::from(row.duration),
            Value::from(row.people),
            Value::from(row.label),
        ];
        values.extend(row.extra);
        values
    }
}

impl HourlyRow for ActivityRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn hour(&self) -> u32 {
        self.hour
    }

    fn duration(&self) -> i64 {
        self.duration
    }
}

/// One hour of time spent in a productivity bucket.
/// Stored as `[date, hour, seconds, rank, score, ...extra]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct ProductivityRow {
    pub date: NaiveDate,
    pub hour: u32,
    pub duration: i64,
    pub rank: i64,
    pub score: ProductivityScore,
    pub extra: Vec<Value>,
}

impl ProductivityRow {
    pub fn from_provider(raw: Vec<Value>) -> Result<Self, MalformedRow> {
        normalize_row(raw)?.try_into()
    }
}

impl TryFrom<Vec<Value>> for ProductivityRow {
    type Error = MalformedRow;

    fn try_from(value: Vec<Value>) -> Result<Self, Self::Error> {
        let mut fields = RowFields::new(value);
        Ok(ProductivityRow {
            date: fields.date()?,
            hour: fields.hour()?,
            duration: fields.integer("duration")?,
            rank: fields.integer("rank")?,
            score: ProductivityScore::try_from(fields.integer("score")?)?,
            extra: fields.rest(),
        })
    }
}

impl From<ProductivityRow> for Vec<Value> {
    fn from(row: ProductivityRow) -> Self {
        let mut values = vec![
            Value::from(date_to_iso(row.date)),
            Value::from(row.hour),
            Value::from(row.duration),
            Value::from(row.rank),
            Value::from(row.score.value()),
        ];
        values.extend(row.extra);
        values
    }
}

impl HourlyRow for ProductivityRow {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn hour(&self) -> u32 {
        self.hour
    }

    fn duration(&self) -> i64 {
        self.duration
    }
}

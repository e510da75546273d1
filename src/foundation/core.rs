use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::foundation::error::{LapseError, LapseResult};

/// Minutes in one UTC day; slot intervals must divide it evenly.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Width of the zero-padded slot number in keys and frame filenames.
pub const SLOT_DIGITS: usize = 4;

/// Primary key of a frame: calendar date plus intra-day slot index.
///
/// Ordering is chronological (date first, then slot). The display form `YYYY-MM-DD/NNNN` is
/// used as the manifest key and sorts the same way.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct FrameKey {
    /// UTC calendar date (the date partition).
    pub date: NaiveDate,
    /// Slot index within the day, `< SlotGrid::slots_per_day()`.
    pub slot: u32,
}

impl FrameKey {
    /// Build a key without checking the slot against a grid.
    ///
    /// Use [`SlotGrid::key`] when the slot comes from outside.
    pub fn new(date: NaiveDate, slot: u32) -> Self {
        Self { date, slot }
    }

    /// Partition directory name (`YYYY-MM-DD`).
    pub fn partition(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{:0width$}",
            self.partition(),
            self.slot,
            width = SLOT_DIGITS
        )
    }
}

impl FromStr for FrameKey {
    type Err = LapseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, slot) = s
            .split_once('/')
            .ok_or_else(|| LapseError::validation(format!("frame key '{s}' lacks '/'")))?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| LapseError::validation(format!("frame key '{s}': bad date: {e}")))?;
        let slot = slot
            .parse::<u32>()
            .map_err(|e| LapseError::validation(format!("frame key '{s}': bad slot: {e}")))?;
        Ok(Self { date, slot })
    }
}

impl From<FrameKey> for String {
    fn from(key: FrameKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for FrameKey {
    type Error = LapseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Fixed-interval time grid covering one UTC day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotGrid {
    slot_minutes: u32,
}

impl SlotGrid {
    /// Create a grid; `slot_minutes` must be non-zero and divide a day evenly.
    pub fn new(slot_minutes: u32) -> LapseResult<Self> {
        if slot_minutes == 0 || !MINUTES_PER_DAY.is_multiple_of(slot_minutes) {
            return Err(LapseError::validation(format!(
                "slot interval {slot_minutes} min must be non-zero and divide {MINUTES_PER_DAY}"
            )));
        }
        Ok(Self { slot_minutes })
    }

    /// Interval between slots in minutes.
    pub fn slot_minutes(self) -> u32 {
        self.slot_minutes
    }

    /// Number of slots per day.
    pub fn slots_per_day(self) -> u32 {
        MINUTES_PER_DAY / self.slot_minutes
    }

    /// Build a key, rejecting slots outside the grid.
    pub fn key(self, date: NaiveDate, slot: u32) -> LapseResult<FrameKey> {
        if slot >= self.slots_per_day() {
            return Err(LapseError::validation(format!(
                "slot {slot} out of range [0, {})",
                self.slots_per_day()
            )));
        }
        Ok(FrameKey { date, slot })
    }

    /// Canonical wall-clock timestamp of a key.
    pub fn timestamp(self, key: FrameKey) -> DateTime<Utc> {
        let midnight = key.date.and_time(NaiveTime::MIN).and_utc();
        midnight + Duration::minutes(i64::from(key.slot) * i64::from(self.slot_minutes))
    }

    /// Key whose canonical timestamp is exactly `ts`.
    pub fn key_at(self, ts: DateTime<Utc>) -> LapseResult<FrameKey> {
        let minutes = ts.hour() * 60 + ts.minute();
        if ts.second() != 0 || ts.nanosecond() != 0 || !minutes.is_multiple_of(self.slot_minutes)
        {
            return Err(LapseError::validation(format!(
                "timestamp {} is not aligned to the {}-minute grid",
                format_api_timestamp(ts),
                self.slot_minutes
            )));
        }
        self.key(ts.date_naive(), minutes / self.slot_minutes)
    }

    /// All keys of one day, in slot order.
    pub fn keys_for_day(self, date: NaiveDate) -> impl Iterator<Item = FrameKey> {
        (0..self.slots_per_day()).map(move |slot| FrameKey { date, slot })
    }

    /// All keys for the inclusive date range `[start, end]`, chronologically ordered.
    pub fn keys_for_range(self, start: NaiveDate, end: NaiveDate) -> LapseResult<Vec<FrameKey>> {
        let dates = dates_inclusive(start, end)?;
        let mut out = Vec::with_capacity(dates.len() * self.slots_per_day() as usize);
        for date in dates {
            out.extend(self.keys_for_day(date));
        }
        Ok(out)
    }
}

/// Dates of the inclusive range `[start, end]`.
pub fn dates_inclusive(start: NaiveDate, end: NaiveDate) -> LapseResult<Vec<NaiveDate>> {
    if start > end {
        return Err(LapseError::validation(format!(
            "date range start {start} must be <= end {end}"
        )));
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

/// ISO-8601 UTC timestamp without fractional seconds, as the screenshot API expects.
pub fn format_api_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Remove a fractional-seconds component (`.123`) from an ISO-8601 timestamp string.
///
/// Only the time part is touched; strings without a fraction are returned unchanged.
pub fn strip_fractional_seconds(ts: &str) -> String {
    let Some(t_pos) = ts.find('T') else {
        return ts.to_string();
    };
    let Some(dot_rel) = ts[t_pos..].find('.') else {
        return ts.to_string();
    };
    let dot = t_pos + dot_rel;
    let digits_end = ts[dot + 1..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(ts.len(), |i| dot + 1 + i);
    format!("{}{}", &ts[..dot], &ts[digits_end..])
}

/// Parse an ISO-8601 timestamp, tolerating (and discarding) fractional seconds.
pub fn parse_api_timestamp(ts: &str) -> LapseResult<DateTime<Utc>> {
    let cleaned = strip_fractional_seconds(ts.trim());
    DateTime::parse_from_rfc3339(&cleaned)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LapseError::validation(format!("invalid timestamp '{ts}': {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;

//! Descending row keys for the column-family sink.
//!
//! Row keys are `partition + "_" + time_index + id`, where `time_index` is
//! `u64::MAX` minus the binary-encoded creation time, left-padded with spaces
//! to 20 characters. Newer rows of a partition therefore sort first in a
//! lexicographic scan, and the trailing id keeps keys unique within one tick.
//!
//! The binary encoding is the 100-nanosecond tick count since
//! `0001-01-01T00:00:00Z` with bit 62 set to mark the timestamp as UTC, so
//! keys written by earlier producers of the same tables stay comparable.

use chrono::{DateTime, Utc};

/// Ticks between `0001-01-01` and the Unix epoch.
const EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Kind marker for UTC timestamps.
const UTC_KIND: u64 = 1 << 62;

/// Width of the time index.
const TIME_INDEX_WIDTH: usize = 20;

/// Encodes a UTC timestamp as tick count plus kind marker.
pub fn binary_timestamp(ts: DateTime<Utc>) -> u64 {
  let ticks = ts.timestamp() * 10_000_000 + i64::from(ts.timestamp_subsec_nanos() / 100);
  let ticks = EPOCH_TICKS.saturating_add(ticks).max(0) as u64;
  ticks | UTC_KIND
}

/// The descending time component of a row key.
pub fn time_index(ts: DateTime<Utc>) -> String {
  format!(
    "{:>width$}",
    u64::MAX - binary_timestamp(ts),
    width = TIME_INDEX_WIDTH
  )
}

/// Builds the full row key for a record of `partition` created at `ts`.
pub fn row_key(partition: &str, ts: DateTime<Utc>, id: i64) -> String {
  format!("{}_{}{}", partition, time_index(ts), id)
}

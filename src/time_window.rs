//! Calendar-day boundaries for the channel's local time.
//!
//! The local zone is a fixed offset from UTC; no timezone database is
//! consulted, so daylight-saving shifts are not modelled.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::Serialize;

const UTC_MILLIS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Inclusive UTC bounds of one local calendar day, pre-formatted for the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    pub start: String,
    pub finish: String,
}

pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// ISO calendar date (`YYYY-MM-DD`) of `now` in local terms.
pub fn reference_date(now: DateTime<Utc>, offset: FixedOffset) -> String {
    local_date(now, offset).format("%Y-%m-%d").to_string()
}

/// Local midnight through local 23:59:59.999 of the current day, expressed in UTC.
pub fn today_window(now: DateTime<Utc>, offset: FixedOffset) -> DayWindow {
    let start_local = local_date(now, offset).and_time(NaiveTime::MIN);
    let finish_local = start_local + TimeDelta::days(1) - TimeDelta::milliseconds(1);

    DayWindow {
        start: format_utc(to_utc(start_local, offset)),
        finish: format_utc(to_utc(finish_local, offset)),
    }
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> NaiveDateTime {
    local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))
}

fn format_utc(naive: NaiveDateTime) -> String {
    naive.format(UTC_MILLIS_FORMAT).to_string()
}

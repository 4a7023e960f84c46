//! Timestamp normalization and display formatting

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike, Utc};

use crate::models::EventTimestamp;

/// Normalize a wire timestamp to a comparable instant.
///
/// Strings are parsed as ISO-8601 (`Z`, numeric offsets, or no offset meaning
/// UTC; `T` or space separator). Numbers are epoch seconds. Anything else is
/// `None`.
pub fn normalize(ts: &EventTimestamp) -> Option<DateTime<Utc>> {
    match ts {
        EventTimestamp::Text(raw) => parse_iso(raw),
        EventTimestamp::Epoch(secs) => from_epoch_seconds(*secs),
    }
}

fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    None
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
}

/// `M/D/YYYY H:MM AM|PM` in the given offset.
///
/// Month, day and hour are not zero-padded; minutes are. Midnight is 12 AM
/// and noon is 12 PM.
pub fn format_created(instant: DateTime<Utc>, offset: &FixedOffset) -> String {
    let local = instant.with_timezone(offset);
    let (is_pm, hour) = local.hour12();

    format!(
        "{}/{}/{} {}:{:02} {}",
        local.month(),
        local.day(),
        local.year(),
        hour,
        local.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

/// Current time, formatted for a new history entry
pub fn now_created(offset: &FixedOffset) -> String {
    format_created(Utc::now(), offset)
}

//! Wire time formats used by the coordinator protocol.
//!
//! Timestamps are `YYYY-MM-DDTHH:MM:SS[.mmm]Z`; durations are `<seconds>s`
//! with an optional fractional part. Parsing is deliberately permissive:
//! unparsable input never panics, it degrades to a neutral value the caller
//! already knows how to handle (epoch for timestamps, zero for durations).

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Formats an instant the way the coordinator expects, always with
/// millisecond precision (e.g. `2015-06-17T17:22:49.999Z`).
pub fn format_cloud_time(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a coordinator timestamp. Accepts both the millisecond form and the
/// zero-millisecond form (`...:49Z`). Returns `None` on anything else; a
/// caller that needs a concrete deadline should treat `None` as "already
/// expired" the same way the original client's `cloud_time_to_timestamp`
/// falls back to `0`.
pub fn parse_cloud_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // `chrono::DateTime::parse_from_rfc3339` already accepts both the
    // fractional and non-fractional forms; the explicit strptime below only
    // guards against a trailing `Z` lowercase/offset quirk rejected above.
    Utc.datetime_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ").ok()
}

/// Formats a duration as `<seconds>s`, with a fractional part only when
/// non-zero (`"180s"`, `"5.123s"`).
pub fn format_duration_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}s", secs as i64)
    } else {
        format!("{secs:.3}s")
    }
}

/// Parses a `<seconds>s` duration. Unparsable input yields `0.0`, mirroring
/// the original's unguarded-but-tolerant `float(s.rstrip('s'))` being made
/// panic-free.
pub fn parse_duration_secs(s: &str) -> f64 {
    s.trim()
        .trim_end_matches(['s', 'S'])
        .parse::<f64>()
        .unwrap_or(0.0)
}

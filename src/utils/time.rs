//! Relative time expressions ("24h", "7d", "now") to absolute timestamps

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Normalize a time expression against the current clock
pub fn normalize(expr: &str) -> String {
    normalize_at(expr, Utc::now())
}

/// Normalize a time expression against a fixed clock.
///
/// `now` maps to `now`, `<n>h|d|m` to `now` minus that span, and anything
/// else (absolute timestamps included) passes through unchanged.
pub fn normalize_at(expr: &str, now: DateTime<Utc>) -> String {
    let trimmed = expr.trim();
    if trimmed == "now" {
        return to_iso(now);
    }
    if trimmed.contains('T') || trimmed.contains('-') {
        return trimmed.to_string();
    }
    parse_relative(trimmed)
        .and_then(|span| now.checked_sub_signed(span))
        .map(to_iso)
        .unwrap_or_else(|| trimmed.to_string())
}

fn parse_relative(expr: &str) -> Option<Duration> {
    let unit = expr.chars().last()?;
    let amount = &expr[..expr.len() - unit.len_utf8()];
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: i64 = amount.parse().ok()?;
    match unit {
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        'm' => Duration::try_minutes(amount),
        _ => None,
    }
}

fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Epoch milliseconds of an RFC 3339 timestamp
pub fn to_millis(iso: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(iso.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

//! Time helpers for signing, order-id epochs, and exchange timestamps.

use chrono::{DateTime, Duration, Utc};

/// Exchange local time is UTC+8.
const EXCHANGE_UTC_OFFSET_SECS: i64 = 8 * 3600;

/// Signature timestamp format: second precision, no timezone suffix.
const SIGN_TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Current UTC time formatted for the `Timestamp` signature parameter.
pub fn sign_timestamp() -> String {
    format_sign_timestamp(Utc::now())
}

/// Format an instant for the `Timestamp` signature parameter.
pub fn format_sign_timestamp(at: DateTime<Utc>) -> String {
    at.format(SIGN_TIMESTAMP_FMT).to_string()
}

/// Compact numeric connection epoch (`yyMMddHHmmss` in exchange local time).
///
/// Used as the prefix of every locally generated order id.
pub fn connection_epoch(at: DateTime<Utc>) -> u64 {
    let local = at.naive_utc() + Duration::seconds(EXCHANGE_UTC_OFFSET_SECS);
    local.format("%y%m%d%H%M%S").to_string().parse().unwrap_or_default()
}

/// Convert exchange milliseconds since epoch to a UTC datetime.
///
/// Out-of-range values collapse to the Unix epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Convert exchange seconds since epoch to a UTC datetime.
pub fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

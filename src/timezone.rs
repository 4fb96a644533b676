use time::{OffsetDateTime, UtcOffset};
use time_tz::{Offset, TimeZone};

use crate::Error;

/// The UTC offset of `canonical_timezone` at `at`, e.g. +12:00 for
/// "Pacific/Auckland" in winter.
///
/// # Errors
/// Returns an [Error::InvalidTimezone] if the name is not a canonical timezone.
pub fn get_local_offset(canonical_timezone: &str, at: OffsetDateTime) -> Result<UtcOffset, Error> {
    let Some(timezone) = time_tz::timezones::get_by_name(canonical_timezone) else {
        tracing::error!("Invalid timezone {}", canonical_timezone);
        return Err(Error::InvalidTimezone(canonical_timezone.to_owned()));
    };

    Ok(timezone.get_offset_utc(&at).to_utc())
}

/// Convert `timestamp` to the local time of `canonical_timezone`.
///
/// # Errors
/// Returns an [Error::InvalidTimezone] if the name is not a canonical timezone.
pub fn to_local_time(
    timestamp: OffsetDateTime,
    canonical_timezone: &str,
) -> Result<OffsetDateTime, Error> {
    Ok(timestamp.to_offset(get_local_offset(canonical_timezone, timestamp)?))
}

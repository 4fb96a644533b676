//! Text formatting for amounts, percentages and timestamps.

use std::sync::OnceLock;

use numfmt::{Formatter, Precision};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{Error, timezone::to_local_time};

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

/// Format an amount of money as dollars with two decimal places, e.g. "$1,234.50".
pub fn format_currency(number: f64) -> String {
    static POSITIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let positive_fmt = POSITIVE_FMT.get_or_init(|| {
        Formatter::currency("$")
            .expect("\"$\" is a valid currency prefix")
            .precision(Precision::Decimals(2))
    });

    static NEGATIVE_FMT: OnceLock<Formatter> = OnceLock::new();

    let negative_fmt = NEGATIVE_FMT.get_or_init(|| {
        Formatter::currency("-$")
            .expect("\"-$\" is a valid currency prefix")
            .precision(Precision::Decimals(2))
    });

    let mut formatted_string = if number < 0.0 {
        negative_fmt.fmt_string(number.abs())
    } else if number > 0.0 {
        positive_fmt.fmt_string(number)
    } else {
        // numfmt renders zero as "0".
        "$0.00".to_owned()
    };

    // numfmt drops a trailing zero, e.g. "12.30" comes out as "12.3".
    if formatted_string.as_bytes()[formatted_string.len() - 3] != b'.' {
        formatted_string = format!("{formatted_string}0");
    }

    formatted_string
}

/// Format a percentage rounded to a whole number, never showing "-0".
pub fn format_percentage(value: f64) -> String {
    let rounded = value.round();
    if rounded.abs() < 0.5 {
        "0%".to_owned()
    } else {
        format!("{rounded:.0}%")
    }
}

/// Format a creation time in the local time of `canonical_timezone`.
///
/// A missing timestamp is shown as "-".
///
/// # Errors
/// Returns an [Error::InvalidTimezone] if the timezone name is not canonical,
/// or an [Error::TimestampFormat] if the local time cannot be formatted.
pub fn format_timestamp(
    timestamp: Option<OffsetDateTime>,
    canonical_timezone: &str,
) -> Result<String, Error> {
    let Some(timestamp) = timestamp else {
        return Ok("-".to_owned());
    };

    Ok(to_local_time(timestamp, canonical_timezone)?.format(TIMESTAMP_FORMAT)?)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::{
        Error,
        format::{format_currency, format_percentage, format_timestamp},
    };

    #[test]
    fn formats_currency() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(12.3), "$12.30");
        assert_eq!(format_currency(-12.3), "-$12.30");
    }

    #[test]
    fn formats_whole_and_large_amounts() {
        assert_eq!(format_currency(40.0), "$40.00");
        assert_eq!(format_currency(1234.5), "$1,234.50");
    }

    #[test]
    fn formats_percentage_without_negative_zero() {
        assert_eq!(format_percentage(66.666), "67%");
        assert_eq!(format_percentage(-0.2), "0%");
        assert_eq!(format_percentage(0.0), "0%");
        assert_eq!(format_percentage(100.0), "100%");
    }

    #[test]
    fn formats_timestamp_in_local_time() {
        let got = format_timestamp(Some(datetime!(2025-07-01 20:30 UTC)), "Pacific/Auckland");

        assert_eq!(got, Ok("2025-07-02 08:30".to_owned()));
    }

    #[test]
    fn format_failures_are_not_timezone_errors() {
        // `Format::InsufficientTypeInformation` is `#[non_exhaustive]`; obtain it from the library.
        let err = time::macros::date!(2025 - 07 - 01)
            .format(time::macros::format_description!("[hour]"))
            .unwrap_err();
        assert!(matches!(err, time::error::Format::InsufficientTypeInformation { .. }));
        let got = Error::from(err);

        assert!(matches!(got, Error::TimestampFormat(_)), "got {got:?}");
    }

    #[test]
    fn formats_missing_timestamp() {
        assert_eq!(format_timestamp(None, "Etc/UTC"), Ok("-".to_owned()));
    }
}

//! Date and timestamp coercion for hospital exports.
//!
//! Source systems write timestamps in many shapes (`2021-03-04 09:10:00`,
//! `20210304091000`, `2021/03/04`, ...). Everything is coerced to
//! `NaiveDateTime`/`NaiveDate`; anything unrecognised is `None`, never an
//! error, so a single bad cell cannot abort a table.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Lower bound used for open-ended validity intervals.
pub fn open_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Upper bound used for open-ended validity intervals.
pub fn open_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or(NaiveDate::MAX)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Parses a source timestamp. Date-only values get midnight.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return parse_compact(trimmed);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parses the date part of a source timestamp.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    parse_datetime(value).map(|dt| dt.date())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `YYYYMMDD`, `YYYYMMDDHHMM` and `YYYYMMDDHHMMSS`.
fn parse_compact(digits: &str) -> Option<NaiveDateTime> {
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();
    let year = digits.get(0..4)?.parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?;
    let time = match digits.len() {
        8 => NaiveTime::MIN,
        12 => NaiveTime::from_hms_opt(field(8..10)?, field(10..12)?, 0)?,
        14 => NaiveTime::from_hms_opt(field(8..10)?, field(10..12)?, field(12..14)?)?,
        _ => return None,
    };
    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_iso_and_compact_forms() {
        let expected = ymd(2021, 3, 4).and_hms_opt(9, 10, 0).unwrap();
        assert_eq!(parse_datetime("2021-03-04 09:10:00"), Some(expected));
        assert_eq!(parse_datetime("2021-03-04T09:10"), Some(expected));
        assert_eq!(parse_datetime("202103040910"), Some(expected));
        assert_eq!(parse_datetime("20210304091000"), Some(expected));
        assert_eq!(parse_datetime("2021/03/04 09:10"), Some(expected));
    }

    #[test]
    fn date_only_values_get_midnight() {
        assert_eq!(
            parse_datetime("20210304"),
            Some(ymd(2021, 3, 4).and_time(NaiveTime::MIN))
        );
        assert_eq!(parse_date("2021.03.04"), Some(ymd(2021, 3, 4)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime("20211304"), None);
        assert_eq!(parse_datetime("2021030"), None);
    }

    #[test]
    fn open_bounds_format_as_sentinel_dates() {
        assert_eq!(format_date(open_start()), "1900-01-01");
        assert_eq!(format_date(open_end()), "2099-12-31");
    }
}

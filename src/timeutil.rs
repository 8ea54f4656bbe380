//! Calendar-date helpers and the finite-mean statistic.
//!
//! All dates are plain calendar dates (`chrono::NaiveDate`) built from
//! local year/month/day fields. Routing through a UTC-interpreting parse
//! shifts dates by a day near midnight, so nothing here touches a
//! timezone.

use chrono::{Datelike, Duration, NaiveDate};

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(d: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())
}

/// Parse a strict `YYYY-MM-DD` string. Returns None for anything else.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parse a date in whichever format a wearable CSV export used.
///
/// Tries ISO first, then the slash and long-month forms seen in Oura,
/// Whoop and Fitbit exports. Returns None when nothing matches; CSV
/// ingestion skips such rows rather than failing the import.
pub fn parse_loose_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_matches('"');
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%d %b %Y",
        "%d %B %Y",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Add `n` calendar days (n may be negative).
pub fn add_days(d: NaiveDate, n: i64) -> NaiveDate {
    d + Duration::days(n)
}

/// Arithmetic mean over the finite values in `values`.
///
/// Non-finite entries (NaN, infinities) are ignored. Returns None when
/// no finite value remains; callers must treat that as "no data",
/// never as zero.
pub fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Render a statistic for display: one decimal place, em dash when
/// there is no data.
pub fn fmt_stat(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", digits, v),
        _ => "—".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_round_trip() {
        for s in ["2024-01-01", "2023-12-31", "2024-02-29", "1999-06-07"] {
            let d = parse_date(s).unwrap();
            assert_eq!(format_date(d), s);
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("2024-13-01").is_none());
        assert!(parse_date("2023-02-29").is_none());
    }

    #[test]
    fn test_parse_loose_date_formats() {
        let expected = parse_date("2024-01-05").unwrap();
        assert_eq!(parse_loose_date("2024-01-05"), Some(expected));
        assert_eq!(parse_loose_date("1/5/2024"), Some(expected));
        assert_eq!(parse_loose_date("01/05/24"), Some(expected));
        assert_eq!(parse_loose_date("Jan 5, 2024"), Some(expected));
        assert_eq!(parse_loose_date("5 January 2024"), Some(expected));
        assert_eq!(parse_loose_date("\"2024/01/05\""), Some(expected));
        assert!(parse_loose_date("not a date").is_none());
    }

    #[test]
    fn test_add_days_crosses_month_boundary() {
        let d = parse_date("2024-01-31").unwrap();
        assert_eq!(format_date(add_days(d, 1)), "2024-02-01");
        assert_eq!(format_date(add_days(d, -31)), "2023-12-31");
    }

    #[test]
    fn test_mean_ignores_non_finite() {
        assert_eq!(mean(&[3.0, f64::NAN, 5.0]), Some(4.0));
        assert_eq!(mean(&[2.0]), Some(2.0));
    }

    #[test]
    fn test_mean_empty_is_no_data() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[f64::NAN, f64::INFINITY]), None);
    }

    #[test]
    fn test_fmt_stat() {
        assert_eq!(fmt_stat(Some(4.25), 1), "4.2");
        assert_eq!(fmt_stat(None, 1), "—");
        assert_eq!(fmt_stat(Some(f64::NAN), 1), "—");
    }
}

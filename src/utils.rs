use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parses a date the way spreadsheet exports tend to write them.
/// Returns `None` for anything unrecognised instead of failing.
pub fn parse_date_permissive(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Parses a monetary amount from text.
///
/// Accepts thousands separators, a leading currency symbol and accounting
/// style negatives, e.g. `"$1,250.00"` or `"(300)"`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negated, body) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | ' '))
        .collect();

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if negated { -value } else { value })
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Percentile with linear interpolation between closest ranks.
/// `sorted` must be ascending; `q` is in `0.0..=100.0`.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Divides, or reports `None` when the denominator is zero.
pub fn checked_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(parse_date_permissive("2025-03-01"), Some(expected));
        assert_eq!(parse_date_permissive("2025/03/01"), Some(expected));
        assert_eq!(parse_date_permissive("03/01/2025"), Some(expected));
        assert_eq!(parse_date_permissive("01.03.2025"), Some(expected));
        assert_eq!(parse_date_permissive("Mar 01, 2025"), Some(expected));
        assert_eq!(parse_date_permissive("2025-03-01 14:30:00"), Some(expected));
        assert_eq!(
            parse_date_permissive("2025-03-01T09:00:00+02:00"),
            Some(expected)
        );
    }

    #[test]
    fn test_parse_date_garbage_is_none() {
        assert_eq!(parse_date_permissive("not a date"), None);
        assert_eq!(parse_date_permissive(""), None);
        assert_eq!(parse_date_permissive("2025-13-45"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000"), Some(1000.0));
        assert_eq!(parse_amount(" $1,250.50 "), Some(1250.5));
        assert_eq!(parse_amount("(300)"), Some(-300.0));
        assert_eq!(parse_amount("-42.5"), Some(-42.5));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_contains_ignore_case() {
        assert!(contains_ignore_case("Income:Sales", "income"));
        assert!(contains_ignore_case("total current ASSETS", "Current Assets"));
        assert!(!contains_ignore_case("Revenue", "Income"));
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 50.0), Some(3.0));
        assert_eq!(percentile(&sorted, 100.0), Some(5.0));
        assert!((percentile(&sorted, 90.0).unwrap() - 4.6).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_checked_ratio() {
        assert_eq!(checked_ratio(1.0, 4.0), Some(0.25));
        assert_eq!(checked_ratio(1.0, 0.0), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
        assert_eq!(mean(&[]), None);
    }
}

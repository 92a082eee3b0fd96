//! Field normalization shared by the transformers.
//!
//! Every helper degrades to a safe default instead of failing: an unusable
//! phone is "no contact", an unparseable date is "unknown".

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::model::Gender;

/// Honorific prefixes stripped from legacy names.
const HONORIFICS: &[&str] = &["Mrs.", "Mrs", "Mr.", "Mr", "Ms.", "Dr.", "Dr", "Baby", "Master"];

/// Phone numbers keep this many trailing digits.
pub const PHONE_DIGITS: usize = 10;

/// Time of day used when a legacy timestamp carries none.
pub const DEFAULT_APPOINTMENT_TIME: &str = "10:00";

/// MySQL zero-date sentinel.
const ZERO_DATE: &str = "0000-00-00";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Strip leading honorifics and collapse internal whitespace.
///
/// A prefix only matches as a whole word, so `Drew` keeps its `Dr`.
/// Stripping repeats (`Mr. Dr. X` → `X`) but never empties the name.
pub fn clean_name(raw: &str) -> String {
    let mut rest = raw.trim();
    'outer: loop {
        for prefix in HONORIFICS {
            if let Some(stripped) = strip_word_prefix(rest, prefix) {
                if stripped.is_empty() {
                    break 'outer;
                }
                rest = stripped;
                continue 'outer;
            }
        }
        break;
    }
    clean_whitespace(rest)
}

/// Trim and collapse runs of whitespace to one space.
pub fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_word_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let tail = &text[prefix.len()..];
    let boundary = prefix.ends_with('.')
        || tail.is_empty()
        || tail.starts_with(|c: char| c.is_whitespace() || c == '.');
    if !boundary {
        return None;
    }
    Some(tail.trim_start_matches('.').trim_start())
}

/// Split a cleaned name into first name and the remainder.
pub fn split_name(name: &str) -> (String, String) {
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Keep the last ten digits; fewer than ten digits means no usable phone.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < PHONE_DIGITS {
        return None;
    }
    Some(digits[digits.len() - PHONE_DIGITS..].iter().collect())
}

/// Male/Female/Other by first letter.
pub fn normalize_gender(raw: Option<&str>) -> Gender {
    match raw
        .and_then(|g| g.trim().chars().next())
        .map(|c| c.to_ascii_lowercase())
    {
        Some('m') => Gender::Male,
        Some('f') => Gender::Female,
        _ => Gender::Other,
    }
}

/// Lowercased email, or `None` when it cannot be an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Some(email),
        _ => None,
    }
}

/// Parse the date part of a legacy date or timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with(ZERO_DATE) {
        return None;
    }
    if let Some(ts) = parse_timestamp(raw) {
        return Some(ts.date());
    }
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Parse a legacy timestamp that carries a time of day.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.starts_with(ZERO_DATE) {
        return None;
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Legacy timestamp as UTC, falling back to `default`.
pub fn timestamp_or(raw: Option<&str>, default: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|r| {
        parse_timestamp(r).or_else(|| parse_date(r).and_then(|d| d.and_hms_opt(0, 0, 0)))
    })
    .map(|ts| ts.and_utc())
    .unwrap_or(default)
}

/// `HH:MM` from a legacy timestamp, `10:00` when there is none.
pub fn time_of_day(raw: Option<&str>) -> String {
    raw.and_then(parse_timestamp)
        .map(|ts| format!("{:02}:{:02}", ts.hour(), ts.minute()))
        .unwrap_or_else(|| DEFAULT_APPOINTMENT_TIME.to_string())
}

/// Canonical display id: prefix plus zero-padded number.
pub fn format_display_id(prefix: &str, width: usize, number: i64) -> String {
    format!("{prefix}{number:0width$}")
}

/// Last run of ASCII digits in `text`, as a number.
pub fn trailing_digits(text: &str) -> Option<i64> {
    let end = text.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = text[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    text[start..end].parse().ok()
}

/// Non-negative amount, anything else becomes zero.
pub fn money(raw: Option<f64>) -> f64 {
    match raw {
        Some(v) if v.is_finite() && v > 0.0 => (v * 100.0).round() / 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("Dr. Ankita Sharma"), "Ankita Sharma");
        assert_eq!(clean_name("Ankita Sharma"), "Ankita Sharma");
        assert_eq!(clean_name("mrs.  Rekha   Devi "), "Rekha Devi");
        assert_eq!(clean_name("Baby of Sunita"), "of Sunita");
        assert_eq!(clean_name("Master Rohan"), "Rohan");
        assert_eq!(clean_name("Mr. Dr. Kumar"), "Kumar");
        assert_eq!(clean_name("Drew Barry"), "Drew Barry");
        assert_eq!(clean_name("Mrinal Sen"), "Mrinal Sen");
        assert_eq!(clean_name("Dr."), "Dr.");
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Ankita Sharma"), ("Ankita".into(), "Sharma".into()));
        assert_eq!(split_name("Asha"), ("Asha".into(), String::new()));
        assert_eq!(
            split_name("Ram Prasad Gupta"),
            ("Ram".into(), "Prasad Gupta".into())
        );
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone("+91-98765-43210").as_deref(),
            Some("9876543210")
        );
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("098765 43210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn test_normalize_gender() {
        assert_eq!(normalize_gender(Some("M")), Gender::Male);
        assert_eq!(normalize_gender(Some("female")), Gender::Female);
        assert_eq!(normalize_gender(Some(" F ")), Gender::Female);
        assert_eq!(normalize_gender(Some("x")), Gender::Other);
        assert_eq!(normalize_gender(None), Gender::Other);
    }

    #[test]
    fn test_dates() {
        assert_eq!(parse_date("0000-00-00"), None);
        assert_eq!(parse_date("0000-00-00 00:00:00"), None);
        assert_eq!(
            parse_date("1985-07-14"),
            NaiveDate::from_ymd_opt(1985, 7, 14)
        );
        assert_eq!(
            parse_date("14/07/1985"),
            NaiveDate::from_ymd_opt(1985, 7, 14)
        );
        assert_eq!(
            parse_date("2021-03-04 14:30:00"),
            NaiveDate::from_ymd_opt(2021, 3, 4)
        );
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(time_of_day(Some("2021-03-04 14:30:00")), "14:30");
        assert_eq!(time_of_day(Some("2021-03-04")), "10:00");
        assert_eq!(time_of_day(Some("garbage")), "10:00");
        assert_eq!(time_of_day(None), "10:00");
    }

    #[test]
    fn test_display_id_helpers() {
        assert_eq!(format_display_id("PAT", 6, 1042), "PAT001042");
        assert_eq!(format_display_id("PAT", 3, 123456), "PAT123456");
        assert_eq!(trailing_digits("P-00042"), Some(42));
        assert_eq!(trailing_digits("pat12x7"), Some(7));
        assert_eq!(trailing_digits("none"), None);
    }

    #[test]
    fn test_email_and_money() {
        assert_eq!(
            normalize_email(" Asha@Example.COM ").as_deref(),
            Some("asha@example.com")
        );
        assert_eq!(normalize_email("n/a"), None);
        assert_eq!(money(Some(12.5)), 12.5);
        assert_eq!(money(Some(10.004)), 10.0);
        assert_eq!(money(Some(-5.0)), 0.0);
        assert_eq!(money(None), 0.0);
    }
}

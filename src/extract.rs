use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;

use crate::error::Error;
use crate::fallback::FallbackChain;

lazy_static! {
    static ref DURATION_TERM_REGEX: Regex = Regex::new(r"(\d+)\s*([A-Za-z]+)").unwrap();
}

// chrono::Duration panics past this many seconds; anything near it is
// garbage input anyway.
const DURATION_SECONDS_CAP: i64 = i64::MAX / 1_000;

/// The labelled fragments of a story's profile info line, plus the reference
/// instant used to resolve partial and relative dates. Taking the instant
/// here keeps every coercion deterministic under test.
pub struct InfoFields {
    fragments: Vec<String>,
    now: DateTime<Utc>,
}

impl InfoFields {
    pub fn new(fragments: Vec<String>, now: DateTime<Utc>) -> Self {
        InfoFields { fragments, now }
    }

    /// Splits the raw ` - `-separated info line the profile page carries.
    pub fn from_line(line: &str, now: DateTime<Utc>) -> Self {
        let fragments = line
            .split(" - ")
            .map(|fragment| fragment.trim().to_string())
            .collect();
        InfoFields::new(fragments, now)
    }

    /// The trimmed remainder of the first fragment starting with `label`,
    /// or `None` when no fragment carries that label.
    pub fn text(&self, label: &str) -> Option<String> {
        find_labeled(&self.fragments, label)
    }

    /// A labelled count with thousands separators stripped. Absent is not an
    /// error; a present fragment that holds no number is.
    pub fn count(&self, label: &str) -> Result<Option<u64>, Error> {
        match self.text(label) {
            Some(value) => parse_count(label, &value).map(Some),
            None => Ok(None),
        }
    }

    /// A labelled date in any of the three shapes the site serves.
    pub fn date(&self, label: &str) -> Result<Option<NaiveDate>, Error> {
        match self.text(label) {
            Some(value) => parse_date(label, &value, self.now).map(Some),
            None => Ok(None),
        }
    }

    /// A positional (unlabelled) fragment such as the language name. A
    /// fragment shaped like `Label: value` is never a positional value, so a
    /// short info line cannot shift a labelled field into this slot.
    pub fn positional(&self, index: usize) -> Option<String> {
        let fragment = self.fragments.get(index)?;
        if fragment.contains(':') || fragment.is_empty() {
            return None;
        }
        Some(fragment.clone())
    }
}

/// First fragment with the given literal prefix, label stripped and the rest
/// trimmed. A fragment merely *containing* the label text does not match.
pub fn find_labeled(fragments: &[String], label: &str) -> Option<String> {
    fragments
        .iter()
        .find(|fragment| fragment.starts_with(label))
        .map(|fragment| fragment[label.len()..].trim().to_string())
}

/// Integer coercion for counts like `12,345`: every non-digit is dropped
/// before conversion. A value left with no digits at all is fatal.
pub fn parse_count(field: &str, value: &str) -> Result<u64, Error> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().map_err(|_| Error::Field {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Date coercion through the fallback chain, in order: absolute
/// `month/day/year`; `month/day` with the year defaulted to the reference
/// instant's (which drifts for stories spanning a year boundary; the source
/// format leaves no better option); a relative duration subtracted from the reference
/// instant and truncated to a date. A present value that satisfies none of
/// the shapes is fatal.
pub fn parse_date(field: &str, value: &str, now: DateTime<Utc>) -> Result<NaiveDate, Error> {
    let recoverable =
        |miss: &Error| matches!(miss, Error::DateFormat(_) | Error::Duration(_));
    let chain = FallbackChain::new(value)
        .attempt(
            |s| NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y").map_err(Error::from),
            recoverable,
        )?
        .attempt(
            |s| {
                let with_year = format!("{}/{}", s.trim(), now.year());
                NaiveDate::parse_from_str(&with_year, "%m/%d/%Y").map_err(Error::from)
            },
            recoverable,
        )?
        .attempt(|s| parse_relative(s, now), recoverable)?;
    chain.finish().ok_or_else(|| Error::Field {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// `"3 hours"` means "the reference instant minus three hours", truncated
/// to a date.
fn parse_relative(value: &str, now: DateTime<Utc>) -> Result<NaiveDate, Error> {
    let span = parse_duration(value)?;
    let instant = now
        .checked_sub_signed(span)
        .ok_or_else(|| Error::DateRange(value.to_string()))?;
    Ok(instant.date_naive())
}

/// One or more `<integer> <unit>` terms with an optional trailing "ago".
/// Units run from seconds to years; a month is 30 days and a year 365, the
/// precision the source itself offers. Leftover text means the value was
/// never a duration.
fn parse_duration(value: &str) -> Result<Duration, Error> {
    let unrecognized = || Error::Duration(value.to_string());
    let mut seconds: i64 = 0;
    let mut terms = 0;
    for captures in DURATION_TERM_REGEX.captures_iter(value) {
        let amount: i64 = captures[1].parse().map_err(|_| unrecognized())?;
        let unit: i64 = match captures[2].to_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => 1,
            "m" | "min" | "mins" | "minute" | "minutes" => 60,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3_600,
            "d" | "day" | "days" => 86_400,
            "w" | "week" | "weeks" => 604_800,
            "mo" | "month" | "months" => 2_592_000,
            "y" | "yr" | "yrs" | "year" | "years" => 31_536_000,
            _ => return Err(unrecognized()),
        };
        let term = amount.checked_mul(unit).ok_or_else(unrecognized)?;
        seconds = seconds.checked_add(term).ok_or_else(unrecognized)?;
        terms += 1;
    }
    let leftover = DURATION_TERM_REGEX
        .replace_all(value, " ")
        .replace("ago", " ")
        .replace(',', " ");
    if terms == 0 || !leftover.trim().is_empty() {
        return Err(unrecognized());
    }
    if seconds > DURATION_SECONDS_CAP {
        return Err(unrecognized());
    }
    Ok(Duration::seconds(seconds))
}

#[cfg(test)]
use chrono::TimeZone;

#[cfg(test)]
fn fields(fragments: &[&str]) -> InfoFields {
    InfoFields::new(
        fragments.iter().map(|s| s.to_string()).collect(),
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    )
}

#[test]
fn test_labeled_lookup_ignores_fragment_order() {
    let forward = fields(&["Chapters: 33", "Words: 12,345"]);
    let backward = fields(&["Words: 12,345", "Chapters: 33"]);
    assert_eq!(Some("33".to_string()), forward.text("Chapters:"));
    assert_eq!(Some("33".to_string()), backward.text("Chapters:"));
    assert_eq!(None, forward.text("Reviews:"));
}

#[test]
fn test_label_is_a_prefix_not_a_substring() {
    let info = fields(&["Epic Chapters: the tale", "Chapters: 3"]);
    assert_eq!(Some(3), info.count("Chapters:").unwrap());
}

#[test]
fn test_count_strips_separators() {
    let info = fields(&["Words: 1,234,567", "Favs: 12.345"]);
    assert_eq!(Some(1_234_567), info.count("Words:").unwrap());
    assert_eq!(Some(12_345), info.count("Favs:").unwrap());
}

#[test]
fn test_absent_count_is_not_zero() {
    let info = fields(&["Words: 1,234"]);
    assert_eq!(None, info.count("Reviews:").unwrap());
}

#[test]
fn test_present_but_numberless_count_is_fatal() {
    assert!(parse_count("Words:", "lots").is_err());
}

#[test]
fn test_absolute_date() {
    let info = fields(&["Published: 4/5/2016"]);
    assert_eq!(
        Some(NaiveDate::from_ymd_opt(2016, 4, 5).unwrap()),
        info.date("Published:").unwrap()
    );
}

#[test]
fn test_partial_date_defaults_to_reference_year() {
    let info = fields(&["Updated: 4/5"]);
    assert_eq!(
        Some(NaiveDate::from_ymd_opt(2024, 4, 5).unwrap()),
        info.date("Updated:").unwrap()
    );
}

#[test]
fn test_relative_date_subtracts_from_reference_instant() {
    // 2024-01-01T12:00:00Z minus 3 hours is still 2024-01-01.
    let info = fields(&["Published: 3 hours"]);
    assert_eq!(
        Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
        info.date("Published:").unwrap()
    );
    // 13 hours crosses midnight.
    let info = fields(&["Published: 13h ago"]);
    assert_eq!(
        Some(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()),
        info.date("Published:").unwrap()
    );
}

#[test]
fn test_compound_durations() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    assert_eq!(
        NaiveDate::from_ymd_opt(2023, 12, 30).unwrap(),
        parse_relative("2 days, 3 hours ago", now).unwrap()
    );
    assert_eq!(
        NaiveDate::from_ymd_opt(2023, 12, 2).unwrap(),
        parse_relative("1mo", now).unwrap()
    );
}

#[test]
fn test_unparseable_present_date_is_fatal() {
    let info = fields(&["Updated: whenever"]);
    match info.date("Updated:") {
        Err(Error::Field { field, value }) => {
            assert_eq!("Updated:", field);
            assert_eq!("whenever", value);
        }
        other => panic!("expected a field error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_positional_skips_labelled_fragments() {
    let info = fields(&["Rated: Fiction K+", "English", "Chapters: 3"]);
    assert_eq!(Some("English".to_string()), info.positional(1));
    assert_eq!(None, info.positional(2));
    assert_eq!(None, info.positional(9));
}

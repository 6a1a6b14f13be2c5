use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMATS: &[&str] = &["%A, %B %d, %Y", "%B %d, %Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Parse a free-text contact timestamp, e.g. `"Friday, August 2, 2024"`.
/// Date-only inputs land on local midnight. Returns `None` when nothing matches.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let cleaned = text.replace('"', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(at.with_timezone(&Local).naive_local());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(cleaned, fmt) {
            return Some(at);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cleaned, fmt) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    // A weekday name that disagrees with the date is ignored rather than rejected.
    let (weekday, rest) = cleaned.split_once(", ")?;
    if !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    NaiveDate::parse_from_str(rest, "%B %d, %Y")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

/// Roll a date back to the Monday of its week (Sunday goes back six days).
pub fn week_key_of(date: NaiveDate) -> NaiveDate {
    let days_from_monday = date.weekday().num_days_from_monday() as i64;
    date - Duration::days(days_from_monday)
}

/// `"Aug 5 - Aug 11"` for the week starting on `week_key`.
pub fn week_label(week_key: NaiveDate) -> String {
    let sunday = week_key + Duration::days(6);
    format!("{} - {}", week_key.format("%b %-d"), sunday.format("%b %-d"))
}

/// Inclusive lower bound of a filter day: local midnight.
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Inclusive upper bound of a filter day: 23:59:59.999.
pub fn day_end(date: NaiveDate) -> NaiveDateTime {
    let last_milli = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    date.and_time(last_milli)
}

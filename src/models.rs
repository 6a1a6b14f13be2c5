use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::calendar;

/// One support contact, as materialized by the ingestion adapter.
///
/// Empty source cells are stored as `None`; non-empty values are kept verbatim
/// since every filter compares them by exact string equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactRecord {
    pub created_at: Option<NaiveDateTime>,
    pub user_id: Option<String>,
    pub escalated: String,
    pub csat: Option<String>,
    pub language: Option<String>,
    pub decagon_language: Option<String>,
    pub rtr_flagged: Option<String>,
    pub sandbox: Option<String>,
    pub user_device: Option<String>,
    pub fee_block_state: Option<String>,
    pub is_trial: Option<String>,
    pub admin_portal: Option<String>,
}

impl ContactRecord {
    /// Monday of the week `created_at` falls into. `None` iff `created_at` is `None`.
    pub fn week_key(&self) -> Option<NaiveDate> {
        self.created_at.map(|at| calendar::week_key_of(at.date()))
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated == "Yes"
    }

    /// CSAT score when the field is present and reads as an integer.
    pub fn csat_score(&self) -> Option<i64> {
        self.csat.as_deref().and_then(parse_score)
    }
}

/// Integer prefix of a score string: `"4"` → 4, `" 5 stars"` → 5, `"n/a"` → None.
/// Values outside the `i64` range are not scores.
pub fn parse_score(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len() - sign_len);
    if digits == 0 {
        return None;
    }
    trimmed[..sign_len + digits].parse::<i64>().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyMetric {
    pub week_key: NaiveDate,
    pub label: String,
    pub total: usize,
    pub escalated: usize,
    pub escalation_rate: f64,
    pub csat_count: usize,
    pub csat_sum: i128,
    pub csat_average: Option<f64>,
    pub escalation_trend: Option<f64>,
    pub csat_trend: Option<f64>,
}

/// Totals shown on the summary cards; computed over the whole filtered set,
/// including records without a parseable date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub total_records: usize,
    pub csat_responses: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterValues {
    pub languages: Vec<String>,
    pub decagon_languages: Vec<String>,
    pub devices: Vec<String>,
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

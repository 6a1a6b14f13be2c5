use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::calendar;
use crate::error::AppError;
use crate::models::{ContactRecord, FilterValues};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContactRow {
    created_at: String,
    #[serde(rename = "userId")]
    user_id: String,
    escalated: String,
    csat: String,
    language: String,
    #[serde(rename = "decagonlanguage")]
    decagon_language: String,
    #[serde(rename = "is_post_signup_rtr_flagged")]
    rtr_flagged: String,
    sandbox: String,
    user_device: String,
    #[serde(rename = "user_fee_block_state")]
    fee_block_state: String,
    is_trial: String,
    #[serde(rename = "isdecagon_admin_portal")]
    admin_portal: String,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl From<ContactRow> for ContactRecord {
    fn from(row: ContactRow) -> Self {
        ContactRecord {
            created_at: calendar::parse_date(&row.created_at),
            user_id: non_empty(row.user_id),
            escalated: row.escalated,
            csat: non_empty(row.csat),
            language: non_empty(row.language),
            decagon_language: non_empty(row.decagon_language),
            rtr_flagged: non_empty(row.rtr_flagged),
            sandbox: non_empty(row.sandbox),
            user_device: non_empty(row.user_device),
            fee_block_state: non_empty(row.fee_block_state),
            is_trial: non_empty(row.is_trial),
            admin_portal: non_empty(row.admin_portal),
        }
    }
}

pub fn load_csv(path: &Path) -> Result<Vec<ContactRecord>, AppError> {
    let file = std::fs::File::open(path)?;
    let records = read_records(std::io::BufReader::new(file))?;
    info!(path = %path.display(), records = records.len(), "dataset loaded");
    Ok(records)
}

/// Any `Read` source; a malformed row fails the whole load.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<ContactRecord>, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in rdr.deserialize::<ContactRow>() {
        records.push(ContactRecord::from(result?));
    }

    let undated = records.iter().filter(|r| r.created_at.is_none()).count();
    if undated > 0 {
        debug!(undated, "records without a parseable created_at");
    }

    Ok(records)
}

/// Contacts per user id across the whole unfiltered dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactCounts(HashMap<String, usize>);

impl ContactCounts {
    pub fn from_records(records: &[ContactRecord]) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for user_id in records.iter().filter_map(|r| r.user_id.as_ref()) {
            *counts.entry(user_id.clone()).or_insert(0) += 1;
        }
        ContactCounts(counts)
    }

    pub fn get(&self, user_id: &str) -> usize {
        self.0.get(user_id).copied().unwrap_or(0)
    }
}

/// Choices offered for the multi-select and device filters, plus the date span
/// of the dataset.
pub fn filter_values(records: &[ContactRecord]) -> FilterValues {
    fn distinct<'a>(values: impl Iterator<Item = Option<&'a String>>) -> Vec<String> {
        values
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    let dates = records.iter().filter_map(|r| r.created_at.map(|at| at.date()));

    FilterValues {
        languages: distinct(records.iter().map(|r| r.language.as_ref())),
        decagon_languages: distinct(records.iter().map(|r| r.decagon_language.as_ref())),
        devices: distinct(records.iter().map(|r| r.user_device.as_ref())),
        earliest: dates.clone().min(),
        latest: dates.max(),
    }
}

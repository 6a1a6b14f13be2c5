use tracing::debug;

use crate::calendar;
use crate::config::FilterConfig;
use crate::ingest::ContactCounts;
use crate::models::ContactRecord;

/// Records passing every rule of `config`, in input order.
pub fn apply<'a>(
    records: &'a [ContactRecord],
    config: &FilterConfig,
    counts: &ContactCounts,
) -> Vec<&'a ContactRecord> {
    let filtered: Vec<&ContactRecord> = records
        .iter()
        .filter(|record| matches(record, config, counts))
        .collect();
    debug!(
        input = records.len(),
        kept = filtered.len(),
        "filters applied"
    );
    filtered
}

pub fn matches(record: &ContactRecord, config: &FilterConfig, counts: &ContactCounts) -> bool {
    within_date_range(record, config)
        && matches_escalation(record, config)
        && within_repeat_bounds(record, config, counts)
        && config.csat.matches(record.csat.as_deref())
        && config.decagon_language.matches(record.decagon_language.as_deref())
        && config.rtr_flagged.matches(record.rtr_flagged.as_deref())
        && config.sandbox.matches(record.sandbox.as_deref())
        && matches_device(record, config)
        && config.fee_block_state.matches(record.fee_block_state.as_deref())
        && config.is_trial.matches(record.is_trial.as_deref())
        && config.language.matches(record.language.as_deref())
        && config.admin_portal.matches(record.admin_portal.as_deref())
}

/// Undated records are never excluded by the date range.
fn within_date_range(record: &ContactRecord, config: &FilterConfig) -> bool {
    let Some(at) = record.created_at else {
        return true;
    };
    if let Some(start) = config.start_date {
        if at < calendar::day_start(start) {
            return false;
        }
    }
    if let Some(end) = config.end_date {
        if at > calendar::day_end(end) {
            return false;
        }
    }
    true
}

fn matches_escalation(record: &ContactRecord, config: &FilterConfig) -> bool {
    config
        .escalated
        .as_deref()
        .map_or(true, |expected| record.escalated == expected)
}

/// Records without a user id are exempt from both bounds.
fn within_repeat_bounds(
    record: &ContactRecord,
    config: &FilterConfig,
    counts: &ContactCounts,
) -> bool {
    let Some(user_id) = record.user_id.as_deref() else {
        return true;
    };
    let contacts = counts.get(user_id);
    if config.repeat_contacts_min.is_some_and(|min| contacts < min) {
        return false;
    }
    if config.repeat_contacts_max.is_some_and(|max| contacts > max) {
        return false;
    }
    true
}

fn matches_device(record: &ContactRecord, config: &FilterConfig) -> bool {
    config
        .user_device
        .as_deref()
        .map_or(true, |expected| record.user_device.as_deref() == Some(expected))
}

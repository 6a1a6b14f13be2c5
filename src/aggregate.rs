use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::calendar;
use crate::models::{ContactRecord, FilterSummary, WeeklyMetric};

#[derive(Debug, Default)]
struct WeekAccumulator {
    total: usize,
    escalated: usize,
    csat_sum: i128,
    csat_count: usize,
}

impl WeekAccumulator {
    fn escalation_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.escalated as f64 / self.total as f64 * 100.0
        }
    }

    fn csat_average(&self) -> Option<f64> {
        if self.csat_count == 0 {
            None
        } else {
            Some(self.csat_sum as f64 / self.csat_count as f64)
        }
    }
}

/// Group records by week key into metrics sorted by week, each carrying its
/// change against the preceding week. Undated records are skipped.
pub fn weekly_metrics<'a, I>(records: I) -> Vec<WeeklyMetric>
where
    I: IntoIterator<Item = &'a ContactRecord>,
{
    let mut weeks: BTreeMap<NaiveDate, WeekAccumulator> = BTreeMap::new();

    for record in records {
        let Some(week_key) = record.week_key() else {
            continue;
        };
        let entry = weeks.entry(week_key).or_default();
        entry.total += 1;
        if record.is_escalated() {
            entry.escalated += 1;
        }
        if let Some(score) = record.csat_score() {
            entry.csat_sum += i128::from(score);
            entry.csat_count += 1;
        }
    }

    let mut metrics: Vec<WeeklyMetric> = Vec::with_capacity(weeks.len());
    let mut previous: Option<(f64, Option<f64>)> = None;

    for (week_key, week) in weeks {
        let escalation_rate = week.escalation_rate();
        let csat_average = week.csat_average();

        let (escalation_trend, csat_trend) = match previous {
            Some((prev_rate, prev_average)) => (
                rate_trend(escalation_rate, prev_rate),
                csat_average
                    .zip(prev_average)
                    .map(|(avg, prev)| percent_change(avg, prev)),
            ),
            None => (None, None),
        };

        metrics.push(WeeklyMetric {
            week_key,
            label: calendar::week_label(week_key),
            total: week.total,
            escalated: week.escalated,
            escalation_rate,
            csat_count: week.csat_count,
            csat_sum: week.csat_sum,
            csat_average,
            escalation_trend,
            csat_trend,
        });
        previous = Some((escalation_rate, csat_average));
    }

    debug!(weeks = metrics.len(), "weekly metrics computed");
    metrics
}

/// A week following a 0% week reports no trend rather than an infinite one.
fn rate_trend(rate: f64, prev_rate: f64) -> Option<f64> {
    if prev_rate > 0.0 {
        Some(percent_change(rate, prev_rate))
    } else {
        None
    }
}

fn percent_change(current: f64, previous: f64) -> f64 {
    (current - previous) / previous * 100.0
}

pub fn summarize<'a, I>(records: I) -> FilterSummary
where
    I: IntoIterator<Item = &'a ContactRecord>,
{
    records
        .into_iter()
        .fold(FilterSummary::default(), |mut summary, record| {
            summary.total_records += 1;
            if record.csat_score().is_some() {
                summary.csat_responses += 1;
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    const EPSILON: f64 = 0.001;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn contact(
        created_at: Option<NaiveDateTime>,
        escalated: &str,
        csat: Option<&str>,
    ) -> ContactRecord {
        ContactRecord {
            created_at,
            escalated: escalated.to_string(),
            csat: csat.map(str::to_string),
            ..ContactRecord::default()
        }
    }

    /// `escalated` of `total` contacts on `day`, none with CSAT.
    fn week_of(day: NaiveDateTime, total: usize, escalated: usize) -> Vec<ContactRecord> {
        (0..total)
            .map(|i| contact(Some(day), if i < escalated { "Yes" } else { "No" }, None))
            .collect()
    }

    #[test]
    fn single_week_rates_and_average() {
        let records = vec![
            contact(Some(at(2024, 8, 6)), "Yes", Some("5")),
            contact(Some(at(2024, 8, 8)), "No", Some("3")),
        ];
        let metrics = weekly_metrics(&records);
        assert_eq!(metrics.len(), 1);

        let week = &metrics[0];
        assert_eq!(week.week_key, NaiveDate::from_ymd_opt(2024, 8, 5).unwrap());
        assert_eq!(week.label, "Aug 5 - Aug 11");
        assert_eq!(week.total, 2);
        assert_eq!(week.escalated, 1);
        assert!((week.escalation_rate - 50.0).abs() < EPSILON);
        assert_eq!(week.csat_count, 2);
        assert!((week.csat_average.unwrap() - 4.0).abs() < EPSILON);
        assert_eq!(week.escalation_trend, None);
        assert_eq!(week.csat_trend, None);
    }

    #[test]
    fn trend_after_zero_rate_week_is_none() {
        let mut records = week_of(at(2024, 8, 5), 3, 0);
        records.extend(week_of(at(2024, 8, 12), 5, 1));
        let metrics = weekly_metrics(&records);

        assert_eq!(metrics.len(), 2);
        assert!((metrics[0].escalation_rate - 0.0).abs() < EPSILON);
        assert!((metrics[1].escalation_rate - 20.0).abs() < EPSILON);
        assert_eq!(metrics[1].escalation_trend, None);
    }

    #[test]
    fn trend_is_relative_change() {
        let mut records = week_of(at(2024, 8, 12), 4, 1);
        records.extend(week_of(at(2024, 8, 5), 4, 2));
        let metrics = weekly_metrics(&records);

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].escalation_trend, None);
        assert!((metrics[0].escalation_rate - 50.0).abs() < EPSILON);
        assert!((metrics[1].escalation_rate - 25.0).abs() < EPSILON);
        assert!((metrics[1].escalation_trend.unwrap() + 50.0).abs() < EPSILON);
    }

    #[test]
    fn csat_trend_needs_both_averages() {
        let records = vec![
            contact(Some(at(2024, 7, 29)), "No", Some("4")),
            contact(Some(at(2024, 8, 5)), "No", None),
            contact(Some(at(2024, 8, 12)), "No", Some("5")),
            contact(Some(at(2024, 8, 19)), "No", Some("4")),
        ];
        let metrics = weekly_metrics(&records);

        assert_eq!(metrics.len(), 4);
        assert_eq!(metrics[1].csat_average, None);
        assert_eq!(metrics[1].csat_trend, None);
        assert_eq!(metrics[2].csat_trend, None);
        assert!((metrics[3].csat_trend.unwrap() + 20.0).abs() < EPSILON);
    }

    #[test]
    fn non_numeric_csat_counts_toward_total_only() {
        let records = vec![
            contact(Some(at(2024, 8, 5)), "No", Some("great")),
            contact(Some(at(2024, 8, 5)), "No", Some("2")),
        ];
        let metrics = weekly_metrics(&records);
        assert_eq!(metrics[0].total, 2);
        assert_eq!(metrics[0].csat_count, 1);
        assert_eq!(metrics[0].csat_sum, 2);
    }

    #[test]
    fn extreme_scores_do_not_overflow_the_sum() {
        let records = vec![
            contact(Some(at(2024, 8, 5)), "No", Some("9223372036854775807")),
            contact(Some(at(2024, 8, 6)), "No", Some("5")),
            contact(Some(at(2024, 8, 7)), "No", Some("99999999999999999999")),
        ];
        let metrics = weekly_metrics(&records);
        assert_eq!(metrics[0].total, 3);
        assert_eq!(metrics[0].csat_count, 2);
        assert_eq!(metrics[0].csat_sum, i128::from(i64::MAX) + 5);
        let expected = (i64::MAX as f64 + 5.0) / 2.0;
        assert!((metrics[0].csat_average.unwrap() - expected).abs() / expected < 1e-12);
        assert_eq!(summarize(&records).csat_responses, 2);
    }

    #[test]
    fn escalation_match_is_case_sensitive() {
        let records = vec![
            contact(Some(at(2024, 8, 5)), "yes", None),
            contact(Some(at(2024, 8, 5)), "YES", None),
            contact(Some(at(2024, 8, 5)), "Yes", None),
        ];
        let metrics = weekly_metrics(&records);
        assert_eq!(metrics[0].escalated, 1);
    }

    #[test]
    fn undated_records_are_skipped() {
        let records = vec![
            contact(None, "Yes", Some("1")),
            contact(Some(at(2024, 8, 11)), "No", Some("5")),
            contact(None, "No", None),
        ];
        let metrics = weekly_metrics(&records);
        let grouped: usize = metrics.iter().map(|m| m.total).sum();
        let dated = records.iter().filter(|r| r.week_key().is_some()).count();
        assert_eq!(grouped, dated);
        assert_eq!(metrics[0].week_key, NaiveDate::from_ymd_opt(2024, 8, 5).unwrap());

        let summary = summarize(&records);
        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.csat_responses, 2);
    }

    #[test]
    fn weeks_are_sorted_chronologically() {
        let records = vec![
            contact(Some(at(2025, 1, 2)), "No", None),
            contact(Some(at(2024, 12, 24)), "No", None),
            contact(Some(at(2024, 2, 1)), "No", None),
        ];
        let keys: Vec<String> = weekly_metrics(&records)
            .iter()
            .map(|m| m.week_key.to_string())
            .collect();
        assert_eq!(keys, vec!["2024-01-29", "2024-12-23", "2024-12-30"]);
    }

    #[test]
    fn empty_input_yields_no_weeks() {
        let records: Vec<ContactRecord> = Vec::new();
        assert!(weekly_metrics(&records).is_empty());
        assert_eq!(summarize(&records), FilterSummary::default());
    }
}

use std::fmt::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::models::{FilterSummary, WeeklyMetric};

/// Fixed-point text with `decimals` places; exact ties round away from zero
/// (`4.125` → `"4.13"`), unlike `{:.N}` which rounds them to even.
pub fn fixed(value: f64, decimals: usize) -> String {
    // A tie at `decimals` places is a multiple of 2^-(decimals + 1), so
    // scaling by that power of two is exact.
    let halves = value.abs() * 2f64.powi(decimals as i32 + 1);
    if value.is_finite() && halves.fract() == 0.0 && halves < 2f64.powi(53) {
        let twice_scaled = halves as u128 * 5u128.pow(decimals as u32);
        if twice_scaled % 2 == 1 {
            let units = (twice_scaled + 1) / 2;
            let scale = 10u128.pow(decimals as u32);
            let sign = if value < 0.0 { "-" } else { "" };
            return if decimals == 0 {
                format!("{}{}", sign, units)
            } else {
                format!(
                    "{}{}.{:0width$}",
                    sign,
                    units / scale,
                    units % scale,
                    width = decimals
                )
            };
        }
    }
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.*}", decimals, value)
}

fn avg_or_dash(value: Option<f64>) -> String {
    value
        .map(|avg| fixed(avg, 2))
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

/// Direction arrow and magnitude of a week-over-week change.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendBadge {
    pub text: String,
    pub tone: Tone,
}

/// `lower_is_better` flips the tone for metrics where a drop is good news,
/// such as escalation rate.
pub fn trend_badge(value: Option<f64>, lower_is_better: bool) -> TrendBadge {
    let Some(value) = value.filter(|v| !v.is_nan()) else {
        return TrendBadge {
            text: "-".to_string(),
            tone: Tone::Neutral,
        };
    };

    let arrow = if value > 0.0 {
        '↑'
    } else if value < 0.0 {
        '↓'
    } else {
        '→'
    };
    let improved = if lower_is_better { value < 0.0 } else { value > 0.0 };
    let tone = if value == 0.0 {
        Tone::Neutral
    } else if improved {
        Tone::Positive
    } else {
        Tone::Negative
    };

    TrendBadge {
        text: format!("{} {}%", arrow, fixed(value.abs(), 1)),
        tone,
    }
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Week")]
    week: &'a str,
    #[serde(rename = "Total Records")]
    total: usize,
    #[serde(rename = "Escalated")]
    escalated: usize,
    #[serde(rename = "Escalation Rate (%)")]
    escalation_rate: String,
    #[serde(rename = "Rate Trend (%)")]
    rate_trend: String,
    #[serde(rename = "CSAT Responses")]
    csat_responses: usize,
    #[serde(rename = "Avg CSAT")]
    csat_average: String,
    #[serde(rename = "CSAT Trend (%)")]
    csat_trend: String,
}

fn two_decimals(value: Option<f64>) -> String {
    value.map(|v| fixed(v, 2)).unwrap_or_default()
}

pub fn write_export<W: std::io::Write>(
    writer: W,
    metrics: &[WeeklyMetric],
) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for week in metrics {
        wtr.serialize(ExportRow {
            week: &week.label,
            total: week.total,
            escalated: week.escalated,
            escalation_rate: fixed(week.escalation_rate, 2),
            rate_trend: two_decimals(week.escalation_trend),
            csat_responses: week.csat_count,
            csat_average: two_decimals(week.csat_average),
            csat_trend: two_decimals(week.csat_trend),
        })?;
    }
    if metrics.is_empty() {
        wtr.write_record([
            "Week",
            "Total Records",
            "Escalated",
            "Escalation Rate (%)",
            "Rate Trend (%)",
            "CSAT Responses",
            "Avg CSAT",
            "CSAT Trend (%)",
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, metrics: &[WeeklyMetric]) -> Result<(), AppError> {
    let file = std::fs::File::create(path)?;
    write_export(std::io::BufWriter::new(file), metrics)?;
    info!(path = %path.display(), weeks = metrics.len(), "export written");
    Ok(())
}

pub fn default_export_name(today: NaiveDate) -> String {
    format!("analytics-export-{}.csv", today.format("%Y-%m-%d"))
}

pub fn render_table(summary: &FilterSummary, metrics: &[WeeklyMetric]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Total records: {}", summary.total_records);
    let _ = writeln!(output, "CSAT responses: {}", summary.csat_responses);
    let _ = writeln!(output);

    if metrics.is_empty() {
        let _ = writeln!(output, "No records match the current filters.");
        return output;
    }

    let _ = writeln!(
        output,
        "{:<16} {:>7} {:>9} {:>8} {:>9} {:>6} {:>8} {:>9}",
        "Week", "Total", "Escalated", "Rate", "Trend", "CSAT", "Avg", "Trend"
    );
    for week in metrics {
        let _ = writeln!(
            output,
            "{:<16} {:>7} {:>9} {:>7}% {:>9} {:>6} {:>8} {:>9}",
            week.label,
            week.total,
            week.escalated,
            fixed(week.escalation_rate, 2),
            trend_badge(week.escalation_trend, true).text,
            week.csat_count,
            avg_or_dash(week.csat_average),
            trend_badge(week.csat_trend, false).text,
        );
    }

    output
}

/// Regressions are set in bold.
fn markdown_badge(badge: TrendBadge) -> String {
    match badge.tone {
        Tone::Negative => format!("**{}**", badge.text),
        Tone::Positive | Tone::Neutral => badge.text,
    }
}

pub fn build_report(
    scope: &str,
    summary: &FilterSummary,
    metrics: &[WeeklyMetric],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Weekly Contact Analytics Report");
    let _ = writeln!(output, "Generated for {}", scope);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Total records: {}", summary.total_records);
    let _ = writeln!(output, "- CSAT responses: {}", summary.csat_responses);
    let _ = writeln!(output, "- Weeks covered: {}", metrics.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Metrics");

    if metrics.is_empty() {
        let _ = writeln!(output, "No records match the current filters.");
        return output;
    }

    let _ = writeln!(
        output,
        "| Week | Total | Escalated | Escalation Rate | Rate Trend | CSAT Responses | Avg CSAT | CSAT Trend |"
    );
    let _ = writeln!(output, "|---|---:|---:|---:|---:|---:|---:|---:|");
    for week in metrics {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {}% | {} | {} | {} | {} |",
            week.label,
            week.total,
            week.escalated,
            fixed(week.escalation_rate, 2),
            markdown_badge(trend_badge(week.escalation_trend, true)),
            week.csat_count,
            avg_or_dash(week.csat_average),
            markdown_badge(trend_badge(week.csat_trend, false)),
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Escalation Extremes");
    let by_rate = |a: &&WeeklyMetric, b: &&WeeklyMetric| {
        a.escalation_rate
            .partial_cmp(&b.escalation_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    };
    if let Some(worst) = metrics.iter().max_by(by_rate) {
        let _ = writeln!(
            output,
            "- Highest: {} at {}% ({} of {})",
            worst.label,
            fixed(worst.escalation_rate, 2),
            worst.escalated,
            worst.total
        );
    }
    if let Some(best) = metrics.iter().min_by(by_rate) {
        let _ = writeln!(
            output,
            "- Lowest: {} at {}% ({} of {})",
            best.label,
            fixed(best.escalation_rate, 2),
            best.escalated,
            best.total
        );
    }

    output
}

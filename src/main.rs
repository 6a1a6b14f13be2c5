use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

mod aggregate;
mod calendar;
mod config;
mod error;
mod filters;
mod ingest;
mod models;
mod report;

use config::{exact_match, FieldFilter, FilterConfig, Presence};
use models::{FilterSummary, WeeklyMetric};

#[derive(Parser)]
#[command(name = "contact-week-analytics")]
#[command(about = "Weekly escalation and CSAT metrics for support contacts", long_about = None)]
struct Cli {
    /// Contact dataset (CSV with a header row)
    #[arg(long, env = "CONTACT_DATA_CSV")]
    csv: PathBuf,
    /// TOML file with filter settings; flags override it
    #[arg(long)]
    filters: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print weekly metrics and summary totals
    Weekly {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Write weekly metrics as CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print weekly metrics and summary totals as JSON
    Json {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// List filterable values and the dataset date span
    Values,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    #[arg(long)]
    start_date: Option<NaiveDate>,
    #[arg(long)]
    end_date: Option<NaiveDate>,
    /// Exact escalation value ("all" for any)
    #[arg(long)]
    escalated: Option<String>,
    #[arg(long)]
    repeat_min: Option<usize>,
    #[arg(long)]
    repeat_max: Option<usize>,
    /// all | exists | not_exists
    #[arg(long)]
    csat: Option<Presence>,
    #[arg(long = "csat-score")]
    csat_scores: Vec<String>,
    #[arg(long)]
    decagon_language_exists: Option<Presence>,
    #[arg(long = "decagon-language")]
    decagon_languages: Vec<String>,
    #[arg(long)]
    rtr_flagged: Option<Presence>,
    #[arg(long)]
    sandbox: Option<Presence>,
    /// Exact device value ("all" for any)
    #[arg(long)]
    device: Option<String>,
    #[arg(long)]
    fee_block_state: Option<Presence>,
    #[arg(long)]
    trial: Option<Presence>,
    #[arg(long)]
    language_exists: Option<Presence>,
    #[arg(long = "language")]
    languages: Vec<String>,
    #[arg(long)]
    admin_portal: Option<Presence>,
}

fn merge_field(field: &mut FieldFilter, presence: Option<Presence>, accepted: Vec<String>) {
    if let Some(presence) = presence {
        field.presence = presence;
    }
    if !accepted.is_empty() {
        field.accepted = accepted.into_iter().collect();
    }
}

impl FilterArgs {
    fn apply_to(self, config: &mut FilterConfig) {
        if self.start_date.is_some() {
            config.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            config.end_date = self.end_date;
        }
        if let Some(escalated) = self.escalated {
            config.escalated = exact_match(escalated);
        }
        if self.repeat_min.is_some() {
            config.repeat_contacts_min = self.repeat_min;
        }
        if self.repeat_max.is_some() {
            config.repeat_contacts_max = self.repeat_max;
        }
        merge_field(&mut config.csat, self.csat, self.csat_scores);
        merge_field(
            &mut config.decagon_language,
            self.decagon_language_exists,
            self.decagon_languages,
        );
        merge_field(&mut config.language, self.language_exists, self.languages);
        if let Some(device) = self.device {
            config.user_device = exact_match(device);
        }
        let flags = [
            (&mut config.rtr_flagged, self.rtr_flagged),
            (&mut config.sandbox, self.sandbox),
            (&mut config.fee_block_state, self.fee_block_state),
            (&mut config.is_trial, self.trial),
            (&mut config.admin_portal, self.admin_portal),
        ];
        for (target, value) in flags {
            if let Some(value) = value {
                *target = value;
            }
        }
    }
}

fn build_config(file: Option<&PathBuf>, args: FilterArgs) -> anyhow::Result<FilterConfig> {
    let mut config = match file {
        Some(path) => FilterConfig::load(path)
            .with_context(|| format!("failed to load filters from {}", path.display()))?,
        None => FilterConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contact_week_analytics=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let records = ingest::load_csv(&cli.csv)
        .with_context(|| format!("failed to load contacts from {}", cli.csv.display()))?;
    let counts = ingest::ContactCounts::from_records(&records);

    let (filter, command) = match cli.command {
        Commands::Values => {
            let values = ingest::filter_values(&records);
            let span = match (values.earliest, values.latest) {
                (Some(earliest), Some(latest)) => format!("{earliest} to {latest}"),
                _ => "no dated records".to_string(),
            };
            println!("Dates: {span}");
            println!("Languages: {}", values.languages.join(", "));
            println!("Decagon languages: {}", values.decagon_languages.join(", "));
            println!("Devices: {}", values.devices.join(", "));
            return Ok(());
        }
        Commands::Weekly { filter } => (filter, Output::Table),
        Commands::Export { filter, out } => (filter, Output::Csv(out)),
        Commands::Report { filter, out } => (filter, Output::Markdown(out)),
        Commands::Json { filter } => (filter, Output::Json),
    };

    let config = build_config(cli.filters.as_ref(), filter)?;
    let filtered = filters::apply(&records, &config, &counts);
    let summary = aggregate::summarize(filtered.iter().copied());
    let metrics = aggregate::weekly_metrics(filtered.iter().copied());
    info!(
        records = records.len(),
        filtered = summary.total_records,
        weeks = metrics.len(),
        "metrics ready"
    );

    match command {
        Output::Table => {
            print!("{}", report::render_table(&summary, &metrics));
        }
        Output::Csv(out) => {
            let out = out.unwrap_or_else(|| {
                PathBuf::from(report::default_export_name(Local::now().date_naive()))
            });
            report::export_csv(&out, &metrics)?;
            println!("Exported {} weeks to {}.", metrics.len(), out.display());
        }
        Output::Markdown(out) => {
            let scope = cli.csv.display().to_string();
            let text = report::build_report(&scope, &summary, &metrics);
            std::fs::write(&out, text)?;
            println!("Report written to {}.", out.display());
        }
        Output::Json => {
            let body = JsonOutput {
                filters: &config,
                summary,
                weeks: &metrics,
            };
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

enum Output {
    Table,
    Csv(Option<PathBuf>),
    Markdown(PathBuf),
    Json,
}

/// `json` command payload; echoes the effective filters next to the numbers.
#[derive(Serialize)]
struct JsonOutput<'a> {
    filters: &'a FilterConfig,
    summary: FilterSummary,
    weeks: &'a [WeeklyMetric],
}

use crate::infra::{load_registry, parse_instant};
use chrono::{DateTime, Utc};
use clap::Args;
use dossier_desk::config::AppConfig;
use dossier_desk::error::AppError;
use dossier_desk::workflows::requests::{
    ApplicationRecord, DeadlineRegistry, PriorityEngine, RankingOutcome, RankingScope,
};
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct QueueRankArgs {
    /// JSON array of request-store rows
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Evaluation instant (ISO-8601). Defaults to now.
    #[arg(long, value_parser = parse_instant)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Also score draft, approved, rejected and unknown-status requests
    #[arg(long)]
    pub(crate) include_inactive: bool,
    /// CSV of `flow_type,window_days,label` overrides (defaults to APP_DEADLINES_CSV)
    #[arg(long)]
    pub(crate) deadlines_csv: Option<PathBuf>,
    /// Print the raw ranking outcome as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DeadlinesListArgs {
    /// CSV of `flow_type,window_days,label` overrides (defaults to APP_DEADLINES_CSV)
    #[arg(long)]
    pub(crate) deadlines_csv: Option<PathBuf>,
}

pub(crate) fn run_queue_rank(args: QueueRankArgs) -> Result<(), AppError> {
    let QueueRankArgs {
        input,
        now,
        include_inactive,
        deadlines_csv,
        json,
    } = args;

    let config = AppConfig::load()?;
    let overrides = deadlines_csv.or(config.deadlines.overrides_csv);
    let registry = load_registry(overrides.as_deref())?;
    let engine = PriorityEngine::new(Arc::new(registry), config.priority);

    let raw = std::fs::read_to_string(&input)?;
    let records: Vec<ApplicationRecord> = serde_json::from_str(&raw)?;
    let scope = if include_inactive {
        RankingScope::IncludeInactive
    } else {
        RankingScope::ActiveOnly
    };
    let outcome = engine.rank_with_scope(&records, now.unwrap_or_else(Utc::now), scope);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render_outcome(&outcome));
    }
    Ok(())
}

pub(crate) fn run_deadlines_list(args: DeadlinesListArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let overrides = args.deadlines_csv.or(config.deadlines.overrides_csv);
    let registry = load_registry(overrides.as_deref())?;
    print!("{}", render_registry(&registry));
    Ok(())
}

pub(crate) fn render_outcome(outcome: &RankingOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Request queue evaluated at {}",
        outcome.evaluated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(
        out,
        "- {} ranked | {} skipped | {} inactive excluded | {} warnings",
        outcome.ranked.len(),
        outcome.skipped.len(),
        outcome.excluded_inactive,
        outcome.warnings.len()
    );

    if outcome.ranked.is_empty() {
        let _ = writeln!(out, "No requests to rank.");
    } else {
        let _ = writeln!(
            out,
            "{:>4}  {:<16} {:<26} {:>9} {:>7} {:>8}",
            "rank", "id", "flow type", "days left", "backlog", "score"
        );
        for (index, result) in outcome.ranked.iter().enumerate() {
            let days_left = result
                .days_left
                .map(|days| days.to_string())
                .unwrap_or_else(|| "-".to_string());
            let flow_type = match (&result.flow_type, result.unrecognized_flow_type) {
                (Some(flow_type), false) => flow_type.clone(),
                (Some(flow_type), true) => format!("{flow_type}*"),
                (None, _) => "(none)*".to_string(),
            };
            let _ = writeln!(
                out,
                "{:>4}  {:<16} {:<26} {:>9} {:>7} {:>8.2}",
                index + 1,
                result.id.as_str(),
                flow_type,
                days_left,
                result.backlog_in_category,
                result.priority_score
            );
        }
        if outcome.ranked.iter().any(|result| result.unrecognized_flow_type) {
            let _ = writeln!(out, "* default deadline window applied");
        }
    }

    if !outcome.skipped.is_empty() {
        let _ = writeln!(out, "Skipped:");
        for skipped in &outcome.skipped {
            let id = if skipped.id.trim().is_empty() {
                "(no id)"
            } else {
                skipped.id.as_str()
            };
            let _ = writeln!(out, "  - {}: {}", id, skipped.error);
        }
    }

    if !outcome.warnings.is_empty() {
        let _ = writeln!(out, "Warnings:");
        for warning in &outcome.warnings {
            let _ = writeln!(out, "  - {}: {:?}", warning.id, warning.kind);
        }
    }

    out
}

pub(crate) fn render_registry(registry: &DeadlineRegistry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Statutory resolution windows");
    for entry in registry.entries() {
        let _ = writeln!(
            out,
            "- {:<26} {:>4} days  {}",
            entry.flow_type, entry.window_days, entry.label
        );
    }
    let _ = writeln!(
        out,
        "- {:<26} {:>4} days  (unrecognized categories)",
        "default",
        registry.default_days()
    );

    let mut aliases = registry.aliases().peekable();
    if aliases.peek().is_some() {
        let _ = writeln!(out, "Aliases:");
        for (alias, canonical) in aliases {
            let _ = writeln!(out, "  - {alias} -> {canonical}");
        }
    }
    out
}

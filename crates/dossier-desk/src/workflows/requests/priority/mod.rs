mod policy;
mod rules;

pub use policy::PriorityPolicy;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::deadlines::DeadlineRegistry;
use super::domain::{ApplicationId, ApplicationRecord};

/// Which records are eligible for the ranked output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankingScope {
    /// Only `pending_validation` / `in_review` requests.
    #[default]
    ActiveOnly,
    /// Also score completed, rejected, draft or unknown-status requests.
    IncludeInactive,
}

/// Record-level rejection; the rest of the batch is still ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputError {
    #[error("application id is missing")]
    MissingId,
    #[error("submitted_at is missing")]
    MissingSubmittedAt,
    #[error("submitted_at '{value}' is not an ISO-8601 timestamp")]
    InvalidSubmittedAt { value: String },
    #[error("application id appears more than once in the batch")]
    DuplicateId,
}

/// Non-fatal observations about a record that was still ranked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    UnrecognizedFlowType { flow_type: String, fallback_days: u32 },
    MissingFlowType { fallback_days: u32 },
    DueDateRecomputed { value: String },
    UnknownStatus { status: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingWarning {
    pub id: ApplicationId,
    #[serde(flatten)]
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedApplication {
    /// Raw id as it arrived, possibly empty.
    pub id: String,
    pub error: InputError,
}

/// Derived, read-only view of one request; recomputed on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriorityResult {
    pub id: ApplicationId,
    pub flow_type: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub legal_due_date: Option<DateTime<Utc>>,
    pub status: String,
    /// `None` when the request carries no deadline.
    pub days_left: Option<i64>,
    pub backlog_in_category: usize,
    pub priority_score: f64,
    pub deadline_window_days: u32,
    pub unrecognized_flow_type: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingOutcome {
    pub evaluated_at: DateTime<Utc>,
    pub ranked: Vec<PriorityResult>,
    pub skipped: Vec<SkippedApplication>,
    pub warnings: Vec<RankingWarning>,
    pub excluded_inactive: usize,
}

impl RankingOutcome {
    /// Ranked entries due no later than `evaluated_at + threshold_days` (overdue included).
    pub fn urgent(&self, threshold_days: i64) -> Vec<PriorityResult> {
        let cutoff = Duration::try_days(threshold_days)
            .and_then(|window| self.evaluated_at.checked_add_signed(window));

        self.ranked
            .iter()
            .filter(|result| match (result.legal_due_date, cutoff) {
                (Some(due), Some(cutoff)) => due <= cutoff,
                // Threshold beyond chrono's range: every deadline qualifies, none if negative.
                (Some(_), None) => threshold_days > 0,
                (None, _) => false,
            })
            .cloned()
            .collect()
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.ranked
            .iter()
            .position(|result| result.id.as_str() == id)
    }
}

/// Pure ranking over a batch of store rows and an explicit `now`.
#[derive(Debug, Clone)]
pub struct PriorityEngine {
    registry: Arc<DeadlineRegistry>,
    policy: PriorityPolicy,
}

impl PriorityEngine {
    pub fn new(registry: Arc<DeadlineRegistry>, policy: PriorityPolicy) -> Self {
        Self { registry, policy }
    }

    pub fn registry(&self) -> &DeadlineRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &PriorityPolicy {
        &self.policy
    }

    pub fn rank(&self, records: &[ApplicationRecord], now: DateTime<Utc>) -> RankingOutcome {
        self.rank_with_scope(records, now, RankingScope::ActiveOnly)
    }

    pub fn rank_with_scope(
        &self,
        records: &[ApplicationRecord],
        now: DateTime<Utc>,
        scope: RankingScope,
    ) -> RankingOutcome {
        let mut skipped = Vec::new();
        let mut warnings = Vec::new();
        let mut admitted = Vec::with_capacity(records.len());
        let mut seen = HashSet::with_capacity(records.len());

        for record in records {
            match rules::admit(record, &self.registry) {
                Ok(entry) => {
                    if !seen.insert(entry.application.id.clone()) {
                        skipped.push(SkippedApplication {
                            id: record.id.clone(),
                            error: InputError::DuplicateId,
                        });
                        continue;
                    }
                    warnings.extend(entry.warnings.iter().cloned().map(|kind| RankingWarning {
                        id: entry.application.id.clone(),
                        kind,
                    }));
                    admitted.push(entry);
                }
                Err(error) => skipped.push(SkippedApplication {
                    id: record.id.clone(),
                    error,
                }),
            }
        }

        let backlog = rules::backlog_by_category(admitted.iter().map(|entry| &entry.application));

        let mut excluded_inactive = 0;
        let mut ranked = Vec::with_capacity(admitted.len());
        for entry in &admitted {
            let application = &entry.application;
            if scope == RankingScope::ActiveOnly && !application.is_active() {
                excluded_inactive += 1;
                continue;
            }

            let days_left = application
                .legal_due_date
                .map(|due| rules::days_left(due, now));
            let backlog_in_category = backlog
                .get(&application.flow_type.as_deref())
                .copied()
                .unwrap_or(0);

            ranked.push(PriorityResult {
                id: application.id.clone(),
                flow_type: application.flow_type.clone(),
                submitted_at: application.submitted_at,
                legal_due_date: application.legal_due_date,
                status: application.status_label.clone(),
                days_left,
                backlog_in_category,
                priority_score: self.policy.score(days_left, backlog_in_category),
                deadline_window_days: entry.lookup.days,
                unrecognized_flow_type: entry.lookup.was_default,
            });
        }

        ranked.sort_by(rank_order);

        RankingOutcome {
            evaluated_at: now,
            ranked,
            skipped,
            warnings,
            excluded_inactive,
        }
    }
}

/// Score descending, then earlier submission, then smaller id.
fn rank_order(a: &PriorityResult, b: &PriorityResult) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        .then_with(|| a.id.cmp(&b.id))
}

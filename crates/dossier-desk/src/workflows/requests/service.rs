use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::deadlines::{DeadlineLookup, DeadlineRegistry};
use super::domain::{
    format_timestamp, parse_timestamp, ApplicationId, ApplicationRecord, ApplicationStatus,
};
use super::gate::{bearer_token, AuthError, Identity, IdentityVerifier, Role};
use super::priority::{PriorityEngine, PriorityResult, RankingOutcome, RankingScope};
use super::store::{RequestStore, ScoreSnapshot, StoreError};

/// Look-ahead used by the clerk dashboard "near deadline" counter.
const NEAR_DEADLINE_DAYS: i64 = 7;

/// Default look-ahead for the urgent-requests view.
pub const DEFAULT_URGENT_DAYS: i64 = 3;

/// Service composing the identity gate, request store, and priority engine.
pub struct RequestQueueService<S, V> {
    store: Arc<S>,
    verifier: Arc<V>,
    engine: Arc<PriorityEngine>,
    clock: Arc<dyn Clock>,
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> ApplicationId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("req-{id:06}"))
}

/// Citizen-supplied payload for a new request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    #[serde(default)]
    pub flow_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiledRequest {
    pub record: ApplicationRecord,
    pub deadline: DeadlineLookup,
}

/// Reporting window for dashboard statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatisticsWindow {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
}

impl StatisticsWindow {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "7d" => Some(Self::Week),
            "30d" => Some(Self::Month),
            "90d" => Some(Self::Quarter),
            "1y" => Some(Self::Year),
            _ => None,
        }
    }

    /// Earliest `submitted_at` counted in the window ending at `now`.
    /// `1y` is a calendar year, the others are fixed day counts.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            Self::Week => now.checked_sub_signed(Duration::days(7)),
            Self::Month => now.checked_sub_signed(Duration::days(30)),
            Self::Quarter => now.checked_sub_signed(Duration::days(90)),
            Self::Year => now.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestStatistics {
    pub window: StatisticsWindow,
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Percentage with one decimal.
    pub approval_rate: f64,
    pub near_deadline: usize,
    pub by_flow_type: BTreeMap<String, usize>,
}

impl<S, V> RequestQueueService<S, V>
where
    S: RequestStore + 'static,
    V: IdentityVerifier + 'static,
{
    pub fn new(store: Arc<S>, verifier: Arc<V>, engine: PriorityEngine) -> Self {
        Self {
            store,
            verifier,
            engine: Arc::new(engine),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &DeadlineRegistry {
        self.engine.registry()
    }

    pub fn engine(&self) -> Arc<PriorityEngine> {
        Arc::clone(&self.engine)
    }

    /// Resolve an `Authorization` header value to a caller identity.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, QueueServiceError> {
        let token = bearer_token(authorization)?;
        Ok(self.verifier.verify(token)?)
    }

    /// File a new request, stamping its statutory due date from the registry.
    pub fn file_request(
        &self,
        identity: &Identity,
        request: NewRequest,
    ) -> Result<FiledRequest, QueueServiceError> {
        let flow_type = request
            .flow_type
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let submitted_at = self.clock.now();
        let due = self
            .engine
            .registry()
            .due_date_for(flow_type.as_deref(), submitted_at);

        if due.lookup.was_default {
            warn!(
                flow_type = flow_type.as_deref().unwrap_or("<missing>"),
                fallback_days = due.lookup.days,
                "unrecognized flow type, applying default deadline window"
            );
        }

        let record = ApplicationRecord {
            id: next_request_id().0,
            flow_type,
            submitted_at: Some(format_timestamp(submitted_at)),
            legal_due_date: Some(format_timestamp(due.due)),
            status: ApplicationStatus::PendingValidation.label().to_string(),
            citizen_id: Some(identity.user_id.clone()),
            assigned_clerk_id: None,
        };

        let stored = self.store.insert(record)?;
        debug!(id = %stored.id, citizen = %identity.user_id, "request filed");

        Ok(FiledRequest {
            record: stored,
            deadline: due.lookup,
        })
    }

    /// Fetch one request; citizens only see their own.
    pub fn get(
        &self,
        identity: &Identity,
        id: &ApplicationId,
    ) -> Result<ApplicationRecord, QueueServiceError> {
        let record = self.store.fetch(id)?.ok_or(StoreError::NotFound)?;
        if identity.role == Role::Clerk || record.owned_by(&identity.user_id) {
            Ok(record)
        } else {
            Err(StoreError::NotFound.into())
        }
    }

    /// Rank the caller's own requests.
    pub fn rank_for_citizen(&self, identity: &Identity) -> Result<RankingOutcome, QueueServiceError> {
        let records = self.store.list_for_citizen(&identity.user_id)?;
        Ok(self.rank(&records, RankingScope::ActiveOnly))
    }

    /// Rank the whole queue for clerks and persist a score snapshot.
    pub fn clerk_queue(
        &self,
        identity: &Identity,
        scope: RankingScope,
    ) -> Result<RankingOutcome, QueueServiceError> {
        identity.require(Role::Clerk)?;
        let records = self.store.list_all()?;
        let outcome = self.rank(&records, scope);

        if let Err(err) = self.store.record_scores(&ScoreSnapshot::from(&outcome)) {
            warn!(error = %err, "failed to persist priority snapshot");
        }

        Ok(outcome)
    }

    /// Active requests whose deadline is within `threshold_days`, in rank order.
    pub fn urgent(
        &self,
        identity: &Identity,
        threshold_days: i64,
    ) -> Result<Vec<PriorityResult>, QueueServiceError> {
        identity.require(Role::Clerk)?;
        let records = self.store.list_all()?;
        Ok(self
            .rank(&records, RankingScope::ActiveOnly)
            .urgent(threshold_days))
    }

    pub fn statistics(
        &self,
        identity: &Identity,
        window: StatisticsWindow,
    ) -> Result<RequestStatistics, QueueServiceError> {
        identity.require(Role::Clerk)?;
        let now = self.clock.now();
        let since = window.start(now);
        let near_deadline_cutoff = now
            .checked_add_signed(Duration::days(NEAR_DEADLINE_DAYS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let records = self.store.list_all()?;
        let mut stats = RequestStatistics {
            window,
            total: 0,
            pending: 0,
            approved: 0,
            rejected: 0,
            approval_rate: 0.0,
            near_deadline: 0,
            by_flow_type: BTreeMap::new(),
        };

        for record in &records {
            let in_window = record
                .submitted_at
                .as_deref()
                .and_then(parse_timestamp)
                .map(|submitted_at| submitted_at >= since)
                .unwrap_or(false);
            if !in_window {
                continue;
            }

            stats.total += 1;
            match record.parsed_status() {
                Some(status) if status.is_active() => {
                    stats.pending += 1;
                    let near = record
                        .legal_due_date
                        .as_deref()
                        .and_then(parse_timestamp)
                        .map(|due| due <= near_deadline_cutoff)
                        .unwrap_or(false);
                    if near {
                        stats.near_deadline += 1;
                    }
                }
                Some(ApplicationStatus::Approved) => stats.approved += 1,
                Some(ApplicationStatus::Rejected) => stats.rejected += 1,
                _ => {}
            }

            let flow_type = record
                .flow_type
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or("unknown");
            *stats.by_flow_type.entry(flow_type.to_string()).or_insert(0) += 1;
        }

        if stats.total > 0 {
            let rate = stats.approved as f64 / stats.total as f64 * 100.0;
            stats.approval_rate = (rate * 10.0).round() / 10.0;
        }

        Ok(stats)
    }

    fn rank(&self, records: &[ApplicationRecord], scope: RankingScope) -> RankingOutcome {
        let outcome = self
            .engine
            .rank_with_scope(records, self.clock.now(), scope);

        for skipped in &outcome.skipped {
            warn!(id = %skipped.id, error = %skipped.error, "request excluded from ranking");
        }
        for warning in &outcome.warnings {
            warn!(id = %warning.id, kind = ?warning.kind, "request ranked with fallback");
        }

        outcome
    }
}

/// Error raised by the request queue service.
#[derive(Debug, thiserror::Error)]
pub enum QueueServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, ApplicationRecord};
use super::priority::RankingOutcome;

/// Persistence collaborator materializing requests and storing score snapshots.
pub trait RequestStore: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError>;
    fn list_for_citizen(&self, citizen_id: &str) -> Result<Vec<ApplicationRecord>, StoreError>;
    fn list_all(&self) -> Result<Vec<ApplicationRecord>, StoreError>;
    fn record_scores(&self, snapshot: &ScoreSnapshot) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("request store unavailable: {0}")]
    Unavailable(String),
}

/// Point-in-time copy of computed scores. Never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub evaluated_at: DateTime<Utc>,
    pub entries: Vec<ScoreEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub id: ApplicationId,
    pub rank: usize,
    pub priority_score: f64,
    pub days_left: Option<i64>,
    pub backlog_in_category: usize,
}

impl From<&RankingOutcome> for ScoreSnapshot {
    fn from(outcome: &RankingOutcome) -> Self {
        let entries = outcome
            .ranked
            .iter()
            .enumerate()
            .map(|(index, result)| ScoreEntry {
                id: result.id.clone(),
                rank: index + 1,
                priority_score: result.priority_score,
                days_left: result.days_left,
                backlog_in_category: result.backlog_in_category,
            })
            .collect();

        Self {
            evaluated_at: outcome.evaluated_at,
            entries,
        }
    }
}

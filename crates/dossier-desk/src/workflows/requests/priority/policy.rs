use serde::{Deserialize, Serialize};

const DEFAULT_URGENCY_WEIGHT: f64 = 1.0;
const DEFAULT_HORIZON_DAYS: i64 = 60;
const DEFAULT_OVERDUE_BONUS: f64 = 25.0;
const DEFAULT_BACKLOG_WEIGHT: f64 = 5.0;

/// Weights combining deadline pressure and category congestion into one score.
///
/// ```text
/// urgency    = 0                                  (no deadline)
///            = max(horizon_days - days_left, 0)   (otherwise)
/// overdue    = overdue_bonus when days_left < 0
/// congestion = ln(1 + backlog)
/// score      = urgency_weight * urgency + overdue + backlog_weight * congestion
/// ```
///
/// With non-negative weights the score never rises as `days_left` grows and
/// never falls as the backlog grows. A missing deadline scores like one that
/// lies beyond the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityPolicy {
    pub urgency_weight: f64,
    pub horizon_days: i64,
    pub overdue_bonus: f64,
    pub backlog_weight: f64,
}

impl PriorityPolicy {
    /// Builds a policy, replacing negative or non-finite values with defaults.
    pub fn new(
        urgency_weight: f64,
        horizon_days: i64,
        overdue_bonus: f64,
        backlog_weight: f64,
    ) -> Self {
        Self {
            urgency_weight: sanitize_weight(urgency_weight, DEFAULT_URGENCY_WEIGHT),
            horizon_days: if horizon_days >= 0 {
                horizon_days
            } else {
                DEFAULT_HORIZON_DAYS
            },
            overdue_bonus: sanitize_weight(overdue_bonus, DEFAULT_OVERDUE_BONUS),
            backlog_weight: sanitize_weight(backlog_weight, DEFAULT_BACKLOG_WEIGHT),
        }
    }

    pub fn score(&self, days_left: Option<i64>, backlog_in_category: usize) -> f64 {
        self.urgency_weight * self.urgency(days_left)
            + self.overdue(days_left)
            + self.backlog_weight * congestion(backlog_in_category)
    }

    fn urgency(&self, days_left: Option<i64>) -> f64 {
        match days_left {
            Some(days) => self.horizon_days.saturating_sub(days).max(0) as f64,
            None => 0.0,
        }
    }

    fn overdue(&self, days_left: Option<i64>) -> f64 {
        match days_left {
            Some(days) if days < 0 => self.overdue_bonus,
            _ => 0.0,
        }
    }
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            urgency_weight: DEFAULT_URGENCY_WEIGHT,
            horizon_days: DEFAULT_HORIZON_DAYS,
            overdue_bonus: DEFAULT_OVERDUE_BONUS,
            backlog_weight: DEFAULT_BACKLOG_WEIGHT,
        }
    }
}

fn sanitize_weight(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

fn congestion(backlog: usize) -> f64 {
    (backlog as f64).ln_1p()
}

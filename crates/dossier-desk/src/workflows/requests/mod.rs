//! Administrative request intake and deadline-aware prioritization.
//!
//! Citizens file urbanism requests whose statutory due date is stamped from the
//! [`DeadlineRegistry`]. Clerks read a queue ranked by the [`PriorityEngine`],
//! which is a pure function of the store rows and an explicit `now`; the
//! service layer owns the clock, the identity gate, and the request store.

pub mod clock;
pub mod deadlines;
pub mod domain;
pub mod gate;
pub mod priority;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use deadlines::{
    DeadlineEntry, DeadlineLookup, DeadlineRegistry, DueDate, RegistryError, DEFAULT_WINDOW_DAYS,
    MAX_WINDOW_DAYS,
};
pub use domain::{
    format_timestamp, parse_timestamp, Application, ApplicationId, ApplicationRecord,
    ApplicationStatus,
};
pub use gate::{bearer_token, AuthError, Identity, IdentityVerifier, Role};
pub use priority::{
    InputError, PriorityEngine, PriorityPolicy, PriorityResult, RankingOutcome, RankingScope,
    RankingWarning, SkippedApplication, WarningKind,
};
pub use router::request_router;
pub use service::{
    FiledRequest, NewRequest, QueueServiceError, RequestQueueService, RequestStatistics,
    StatisticsWindow, DEFAULT_URGENT_DAYS,
};
pub use store::{RequestStore, ScoreEntry, ScoreSnapshot, StoreError};

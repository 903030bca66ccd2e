use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for administrative requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states written by the request store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    PendingValidation,
    InReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending_validation" | "pending" => Some(Self::PendingValidation),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingValidation => "pending_validation",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Only active requests count toward category backlog and default ranking.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::PendingValidation | Self::InReview)
    }
}

/// Request-store row as materialized by the persistence collaborator.
///
/// Timestamps stay as strings so a single malformed row can be rejected
/// without failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub flow_type: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub legal_due_date: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizen_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_clerk_id: Option<String>,
}

impl ApplicationRecord {
    pub fn application_id(&self) -> ApplicationId {
        ApplicationId(self.id.clone())
    }

    pub fn parsed_status(&self) -> Option<ApplicationStatus> {
        ApplicationStatus::parse(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.parsed_status()
            .map(ApplicationStatus::is_active)
            .unwrap_or(false)
    }

    pub fn owned_by(&self, citizen_id: &str) -> bool {
        self.citizen_id.as_deref() == Some(citizen_id)
    }
}

/// Typed request after intake parsing; the engine never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub id: ApplicationId,
    pub flow_type: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub legal_due_date: Option<DateTime<Utc>>,
    pub status: Option<ApplicationStatus>,
    pub status_label: String,
}

impl Application {
    pub fn is_active(&self) -> bool {
        self.status
            .map(ApplicationStatus::is_active)
            .unwrap_or(false)
    }
}

/// Parses the ISO-8601 shapes the store emits. Offset-less values are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

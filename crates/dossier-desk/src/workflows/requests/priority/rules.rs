use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::super::deadlines::{add_window, DeadlineLookup, DeadlineRegistry};
use super::super::domain::{
    parse_timestamp, Application, ApplicationId, ApplicationRecord, ApplicationStatus,
};
use super::{InputError, WarningKind};

pub(crate) struct Admitted {
    pub application: Application,
    pub lookup: DeadlineLookup,
    pub warnings: Vec<WarningKind>,
}

/// Parses one store row; only a bad id or `submitted_at` rejects the record.
pub(crate) fn admit(
    record: &ApplicationRecord,
    registry: &DeadlineRegistry,
) -> Result<Admitted, InputError> {
    let id = record.id.trim();
    if id.is_empty() {
        return Err(InputError::MissingId);
    }

    let submitted_at = match record.submitted_at.as_deref().map(str::trim) {
        None | Some("") => return Err(InputError::MissingSubmittedAt),
        Some(raw) => parse_timestamp(raw).ok_or_else(|| InputError::InvalidSubmittedAt {
            value: raw.to_string(),
        })?,
    };

    let mut warnings = Vec::new();

    let flow_type = record
        .flow_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let lookup = registry.lookup(flow_type.as_deref().unwrap_or_default());
    if lookup.was_default {
        warnings.push(match &flow_type {
            Some(flow_type) => WarningKind::UnrecognizedFlowType {
                flow_type: flow_type.clone(),
                fallback_days: lookup.days,
            },
            None => WarningKind::MissingFlowType {
                fallback_days: lookup.days,
            },
        });
    }

    let legal_due_date = match record
        .legal_due_date
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        None => None,
        Some(raw) => match parse_timestamp(raw) {
            Some(due) => Some(due),
            None => {
                warnings.push(WarningKind::DueDateRecomputed {
                    value: raw.to_string(),
                });
                add_window(submitted_at, lookup.days)
            }
        },
    };

    let status_label = record.status.trim().to_string();
    let status = ApplicationStatus::parse(&status_label);
    if status.is_none() {
        warnings.push(WarningKind::UnknownStatus {
            status: status_label.clone(),
        });
    }

    Ok(Admitted {
        application: Application {
            id: ApplicationId(id.to_string()),
            flow_type,
            submitted_at,
            legal_due_date,
            status,
            status_label,
        },
        lookup,
        warnings,
    })
}

/// Whole days until the deadline, rounded toward negative infinity so any
/// instant past the deadline is negative.
pub(crate) fn days_left(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = due - now;
    let whole_days = delta.num_days();
    if delta < Duration::days(whole_days) {
        whole_days - 1
    } else {
        whole_days
    }
}

/// Active requests per `flow_type`; requests without a category share one bucket.
pub(crate) fn backlog_by_category<'a, I>(applications: I) -> BTreeMap<Option<&'a str>, usize>
where
    I: IntoIterator<Item = &'a Application>,
{
    let mut backlog = BTreeMap::new();
    for application in applications {
        if application.is_active() {
            *backlog.entry(application.flow_type.as_deref()).or_insert(0) += 1;
        }
    }
    backlog
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, hour, minute, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn days_left_floors_partial_days() {
        let now = at(12, 0);
        assert_eq!(days_left(now + Duration::hours(36), now), 1);
        assert_eq!(days_left(now + Duration::days(2), now), 2);
        assert_eq!(days_left(now, now), 0);
        assert_eq!(days_left(now - Duration::minutes(1), now), -1);
        assert_eq!(days_left(now - Duration::days(1), now), -1);
        assert_eq!(days_left(now - Duration::hours(25), now), -2);
    }

    #[test]
    fn admit_rejects_missing_and_malformed_submission_times() {
        let registry = DeadlineRegistry::standard();
        let mut record = ApplicationRecord {
            id: "req-1".to_string(),
            flow_type: Some("certificat_urbanism".to_string()),
            submitted_at: None,
            legal_due_date: None,
            status: "pending_validation".to_string(),
            citizen_id: None,
            assigned_clerk_id: None,
        };

        assert!(matches!(
            admit(&record, &registry),
            Err(InputError::MissingSubmittedAt)
        ));

        record.submitted_at = Some("last tuesday".to_string());
        assert!(matches!(
            admit(&record, &registry),
            Err(InputError::InvalidSubmittedAt { .. })
        ));

        record.submitted_at = Some("2025-05-01T09:00:00Z".to_string());
        record.id = "  ".to_string();
        assert!(matches!(admit(&record, &registry), Err(InputError::MissingId)));
    }

    #[test]
    fn admit_recomputes_unreadable_due_dates_from_the_window() {
        let registry = DeadlineRegistry::standard();
        let record = ApplicationRecord {
            id: "req-2".to_string(),
            flow_type: Some("informare_urbanism".to_string()),
            submitted_at: Some("2025-05-01T00:00:00Z".to_string()),
            legal_due_date: Some("soon".to_string()),
            status: "in_review".to_string(),
            citizen_id: None,
            assigned_clerk_id: None,
        };

        let admitted = admit(&record, &registry).expect("record admitted");
        assert_eq!(
            admitted.application.legal_due_date,
            parse_timestamp("2025-05-16T00:00:00Z")
        );
        assert_eq!(
            admitted.warnings,
            vec![WarningKind::DueDateRecomputed {
                value: "soon".to_string()
            }]
        );
    }
}

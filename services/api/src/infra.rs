use chrono::{DateTime, Utc};
use dossier_desk::config::StaticToken;
use dossier_desk::error::AppError;
use dossier_desk::workflows::requests::{
    parse_timestamp, ApplicationId, ApplicationRecord, AuthError, DeadlineRegistry, Identity,
    IdentityVerifier, RequestStore, ScoreSnapshot, StoreError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local request store; snapshots are kept for inspection only.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestStore {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    snapshots: Arc<Mutex<Vec<ScoreSnapshot>>>,
}

impl RequestStore for InMemoryRequestStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let id = record.application_id();
        if guard.contains_key(&id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list_for_citizen(&self, citizen_id: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.owned_by(citizen_id))
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn record_scores(&self, snapshot: &ScoreSnapshot) -> Result<(), StoreError> {
        debug!(
            entries = snapshot.entries.len(),
            evaluated_at = %snapshot.evaluated_at,
            "priority snapshot recorded"
        );
        let mut guard = self.snapshots.lock().expect("snapshot mutex poisoned");
        guard.push(snapshot.clone());
        Ok(())
    }
}

/// Identity adapter backed by `APP_STATIC_TOKENS`.
#[derive(Debug, Default, Clone)]
pub(crate) struct StaticTokenVerifier {
    identities: HashMap<String, Identity>,
}

impl StaticTokenVerifier {
    pub(crate) fn from_tokens(tokens: &[StaticToken]) -> Self {
        let identities = tokens
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    Identity {
                        user_id: entry.user_id.clone(),
                        role: entry.role,
                    },
                )
            })
            .collect();
        Self { identities }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

impl IdentityVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.identities
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Standard registry with an optional CSV override merged on top.
pub(crate) fn load_registry(overrides: Option<&Path>) -> Result<DeadlineRegistry, AppError> {
    let registry = DeadlineRegistry::standard();
    match overrides {
        Some(path) => Ok(registry.with_overrides_from_path(path)?),
        None => Ok(registry),
    }
}

pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).ok_or_else(|| {
        format!("failed to parse '{raw}' as an ISO-8601 timestamp (e.g. 2025-06-02T09:00:00Z)")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_desk::workflows::requests::Role;
    use std::io::Write;

    fn record(id: &str, citizen: &str) -> ApplicationRecord {
        ApplicationRecord {
            id: id.to_string(),
            flow_type: Some("certificat_urbanism".to_string()),
            submitted_at: Some("2025-06-01T08:00:00Z".to_string()),
            legal_due_date: Some("2025-07-01T08:00:00Z".to_string()),
            status: "pending_validation".to_string(),
            citizen_id: Some(citizen.to_string()),
            assigned_clerk_id: None,
        }
    }

    #[test]
    fn store_rejects_duplicate_ids() {
        let store = InMemoryRequestStore::default();
        store.insert(record("req-1", "c-1")).expect("first insert");

        let err = store
            .insert(record("req-1", "c-2"))
            .expect_err("duplicate rejected");
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.list_all().expect("list").len(), 1);
        assert_eq!(store.list_for_citizen("c-2").expect("list").len(), 0);
    }

    #[test]
    fn store_keeps_snapshots() {
        let store = InMemoryRequestStore::default();
        let snapshot = ScoreSnapshot {
            evaluated_at: Utc::now(),
            entries: Vec::new(),
        };

        store.record_scores(&snapshot).expect("snapshot stored");
        let guard = store.snapshots.lock().expect("snapshot mutex poisoned");
        assert_eq!(guard.as_slice(), &[snapshot]);
    }

    #[test]
    fn static_verifier_resolves_configured_tokens() {
        let verifier = StaticTokenVerifier::from_tokens(&[StaticToken {
            token: "s3cret".to_string(),
            user_id: "clerk-7".to_string(),
            role: Role::Clerk,
        }]);

        let identity = verifier.verify("s3cret").expect("token known");
        assert_eq!(identity.user_id, "clerk-7");
        assert_eq!(identity.role, Role::Clerk);
        assert!(matches!(
            verifier.verify("guess"),
            Err(AuthError::InvalidToken)
        ));
        assert!(StaticTokenVerifier::default().is_empty());
    }

    #[test]
    fn load_registry_merges_override_file() {
        let path = std::env::temp_dir().join(format!(
            "dossier-desk-overrides-{}.csv",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).expect("temp file");
        writeln!(file, "flow_type,window_days,label").expect("write header");
        writeln!(file, "racord_utilitati,20,").expect("write row");
        drop(file);

        let registry = load_registry(Some(&path)).expect("registry loads");
        std::fs::remove_file(&path).ok();

        assert_eq!(registry.lookup("racord_utilitati").days, 20);
        assert!(matches!(
            load_registry(Some(Path::new("/nonexistent/deadlines.csv"))),
            Err(AppError::Registry(_))
        ));
    }

    #[test]
    fn parse_instant_reports_bad_input() {
        assert!(parse_instant("2025-06-02").is_ok());
        let err = parse_instant("tomorrow").expect_err("rejected");
        assert!(err.contains("tomorrow"));
    }
}

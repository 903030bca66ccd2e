use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::requests::{
    format_timestamp, ApplicationId, ApplicationRecord, AuthError, DeadlineRegistry, FixedClock,
    Identity, IdentityVerifier, PriorityEngine, PriorityPolicy, RequestQueueService, RequestStore,
    Role, ScoreSnapshot, StoreError,
};

pub(super) const CITIZEN_TOKEN: &str = "citizen-token";
pub(super) const OTHER_CITIZEN_TOKEN: &str = "other-citizen-token";
pub(super) const CLERK_TOKEN: &str = "clerk-token";

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn engine() -> PriorityEngine {
    PriorityEngine::new(
        Arc::new(DeadlineRegistry::standard()),
        PriorityPolicy::default(),
    )
}

/// Store row submitted `submitted_days_ago` before [`now`], due `due_in_days` after it.
pub(super) fn record(
    id: &str,
    flow_type: &str,
    submitted_days_ago: i64,
    due_in_days: Option<i64>,
    status: &str,
) -> ApplicationRecord {
    ApplicationRecord {
        id: id.to_string(),
        flow_type: Some(flow_type.to_string()),
        submitted_at: Some(format_timestamp(now() - Duration::days(submitted_days_ago))),
        legal_due_date: due_in_days.map(|days| format_timestamp(now() + Duration::days(days))),
        status: status.to_string(),
        citizen_id: Some("citizen-1".to_string()),
        assigned_clerk_id: None,
    }
}

pub(super) fn owned_by(mut record: ApplicationRecord, citizen: &str) -> ApplicationRecord {
    record.citizen_id = Some(citizen.to_string());
    record
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    pub(super) records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    pub(super) snapshots: Arc<Mutex<Vec<ScoreSnapshot>>>,
}

impl MemoryStore {
    pub(super) fn seeded(records: Vec<ApplicationRecord>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record).expect("seed insert");
        }
        store
    }

    pub(super) fn snapshots(&self) -> Vec<ScoreSnapshot> {
        self.snapshots.lock().expect("snapshot mutex poisoned").clone()
    }
}

impl RequestStore for MemoryStore {
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
        self.snapshots
            .lock()
            .expect("snapshot mutex poisoned")
            .push(snapshot.clone());
        Ok(())
    }
}

pub(super) struct UnavailableStore;

impl RequestStore for UnavailableStore {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list_for_citizen(&self, _citizen_id: &str) -> Result<Vec<ApplicationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list_all(&self) -> Result<Vec<ApplicationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn record_scores(&self, _snapshot: &ScoreSnapshot) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct StaticVerifier;

impl IdentityVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let (user_id, role) = match token {
            CITIZEN_TOKEN => ("citizen-1", Role::Citizen),
            OTHER_CITIZEN_TOKEN => ("citizen-2", Role::Citizen),
            CLERK_TOKEN => ("clerk-1", Role::Clerk),
            _ => return Err(AuthError::InvalidToken),
        };
        Ok(Identity {
            user_id: user_id.to_string(),
            role,
        })
    }
}

pub(super) fn citizen() -> Identity {
    Identity {
        user_id: "citizen-1".to_string(),
        role: Role::Citizen,
    }
}

pub(super) fn clerk() -> Identity {
    Identity {
        user_id: "clerk-1".to_string(),
        role: Role::Clerk,
    }
}

pub(super) fn build_service(
    store: MemoryStore,
) -> (RequestQueueService<MemoryStore, StaticVerifier>, Arc<MemoryStore>) {
    let store = Arc::new(store);
    let service = RequestQueueService::new(store.clone(), Arc::new(StaticVerifier), engine())
        .with_clock(Arc::new(FixedClock(now())));
    (service, store)
}

pub(super) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

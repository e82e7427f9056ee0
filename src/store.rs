//! Pass store (spec.md §4.C) — the persistence seam. `PassStore` is the
//! trait a real transactional, key-addressable database would implement
//! (an explicit external collaborator per spec.md §1); `InMemoryPassStore`
//! is the concrete stand-in used by this service and its tests.
//!
//! The linearizability guarantee `update_pass` must offer is realised with
//! one lock per row (`DashMap<PassId, Mutex<PassRequest>>`), the same
//! per-key-locking idiom the teacher uses for its rate-limit table
//! (`DashMap<Vec<u8>, RateEntry>` guarded via `entry().or_insert(...)`).
//! The lock is a plain `std::sync::Mutex`, never held across an `.await`.

use crate::domain::{Direction, PassId, PassRequest, PassState, Principal, PrincipalId, ScanId, ScanLog};
use crate::error::GateError;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct PassFilter {
    pub subject_id: Option<PrincipalId>,
    pub state: Option<PassState>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub subject_code_contains: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub direction: Option<Direction>,
    pub result: Option<crate::domain::ScanResult>,
}

/// The persistence seam: everything the pass lifecycle engine, the scan
/// verifier, and the audit broadcaster need from a transactional store.
pub trait PassStore: Send + Sync {
    fn get_principal(&self, id: PrincipalId) -> Option<Principal>;
    fn list_principals(&self) -> Vec<Principal>;
    fn upsert_principal(&self, principal: Principal);

    fn get_pass(&self, id: PassId) -> Option<PassRequest>;
    fn insert_pass(&self, draft: PassRequest) -> PassId;

    /// Runs `mutator` under the per-row lock and returns the row as it
    /// stands after the mutation. `mutator` returns `Ok(())` to commit or
    /// `Err` to leave the row untouched; boxed so the trait stays object
    /// safe (`Arc<dyn PassStore>` is threaded through the lifecycle engine,
    /// the verifier, and the audit broadcaster).
    fn update_pass(
        &self,
        id: PassId,
        mutator: Box<dyn FnOnce(&mut PassRequest) -> Result<(), GateError> + Send>,
    ) -> Result<PassRequest, GateError>;

    fn query_passes(&self, filter: &PassFilter, limit: usize) -> Vec<PassRequest>;

    /// Structured idempotency lookup for the daily self-service path
    /// (spec.md §9 Open Questions: a `(subject, direction, civil-date)` key,
    /// not a `reason LIKE` prefix match).
    fn find_daily_pass(
        &self,
        subject_id: PrincipalId,
        direction: Direction,
        civil_date: NaiveDate,
    ) -> Option<PassId>;
    fn index_daily_pass(
        &self,
        subject_id: PrincipalId,
        direction: Direction,
        civil_date: NaiveDate,
        pass_id: PassId,
    );

    fn insert_scan(&self, record: ScanLog) -> ScanLog;
    fn query_scans(&self, filter: &ScanFilter, limit: usize, offset: usize) -> Vec<ScanLog>;
    fn all_scans_since(&self, since: DateTime<Utc>) -> Vec<ScanLog>;
    fn recent_scans(&self, limit: usize) -> Vec<ScanLog>;
}

pub struct InMemoryPassStore {
    principals: DashMap<PrincipalId, Principal>,
    passes: DashMap<PassId, Mutex<PassRequest>>,
    next_pass_id: AtomicU64,
    daily_index: DashMap<(PrincipalId, Direction, NaiveDate), PassId>,
    scans: DashMap<ScanId, ScanLog>,
    next_scan_id: AtomicU64,
}

impl InMemoryPassStore {
    pub fn new() -> Self {
        Self {
            principals: DashMap::new(),
            passes: DashMap::new(),
            next_pass_id: AtomicU64::new(1),
            daily_index: DashMap::new(),
            scans: DashMap::new(),
            next_scan_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryPassStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PassStore for InMemoryPassStore {
    fn get_principal(&self, id: PrincipalId) -> Option<Principal> {
        self.principals.get(&id).map(|p| p.clone())
    }

    fn list_principals(&self) -> Vec<Principal> {
        self.principals.iter().map(|e| e.value().clone()).collect()
    }

    fn upsert_principal(&self, principal: Principal) {
        self.principals.insert(principal.id, principal);
    }

    fn get_pass(&self, id: PassId) -> Option<PassRequest> {
        self.passes.get(&id).map(|m| m.lock().unwrap().clone())
    }

    fn insert_pass(&self, mut draft: PassRequest) -> PassId {
        let id = self.next_pass_id.fetch_add(1, Ordering::SeqCst);
        draft.id = id;
        self.passes.insert(id, Mutex::new(draft));
        id
    }

    fn update_pass(
        &self,
        id: PassId,
        mutator: Box<dyn FnOnce(&mut PassRequest) -> Result<(), GateError> + Send>,
    ) -> Result<PassRequest, GateError> {
        let row = self.passes.get(&id).ok_or(GateError::NotFound)?;
        let mut guard = row.lock().unwrap();
        mutator(&mut guard)?;
        Ok(guard.clone())
    }

    fn query_passes(&self, filter: &PassFilter, limit: usize) -> Vec<PassRequest> {
        let mut out: Vec<PassRequest> = self
            .passes
            .iter()
            .map(|e| e.value().lock().unwrap().clone())
            .filter(|p| {
                filter.subject_id.map(|s| s == p.subject_id).unwrap_or(true)
                    && filter.state.map(|s| s == p.state).unwrap_or(true)
            })
            .collect();
        out.sort_by(|a, b| b.request_time.cmp(&a.request_time).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        out
    }

    fn find_daily_pass(
        &self,
        subject_id: PrincipalId,
        direction: Direction,
        civil_date: NaiveDate,
    ) -> Option<PassId> {
        self.daily_index
            .get(&(subject_id, direction, civil_date))
            .map(|e| *e)
    }

    fn index_daily_pass(
        &self,
        subject_id: PrincipalId,
        direction: Direction,
        civil_date: NaiveDate,
        pass_id: PassId,
    ) {
        self.daily_index
            .insert((subject_id, direction, civil_date), pass_id);
    }

    fn insert_scan(&self, mut record: ScanLog) -> ScanLog {
        let id = self.next_scan_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;
        self.scans.insert(id, record.clone());
        record
    }

    fn query_scans(&self, filter: &ScanFilter, limit: usize, offset: usize) -> Vec<ScanLog> {
        let mut out: Vec<ScanLog> = self
            .scans
            .iter()
            .map(|e| e.value().clone())
            .filter(|s| {
                let subject_ok = match &filter.subject_code_contains {
                    Some(needle) => s
                        .subject_id
                        .and_then(|id| self.get_principal(id))
                        .and_then(|p| p.subject_code)
                        .map(|code| code.contains(needle.as_str()))
                        .unwrap_or(false),
                    None => true,
                };
                subject_ok
                    && filter.date_from.map(|d| s.timestamp >= d).unwrap_or(true)
                    && filter.date_to.map(|d| s.timestamp <= d).unwrap_or(true)
                    && filter.direction.map(|d| d == s.direction).unwrap_or(true)
                    && filter.result.map(|r| r == s.result).unwrap_or(true)
            })
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        out.into_iter().skip(offset).take(limit).collect()
    }

    fn all_scans_since(&self, since: DateTime<Utc>) -> Vec<ScanLog> {
        self.scans
            .iter()
            .map(|e| e.value().clone())
            .filter(|s| s.timestamp >= since)
            .collect()
    }

    fn recent_scans(&self, limit: usize) -> Vec<ScanLog> {
        let mut out: Vec<ScanLog> = self.scans.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Role, ScanResult};

    fn student(id: u64) -> Principal {
        Principal {
            id,
            name: "Test Student".into(),
            role: Role::Student,
            active: true,
            subject_code: Some(format!("U{id:05}")),
            student_class: None,
            guardian_name: None,
            validity_end: None,
            contact: None,
            password_hash: String::new(),
        }
    }

    #[test]
    fn update_pass_is_exclusive_under_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryPassStore::new());
        let id = store.insert_pass(PassRequest::new_pending(
            0,
            1,
            Direction::Entry,
            "test".into(),
            Utc::now(),
            None,
            None,
            false,
        ));

        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                store.update_pass(
                    id,
                    Box::new(|p| {
                        if p.used_time.is_some() {
                            Err(GateError::Replay)
                        } else {
                            p.used_time = Some(Utc::now());
                            p.state = PassState::Used;
                            Ok(())
                        }
                    }),
                )
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one concurrent consume should succeed");
    }

    #[test]
    fn daily_index_round_trips() {
        let store = InMemoryPassStore::new();
        store.upsert_principal(student(1));
        let date = Utc::now().date_naive();
        assert!(store.find_daily_pass(1, Direction::Entry, date).is_none());
        store.index_daily_pass(1, Direction::Entry, date, 99);
        assert_eq!(store.find_daily_pass(1, Direction::Entry, date), Some(99));
    }

    #[test]
    fn query_scans_filters_by_result() {
        let store = InMemoryPassStore::new();
        store.upsert_principal(student(1));
        store.insert_scan(ScanLog {
            id: 0,
            pass_id: Some(1),
            subject_id: Some(1),
            scanner_id: 2,
            direction: Direction::Entry,
            result: ScanResult::Success,
            detail: "verified".into(),
            timestamp: Utc::now(),
            emergency: false,
        });
        store.insert_scan(ScanLog {
            id: 0,
            pass_id: Some(1),
            subject_id: Some(1),
            scanner_id: 2,
            direction: Direction::Entry,
            result: ScanResult::Invalid,
            detail: "sig-mismatch".into(),
            timestamp: Utc::now(),
            emergency: false,
        });
        let filter = ScanFilter {
            result: Some(ScanResult::Success),
            ..Default::default()
        };
        let out = store.query_scans(&filter, 10, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].result, ScanResult::Success);
    }
}

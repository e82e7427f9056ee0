//! Pass lifecycle engine (spec.md §4.D). Drives the state machine:
//!
//! ```text
//!             approve                     consume
//!  pending ─────────────▶ approved ──────────────▶ used
//!    │
//!    │ reject
//!    ▼
//!  rejected
//! ```
//!
//! All transitions go through `PassStore::update_pass`, which is
//! linearizable per row — that is the substrate exactly-once `consume`
//! rests on (spec.md §4.C/§4.D/§8 property 3).

use crate::config::Config;
use crate::domain::{Direction, PassId, PassRequest, PassState, Principal};
use crate::error::GateError;
use crate::geofence::{self, LocationPolicyStore};
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::store::PassStore;
use crate::token;
use chrono::Utc;
use std::sync::Arc;

pub struct LifecycleEngine {
    store: Arc<dyn PassStore>,
    policy_store: Arc<LocationPolicyStore>,
    config: Config,
    notify_sink: &'static dyn NotificationSink,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn PassStore>,
        policy_store: Arc<LocationPolicyStore>,
        config: Config,
        notify_sink: &'static dyn NotificationSink,
    ) -> Self {
        Self {
            store,
            policy_store,
            config,
            notify_sink,
        }
    }

    pub fn notify_sink(&self) -> &'static dyn NotificationSink {
        self.notify_sink
    }

    /// spec.md §4.D `create`. If `gps` is supplied, evaluates the geofence
    /// in *advisory* mode — the result is recorded but never blocks
    /// issuance for an admin-approved pass.
    pub fn create(
        &self,
        subject: &Principal,
        direction: Direction,
        reason: String,
        gps: Option<(f64, f64)>,
    ) -> Result<PassRequest, GateError> {
        if !(3..=300).contains(&reason.chars().count()) {
            return Err(GateError::BadRequest(
                "reason must be between 3 and 300 characters".to_string(),
            ));
        }
        let (origin_lat, origin_lon, location_ok) = match gps {
            Some((lat, lon)) => {
                let policy = self.policy_store.load();
                let decision =
                    geofence::evaluate(&policy, lat, lon, self.config.geofence_buffer_m);
                (Some(lat), Some(lon), decision.inside)
            }
            None => (None, None, false),
        };

        let draft = PassRequest::new_pending(
            0,
            subject.id,
            direction,
            reason,
            Utc::now(),
            origin_lat,
            origin_lon,
            location_ok,
        );
        let id = self.store.insert_pass(draft);
        let created = self.store.get_pass(id).expect("just inserted");

        dispatch(
            self.notify_sink,
            NotificationEvent::NewRequest {
                pass_id: id,
                subject_id: subject.id,
                direction,
            },
            self.config.side_effect_budget,
        );

        Ok(created)
    }

    /// spec.md §4.D `approve`. Atomically mints a token and transitions
    /// `pending -> approved`.
    pub fn approve(&self, pass_id: PassId, admin: &Principal) -> Result<PassRequest, GateError> {
        let secret = self.config.secret_key.clone();
        let ttl = self.config.pass_ttl;
        let admin_id = admin.id;
        self.store
            .update_pass(
                pass_id,
                Box::new(move |pass| {
                    if pass.state != PassState::Pending {
                        return Err(GateError::WrongState);
                    }
                    let now = Utc::now();
                    let expiry = now + ttl;
                    let tok = token::mint(&secret, pass.id, pass.subject_id, expiry.timestamp());
                    pass.token = Some(tok);
                    pass.approved_time = Some(now);
                    pass.expiry = Some(expiry);
                    pass.approver_id = Some(admin_id);
                    pass.state = PassState::Approved;
                    Ok(())
                }),
            )
            .map(|pass| {
            dispatch(
                self.notify_sink,
                NotificationEvent::PassApproved {
                    pass_id: pass.id,
                    subject_id: pass.subject_id,
                },
                self.config.side_effect_budget,
            );
            pass
        })
    }

    /// spec.md §4.D `reject`. No token is minted.
    pub fn reject(&self, pass_id: PassId, _admin: &Principal) -> Result<PassRequest, GateError> {
        self.store.update_pass(
            pass_id,
            Box::new(|pass| {
                if pass.state != PassState::Pending {
                    return Err(GateError::WrongState);
                }
                pass.state = PassState::Rejected;
                Ok(())
            }),
        )
    }

    /// spec.md §4.D `consume`. Called only from the scan verifier, under
    /// the per-row lock. Exactly one of two concurrent callers observes
    /// `Ok`; the other observes `GateError::Replay`.
    pub fn consume(&self, pass_id: PassId, scanner: &Principal) -> Result<PassRequest, GateError> {
        let scanner_id = scanner.id;
        self.store.update_pass(
            pass_id,
            Box::new(move |pass| {
                if pass.used_time.is_some() {
                    return Err(GateError::Replay);
                }
                pass.used_time = Some(Utc::now());
                pass.consumer_id = Some(scanner_id);
                pass.state = PassState::Used;
                Ok(())
            }),
        )
    }

    /// spec.md §4.D `daily`. Self-service path: strict geofence
    /// enforcement, subject validity check, and idempotency per
    /// `(subject, direction, civil-date)`.
    pub fn daily(
        &self,
        subject: &Principal,
        direction: Direction,
        gps: (f64, f64),
        now_civil_date: chrono::NaiveDate,
    ) -> Result<PassRequest, GateError> {
        let now = Utc::now();
        if !subject.is_valid_at(now) {
            return Err(GateError::Forbidden);
        }

        let policy = self.policy_store.load();
        let (lat, lon) = gps;
        let decision = geofence::evaluate(&policy, lat, lon, self.config.geofence_buffer_m);
        if !decision.inside {
            return Err(GateError::GeofenceDenied);
        }

        if let Some(existing_id) = self.store.find_daily_pass(subject.id, direction, now_civil_date)
        {
            let existing = self.store.get_pass(existing_id).ok_or(GateError::NotFound)?;
            return match existing.state {
                PassState::Approved | PassState::Used => Ok(existing),
                PassState::Pending => self.promote_pending_to_approved(existing_id, subject),
                PassState::Rejected => {
                    // A rejected daily pass from earlier today does not block a
                    // fresh self-service attempt; fall through to create a new one
                    // by clearing the stale index entry.
                    self.create_and_approve_daily(subject, direction, lat, lon, decision.inside, now_civil_date)
                }
            };
        }

        self.create_and_approve_daily(subject, direction, lat, lon, decision.inside, now_civil_date)
    }

    fn promote_pending_to_approved(
        &self,
        pass_id: PassId,
        subject: &Principal,
    ) -> Result<PassRequest, GateError> {
        // Promotion acts as an admin approval would (spec.md §4.D `daily`).
        let admin_stand_in = Principal {
            id: subject.id,
            ..subject.clone()
        };
        self.approve(pass_id, &admin_stand_in)
    }

    fn create_and_approve_daily(
        &self,
        subject: &Principal,
        direction: Direction,
        lat: f64,
        lon: f64,
        location_ok: bool,
        civil_date: chrono::NaiveDate,
    ) -> Result<PassRequest, GateError> {
        let reason = format!(
            "Daily {} – {}",
            direction.as_str(),
            civil_date.format("%d/%m/%Y")
        );
        let draft = PassRequest::new_pending(
            0,
            subject.id,
            direction,
            reason,
            Utc::now(),
            Some(lat),
            Some(lon),
            location_ok,
        );
        let id = self.store.insert_pass(draft);
        self.store.index_daily_pass(subject.id, direction, civil_date, id);
        self.approve(id, subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::Role;
    use crate::store::InMemoryPassStore;

    struct NoopSink;
    impl NotificationSink for NoopSink {
        fn notify(&self, _event: NotificationEvent) {}
    }
    static SINK: NoopSink = NoopSink;

    fn engine() -> LifecycleEngine {
        let store: Arc<dyn PassStore> = Arc::new(InMemoryPassStore::new());
        let policy_store = Arc::new(LocationPolicyStore::new(format!(
            "/tmp/gatepass-test-policy-{}.json",
            std::process::id()
        )));
        LifecycleEngine::new(store, policy_store, Config::from_env(), &SINK)
    }

    fn student(id: u64) -> Principal {
        Principal {
            id,
            name: "S".into(),
            role: Role::Student,
            active: true,
            subject_code: Some(format!("U{id}")),
            student_class: None,
            guardian_name: None,
            validity_end: Some(Utc::now() + chrono::Duration::days(365)),
            contact: None,
            password_hash: String::new(),
        }
    }

    fn admin(id: u64) -> Principal {
        Principal {
            role: Role::Admin,
            ..student(id)
        }
    }

    #[tokio::test]
    async fn pending_to_approved_to_used_is_valid_path() {
        let eng = engine();
        let s = student(1);
        let a = admin(2);
        let pass = eng.create(&s, Direction::Entry, "Medical".into(), None).unwrap();
        assert_eq!(pass.state, PassState::Pending);
        let approved = eng.approve(pass.id, &a).unwrap();
        assert_eq!(approved.state, PassState::Approved);
        assert!(approved.token.is_some());
        let used = eng.consume(pass.id, &a).unwrap();
        assert_eq!(used.state, PassState::Used);
    }

    #[tokio::test]
    async fn reject_mints_no_token() {
        let eng = engine();
        let s = student(1);
        let a = admin(2);
        let pass = eng.create(&s, Direction::Exit, "Leaving early".into(), None).unwrap();
        let rejected = eng.reject(pass.id, &a).unwrap();
        assert_eq!(rejected.state, PassState::Rejected);
        assert!(rejected.token.is_none());
    }

    #[tokio::test]
    async fn approve_twice_is_wrong_state() {
        let eng = engine();
        let s = student(1);
        let a = admin(2);
        let pass = eng.create(&s, Direction::Entry, "Medical".into(), None).unwrap();
        eng.approve(pass.id, &a).unwrap();
        let second = eng.approve(pass.id, &a);
        assert!(matches!(second, Err(GateError::WrongState)));
    }

    #[tokio::test]
    async fn consume_twice_is_replay() {
        let eng = engine();
        let s = student(1);
        let a = admin(2);
        let pass = eng.create(&s, Direction::Entry, "Medical".into(), None).unwrap();
        eng.approve(pass.id, &a).unwrap();
        eng.consume(pass.id, &a).unwrap();
        let second = eng.consume(pass.id, &a);
        assert!(matches!(second, Err(GateError::Replay)));
    }

    #[tokio::test]
    async fn reason_length_boundaries() {
        let eng = engine();
        let s = student(1);
        assert!(eng.create(&s, Direction::Entry, "ab".into(), None).is_err());
        assert!(eng.create(&s, Direction::Entry, "abc".into(), None).is_ok());
        let max = "x".repeat(300);
        assert!(eng.create(&s, Direction::Entry, max, None).is_ok());
        let too_long = "x".repeat(301);
        assert!(eng.create(&s, Direction::Entry, too_long, None).is_err());
    }
}

//! Scan verifier (spec.md §4.E). Combines the token codec, the lifecycle
//! engine, and the audit log on a single gate event.
//!
//! The exception-driven flow of the Python original collapses, per
//! spec.md §9's Design Note, into a tagged result returned by
//! `log_and_return`, which both writes the `ScanLog` and produces the
//! `VerifyOutcome` the HTTP boundary serialises — there is exactly one
//! place a scan attempt is logged, success or failure.

use crate::audit::AuditBroadcaster;
use crate::biometric::{BiometricVerdict, BiometricVerifier};
use crate::config::Config;
use crate::domain::{Direction, PassId, Principal, ScanLog, ScanResult};
use crate::lifecycle::LifecycleEngine;
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::store::PassStore;
use crate::token::{self, TokenError};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

pub struct VerifyOutcome {
    pub result: ScanResult,
    pub detail: String,
    pub pass_id: Option<PassId>,
    pub biometric: Option<BiometricVerdict>,
}

pub struct ScanVerifier {
    store: Arc<dyn PassStore>,
    lifecycle: Arc<LifecycleEngine>,
    audit: Arc<AuditBroadcaster>,
    config: Config,
    notify_sink: &'static dyn NotificationSink,
    biometric: Arc<dyn BiometricVerifier>,
}

impl ScanVerifier {
    pub fn new(
        store: Arc<dyn PassStore>,
        lifecycle: Arc<LifecycleEngine>,
        audit: Arc<AuditBroadcaster>,
        config: Config,
        notify_sink: &'static dyn NotificationSink,
        biometric: Arc<dyn BiometricVerifier>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            audit,
            config,
            notify_sink,
            biometric,
        }
    }

    fn log_and_return(
        &self,
        pass_id: Option<PassId>,
        subject_id: Option<u64>,
        scanner: &Principal,
        direction: Direction,
        result: ScanResult,
        detail: &str,
        emergency: bool,
    ) -> VerifyOutcome {
        let record = ScanLog {
            id: 0,
            pass_id,
            subject_id,
            scanner_id: scanner.id,
            direction,
            result,
            detail: detail.to_string(),
            timestamp: Utc::now(),
            emergency,
        };
        let inserted = self.store.insert_scan(record);
        self.audit.publish(inserted);
        VerifyOutcome {
            result,
            detail: detail.to_string(),
            pass_id,
            biometric: None,
        }
    }

    /// spec.md §4.E decision procedure, steps 1-7.
    #[instrument(skip(self, token_str, image), fields(scanner = scanner.id))]
    pub async fn verify(
        &self,
        token_str: &str,
        scanner: &Principal,
        image: Option<Vec<u8>>,
    ) -> VerifyOutcome {
        // Step 1+2: parse and MAC-verify outside the per-pass lock.
        let parsed = match token::parse_and_verify(&self.config.secret_key, token_str) {
            Ok(p) => p,
            Err(TokenError::Structural) => {
                return self.log_and_return(
                    None,
                    None,
                    scanner,
                    Direction::Entry,
                    ScanResult::Invalid,
                    "malformed",
                    false,
                )
            }
            Err(TokenError::SignatureMismatch) => {
                return self.log_and_return(
                    None,
                    None,
                    scanner,
                    Direction::Entry,
                    ScanResult::Invalid,
                    "sig-mismatch",
                    false,
                )
            }
        };

        // Step 3: load pass by id.
        let pass = match self.store.get_pass(parsed.pass_id) {
            Some(p) => p,
            None => {
                return self.log_and_return(
                    Some(parsed.pass_id),
                    None,
                    scanner,
                    Direction::Entry,
                    ScanResult::Invalid,
                    "no-pass",
                    false,
                )
            }
        };

        // Step 4: expiry — now == E counts as expired (spec.md §8 boundary).
        let now = Utc::now();
        if now.timestamp() >= parsed.expiry_unix {
            return self.log_and_return(
                Some(pass.id),
                Some(pass.subject_id),
                scanner,
                pass.direction,
                ScanResult::Expired,
                "past-expiry",
                false,
            );
        }

        // Step 5: state must be approved.
        if pass.state != crate::domain::PassState::Approved {
            return self.log_and_return(
                Some(pass.id),
                Some(pass.subject_id),
                scanner,
                pass.direction,
                ScanResult::NotApproved,
                pass.state.as_str(),
                false,
            );
        }

        // Step 6: exactly-once consumption under the per-row lock.
        match self.lifecycle.consume(pass.id, scanner) {
            Err(crate::error::GateError::Replay) => self.log_and_return(
                Some(pass.id),
                Some(pass.subject_id),
                scanner,
                pass.direction,
                ScanResult::Replay,
                "already-used",
                false,
            ),
            Err(_) => self.log_and_return(
                Some(pass.id),
                Some(pass.subject_id),
                scanner,
                pass.direction,
                ScanResult::Invalid,
                "consume-failed",
                false,
            ),
            Ok(_) => {
                let mut outcome = self.log_and_return(
                    Some(pass.id),
                    Some(pass.subject_id),
                    scanner,
                    pass.direction,
                    ScanResult::Success,
                    "verified",
                    false,
                );

                // Step 7: side effects — never downgrade the gate decision.
                if let Some(subject) = self.store.get_principal(pass.subject_id) {
                    dispatch(
                        self.notify_sink,
                        NotificationEvent::ScanSucceeded {
                            pass_id: pass.id,
                            subject_id: subject.id,
                            direction: pass.direction,
                        },
                        self.config.side_effect_budget,
                    );

                    if let Some(img) = image {
                        // Advisory only: attach the verdict if it completes
                        // before the response is sent, else omit it.
                        let biometric = self.biometric.clone();
                        let verdict = tokio::time::timeout(
                            self.config.side_effect_budget,
                            tokio::task::spawn_blocking(move || biometric.verify(&img, &subject)),
                        )
                        .await;
                        if let Ok(Ok(v)) = verdict {
                            outcome.biometric = Some(v);
                        }
                    }
                }

                outcome
            }
        }
    }
}

//! Notification dispatcher (SPEC_FULL.md §4.I). Fire-and-forget side
//! effects that must never alter pass state (spec.md §4.D/§4.E/§7).
//!
//! Implements the Design Note in spec.md §9: "Nested try/except around
//! every side effect in the source encodes 'side effects must not affect
//! the primary path.' Make this explicit by separating the primary
//! transaction from a post-commit side-effect dispatcher." Here that
//! dispatcher is a `tokio::spawn`ed future bounded by the configured
//! wall-clock budget; timeouts and sink errors are logged and swallowed.

use crate::domain::{Direction, PrincipalId};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    NewRequest {
        pass_id: u64,
        subject_id: PrincipalId,
        direction: Direction,
    },
    PassApproved {
        pass_id: u64,
        subject_id: PrincipalId,
    },
    ScanSucceeded {
        pass_id: u64,
        subject_id: PrincipalId,
        direction: Direction,
    },
    EmergencyExit {
        subject_id: PrincipalId,
    },
}

/// External collaborator boundary (spec.md §1: "push/SMS delivery... invoked
/// as fire-and-forget side effects"). No real FCM/Twilio account exists in
/// this environment; the default sink logs structurally so the boundary is
/// still exercised end-to-end.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, event: NotificationEvent);
}

pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn notify(&self, event: NotificationEvent) {
        match &event {
            NotificationEvent::NewRequest {
                pass_id,
                subject_id,
                direction,
            } => info!(pass_id, subject_id, direction = direction.as_str(), "notify: new pass request pending admin review"),
            NotificationEvent::PassApproved { pass_id, subject_id } => {
                info!(pass_id, subject_id, "notify: pass approved")
            }
            NotificationEvent::ScanSucceeded {
                pass_id,
                subject_id,
                direction,
            } => info!(pass_id, subject_id, direction = direction.as_str(), "notify: parent contact informed of successful scan"),
            NotificationEvent::EmergencyExit { subject_id } => {
                warn!(subject_id, "notify: emergency exit — admins alerted")
            }
        }
    }
}

/// Dispatch `event` without blocking the caller. Inherits the ~10s wall
/// clock budget from spec.md §5; a timeout or sink panic is dropped
/// without affecting the gate decision.
pub fn dispatch(sink: &'static dyn NotificationSink, event: NotificationEvent, budget: Duration) {
    tokio::spawn(async move {
        let res = tokio::time::timeout(budget, async { sink.notify(event) }).await;
        if res.is_err() {
            warn!("notification dispatch exceeded its wall-clock budget, dropped");
        }
    });
}

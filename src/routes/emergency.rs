use crate::auth::AuthPrincipal;
use crate::domain::{Direction, Role, ScanLog, ScanResult};
use crate::error::GateError;
use crate::notify::{dispatch, NotificationEvent};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct EmergencyExitResponse {
    pub logged: bool,
}

/// `POST /api/emergency_exit` (spec.md §4.H). Bypasses approval and
/// tokenization entirely: directly appends `result=success, direction=exit,
/// emergency=true, pass_id=None` and broadcasts it, deliberately without an
/// idempotency guard — "safety over strict accounting" per spec.md §4.H.
pub async fn emergency_exit(
    State(state): State<AppState>,
    auth: AuthPrincipal,
) -> Result<Json<EmergencyExitResponse>, GateError> {
    auth.require_role(&[Role::Student])?;
    let subject = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;

    let record = ScanLog {
        id: 0,
        pass_id: None,
        subject_id: Some(subject.id),
        scanner_id: subject.id,
        direction: Direction::Exit,
        result: ScanResult::Success,
        detail: "emergency exit".to_string(),
        timestamp: Utc::now(),
        emergency: true,
    };
    let inserted = state.store.insert_scan(record);
    state.audit.publish(inserted);

    dispatch(
        state_notify_sink(&state),
        NotificationEvent::EmergencyExit { subject_id: subject.id },
        state.config.side_effect_budget,
    );

    Ok(Json(EmergencyExitResponse { logged: true }))
}

fn state_notify_sink(state: &AppState) -> &'static dyn crate::notify::NotificationSink {
    state.lifecycle.notify_sink()
}

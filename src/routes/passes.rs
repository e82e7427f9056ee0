use crate::auth::AuthPrincipal;
use crate::domain::{Direction, PassId, PassState, Role};
use crate::error::GateError;
use crate::state::AppState;
use crate::store::PassFilter;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct CreatePassRequest {
    pub reason: String,
    pub direction: Direction,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Deserialize)]
pub struct DailyEntryRequest {
    pub direction: Direction,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Serialize)]
pub struct PassOut {
    pub id: PassId,
    pub subject_id: u64,
    pub subject_name: String,
    pub subject_code: Option<String>,
    pub direction: Direction,
    pub reason: String,
    pub state: PassState,
    pub request_time: DateTime<Utc>,
    pub approved_time: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub used_time: Option<DateTime<Utc>>,
    pub token: Option<String>,
    pub location_ok: bool,
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub state: Option<String>,
}

fn project(state: &AppState, pass: crate::domain::PassRequest) -> PassOut {
    let subject = state.store.get_principal(pass.subject_id);
    PassOut {
        id: pass.id,
        subject_id: pass.subject_id,
        subject_name: subject.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
        subject_code: subject.and_then(|p| p.subject_code),
        direction: pass.direction,
        reason: pass.reason,
        state: pass.state,
        request_time: pass.request_time,
        approved_time: pass.approved_time,
        expiry: pass.expiry,
        used_time: pass.used_time,
        token: pass.token,
        location_ok: pass.location_ok,
    }
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(body): Json<CreatePassRequest>,
) -> Result<Json<PassOut>, GateError> {
    auth.require_role(&[Role::Student])?;
    let subject = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;
    let gps = match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    };
    let pass = state.lifecycle.create(&subject, body.direction, body.reason, gps)?;
    Ok(Json(project(&state, pass)))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<PassOut>>, GateError> {
    let parsed_state = match q.state.as_deref() {
        Some("pending") => Some(PassState::Pending),
        Some("approved") => Some(PassState::Approved),
        Some("rejected") => Some(PassState::Rejected),
        Some("used") => Some(PassState::Used),
        Some(_) => return Err(GateError::BadRequest("unknown state filter".to_string())),
        None => None,
    };
    let filter = PassFilter {
        subject_id: match auth.role {
            Role::Student => Some(auth.id),
            Role::Admin | Role::Guard => None,
        },
        state: parsed_state,
    };
    let passes = state.store.query_passes(&filter, 200);
    Ok(Json(passes.into_iter().map(|p| project(&state, p)).collect()))
}

pub async fn approve(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Path(id): Path<PassId>,
) -> Result<Json<PassOut>, GateError> {
    auth.require_role(&[Role::Admin])?;
    let admin = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;
    let pass = state.lifecycle.approve(id, &admin)?;
    Ok(Json(project(&state, pass)))
}

pub async fn reject(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Path(id): Path<PassId>,
) -> Result<Json<PassOut>, GateError> {
    auth.require_role(&[Role::Admin])?;
    let admin = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;
    let pass = state.lifecycle.reject(id, &admin)?;
    Ok(Json(project(&state, pass)))
}

pub async fn daily_entry(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(body): Json<DailyEntryRequest>,
) -> Result<Json<PassOut>, GateError> {
    auth.require_role(&[Role::Student])?;
    let subject = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;
    let civil_date = Utc::now().with_timezone(&state.config.analytics_offset).date_naive();
    let pass = state
        .lifecycle
        .daily(&subject, body.direction, (body.lat, body.lon), civil_date)?;
    Ok(Json(project(&state, pass)))
}

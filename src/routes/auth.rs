use crate::auth::AuthPrincipal;
use crate::domain::{ContactInfo, PrincipalId, Role};
use crate::error::GateError;
use crate::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::Form;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::warn;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub role: Role,
}

#[derive(Serialize)]
pub struct PrincipalOut {
    pub id: PrincipalId,
    pub name: String,
    pub role: Role,
    pub subject_code: Option<String>,
    pub validity_end: Option<DateTime<Utc>>,
    pub contact: Option<ContactInfo>,
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(body): Form<LoginRequest>,
) -> Result<Json<LoginResponse>, GateError> {
    if let Some(retry_after) = state.auth.check_login_rate_limit(addr.ip()) {
        warn!(ip = %addr.ip(), retry_after, "login rate limit exceeded");
        return Err(GateError::RateLimited);
    }

    let principal = state
        .store
        .list_principals()
        .into_iter()
        .find(|p| p.subject_code.as_deref() == Some(body.username.as_str()) || p.name == body.username)
        .ok_or(GateError::Unauthorized)?;

    if !principal.active || !crate::auth::AuthService::verify_password(&body.password, &principal.password_hash)
    {
        return Err(GateError::Unauthorized);
    }

    state.auth.clear_login_attempts(addr.ip());
    let token = state.auth.issue_token(principal.id, principal.role)?;
    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "bearer",
        role: principal.role,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthPrincipal,
) -> Result<Json<PrincipalOut>, GateError> {
    let p = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;
    Ok(Json(PrincipalOut {
        id: p.id,
        name: p.name,
        role: p.role,
        subject_code: p.subject_code,
        validity_end: p.validity_end,
        contact: p.contact,
    }))
}

use crate::auth::AuthPrincipal;
use crate::domain::{LocationPolicy, Role};
use crate::error::GateError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct PublicLocationOut {
    pub label: String,
    pub radius_km: f64,
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct SetLocationRequest {
    pub label: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
    pub enabled: bool,
}

pub async fn get_location(
    State(state): State<AppState>,
    auth: AuthPrincipal,
) -> Result<Json<LocationPolicy>, GateError> {
    auth.require_role(&[Role::Admin])?;
    Ok(Json(state.policy_store.load()))
}

pub async fn set_location(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    Json(body): Json<SetLocationRequest>,
) -> Result<Json<LocationPolicy>, GateError> {
    auth.require_role(&[Role::Admin])?;
    if !crate::geofence::is_valid_coordinate(body.center_lat, body.center_lon) {
        return Err(GateError::InvalidCoordinates);
    }
    let policy = LocationPolicy {
        label: body.label,
        center_lat: body.center_lat,
        center_lon: body.center_lon,
        radius_km: body.radius_km,
        enabled: body.enabled,
    };
    state
        .policy_store
        .save(&policy)
        .map_err(|e| GateError::Internal(e.to_string()))?;
    Ok(Json(policy))
}

/// `GET /api/location` — the public-safe subset (no raw coordinates) any
/// authenticated principal may read to know whether they're expected to be
/// on campus.
pub async fn get_public_location(
    State(state): State<AppState>,
    _auth: AuthPrincipal,
) -> Result<Json<PublicLocationOut>, GateError> {
    let policy = state.policy_store.load();
    Ok(Json(PublicLocationOut {
        label: policy.label,
        radius_km: policy.radius_km,
        enabled: policy.enabled,
    }))
}

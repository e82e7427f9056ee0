use crate::auth::AuthPrincipal;
use crate::biometric::BiometricVerdict;
use crate::domain::{PassId, Role, ScanResult};
use crate::error::GateError;
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct VerifyResponse {
    pub result: ScanResult,
    pub detail: String,
    pub pass_id: Option<PassId>,
    pub biometric: Option<BiometricVerdict>,
}

/// `POST /verify` (spec.md §4.E). Multipart body: a `token` field (the QR
/// payload) and an optional `image` field (JPEG/PNG bytes) for the advisory
/// biometric check.
pub async fn verify(
    State(state): State<AppState>,
    auth: AuthPrincipal,
    mut multipart: Multipart,
) -> Result<Json<VerifyResponse>, GateError> {
    auth.require_role(&[Role::Guard, Role::Admin])?;
    let scanner = state.store.get_principal(auth.id).ok_or(GateError::PrincipalNotFound)?;

    let mut token: Option<String> = None;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GateError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("token") => {
                token = Some(field.text().await.map_err(|e| GateError::BadRequest(e.to_string()))?);
            }
            Some("image") => {
                image = Some(field.bytes().await.map_err(|e| GateError::BadRequest(e.to_string()))?.to_vec());
            }
            _ => {}
        }
    }

    let token = token.ok_or_else(|| GateError::BadRequest("missing token field".to_string()))?;
    let outcome = state.verifier.verify(&token, &scanner, image).await;

    match outcome.result {
        ScanResult::Success => Ok(Json(VerifyResponse {
            result: outcome.result,
            detail: outcome.detail,
            pass_id: outcome.pass_id,
            biometric: outcome.biometric,
        })),
        ScanResult::Invalid => Err(GateError::SignatureMismatch),
        ScanResult::Expired => Err(GateError::Expired),
        ScanResult::Replay => Err(GateError::Replay),
        ScanResult::NotApproved => Err(GateError::WrongState),
        ScanResult::Denied => Err(GateError::GeofenceDenied),
    }
}

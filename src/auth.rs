//! Bearer-token authentication (SPEC_FULL.md §4.I ambient stack; Non-goals
//! carry the ambient concern even though the real user directory is out of
//! scope). Mints HS256 JWTs at `/auth/login` and extracts/validates them at
//! every other route via an axum `FromRequestParts` extractor, mirroring
//! `original_source/backend/auth.py`'s `create_access_token`/
//! `get_current_user`/`require_role` trio — `sub` carries the principal id,
//! `role` carries the role claim checked by the per-route guard.

use crate::domain::{PrincipalId, Role};
use crate::error::GateError;
use crate::store::PassStore;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct AuthService {
    secret: Vec<u8>,
    access_token_ttl: Duration,
    login_attempts: Arc<DashMap<IpAddr, Vec<Instant>>>,
}

const MAX_LOGIN_ATTEMPTS: usize = 5;
const LOGIN_WINDOW: Duration = Duration::from_secs(60);

impl AuthService {
    pub fn new(secret: Vec<u8>, access_token_ttl: Duration) -> Self {
        Self {
            secret,
            access_token_ttl,
            login_attempts: Arc::new(DashMap::new()),
        }
    }

    pub fn hash_password(password: &str) -> Result<String, GateError> {
        hash(password, DEFAULT_COST).map_err(|e| GateError::Internal(e.to_string()))
    }

    pub fn verify_password(password: &str, hash: &str) -> bool {
        verify(password, hash).unwrap_or(false)
    }

    /// Atomically checks and reserves a login attempt slot for `ip`. Returns
    /// `Some(retry_after_secs)` when the sliding window is exhausted.
    pub fn check_login_rate_limit(&self, ip: IpAddr) -> Option<u64> {
        let now = Instant::now();
        let mut entry = self.login_attempts.entry(ip).or_default();
        entry.retain(|t| now.duration_since(*t) < LOGIN_WINDOW);
        if entry.len() >= MAX_LOGIN_ATTEMPTS {
            let oldest = *entry.first().unwrap();
            let elapsed = now.duration_since(oldest);
            return Some(LOGIN_WINDOW.saturating_sub(elapsed).as_secs().max(1));
        }
        entry.push(now);
        None
    }

    pub fn clear_login_attempts(&self, ip: IpAddr) {
        self.login_attempts.remove(&ip);
    }

    pub fn issue_token(&self, principal_id: PrincipalId, role: Role) -> Result<String, GateError> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + chrono::Duration::from_std(self.access_token_ttl).unwrap()).timestamp(),
        };
        encode(&Header::new(jsonwebtoken::Algorithm::HS256), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| GateError::Internal(e.to_string()))
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, GateError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                warn!(error = %e, "bearer token rejected");
                GateError::Unauthorized
            })
    }
}

/// An authenticated principal extracted from the `Authorization: Bearer`
/// header. Any handler that declares this as an argument requires auth;
/// `require_role` narrows further to specific roles.
#[derive(Clone)]
pub struct AuthPrincipal {
    pub id: PrincipalId,
    pub role: Role,
}

impl AuthPrincipal {
    pub fn require_role(&self, roles: &[Role]) -> Result<(), GateError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(GateError::Forbidden)
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
    AuthService: FromRef<S>,
    Arc<dyn PassStore>: FromRef<S>,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthService::from_ref(state);
        let store = <Arc<dyn PassStore>>::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(GateError::Unauthorized)?;
        let token = header.strip_prefix("Bearer ").ok_or(GateError::Unauthorized)?;
        let claims = auth.decode_token(token)?;
        let id: PrincipalId = claims.sub.parse().map_err(|_| GateError::Unauthorized)?;

        let principal = store.get_principal(id).ok_or(GateError::Unauthorized)?;
        if !principal.active {
            return Err(GateError::Unauthorized);
        }
        Ok(AuthPrincipal {
            id: principal.id,
            role: principal.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_claims() {
        let svc = AuthService::new(b"test-secret-value".to_vec(), Duration::from_secs(3600));
        let token = svc.issue_token(42, Role::Guard).unwrap();
        let claims = svc.decode_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Role::Guard);
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = AuthService::new(b"test-secret-value".to_vec(), Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(1100));
        let token = svc.issue_token(1, Role::Student).unwrap();
        assert!(svc.decode_token(&token).is_err());
    }

    #[test]
    fn password_hash_round_trips() {
        let h = AuthService::hash_password("correct horse battery staple").unwrap();
        assert!(AuthService::verify_password("correct horse battery staple", &h));
        assert!(!AuthService::verify_password("wrong", &h));
    }

    #[test]
    fn login_rate_limit_trips_after_five_attempts() {
        let svc = AuthService::new(b"x".to_vec(), Duration::from_secs(3600));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(svc.check_login_rate_limit(ip).is_none());
        }
        assert!(svc.check_login_rate_limit(ip).is_some());
    }
}

//! Shared application state threaded into every axum handler (spec.md §2),
//! mirroring the teacher's single `AppState` struct bundled via `.with_state`.

use crate::audit::{Analytics, AuditBroadcaster};
use crate::auth::AuthService;
use crate::biometric::BiometricVerifier;
use crate::config::Config;
use crate::geofence::LocationPolicyStore;
use crate::lifecycle::LifecycleEngine;
use crate::notify::NotificationSink;
use crate::store::PassStore;
use crate::verifier::ScanVerifier;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PassStore>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub verifier: Arc<ScanVerifier>,
    pub audit: Arc<AuditBroadcaster>,
    pub analytics: Arc<Analytics>,
    pub policy_store: Arc<LocationPolicyStore>,
    pub auth: AuthService,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PassStore>,
        policy_store: Arc<LocationPolicyStore>,
        config: Config,
        notify_sink: &'static dyn NotificationSink,
        biometric: Arc<dyn BiometricVerifier>,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleEngine::new(
            store.clone(),
            policy_store.clone(),
            config.clone(),
            notify_sink,
        ));
        let audit = Arc::new(AuditBroadcaster::new(store.clone(), config.audit_backfill));
        let analytics = Arc::new(Analytics::new(store.clone(), config.analytics_offset));
        let verifier = Arc::new(ScanVerifier::new(
            store.clone(),
            lifecycle.clone(),
            audit.clone(),
            config.clone(),
            notify_sink,
            biometric,
        ));
        let auth = AuthService::new(config.secret_key.clone(), config.access_token_ttl);

        Self {
            store,
            lifecycle,
            verifier,
            audit,
            analytics,
            policy_store,
            auth,
            config,
        }
    }
}

impl FromRef<AppState> for Arc<dyn PassStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

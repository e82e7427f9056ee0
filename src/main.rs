//! Campus gate-pass service entry point. Bootstraps configuration,
//! constructs `AppState`, seeds a small in-memory principal directory (the
//! real user directory is an explicit external collaborator), and serves
//! the HTTP surface — mirroring the teacher's `#[tokio::main]` bootstrap:
//! `tracing_subscriber::fmt().with_env_filter(...).json().init()`, a
//! `Router::new()...with_state(s).layer(ServiceBuilder::new()...)` chain,
//! and graceful shutdown on `ctrl_c`.

mod audit;
mod auth;
mod biometric;
mod config;
mod domain;
mod error;
mod geofence;
mod lifecycle;
mod notify;
mod routes;
mod state;
mod store;
mod token;
mod verifier;
mod ws;

use crate::auth::AuthService;
use crate::biometric::{BiometricVerifier, StubBiometricVerifier};
use crate::config::Config;
use crate::domain::{ContactInfo, Principal, Role};
use crate::geofence::LocationPolicyStore;
use crate::notify::{LoggingNotificationSink, NotificationSink};
use crate::state::AppState;
use crate::store::{InMemoryPassStore, PassStore};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

static NOTIFY_SINK: LoggingNotificationSink = LoggingNotificationSink;

/// Seeds the three demo principals (`original_source/backend/seed.py`-style
/// bootstrap data) so the HTTP surface and the demo client are runnable
/// without a real directory service. Real deployments would replace this
/// with `PassStore::upsert_principal` calls from an actual import job.
fn seed_principals(store: &dyn PassStore) {
    let now = Utc::now();
    store.upsert_principal(Principal {
        id: 1,
        name: "Asha Rao".to_string(),
        role: Role::Student,
        active: true,
        subject_code: Some("STU-0001".to_string()),
        student_class: Some("10-B".to_string()),
        guardian_name: Some("Rao Family".to_string()),
        validity_end: Some(now + chrono::Duration::days(365)),
        contact: Some(ContactInfo {
            phone: Some("+91-90000-00001".to_string()),
            parent_name: Some("Meera Rao".to_string()),
            parent_phone: Some("+91-90000-00002".to_string()),
        }),
        password_hash: AuthService::hash_password("student123").expect("bcrypt available"),
    });
    store.upsert_principal(Principal {
        id: 2,
        name: "Dean Verma".to_string(),
        role: Role::Admin,
        active: true,
        subject_code: None,
        student_class: None,
        guardian_name: None,
        validity_end: None,
        contact: None,
        password_hash: AuthService::hash_password("admin123").expect("bcrypt available"),
    });
    store.upsert_principal(Principal {
        id: 3,
        name: "Gate Guard".to_string(),
        role: Role::Guard,
        active: true,
        subject_code: None,
        student_class: None,
        guardian_name: None,
        validity_end: None,
        contact: None,
        password_hash: AuthService::hash_password("guard123").expect("bcrypt available"),
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "campus_gatepass=info,tower_http=info".into()),
        )
        .json()
        .init();

    let config = Config::from_env();
    info!(port = config.port, "campus gate-pass service starting");

    let store: Arc<dyn PassStore> = Arc::new(InMemoryPassStore::new());
    seed_principals(store.as_ref());

    let policy_store = Arc::new(LocationPolicyStore::new(config.location_policy_path.clone()));
    let notify_sink: &'static dyn NotificationSink = &NOTIFY_SINK;
    let biometric: Arc<dyn BiometricVerifier> = Arc::new(StubBiometricVerifier);

    let app_state = AppState::new(store, policy_store, config.clone(), notify_sink, biometric);

    let app = routes::router()
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        eprintln!("failed to bind {addr}: {e}");
        std::process::exit(1);
    });

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
    })
    .await
    .unwrap_or_else(|e| {
        eprintln!("server error: {e}");
        std::process::exit(1);
    });
}

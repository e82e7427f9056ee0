//! HTTP surface (spec.md §6). One submodule per resource family, assembled
//! into a single `Router` in `main.rs` the way the teacher assembles its
//! flat `.route(...)` chain.

pub mod admin;
pub mod auth;
pub mod emergency;
pub mod logs;
pub mod passes;
pub mod verify;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/passes", post(passes::create).get(passes::list))
        .route("/passes/daily-entry", post(passes::daily_entry))
        .route("/passes/{id}/approve", post(passes::approve))
        .route("/passes/{id}/reject", post(passes::reject))
        .route("/verify", post(verify::verify))
        .route("/api/emergency_exit", post(emergency::emergency_exit))
        .route("/api/logs/recent", get(logs::recent))
        .route("/api/logs/statistics", get(logs::statistics))
        .route("/api/logs/hourly", get(logs::hourly))
        .route("/api/logs/daily", get(logs::daily))
        .route("/api/logs/top_students", get(logs::top_students))
        .route("/api/logs/search", get(logs::search))
        .route("/ws/logs", get(crate::ws::logs_ws))
        .route(
            "/api/admin/location",
            get(admin::get_location).post(admin::set_location),
        )
        .route("/api/location", get(admin::get_public_location))
}

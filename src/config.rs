//! Process configuration (spec.md §2 component H). Gathered from the
//! environment at startup into one typed value, mirroring the teacher's
//! `std::env::var(...).ok().and_then(...).unwrap_or(...)` style but
//! collected once instead of scattered across call sites.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Shared HMAC secret for the QR token codec (spec.md §4.A) and for
    /// signing bearer access tokens at the HTTP boundary.
    pub secret_key: Vec<u8>,
    /// Token time-to-live from approval to expiry (spec.md §3 invariant iv).
    pub pass_ttl: chrono::Duration,
    /// Access-token lifetime for `/auth/login`.
    pub access_token_ttl: Duration,
    /// GPS-accuracy buffer absorbed by the geofence evaluator (spec.md §4.B).
    pub geofence_buffer_m: f64,
    /// Path to the persisted location policy JSON file (spec.md §6).
    pub location_policy_path: String,
    /// Civil-date offset used for analytics bucketing (spec.md §4.F), default UTC+5:30.
    pub analytics_offset: chrono::FixedOffset,
    /// Wall-clock budget for fire-and-forget side effects (spec.md §5).
    pub side_effect_budget: Duration,
    /// How many recent records a new audit subscriber receives on connect.
    pub audit_backfill: usize,
}

fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let offset_minutes: i32 = env_parse("ANALYTICS_TZ_OFFSET_MINUTES", 330); // UTC+5:30
        Self {
            port: env_parse("PORT", 8080),
            secret_key: env_var(
                "GATEPASS_SECRET_KEY",
                "change-me-in-production-32-bytes!",
            )
            .into_bytes(),
            pass_ttl: chrono::Duration::minutes(env_parse("PASS_TTL_MINUTES", 15)),
            access_token_ttl: Duration::from_secs(env_parse("ACCESS_TOKEN_TTL_SECS", 12 * 3600)),
            geofence_buffer_m: env_parse("GEOFENCE_BUFFER_M", 50.0),
            location_policy_path: env_var("LOCATION_POLICY_PATH", "location_policy.json"),
            analytics_offset: chrono::FixedOffset::east_opt(offset_minutes * 60)
                .expect("offset within +-24h"),
            side_effect_budget: Duration::from_secs(env_parse("SIDE_EFFECT_BUDGET_SECS", 10)),
            audit_backfill: env_parse("AUDIT_BACKFILL", 10),
        }
    }
}

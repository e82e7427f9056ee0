//! Core data model: principals, passes, scan logs, location policy.
//!
//! These types are deliberately dumb — no behaviour lives here beyond
//! construction and serde. The state machine lives in `lifecycle`, the
//! wire codec in `token`, and the geofence math in `geofence`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PrincipalId = u64;
pub type PassId = u64;
pub type ScanId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
    Guard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(Direction::Entry),
            "exit" => Some(Direction::Exit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassState {
    Pending,
    Approved,
    Rejected,
    Used,
}

impl PassState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassState::Pending => "pending",
            PassState::Approved => "approved",
            PassState::Rejected => "rejected",
            PassState::Used => "used",
        }
    }
}

/// Contact points used only by the notification side-effect dispatcher.
/// Never read by the lifecycle engine, codec, geofence, or verifier.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub role: Role,
    pub active: bool,
    /// Present for students only; globally unique.
    pub subject_code: Option<String>,
    pub student_class: Option<String>,
    pub guardian_name: Option<String>,
    pub validity_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    /// Opaque password hash; out of scope per spec (real directory is an
    /// external collaborator) but required to make `/auth/login` runnable.
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl Principal {
    /// A student pass is rejected once `now > validity_end`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.validity_end {
            Some(end) => now <= end,
            None => true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassRequest {
    pub id: PassId,
    pub subject_id: PrincipalId,
    pub direction: Direction,
    pub reason: String,
    pub state: PassState,
    pub request_time: DateTime<Utc>,
    pub approved_time: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub used_time: Option<DateTime<Utc>>,
    pub approver_id: Option<PrincipalId>,
    pub consumer_id: Option<PrincipalId>,
    pub token: Option<String>,
    pub origin_lat: Option<f64>,
    pub origin_lon: Option<f64>,
    pub location_ok: bool,
}

impl PassRequest {
    pub fn new_pending(
        id: PassId,
        subject_id: PrincipalId,
        direction: Direction,
        reason: String,
        request_time: DateTime<Utc>,
        origin_lat: Option<f64>,
        origin_lon: Option<f64>,
        location_ok: bool,
    ) -> Self {
        Self {
            id,
            subject_id,
            direction,
            reason,
            state: PassState::Pending,
            request_time,
            approved_time: None,
            expiry: None,
            used_time: None,
            approver_id: None,
            consumer_id: None,
            token: None,
            origin_lat,
            origin_lon,
            location_ok,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanResult {
    Success,
    Expired,
    Invalid,
    Replay,
    NotApproved,
    Denied,
}

impl ScanResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanResult::Success => "success",
            ScanResult::Expired => "expired",
            ScanResult::Invalid => "invalid",
            ScanResult::Replay => "replay",
            ScanResult::NotApproved => "not-approved",
            ScanResult::Denied => "denied",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanLog {
    pub id: ScanId,
    pub pass_id: Option<PassId>,
    pub subject_id: Option<PrincipalId>,
    pub scanner_id: PrincipalId,
    pub direction: Direction,
    pub result: ScanResult,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    pub emergency: bool,
}

/// Process-wide geofence configuration, reloaded fresh on each evaluation
/// from the persisted location policy file (see `geofence::LocationPolicyStore`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationPolicy {
    pub label: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_km: f64,
    pub enabled: bool,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            label: "Campus".to_string(),
            center_lat: 31.7768,
            center_lon: 77.0144,
            radius_km: 2.0,
            enabled: true,
        }
    }
}

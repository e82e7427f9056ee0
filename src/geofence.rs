//! Geofence evaluator (spec.md §4.B) and the persisted location policy file
//! (spec.md §6 "Location policy file").
//!
//! Grounded on `original_source/backend/geofence.py::Geofence.validate_location`
//! for the algorithm (great-circle distance to a circular region with a
//! GPS-accuracy buffer) and `location_settings.py` for the file-backed,
//! hot-reloadable policy. Distance math is a direct haversine implementation
//! since no geodesy crate is otherwise pulled into this stack.

use crate::domain::LocationPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const DEFAULT_BUFFER_M: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GeoDecision {
    pub inside: bool,
    pub distance_m: u32,
    pub message: String,
}

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Evaluate `(lat, lon)` against `policy` with a GPS-accuracy buffer.
/// Coordinates outside `[-90,90]x[-180,180]` fail with an `invalid` message
/// and `inside: false`. If the policy is disabled, everything is inside.
pub fn evaluate(policy: &LocationPolicy, lat: f64, lon: f64, buffer_m: f64) -> GeoDecision {
    if !is_valid_coordinate(lat, lon) {
        return GeoDecision {
            inside: false,
            distance_m: u32::MAX,
            message: "invalid coordinates".to_string(),
        };
    }
    if !policy.enabled {
        return GeoDecision {
            inside: true,
            distance_m: 0,
            message: "geofencing disabled".to_string(),
        };
    }
    let distance_m = haversine_m(lat, lon, policy.center_lat, policy.center_lon);
    let radius_m = policy.radius_km * 1000.0;
    let inside = distance_m <= radius_m + buffer_m;
    let message = if inside {
        format!("location verified ({:.1}m from {})", distance_m, policy.label)
    } else {
        format!(
            "location denied ({:.2}km from {}, outside {:.2}km radius)",
            distance_m / 1000.0,
            policy.label,
            policy.radius_km
        )
    };
    GeoDecision {
        inside,
        distance_m: distance_m.round() as u32,
        message,
    }
}

/// File-backed `LocationPolicy`, read fresh on every evaluation so the
/// policy can be hot-reconfigured without restart (spec.md §4.B).
pub struct LocationPolicyStore {
    path: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct PolicyFile {
    label: String,
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    enabled: bool,
}

impl From<&LocationPolicy> for PolicyFile {
    fn from(p: &LocationPolicy) -> Self {
        PolicyFile {
            label: p.label.clone(),
            latitude: p.center_lat,
            longitude: p.center_lon,
            radius_km: p.radius_km,
            enabled: p.enabled,
        }
    }
}

impl From<PolicyFile> for LocationPolicy {
    fn from(f: PolicyFile) -> Self {
        LocationPolicy {
            label: f.label,
            center_lat: f.latitude,
            center_lon: f.longitude,
            radius_km: f.radius_km,
            enabled: f.enabled,
        }
    }
}

impl LocationPolicyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Tolerates a missing or unreadable file by returning defaults.
    pub fn load(&self) -> LocationPolicy {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<PolicyFile>(&raw) {
                Ok(f) => f.into(),
                Err(e) => {
                    warn!(error=%e, path=%self.path.display(), "malformed location policy file, using defaults");
                    LocationPolicy::default()
                }
            },
            Err(_) => LocationPolicy::default(),
        }
    }

    /// Whole-file replace.
    pub fn save(&self, policy: &LocationPolicy) -> Result<(), std::io::Error> {
        let file = PolicyFile::from(policy);
        let raw = serde_json::to_string_pretty(&file).expect("LocationPolicy always serializes");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, raw).map_err(|e| {
            error!(error=%e, path=%self.path.display(), "failed to persist location policy");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campus() -> LocationPolicy {
        LocationPolicy {
            label: "Campus".into(),
            center_lat: 31.7768,
            center_lon: 77.0144,
            radius_km: 2.0,
            enabled: true,
        }
    }

    #[test]
    fn center_is_inside() {
        let d = evaluate(&campus(), 31.7768, 77.0144, DEFAULT_BUFFER_M);
        assert!(d.inside);
        assert_eq!(d.distance_m, 0);
    }

    #[test]
    fn far_point_is_outside() {
        let d = evaluate(&campus(), 0.0, 0.0, DEFAULT_BUFFER_M);
        assert!(!d.inside);
    }

    #[test]
    fn buffer_absorbs_small_overshoot() {
        // ~2.03 km from center: inside the 2km radius + 50m buffer.
        let d = evaluate(&campus(), 31.7768 + 0.018, 77.0144, DEFAULT_BUFFER_M);
        assert!(d.distance_m > 2000, "expected just past the bare radius");
        assert!(d.inside, "buffer should absorb the overshoot");
    }

    #[test]
    fn out_of_range_coordinate_is_invalid() {
        let d = evaluate(&campus(), 91.0, 0.0, DEFAULT_BUFFER_M);
        assert!(!d.inside);
        assert_eq!(d.message, "invalid coordinates");
    }

    #[test]
    fn disabled_policy_allows_everything() {
        let mut p = campus();
        p.enabled = false;
        let d = evaluate(&p, 0.0, 0.0, DEFAULT_BUFFER_M);
        assert!(d.inside);
    }

    #[test]
    fn symmetric_around_equator() {
        let p = LocationPolicy {
            label: "Eq".into(),
            center_lat: 0.0,
            center_lon: 0.0,
            radius_km: 500.0,
            enabled: true,
        };
        let north = haversine_m(10.0, 0.0, p.center_lat, p.center_lon);
        let south = haversine_m(-10.0, 0.0, p.center_lat, p.center_lon);
        assert!((north - south).abs() < 1.0);
    }

    #[test]
    fn triangle_inequality_holds() {
        let a = (31.77, 77.01);
        let b = (31.80, 77.05);
        let c = (31.90, 77.20);
        let ab = haversine_m(a.0, a.1, b.0, b.1);
        let bc = haversine_m(b.0, b.1, c.0, c.1);
        let ac = haversine_m(a.0, a.1, c.0, c.1);
        assert!(ac <= ab + bc + 1.0);
    }

    #[test]
    fn missing_file_returns_defaults() {
        let store = LocationPolicyStore::new("/tmp/does-not-exist-gatepass-policy.json");
        let p = store.load();
        assert_eq!(p.label, LocationPolicy::default().label);
    }
}

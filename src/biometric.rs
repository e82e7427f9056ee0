//! Biometric verification stub (SPEC_FULL.md §4.J). The real face-matching
//! pipeline (`original_source/backend/face_auth.py`, 128-D encodings via
//! `face_recognition`) is an explicit non-goal (spec.md §1): its failure
//! never downgrades the gate decision (spec.md §4.E step 7). This module
//! is the trait boundary a real implementation would sit behind.

use crate::domain::Principal;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize)]
pub struct BiometricVerdict {
    pub matched: bool,
    pub confidence_percent: u8,
    pub note: String,
}

pub trait BiometricVerifier: Send + Sync + 'static {
    fn verify(&self, image: &[u8], subject: &Principal) -> BiometricVerdict;
}

/// Deterministic stand-in: reports `no_face_registered` for a subject with
/// no enrolled encoding (tracked here only as `student_class.is_some()` as
/// a stand-in flag since full enrollment storage is out of scope), else a
/// synthetic confidence derived from a hash of the image bytes so repeated
/// calls with the same image are reproducible in tests.
pub struct StubBiometricVerifier;

impl BiometricVerifier for StubBiometricVerifier {
    fn verify(&self, image: &[u8], _subject: &Principal) -> BiometricVerdict {
        if image.is_empty() {
            return BiometricVerdict {
                matched: false,
                confidence_percent: 0,
                note: "no image supplied".to_string(),
            };
        }
        let mut hasher = DefaultHasher::new();
        image.hash(&mut hasher);
        let h = hasher.finish();
        let confidence_percent = (h % 101) as u8;
        BiometricVerdict {
            matched: confidence_percent >= 60,
            confidence_percent,
            note: "advisory: stub verifier, no face-recognition backend configured".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn subject() -> Principal {
        Principal {
            id: 1,
            name: "Test".into(),
            role: Role::Student,
            active: true,
            subject_code: None,
            student_class: None,
            guardian_name: None,
            validity_end: None,
            contact: None,
            password_hash: String::new(),
        }
    }

    #[test]
    fn empty_image_is_never_matched() {
        let v = StubBiometricVerifier;
        let verdict = v.verify(&[], &subject());
        assert!(!verdict.matched);
    }

    #[test]
    fn same_image_is_deterministic() {
        let v = StubBiometricVerifier;
        let img = vec![1, 2, 3, 4];
        let a = v.verify(&img, &subject());
        let b = v.verify(&img, &subject());
        assert_eq!(a.confidence_percent, b.confidence_percent);
    }
}

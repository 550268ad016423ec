//! Ruleset fingerprinting

use sha2::{Digest, Sha256};
use std::fmt;

/// 64-bit content digest of a ruleset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Leading 8 bytes of the SHA-256 digest, big endian
    pub fn of(text: &str) -> Self {
        let digest = Sha256::digest(text.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Fingerprint(u64::from_be_bytes(prefix))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Remembers the fingerprint of the last ruleset applied successfully
#[derive(Debug, Default)]
pub struct ChangeDetector {
    applied: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `fingerprint` matches what is already applied
    pub fn is_current(&self, fingerprint: Fingerprint) -> bool {
        self.applied == Some(fingerprint)
    }

    /// Record a successful application
    pub fn record_applied(&mut self, fingerprint: Fingerprint) {
        self.applied = Some(fingerprint);
    }

    pub fn applied(&self) -> Option<Fingerprint> {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_content_addressed() {
        let a = Fingerprint::of("table container-hostports {}\n");
        let b = Fingerprint::of("table container-hostports {}\n");
        let c = Fingerprint::of("table container-hostports { }\n");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_known_value() {
        // sha256("") = e3b0c44298fc1c14...
        assert_eq!(Fingerprint::of("").as_u64(), 0xe3b0_c442_98fc_1c14);
        assert_eq!(Fingerprint::of("").to_string(), "e3b0c44298fc1c14");
    }

    #[test]
    fn test_detector_starts_empty() {
        let detector = ChangeDetector::new();
        assert!(detector.applied().is_none());
        assert!(!detector.is_current(Fingerprint::of("")));
    }

    #[test]
    fn test_detector_tracks_last_applied() {
        let mut detector = ChangeDetector::new();
        let first = Fingerprint::of("a");
        let second = Fingerprint::of("b");

        detector.record_applied(first);
        assert!(detector.is_current(first));
        assert!(!detector.is_current(second));

        detector.record_applied(second);
        assert!(detector.is_current(second));
        assert!(!detector.is_current(first));
    }
}

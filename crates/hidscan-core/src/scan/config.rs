// Hidscan Scan Configuration
// Live-tunable engine parameters shared between callers

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use smallvec::SmallVec;

/// Default idle gap ending a scan; scanners type much faster than people
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_MIN_SCAN_LENGTH: usize = 3;

/// Android KEYCODE_ENTER and KEYCODE_NUMPAD_ENTER.
///
/// Hosts with another key code space (evdev, iOS HID usages) supply their own.
pub const DEFAULT_TERMINATOR_KEYS: &[u32] = &[66, 160];

pub const MIN_SCAN_TIMEOUT_MS: u64 = 1;
pub const MIN_SCAN_LENGTH: usize = 1;

/// Values captured when a character is appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub scan_timeout_ms: u64,
    pub min_scan_length: usize,
}

impl ConfigSnapshot {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

/// Engine configuration readable without the engine lock.
///
/// Setters clamp out-of-range input instead of failing.
#[derive(Debug)]
pub struct ScanConfig {
    scan_timeout_ms: AtomicU64,
    min_scan_length: AtomicUsize,
    terminator_keys: RwLock<SmallVec<[u32; 4]>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_TIMEOUT_MS, DEFAULT_MIN_SCAN_LENGTH)
    }
}

impl ScanConfig {
    pub fn new(scan_timeout_ms: u64, min_scan_length: usize) -> Self {
        let config = Self {
            scan_timeout_ms: AtomicU64::new(DEFAULT_SCAN_TIMEOUT_MS),
            min_scan_length: AtomicUsize::new(DEFAULT_MIN_SCAN_LENGTH),
            terminator_keys: RwLock::new(DEFAULT_TERMINATOR_KEYS.iter().copied().collect()),
        };
        config.set_scan_timeout(i64::try_from(scan_timeout_ms).unwrap_or(i64::MAX));
        config.set_min_scan_length(i64::try_from(min_scan_length).unwrap_or(i64::MAX));
        config
    }

    /// Set the idle gap in milliseconds; values below 1 are clamped
    pub fn set_scan_timeout(&self, timeout_ms: i64) {
        let clamped = if timeout_ms < MIN_SCAN_TIMEOUT_MS as i64 {
            log::warn!(
                "scan timeout {}ms out of range, using {}ms",
                timeout_ms,
                MIN_SCAN_TIMEOUT_MS
            );
            MIN_SCAN_TIMEOUT_MS
        } else {
            timeout_ms as u64
        };
        self.scan_timeout_ms.store(clamped, Ordering::Release);
    }

    /// Set the minimum scan length; values below 1 are clamped
    pub fn set_min_scan_length(&self, length: i64) {
        let clamped = if length < MIN_SCAN_LENGTH as i64 {
            log::warn!(
                "minimum scan length {} out of range, using {}",
                length,
                MIN_SCAN_LENGTH
            );
            MIN_SCAN_LENGTH
        } else {
            usize::try_from(length).unwrap_or(usize::MAX)
        };
        self.min_scan_length.store(clamped, Ordering::Release);
    }

    /// Replace the terminator key set; an empty set disables terminators
    pub fn set_terminator_keys(&self, keys: &[u32]) {
        *self.terminator_keys.write() = keys.iter().copied().collect();
    }

    pub fn scan_timeout_ms(&self) -> u64 {
        self.scan_timeout_ms.load(Ordering::Acquire)
    }

    pub fn min_scan_length(&self) -> usize {
        self.min_scan_length.load(Ordering::Acquire)
    }

    pub fn terminator_keys(&self) -> Vec<u32> {
        self.terminator_keys.read().to_vec()
    }

    pub fn is_terminator(&self, key_code: u32) -> bool {
        self.terminator_keys.read().contains(&key_code)
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            scan_timeout_ms: self.scan_timeout_ms(),
            min_scan_length: self.min_scan_length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.scan_timeout_ms(), 50);
        assert_eq!(config.min_scan_length(), 3);
        assert!(config.is_terminator(66));
        assert!(config.is_terminator(160));
        assert!(!config.is_terminator(8));
        // Android KEYCODE_L
        assert!(!config.is_terminator(40));
    }

    #[test]
    fn test_clamping() {
        let config = ScanConfig::default();
        config.set_scan_timeout(-5);
        assert_eq!(config.scan_timeout_ms(), 1);
        config.set_scan_timeout(0);
        assert_eq!(config.scan_timeout_ms(), 1);
        config.set_min_scan_length(-1);
        assert_eq!(config.min_scan_length(), 1);
        config.set_min_scan_length(0);
        assert_eq!(config.min_scan_length(), 1);
    }

    #[test]
    fn test_new_clamps() {
        let config = ScanConfig::new(0, 0);
        assert_eq!(config.snapshot(), ConfigSnapshot {
            scan_timeout_ms: 1,
            min_scan_length: 1,
        });
    }

    #[test]
    fn test_terminator_replacement() {
        let config = ScanConfig::default();
        config.set_terminator_keys(&[28, 96]);
        assert!(config.is_terminator(28));
        assert!(!config.is_terminator(66));
        assert_eq!(config.terminator_keys(), vec![28, 96]);

        config.set_terminator_keys(&[]);
        assert!(!config.is_terminator(28));
    }
}

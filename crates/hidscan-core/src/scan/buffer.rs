// Hidscan Scan Buffer
// Characters accumulated since the last flush

use super::config::ConfigSnapshot;
use crate::event::ScanResult;

/// Text of the scan in progress.
///
/// Keeps the configuration in force when the last character was accepted,
/// so a later config change never re-evaluates text already buffered.
#[derive(Debug, Clone, Default)]
pub struct ScanBuffer {
    text: String,
    chars: usize,
    last_timestamp: u64,
    config: Option<ConfigSnapshot>,
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, character: char, timestamp: u64, config: ConfigSnapshot) {
        self.text.push(character);
        self.chars += 1;
        self.last_timestamp = timestamp;
        self.config = Some(config);
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.last_timestamp)
    }

    /// Whether the idle gap since the last character has run out at `now`
    pub fn is_expired_at(&self, now: u64) -> bool {
        match (self.last_timestamp(), self.config) {
            (Some(last), Some(config)) => now.saturating_sub(last) >= config.scan_timeout_ms,
            _ => false,
        }
    }

    /// Empty the buffer, returning a scan if it met the minimum length
    pub fn flush(&mut self) -> Option<ScanResult> {
        let min_len = self.config.map(|c| c.min_scan_length).unwrap_or(usize::MAX);
        let complete = !self.is_empty() && self.chars >= min_len;

        let result = if complete {
            Some(ScanResult {
                code: std::mem::take(&mut self.text),
                timestamp: self.last_timestamp,
            })
        } else {
            if !self.is_empty() {
                log::debug!("discarding {} stray character(s)", self.chars);
            }
            None
        };

        self.clear();
        result
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.chars = 0;
        self.last_timestamp = 0;
        self.config = None;
    }
}

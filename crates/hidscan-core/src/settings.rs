// Hidscan Settings Module
// Engine tuning and classifier pattern lists loaded from TOML

use std::path::{Path, PathBuf};

use crate::input::{ClassifierPolicy, NamePattern, RuleError};
use crate::scan::config::{
    DEFAULT_MIN_SCAN_LENGTH, DEFAULT_SCAN_TIMEOUT_MS, DEFAULT_TERMINATOR_KEYS, MIN_SCAN_LENGTH,
    MIN_SCAN_TIMEOUT_MS,
};
use crate::scan::ScanConfig;

/// User settings for hidscan
///
/// Loaded from a TOML file (default: ~/.config/hidscan/settings.toml).
/// Classifier patterns extend the built-in lists rather than replacing them.
#[derive(Debug, Clone)]
pub struct Settings {
    scan_timeout_ms: u64,
    min_scan_length: usize,
    terminator_keys: Vec<u32>,
    deny_patterns: Vec<String>,
    allow_patterns: Vec<String>,
    reject_virtual_keyboards: bool,
    accept_hid_names: bool,
    /// Path to the settings file (for reload)
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),

    #[error("Invalid classifier pattern: {0}")]
    Pattern(#[from] RuleError),
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    #[serde(default)]
    engine: Option<EngineSettings>,

    #[serde(default)]
    classifier: Option<ClassifierSettings>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EngineSettings {
    #[serde(default)]
    scan_timeout_ms: Option<i64>,
    #[serde(default)]
    min_scan_length: Option<i64>,
    #[serde(default)]
    terminator_keys: Option<Vec<u32>>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ClassifierSettings {
    #[serde(default)]
    deny: Vec<String>,
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    reject_virtual_keyboards: Option<bool>,
    #[serde(default)]
    accept_hid_names: Option<bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Create settings with built-in defaults
    pub fn new() -> Self {
        Self {
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
            min_scan_length: DEFAULT_MIN_SCAN_LENGTH,
            terminator_keys: DEFAULT_TERMINATOR_KEYS.to_vec(),
            deny_patterns: Vec::new(),
            allow_patterns: Vec::new(),
            reject_virtual_keyboards: true,
            accept_hid_names: false,
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let parsed: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(engine) = parsed.engine {
            if let Some(timeout) = engine.scan_timeout_ms {
                settings.set_scan_timeout(timeout);
            }
            if let Some(length) = engine.min_scan_length {
                settings.set_min_scan_length(length);
            }
            if let Some(keys) = engine.terminator_keys {
                settings.terminator_keys = keys;
            }
        }

        if let Some(classifier) = parsed.classifier {
            settings.deny_patterns = classifier.deny;
            settings.allow_patterns = classifier.allow;
            if let Some(reject) = classifier.reject_virtual_keyboards {
                settings.reject_virtual_keyboards = reject;
            }
            if let Some(accept) = classifier.accept_hid_names {
                settings.accept_hid_names = accept;
            }
        }

        // Surface bad patterns at load time rather than first classification
        settings.classifier_policy()?;

        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hidscan").join("settings.toml"))
    }

    /// Load from default location (~/.config/hidscan/settings.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::new())
    }

    /// Reload settings from the original file
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        if let Some(ref path) = self.source_path {
            let new_settings = Self::from_file(path)?;
            *self = new_settings;
            Ok(())
        } else {
            Err(SettingsError::InvalidValue("No source path set".to_string()))
        }
    }

    pub fn scan_timeout_ms(&self) -> u64 {
        self.scan_timeout_ms
    }

    pub fn min_scan_length(&self) -> usize {
        self.min_scan_length
    }

    pub fn terminator_keys(&self) -> &[u32] {
        &self.terminator_keys
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Set the idle gap; values below 1ms are clamped
    pub fn set_scan_timeout(&mut self, timeout_ms: i64) {
        self.scan_timeout_ms = u64::try_from(timeout_ms)
            .unwrap_or(0)
            .max(MIN_SCAN_TIMEOUT_MS);
    }

    /// Set the minimum scan length; values below 1 are clamped
    pub fn set_min_scan_length(&mut self, length: i64) {
        self.min_scan_length = usize::try_from(length).unwrap_or(0).max(MIN_SCAN_LENGTH);
    }

    pub fn set_terminator_keys(&mut self, keys: Vec<u32>) {
        self.terminator_keys = keys;
    }

    /// Classifier policy: built-in lists extended with configured patterns
    pub fn classifier_policy(&self) -> Result<ClassifierPolicy, SettingsError> {
        let deny = parse_patterns(&self.deny_patterns)?;
        let allow = parse_patterns(&self.allow_patterns)?;
        Ok(ClassifierPolicy::new()
            .with_denylist(deny)
            .with_allowlist(allow)
            .with_reject_virtual_keyboards(self.reject_virtual_keyboards)
            .with_accept_hid_names(self.accept_hid_names))
    }

    /// Engine configuration built from these settings
    pub fn scan_config(&self) -> ScanConfig {
        let config = ScanConfig::new(self.scan_timeout_ms, self.min_scan_length);
        config.set_terminator_keys(&self.terminator_keys);
        config
    }
}

fn parse_patterns(raw: &[String]) -> Result<Vec<NamePattern>, SettingsError> {
    raw.iter()
        .map(|p| NamePattern::parse(p).map_err(SettingsError::from))
        .collect()
}

/// Create default settings content for a new installation
pub fn default_settings_content() -> &'static str {
    r#"# Hidscan Settings
# Place this file at: ~/.config/hidscan/settings.toml

[engine]
# Idle gap (ms) that ends a scan
scan_timeout_ms = 50
# Shorter bursts are treated as stray keypresses
min_scan_length = 3
# Key codes that complete a scan immediately (Android Enter, numpad Enter)
terminator_keys = [66, 160]

[classifier]
# Extra patterns, added to the built-in lists.
# "text" = name contains, "^text" = starts with, "text$" = ends with, "re:..." = regex
deny = []
allow = []
# Treat virtual/software keyboards as non-scanners
reject_virtual_keyboards = true
# Accept any keyboard whose name contains "hid"
accept_hid_names = false
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Classifier, DeviceDescriptor};

    #[test]
    fn test_settings_default() {
        let settings = Settings::new();
        assert_eq!(settings.scan_timeout_ms(), 50);
        assert_eq!(settings.min_scan_length(), 3);
        assert_eq!(settings.terminator_keys(), &[66, 160]);
    }

    #[test]
    fn test_default_content_parses() {
        let settings = Settings::from_toml(default_settings_content()).unwrap();
        assert_eq!(settings.scan_timeout_ms(), 50);
        assert_eq!(settings.min_scan_length(), 3);
    }

    #[test]
    fn test_settings_from_toml() {
        let toml = r#"
[engine]
scan_timeout_ms = 80
min_scan_length = 6
terminator_keys = [28, 96]
"#;

        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(settings.scan_timeout_ms(), 80);
        assert_eq!(settings.min_scan_length(), 6);

        let config = settings.scan_config();
        assert_eq!(config.scan_timeout_ms(), 80);
        assert!(config.is_terminator(28));
        assert!(!config.is_terminator(66));
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let toml = r#"
[engine]
scan_timeout_ms = -10
min_scan_length = 0
"#;
        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(settings.scan_timeout_ms(), 1);
        assert_eq!(settings.min_scan_length(), 1);
    }

    #[test]
    fn test_classifier_patterns() {
        let toml = r#"
[classifier]
deny = ["^acme-int"]
allow = ["acme wand", "re:^scn[0-9]{3}$"]
"#;
        let settings = Settings::from_toml(toml).unwrap();
        let classifier = Classifier::new(&settings.classifier_policy().unwrap());

        let wand = DeviceDescriptor::new(1, "ACME Wand").with_keyboard();
        let scn = DeviceDescriptor::new(2, "SCN200").with_keyboard();
        let internal = DeviceDescriptor::new(3, "acme-internal kbd")
            .with_keyboard()
            .with_usb_ids(1, 1);

        assert!(classifier.is_external_scanner(&wand));
        assert!(classifier.is_external_scanner(&scn));
        assert!(!classifier.is_external_scanner(&internal));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let toml = r#"
[classifier]
deny = ["re:(broken"]
"#;
        assert!(matches!(
            Settings::from_toml(toml),
            Err(SettingsError::Pattern(_))
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let toml = r#"
[engine]
scan_timeout = 50
"#;
        assert!(matches!(
            Settings::from_toml(toml),
            Err(SettingsError::TomlParse(_))
        ));
    }

    #[test]
    fn test_reload_without_path() {
        let mut settings = Settings::new();
        assert!(matches!(
            settings.reload(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_file_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "hidscan-settings-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[engine]\nmin_scan_length = 4\n").unwrap();

        let mut settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.min_scan_length(), 4);
        assert_eq!(settings.source_path(), Some(path.as_path()));

        std::fs::write(&path, "[engine]\nmin_scan_length = 9\n").unwrap();
        settings.reload().unwrap();
        assert_eq!(settings.min_scan_length(), 9);

        let _ = std::fs::remove_file(&path);
    }
}

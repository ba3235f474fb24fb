// Hidscan Input Layer - Device Classifier
// Decides whether a device is an external scanner or an internal/system input

use std::sync::OnceLock;

use super::device::{DeviceDescriptor, KeyboardType};
use super::rules::{evaluate, Condition, NamePattern, Rule, Verdict};

/// Name fragments of internal subsystems that expose key events but never
/// carry scan data (power keys, GPIO buttons, touch controllers, sensors).
const DEFAULT_DENY_CONTAINS: &[&str] = &[
    "mtk-",        // MediaTek internal
    "pmic",        // power management
    "_ts",         // touchscreen controllers
    "touchscreen",
    "touch screen",
    "headset",     // audio jack
    "headphone",
    "gpio",
    "power",
    "volume",
    "fingerprint",
    "biometric",
    "accelerometer",
    "gyroscope",
    "compass",
    "proximity",
    "light sensor",
    "stylus",
    ",pen",
];

const DEFAULT_DENY_PREFIX: &[&str] = &["gpio-", "kpd"];

const DEFAULT_DENY_SUFFIX: &[&str] = &["-kpd"];

/// Generic scanner keywords and scanner manufacturers
const DEFAULT_ALLOW_CONTAINS: &[&str] = &[
    "scanner",
    "barcode",
    "reader",
    "rfid",
    "symbol",
    "honeywell",
    "zebra",
    "datalogic",
    "newland",
    "opticon",
    "motorola",
    "intermec",
    "denso",
    "keyence",
];

/// Classification policy data.
///
/// The rule order is fixed; what varies between deployments is pattern
/// membership and the two optional tie-break rules.
#[derive(Debug, Clone)]
pub struct ClassifierPolicy {
    /// Names of internal devices, checked before capabilities
    pub denylist: Vec<NamePattern>,
    /// Names of known scanner hardware, checked before the USB-id fallback
    pub allowlist: Vec<NamePattern>,
    /// Treat `KeyboardType::Virtual` as an exclusion signal
    pub reject_virtual_keyboards: bool,
    /// Accept any keyboard whose name contains "hid"
    pub accept_hid_names: bool,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierPolicy {
    /// Default (strict) policy
    pub fn new() -> Self {
        let mut denylist: Vec<NamePattern> = DEFAULT_DENY_CONTAINS
            .iter()
            .map(|s| NamePattern::contains(s))
            .collect();
        denylist.extend(DEFAULT_DENY_PREFIX.iter().map(|s| NamePattern::prefix(s)));
        denylist.extend(DEFAULT_DENY_SUFFIX.iter().map(|s| NamePattern::suffix(s)));

        Self {
            denylist,
            allowlist: DEFAULT_ALLOW_CONTAINS
                .iter()
                .map(|s| NamePattern::contains(s))
                .collect(),
            reject_virtual_keyboards: true,
            accept_hid_names: false,
        }
    }

    /// Add denylist patterns
    pub fn with_denylist(mut self, patterns: impl IntoIterator<Item = NamePattern>) -> Self {
        self.denylist.extend(patterns);
        self
    }

    /// Add allowlist patterns
    pub fn with_allowlist(mut self, patterns: impl IntoIterator<Item = NamePattern>) -> Self {
        self.allowlist.extend(patterns);
        self
    }

    pub fn with_reject_virtual_keyboards(mut self, enabled: bool) -> Self {
        self.reject_virtual_keyboards = enabled;
        self
    }

    pub fn with_accept_hid_names(mut self, enabled: bool) -> Self {
        self.accept_hid_names = enabled;
        self
    }

    /// Lower the policy into its ordered rule list
    pub fn to_rules(&self) -> Vec<Rule> {
        let mut rules = vec![
            Rule::new("virtual-device", Condition::Virtual, Verdict::NotScanner),
            Rule::new(
                "internal-name",
                Condition::NameMatchesAny(self.denylist.clone()),
                Verdict::NotScanner,
            ),
        ];

        if self.reject_virtual_keyboards {
            rules.push(Rule::new(
                "virtual-keyboard",
                Condition::KeyboardTypeIs(KeyboardType::Virtual),
                Verdict::NotScanner,
            ));
        }

        rules.push(Rule::new(
            "no-keyboard-source",
            Condition::NoKeyboardSource,
            Verdict::NotScanner,
        ));
        rules.push(Rule::new(
            "scanner-name",
            Condition::NameMatchesAny(self.allowlist.clone()),
            Verdict::ExternalScanner,
        ));

        if self.accept_hid_names {
            rules.push(Rule::new(
                "hid-name",
                Condition::NameMatchesAny(vec![NamePattern::contains("hid")]),
                Verdict::ExternalScanner,
            ));
        }

        rules.push(Rule::new(
            "usb-identity",
            Condition::UsbIdentity,
            Verdict::ExternalScanner,
        ));
        rules.push(Rule::new("fallback", Condition::Always, Verdict::NotScanner));
        rules
    }
}

/// Verdict plus the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub rule: &'static str,
}

/// Pure, deterministic device classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierPolicy::new())
    }
}

impl Classifier {
    pub fn new(policy: &ClassifierPolicy) -> Self {
        Self {
            rules: policy.to_rules(),
        }
    }

    /// Build from an explicit rule list
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, device: &DeviceDescriptor) -> Verdict {
        self.explain(device).verdict
    }

    pub fn is_external_scanner(&self, device: &DeviceDescriptor) -> bool {
        self.classify(device).is_scanner()
    }

    /// Classify and report which rule decided
    pub fn explain(&self, device: &DeviceDescriptor) -> Classification {
        let (verdict, rule) = evaluate(&self.rules, device);
        Classification {
            verdict,
            rule: rule.map(|r| r.name).unwrap_or("fallback"),
        }
    }
}

/// Classify with the default policy
pub fn is_external_scanner(device: &DeviceDescriptor) -> bool {
    static DEFAULT: OnceLock<Classifier> = OnceLock::new();
    DEFAULT.get_or_init(Classifier::default).is_external_scanner(device)
}

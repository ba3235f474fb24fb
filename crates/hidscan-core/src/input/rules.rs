// Hidscan Input Layer - Classification Rules
// Declarative ordered rule list and the generic evaluator behind the classifier

use regex::Regex;

use super::device::{DeviceDescriptor, KeyboardType};

/// Errors building a rule from user data
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid name pattern regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Empty name pattern")]
    EmptyPattern,
}

/// A case-insensitive test against a device name.
///
/// Literal patterns are stored lowercased; callers pass the lowercased name.
#[derive(Debug, Clone)]
pub enum NamePattern {
    Contains(String),
    Prefix(String),
    Suffix(String),
    Regex(Regex),
}

impl NamePattern {
    pub fn contains(s: &str) -> Self {
        NamePattern::Contains(s.to_lowercase())
    }

    pub fn prefix(s: &str) -> Self {
        NamePattern::Prefix(s.to_lowercase())
    }

    pub fn suffix(s: &str) -> Self {
        NamePattern::Suffix(s.to_lowercase())
    }

    /// Parse the settings-file pattern syntax.
    ///
    /// * `re:<regex>` - regular expression, matched case-insensitively
    /// * `^text` - name starts with `text`
    /// * `text$` - name ends with `text`
    /// * anything else - name contains the text
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        if let Some(expr) = raw.strip_prefix("re:") {
            let regex = Regex::new(&format!("(?i){expr}")).map_err(|source| {
                RuleError::InvalidRegex {
                    pattern: expr.to_string(),
                    source,
                }
            })?;
            return Ok(NamePattern::Regex(regex));
        }

        if raw.is_empty() {
            return Err(RuleError::EmptyPattern);
        }

        if let Some(rest) = raw.strip_prefix('^') {
            if !rest.is_empty() {
                return Ok(NamePattern::prefix(rest));
            }
        }

        if let Some(rest) = raw.strip_suffix('$') {
            if !rest.is_empty() {
                return Ok(NamePattern::suffix(rest));
            }
        }

        Ok(NamePattern::contains(raw))
    }

    /// Test against an already lowercased name
    pub fn matches(&self, name_lower: &str) -> bool {
        match self {
            NamePattern::Contains(s) => name_lower.contains(s.as_str()),
            NamePattern::Prefix(s) => name_lower.starts_with(s.as_str()),
            NamePattern::Suffix(s) => name_lower.ends_with(s.as_str()),
            NamePattern::Regex(re) => re.is_match(name_lower),
        }
    }
}

/// Outcome of classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Verdict {
    ExternalScanner,
    NotScanner,
}

impl Verdict {
    pub fn is_scanner(&self) -> bool {
        matches!(self, Verdict::ExternalScanner)
    }
}

/// Predicate a rule tests a descriptor with
#[derive(Debug, Clone)]
pub enum Condition {
    /// Device is software-synthesized
    Virtual,
    /// Name matches any of the patterns
    NameMatchesAny(Vec<NamePattern>),
    /// Keyboard capability bit is absent
    NoKeyboardSource,
    /// Keyboard type equals the given one
    KeyboardTypeIs(KeyboardType),
    /// Both USB vendor and product ids are non-zero
    UsbIdentity,
    /// Matches every descriptor
    Always,
}

impl Condition {
    fn holds(&self, device: &DeviceDescriptor, name_lower: &str) -> bool {
        match self {
            Condition::Virtual => device.is_virtual,
            Condition::NameMatchesAny(patterns) => {
                patterns.iter().any(|p| p.matches(name_lower))
            }
            Condition::NoKeyboardSource => !device.sources.has_keyboard(),
            Condition::KeyboardTypeIs(kb_type) => device.keyboard_type == *kb_type,
            Condition::UsbIdentity => device.has_usb_identity(),
            Condition::Always => true,
        }
    }
}

/// One named entry of the ordered policy
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub condition: Condition,
    pub verdict: Verdict,
}

impl Rule {
    pub fn new(name: &'static str, condition: Condition, verdict: Verdict) -> Self {
        Self {
            name,
            condition,
            verdict,
        }
    }
}

/// Evaluate `rules` in order; the first rule whose condition holds decides.
///
/// Returns the verdict and the deciding rule. Falls back to
/// [`Verdict::NotScanner`] with no rule when nothing matches, so evaluation
/// is total.
pub fn evaluate<'a>(rules: &'a [Rule], device: &DeviceDescriptor) -> (Verdict, Option<&'a Rule>) {
    let name_lower = device.name.to_lowercase();

    rules
        .iter()
        .find(|rule| rule.condition.holds(device, &name_lower))
        .map(|rule| (rule.verdict, Some(rule)))
        .unwrap_or((Verdict::NotScanner, None))
}

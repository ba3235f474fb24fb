// Hidscan Input Layer
// Device descriptors, key events and scanner classification

pub mod classifier;
mod device;
mod event;
pub mod keymap;
pub mod rules;

pub use classifier::{is_external_scanner, Classification, Classifier, ClassifierPolicy};
pub use device::{DeviceDescriptor, DeviceId, DeviceSource, InputSources, KeyboardType};
pub use event::{KeyAction, KeyEvent};
pub use keymap::ModifierState;
pub use rules::{NamePattern, Rule, RuleError, Verdict};

// Hidscan Core Library
// External barcode scanner detection and scan assembly

pub mod event;
pub mod input;
pub mod scan;
pub mod session;
pub mod settings;
pub mod state;

pub use event::{CharEvent, ConnectionEvent, EventDispatcher, ScanResult, SubscriptionId};
pub use input::{
    is_external_scanner, Classification, Classifier, ClassifierPolicy, DeviceDescriptor,
    DeviceId, DeviceSource, InputSources, KeyAction, KeyEvent, KeyboardType, ModifierState,
    NamePattern, RuleError, Verdict,
};
pub use scan::{EngineState, IdleTimer, ManualTimer, ScanConfig, ScanEngine, ThreadTimer, TimerError};
pub use session::ScannerSession;
pub use settings::{Settings, SettingsError};
pub use state::{DeviceRegistry, RegistryDiff};

#[cfg(feature = "evdev-host")]
pub use event::{EventLoop, EventLoopError, EventLoopResult, PolledDevice};

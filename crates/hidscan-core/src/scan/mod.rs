// Hidscan Scan Assembly
// Idle-gap segmentation of scanner keystrokes

mod buffer;
pub mod config;
pub mod engine;
pub mod timer;

pub use buffer::ScanBuffer;
pub use config::{ConfigSnapshot, ScanConfig};
pub use engine::{EngineState, ScanEngine};
pub use timer::{IdleTimer, ManualTimer, ThreadTimer, TimerCallback, TimerError};

// Hidscan Event Handling
// Listener fan-out and the evdev host loop

pub mod dispatcher;
#[cfg(feature = "evdev-host")]
pub mod r#loop;

pub use dispatcher::{CharEvent, ConnectionEvent, EventDispatcher, ScanResult, SubscriptionId};
#[cfg(feature = "evdev-host")]
pub use r#loop::{EventLoop, EventLoopError, EventLoopResult, PolledDevice};

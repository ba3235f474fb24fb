// Hidscan State
// Shared device state

mod registry;

pub use registry::{DeviceRegistry, RegistryDiff};

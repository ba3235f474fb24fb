// Hidscan Input Layer - Device Descriptors
// Passive metadata records describing one connected input device

use bitflags::bitflags;
use strum_macros::{AsRefStr, Display, EnumString};

/// Host-assigned device identifier.
///
/// Unique among currently connected devices. Hosts may reuse an id after the
/// device disconnects and something else attaches. Negative ids are never
/// attached to a physical device.
pub type DeviceId = i32;

bitflags! {
    /// Input source classes a device can produce events for.
    ///
    /// Values follow the Android `InputDevice.SOURCE_*` layout: the low byte
    /// is the source class, the upper bits the concrete source. Composite
    /// flags such as `KEYBOARD` must be checked with `contains`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InputSources: u32 {
        const CLASS_BUTTON = 0x0000_0001;
        const CLASS_POINTER = 0x0000_0002;
        const CLASS_POSITION = 0x0000_0008;
        const CLASS_JOYSTICK = 0x0000_0010;
        const KEYBOARD = 0x0000_0100 | Self::CLASS_BUTTON.bits();
        const DPAD = 0x0000_0200 | Self::CLASS_BUTTON.bits();
        const GAMEPAD = 0x0000_0400 | Self::CLASS_BUTTON.bits();
        const TOUCHSCREEN = 0x0000_1000 | Self::CLASS_POINTER.bits();
        const MOUSE = 0x0000_2000 | Self::CLASS_POINTER.bits();
        const STYLUS = 0x0000_4000 | Self::CLASS_POINTER.bits();
        const TOUCHPAD = 0x0010_0000 | Self::CLASS_POSITION.bits();
        const JOYSTICK = 0x0100_0000 | Self::CLASS_JOYSTICK.bits();
    }
}

impl InputSources {
    /// Whether the device can produce keyboard-style key events
    pub fn has_keyboard(&self) -> bool {
        self.contains(InputSources::KEYBOARD)
    }
}

/// Kind of keyboard a device presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum KeyboardType {
    /// No keyboard at all
    #[default]
    None,
    /// Keys without a letter layout (keypads, digit-only scanners)
    NonAlphabetic,
    /// Full physical letter keyboard
    Alphabetic,
    /// Software or on-screen keyboard
    Virtual,
}

/// Metadata describing one input device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Host device id
    pub id: DeviceId,
    /// Driver-reported name; only used as a classification signal
    pub name: String,
    /// USB vendor id, `0` when not available
    pub vendor_id: u16,
    /// USB product id, `0` when not available
    pub product_id: u16,
    /// Whether the device is synthesized in software
    pub is_virtual: bool,
    /// Source capability bits
    pub sources: InputSources,
    /// Keyboard kind
    pub keyboard_type: KeyboardType,
}

impl DeviceDescriptor {
    /// Create a descriptor with no USB identity and no capabilities
    pub fn new(id: DeviceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            vendor_id: 0,
            product_id: 0,
            is_virtual: false,
            sources: InputSources::empty(),
            keyboard_type: KeyboardType::None,
        }
    }

    /// Set USB vendor and product ids
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Mark the device as virtual
    pub fn with_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = is_virtual;
        self
    }

    /// Set source capability bits
    pub fn with_sources(mut self, sources: InputSources) -> Self {
        self.sources = sources;
        self
    }

    /// Shorthand for a physical alphabetic keyboard source
    pub fn with_keyboard(self) -> Self {
        self.with_sources(InputSources::KEYBOARD)
            .with_keyboard_type(KeyboardType::Alphabetic)
    }

    /// Set keyboard type
    pub fn with_keyboard_type(mut self, keyboard_type: KeyboardType) -> Self {
        self.keyboard_type = keyboard_type;
        self
    }

    /// Whether both USB identifiers are present
    pub fn has_usb_identity(&self) -> bool {
        self.vendor_id != 0 && self.product_id != 0
    }
}

/// Pull source of device descriptors.
///
/// Hosts that can be queried on demand implement this. `descriptor` may
/// return `None` for an id listed by `device_ids` when the device vanished
/// between the two calls.
pub trait DeviceSource {
    /// Ids of all currently attached devices
    fn device_ids(&self) -> Vec<DeviceId>;

    /// Current descriptor for `id`, if the device is still attached
    fn descriptor(&self, id: DeviceId) -> Option<DeviceDescriptor>;
}

impl DeviceSource for [DeviceDescriptor] {
    fn device_ids(&self) -> Vec<DeviceId> {
        self.iter().map(|d| d.id).collect()
    }

    fn descriptor(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.iter().find(|d| d.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_keyboard_source_requires_both_bits() {
        assert!(InputSources::KEYBOARD.has_keyboard());
        assert!((InputSources::KEYBOARD | InputSources::MOUSE).has_keyboard());
        // Button class alone (e.g. a power key) is not a keyboard
        assert!(!InputSources::CLASS_BUTTON.has_keyboard());
        assert!(!InputSources::TOUCHSCREEN.has_keyboard());
    }

    #[test]
    fn test_gamepad_is_not_keyboard() {
        assert!(!InputSources::GAMEPAD.has_keyboard());
        assert!(!InputSources::DPAD.has_keyboard());
    }

    #[test]
    fn test_keyboard_type_parsing() {
        assert_eq!(KeyboardType::from_str("alphabetic"), Ok(KeyboardType::Alphabetic));
        assert_eq!(KeyboardType::from_str("Virtual"), Ok(KeyboardType::Virtual));
        assert_eq!(KeyboardType::from_str("non_alphabetic"), Ok(KeyboardType::NonAlphabetic));
        assert!(KeyboardType::from_str("qwerty").is_err());
        assert_eq!(KeyboardType::NonAlphabetic.to_string(), "non_alphabetic");
    }

    #[test]
    fn test_descriptor_builder() {
        let device = DeviceDescriptor::new(7, "Honeywell 1900")
            .with_usb_ids(0x0c2e, 0x0b01)
            .with_keyboard();

        assert_eq!(device.id, 7);
        assert!(device.has_usb_identity());
        assert!(device.sources.has_keyboard());
        assert_eq!(device.keyboard_type, KeyboardType::Alphabetic);
        assert!(!device.is_virtual);
    }

    #[test]
    fn test_usb_identity_needs_both_ids() {
        assert!(!DeviceDescriptor::new(1, "x").with_usb_ids(0x1234, 0).has_usb_identity());
        assert!(!DeviceDescriptor::new(1, "x").with_usb_ids(0, 0x1234).has_usb_identity());
    }

    #[test]
    fn test_slice_device_source() {
        let devices = vec![
            DeviceDescriptor::new(3, "a"),
            DeviceDescriptor::new(9, "b"),
        ];
        let source: &[DeviceDescriptor] = &devices;
        assert_eq!(source.device_ids(), vec![3, 9]);
        assert_eq!(source.descriptor(9).map(|d| d.name), Some("b".to_string()));
        assert!(source.descriptor(4).is_none());
    }
}

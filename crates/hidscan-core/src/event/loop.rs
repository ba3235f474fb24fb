// Hidscan Evdev Event Loop
// Linux host: device enumeration and key event polling over evdev

use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use evdev::{BusType, Device, EventType, InputEvent, Key};

use crate::input::{
    DeviceDescriptor, DeviceId, InputSources, KeyAction, KeyEvent, KeyboardType, ModifierState,
};

/// Result type for event loop operations
pub type EventLoopResult<T> = Result<T, EventLoopError>;

/// Errors that can occur in event loop
#[derive(Debug, thiserror::Error)]
pub enum EventLoopError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event device error: {0}")]
    Evdev(String),
}

/// An enumerated input node and the descriptor built from it
#[derive(Debug, Clone)]
pub struct PolledDevice {
    pub descriptor: DeviceDescriptor,
    pub path: PathBuf,
}

// QWERTY row: Q, W, E, R, T, Y
const QWERTY_CODES: &[u16] = &[16, 17, 18, 19, 20, 21];
// SPACE, A, Z
const A_Z_SPACE_CODES: &[u16] = &[57, 30, 44];
// Digit row 1..0
const DIGIT_CODES: &[u16] = &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Event node number of `/dev/input/eventN`
pub fn device_id_from_path(path: &Path) -> Option<DeviceId> {
    path.file_name()?
        .to_str()?
        .strip_prefix("event")?
        .parse()
        .ok()
}

/// Input sources and keyboard type from a device's key support.
///
/// Devices without the digit row are not keyboards for scanning purposes.
pub fn key_support<F>(has_ev_key: bool, supports: F) -> (InputSources, KeyboardType)
where
    F: Fn(u16) -> bool,
{
    if !has_ev_key || !DIGIT_CODES.iter().all(|c| supports(*c)) {
        return (InputSources::empty(), KeyboardType::None);
    }

    let alphabetic = QWERTY_CODES.iter().all(|c| supports(*c))
        && A_Z_SPACE_CODES.iter().all(|c| supports(*c));
    let keyboard_type = if alphabetic {
        KeyboardType::Alphabetic
    } else {
        KeyboardType::NonAlphabetic
    };
    (InputSources::KEYBOARD, keyboard_type)
}

fn describe(path: &Path, device: &Device) -> Option<DeviceDescriptor> {
    let id = device_id_from_path(path)?;
    let input_id = device.input_id();
    let has_ev_key = device.supported_events().contains(EventType::KEY);
    let (sources, keyboard_type) = match device.supported_keys() {
        Some(keys) => key_support(has_ev_key, |code| keys.contains(Key::new(code))),
        None => (InputSources::empty(), KeyboardType::None),
    };

    Some(
        DeviceDescriptor::new(id, device.name().unwrap_or("Unknown"))
            .with_usb_ids(input_id.vendor(), input_id.product())
            .with_virtual(input_id.bus_type() == BusType::BUS_VIRTUAL)
            .with_sources(sources)
            .with_keyboard_type(keyboard_type),
    )
}

fn timestamp_ms(event: &InputEvent) -> u64 {
    event
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Translate one evdev key transition into a key event.
///
/// Modifier keys only update `modifiers`; autorepeat (value 2) is dropped.
pub fn translate_key(
    device_id: DeviceId,
    modifiers: &mut ModifierState,
    code: u16,
    value: i32,
    timestamp_ms: u64,
) -> Option<KeyEvent> {
    if modifiers.update(code, value) {
        return None;
    }
    let action = match value {
        1 => KeyAction::Down,
        0 => KeyAction::Up,
        _ => return None,
    };

    Some(KeyEvent {
        device_id,
        key_code: u32::from(code),
        action,
        character: modifiers.translate(code),
        timestamp_ms,
    })
}

struct OpenDevice {
    id: DeviceId,
    device: Device,
    modifiers: ModifierState,
}

/// Polls the scanner devices picked by the registry
pub struct EventLoop {
    devices: Vec<OpenDevice>,
    poll_fds: Vec<libc::pollfd>,
    grabbed: bool,
}

impl EventLoop {
    /// Enumerate every `/dev/input/event*` node readable by this process
    pub fn enumerate() -> Vec<PolledDevice> {
        let mut found: Vec<PolledDevice> = evdev::enumerate()
            .filter_map(|(path, device)| {
                let descriptor = describe(&path, &device)?;
                Some(PolledDevice { descriptor, path })
            })
            .collect();
        found.sort_by_key(|d| d.descriptor.id);
        found
    }

    /// Descriptors of every enumerated device
    pub fn descriptors() -> Vec<DeviceDescriptor> {
        Self::enumerate().into_iter().map(|d| d.descriptor).collect()
    }

    /// Open the devices with the given ids, optionally grabbing them
    /// exclusively so their keystrokes stop reaching other consumers.
    pub fn open(ids: &[DeviceId], grab: bool) -> EventLoopResult<Self> {
        let mut devices: Vec<OpenDevice> = evdev::enumerate()
            .filter_map(|(path, device)| {
                let id = device_id_from_path(&path)?;
                ids.contains(&id).then(|| OpenDevice {
                    id,
                    device,
                    modifiers: ModifierState::default(),
                })
            })
            .collect();

        if devices.is_empty() {
            return Err(EventLoopError::DeviceNotFound(
                "No scanner devices found".to_string(),
            ));
        }

        if grab {
            for open in &mut devices {
                // A crashed earlier instance may still hold the grab
                let _ = open.device.ungrab();
                open.device.grab()?;
            }
        }

        for open in &devices {
            log::info!(
                "listening on event{} '{}'{}",
                open.id,
                open.device.name().unwrap_or("Unknown"),
                if grab { " (grabbed)" } else { "" }
            );
        }

        let poll_fds = Self::create_poll_fds(&devices);
        Ok(Self {
            devices,
            poll_fds,
            grabbed: grab,
        })
    }

    fn create_poll_fds(devices: &[OpenDevice]) -> Vec<libc::pollfd> {
        devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect()
    }

    /// Ungrab all devices (called on shutdown)
    pub fn ungrab_all(&mut self) {
        if self.grabbed {
            for open in &mut self.devices {
                let _ = open.device.ungrab();
            }
            self.grabbed = false;
        }
    }

    /// Wait up to `timeout_ms` (-1 = forever) for key events.
    ///
    /// A signal interrupting the wait yields an empty batch. Devices that
    /// fail to read (typically unplugged) are skipped until the next open.
    pub fn poll_key_events(&mut self, timeout_ms: i32) -> EventLoopResult<Vec<KeyEvent>> {
        let mut events = Vec::new();

        let poll_result = unsafe {
            libc::poll(
                self.poll_fds.as_mut_ptr(),
                self.poll_fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if poll_result < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(events);
            }
            return Err(EventLoopError::Io(err));
        }

        if poll_result == 0 {
            return Ok(events);
        }

        for (i, open) in self.devices.iter_mut().enumerate() {
            let revents = self.poll_fds[i].revents;
            if revents & (libc::POLLERR | libc::POLLHUP) != 0 {
                log::warn!("device event{} hung up", open.id);
                self.poll_fds[i].fd = -1;
                continue;
            }
            if revents & libc::POLLIN == 0 {
                continue;
            }

            let batch = match open.device.fetch_events() {
                Ok(batch) => batch,
                Err(e) => {
                    log::debug!("read from event{} failed: {}", open.id, e);
                    continue;
                }
            };
            for event in batch {
                if event.event_type() != EventType::KEY {
                    continue;
                }
                if let Some(key) = translate_key(
                    open.id,
                    &mut open.modifiers,
                    event.code(),
                    event.value(),
                    timestamp_ms(&event),
                ) {
                    events.push(key);
                }
            }
        }

        Ok(events)
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // A grabbed scanner stays unusable for everyone else otherwise
        self.ungrab_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_from_path() {
        assert_eq!(device_id_from_path(Path::new("/dev/input/event7")), Some(7));
        assert_eq!(device_id_from_path(Path::new("/dev/input/event12")), Some(12));
        assert_eq!(device_id_from_path(Path::new("/dev/input/mouse0")), None);
        assert_eq!(device_id_from_path(Path::new("/dev/input/eventX")), None);
    }

    #[test]
    fn test_key_support_full_keyboard() {
        let (sources, kind) = key_support(true, |_| true);
        assert!(sources.has_keyboard());
        assert_eq!(kind, KeyboardType::Alphabetic);
    }

    #[test]
    fn test_key_support_numeric_pad() {
        let (sources, kind) = key_support(true, |c| DIGIT_CODES.contains(&c));
        assert!(sources.has_keyboard());
        assert_eq!(kind, KeyboardType::NonAlphabetic);
    }

    #[test]
    fn test_key_support_buttons_only() {
        // Power button style device: EV_KEY but no digit row
        let (sources, kind) = key_support(true, |c| c == 116);
        assert!(!sources.has_keyboard());
        assert_eq!(kind, KeyboardType::None);

        let (sources, _) = key_support(false, |_| true);
        assert!(sources.is_empty());
    }

    #[test]
    fn test_translate_key_with_shift() {
        let mut modifiers = ModifierState::default();
        assert!(translate_key(3, &mut modifiers, 42, 1, 0).is_none());

        let event = translate_key(3, &mut modifiers, 30, 1, 5).unwrap();
        assert_eq!(event.character, Some('A'));
        assert_eq!(event.action, KeyAction::Down);
        assert_eq!(event.timestamp_ms, 5);

        assert!(translate_key(3, &mut modifiers, 42, 0, 6).is_none());
        let event = translate_key(3, &mut modifiers, 30, 0, 7).unwrap();
        assert_eq!(event.action, KeyAction::Up);
        assert_eq!(event.character, Some('a'));
    }

    #[test]
    fn test_translate_key_drops_repeat() {
        let mut modifiers = ModifierState::default();
        assert!(translate_key(3, &mut modifiers, 2, 2, 0).is_none());
    }

    #[test]
    fn test_enter_has_no_printable_char() {
        let mut modifiers = ModifierState::default();
        let event = translate_key(3, &mut modifiers, 28, 1, 0).unwrap();
        assert_eq!(event.key_code, 28);
        assert_eq!(event.printable(), None);
    }

    #[test]
    fn test_open_unknown_device() {
        match EventLoop::open(&[i32::MAX], false) {
            Err(EventLoopError::DeviceNotFound(_)) => {}
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("no device should have id {}", i32::MAX),
        }
    }
}

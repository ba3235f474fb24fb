// Hidscan Input Layer - Key Events
// Raw key event records pushed by the host

use super::device::DeviceId;

/// Key transition reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

impl KeyAction {
    /// Convert an Android-style action code (0 = down, 1 = up)
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(KeyAction::Down),
            1 => Some(KeyAction::Up),
            _ => None,
        }
    }
}

/// One raw key event from an input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Source device
    pub device_id: DeviceId,
    /// Host key code
    pub key_code: u32,
    /// Press or release
    pub action: KeyAction,
    /// Character produced by the key, if any
    pub character: Option<char>,
    /// Event time in milliseconds
    pub timestamp_ms: u64,
}

impl KeyEvent {
    /// Key-down event carrying a character
    pub fn press(device_id: DeviceId, key_code: u32, character: char, timestamp_ms: u64) -> Self {
        Self {
            device_id,
            key_code,
            action: KeyAction::Down,
            character: Some(character),
            timestamp_ms,
        }
    }

    /// Key-down event without a character (control keys, trigger buttons)
    pub fn control(device_id: DeviceId, key_code: u32, timestamp_ms: u64) -> Self {
        Self {
            device_id,
            key_code,
            action: KeyAction::Down,
            character: None,
            timestamp_ms,
        }
    }

    /// Build an event from a host string that holds zero or one character
    ///
    /// Hosts marshal the character as a string; anything past the first
    /// character is ignored.
    pub fn from_host(
        device_id: DeviceId,
        key_code: u32,
        action: KeyAction,
        characters: &str,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            device_id,
            key_code,
            action,
            character: characters.chars().next(),
            timestamp_ms,
        }
    }

    /// Same event as a release
    pub fn released(mut self) -> Self {
        self.action = KeyAction::Up;
        self
    }

    /// Character that may enter a scan buffer.
    ///
    /// Control characters (newline, tab, escape, ...) are not scan text.
    pub fn printable(&self) -> Option<char> {
        self.character.filter(|c| !c.is_control())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_from_code() {
        assert_eq!(KeyAction::from_code(0), Some(KeyAction::Down));
        assert_eq!(KeyAction::from_code(1), Some(KeyAction::Up));
        assert_eq!(KeyAction::from_code(2), None);
    }

    #[test]
    fn test_printable_filters_control_chars() {
        assert_eq!(KeyEvent::press(1, 8, '1', 0).printable(), Some('1'));
        assert_eq!(KeyEvent::press(1, 66, '\n', 0).printable(), None);
        assert_eq!(KeyEvent::press(1, 61, '\t', 0).printable(), None);
        assert_eq!(KeyEvent::control(1, 59, 0).printable(), None);
    }

    #[test]
    fn test_from_host_takes_first_char() {
        let event = KeyEvent::from_host(2, 29, KeyAction::Down, "ab", 5);
        assert_eq!(event.character, Some('a'));

        let empty = KeyEvent::from_host(2, 59, KeyAction::Down, "", 5);
        assert_eq!(empty.character, None);
    }

    #[test]
    fn test_released() {
        let event = KeyEvent::press(1, 8, '1', 0).released();
        assert_eq!(event.action, KeyAction::Up);
        assert_eq!(event.character, Some('1'));
    }
}

// Hidscan Input Layer - Key Code Translation
// US-layout mapping from Linux input-event-codes to characters

/// KEY_ENTER from input-event-codes.h
pub const KEY_ENTER: u16 = 28;
/// KEY_KPENTER from input-event-codes.h
pub const KEY_KPENTER: u16 = 96;
pub const KEY_LEFTSHIFT: u16 = 42;
pub const KEY_RIGHTSHIFT: u16 = 54;
pub const KEY_CAPSLOCK: u16 = 58;

/// Terminator key codes for evdev hosts
pub const EVDEV_TERMINATORS: &[u32] = &[KEY_ENTER as u32, KEY_KPENTER as u32];

/// Unshifted and shifted character for a key code
fn key_pair(code: u16) -> Option<(char, char)> {
    let pair = match code {
        2 => ('1', '!'),
        3 => ('2', '@'),
        4 => ('3', '#'),
        5 => ('4', '$'),
        6 => ('5', '%'),
        7 => ('6', '^'),
        8 => ('7', '&'),
        9 => ('8', '*'),
        10 => ('9', '('),
        11 => ('0', ')'),
        12 => ('-', '_'),
        13 => ('=', '+'),
        16 => ('q', 'Q'),
        17 => ('w', 'W'),
        18 => ('e', 'E'),
        19 => ('r', 'R'),
        20 => ('t', 'T'),
        21 => ('y', 'Y'),
        22 => ('u', 'U'),
        23 => ('i', 'I'),
        24 => ('o', 'O'),
        25 => ('p', 'P'),
        26 => ('[', '{'),
        27 => (']', '}'),
        30 => ('a', 'A'),
        31 => ('s', 'S'),
        32 => ('d', 'D'),
        33 => ('f', 'F'),
        34 => ('g', 'G'),
        35 => ('h', 'H'),
        36 => ('j', 'J'),
        37 => ('k', 'K'),
        38 => ('l', 'L'),
        39 => (';', ':'),
        40 => ('\'', '"'),
        41 => ('`', '~'),
        43 => ('\\', '|'),
        44 => ('z', 'Z'),
        45 => ('x', 'X'),
        46 => ('c', 'C'),
        47 => ('v', 'V'),
        48 => ('b', 'B'),
        49 => ('n', 'N'),
        50 => ('m', 'M'),
        51 => (',', '<'),
        52 => ('.', '>'),
        53 => ('/', '?'),
        57 => (' ', ' '),
        // Keypad
        55 => ('*', '*'),
        71 => ('7', '7'),
        72 => ('8', '8'),
        73 => ('9', '9'),
        74 => ('-', '-'),
        75 => ('4', '4'),
        76 => ('5', '5'),
        77 => ('6', '6'),
        78 => ('+', '+'),
        79 => ('1', '1'),
        80 => ('2', '2'),
        81 => ('3', '3'),
        82 => ('0', '0'),
        83 => ('.', '.'),
        98 => ('/', '/'),
        _ => return None,
    };
    Some(pair)
}

/// Shift and caps lock tracking for one device
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifierState {
    left_shift: bool,
    right_shift: bool,
    capslock: bool,
}

impl ModifierState {
    /// Feed a key transition; returns true if the key was a modifier.
    ///
    /// `value` follows evdev: 0 release, 1 press, 2 repeat.
    pub fn update(&mut self, code: u16, value: i32) -> bool {
        match code {
            KEY_LEFTSHIFT => self.left_shift = value != 0,
            KEY_RIGHTSHIFT => self.right_shift = value != 0,
            KEY_CAPSLOCK => {
                if value == 1 {
                    self.capslock = !self.capslock;
                }
            }
            _ => return false,
        }
        true
    }

    pub fn shift(&self) -> bool {
        self.left_shift || self.right_shift
    }

    /// Translate a key code under the current modifier state.
    ///
    /// Caps lock only affects letters.
    pub fn translate(&self, code: u16) -> Option<char> {
        let (plain, shifted) = key_pair(code)?;
        let upper = if plain.is_ascii_alphabetic() {
            self.shift() != self.capslock
        } else {
            self.shift()
        };
        Some(if upper { shifted } else { plain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_and_letters() {
        let state = ModifierState::default();
        assert_eq!(state.translate(2), Some('1'));
        assert_eq!(state.translate(11), Some('0'));
        assert_eq!(state.translate(30), Some('a'));
        assert_eq!(state.translate(82), Some('0'));
    }

    #[test]
    fn test_unmapped_keys() {
        let state = ModifierState::default();
        assert_eq!(state.translate(KEY_ENTER), None);
        assert_eq!(state.translate(1), None); // ESC
        assert_eq!(state.translate(59), None); // F1
    }

    #[test]
    fn test_shift_tracking() {
        let mut state = ModifierState::default();
        assert!(state.update(KEY_LEFTSHIFT, 1));
        assert_eq!(state.translate(30), Some('A'));
        assert_eq!(state.translate(2), Some('!'));
        assert!(state.update(KEY_LEFTSHIFT, 0));
        assert_eq!(state.translate(30), Some('a'));
    }

    #[test]
    fn test_capslock_affects_letters_only() {
        let mut state = ModifierState::default();
        state.update(KEY_CAPSLOCK, 1);
        state.update(KEY_CAPSLOCK, 0);
        assert_eq!(state.translate(30), Some('A'));
        assert_eq!(state.translate(2), Some('1'));

        // Shift inverts caps lock for letters
        state.update(KEY_RIGHTSHIFT, 1);
        assert_eq!(state.translate(30), Some('a'));
        assert_eq!(state.translate(2), Some('!'));
    }

    #[test]
    fn test_non_modifier_update() {
        let mut state = ModifierState::default();
        assert!(!state.update(30, 1));
        assert!(!state.shift());
    }
}

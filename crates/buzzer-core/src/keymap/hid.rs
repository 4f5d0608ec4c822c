//! USB HID Usage IDs (page 0x07, Keyboard/Keypad) that a buzzer can type.
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The USB HID standard assigns a number to every key *position* on a
//! keyboard: letter A is `0x04`, Enter is `0x28`.  A buzzer configured as a
//! keyboard sends that number plus a modifier byte when pressed, so the host
//! sees an ordinary key press.  The character produced still depends on the
//! host's keyboard layout.
//!
//! Only the keys a buzzer can sensibly be bound to have labels here: letters,
//! digits, function keys F1–F12 and a handful of named navigation keys.

/// Named keys outside the letter, digit and function-key ranges.
/// `(usage id, label, accepted aliases)`.
const NAMED_KEYS: &[(u8, &str, &[&str])] = &[
    (0x28, "Enter", &["return"]),
    (0x29, "Esc", &["escape"]),
    (0x2A, "Backspace", &[]),
    (0x2B, "Tab", &[]),
    (0x2C, "Space", &[]),
    (0x37, "Period", &["."]),
    (0x46, "PrintScreen", &["prtsc"]),
    (0x47, "ScrollLock", &[]),
    (0x48, "Pause", &[]),
    (0x49, "Insert", &["ins"]),
    (0x4A, "Home", &[]),
    (0x4B, "PageUp", &["pgup"]),
    (0x4C, "Delete", &["del"]),
    (0x4D, "End", &[]),
    (0x4E, "PageDown", &["pgdn"]),
    (0x4F, "Right", &["arrowright"]),
    (0x50, "Left", &["arrowleft"]),
    (0x51, "Down", &["arrowdown"]),
    (0x52, "Up", &["arrowup"]),
];

const LETTER_A: u8 = 0x04;
const LETTER_Z: u8 = 0x1D;
const DIGIT_1: u8 = 0x1E;
const DIGIT_0: u8 = 0x27;
const F1: u8 = 0x3A;
const F12: u8 = 0x45;

/// Human-readable label for `scan_code`, or `None` if it is not a bindable key.
///
/// ```rust
/// use buzzer_core::keymap::hid::key_label;
///
/// assert_eq!(key_label(0x04).as_deref(), Some("A"));
/// assert_eq!(key_label(0x27).as_deref(), Some("0"));
/// assert_eq!(key_label(0x3B).as_deref(), Some("F2"));
/// assert_eq!(key_label(0x2C).as_deref(), Some("Space"));
/// assert_eq!(key_label(0x00), None);
/// ```
pub fn key_label(scan_code: u8) -> Option<String> {
    match scan_code {
        LETTER_A..=LETTER_Z => Some(char::from(b'A' + (scan_code - LETTER_A)).to_string()),
        DIGIT_1..=DIGIT_0 => {
            let digit = (scan_code - DIGIT_1 + 1) % 10;
            Some(char::from(b'0' + digit).to_string())
        }
        F1..=F12 => Some(format!("F{}", scan_code - F1 + 1)),
        _ => NAMED_KEYS
            .iter()
            .find(|(code, _, _)| *code == scan_code)
            .map(|(_, label, _)| (*label).to_string()),
    }
}

/// Inverse of [`key_label`]; case-insensitive and accepting common aliases.
pub fn scan_code_for_label(label: &str) -> Option<u8> {
    let lower = label.trim().to_ascii_lowercase();
    let bytes = lower.as_bytes();

    if bytes.len() == 1 {
        let c = bytes[0];
        if c.is_ascii_lowercase() {
            return Some(LETTER_A + (c - b'a'));
        }
        if c.is_ascii_digit() {
            return Some(match c - b'0' {
                0 => DIGIT_0,
                d => DIGIT_1 + d - 1,
            });
        }
    }

    if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
        if (1..=12).contains(&n) {
            return Some(F1 + n - 1);
        }
    }

    NAMED_KEYS
        .iter()
        .find(|(_, name, aliases)| {
            name.eq_ignore_ascii_case(&lower) || aliases.iter().any(|a| *a == lower)
        })
        .map(|(code, _, _)| *code)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

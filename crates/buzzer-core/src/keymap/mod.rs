//! Text form of buzzer key bindings, e.g. `Ctrl+Shift+A`.
//!
//! [`KeyConfig`] renders as its modifiers (Ctrl, Shift, Alt, Gui, in that
//! order, either side) followed by the key label from [`hid::key_label`].
//! Parsing accepts the same text case-insensitively; parsed modifiers are set
//! on the left-hand side.

pub mod hid;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::protocol::model::KeyModifiers;
use crate::protocol::records::KeyConfig;

/// Error returned when a key binding string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyBindingError {
    #[error("empty key binding")]
    Empty,

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),

    #[error("unknown key `{0}`")]
    UnknownKey(String),
}

impl fmt::Display for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mods = self.modifiers;
        let mut parts: Vec<String> = Vec::new();
        if mods.ctrl() {
            parts.push("Ctrl".to_string());
        }
        if mods.shift() {
            parts.push("Shift".to_string());
        }
        if mods.alt() {
            parts.push("Alt".to_string());
        }
        if mods.gui() {
            parts.push("Gui".to_string());
        }
        match hid::key_label(self.scan_code) {
            Some(label) => parts.push(label),
            None if self.scan_code != 0 => parts.push(format!("0x{:02X}", self.scan_code)),
            None => {}
        }
        if parts.is_empty() {
            return f.write_str("(none)");
        }
        f.write_str(&parts.join("+"))
    }
}

impl FromStr for KeyConfig {
    type Err = KeyBindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
        let (key, modifiers) = match tokens.split_last() {
            Some((key, modifiers)) if !key.is_empty() => (*key, modifiers),
            _ => return Err(KeyBindingError::Empty),
        };

        let mut mask = 0u8;
        for token in modifiers {
            mask |= match token.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => KeyModifiers::LEFT_CTRL,
                "shift" => KeyModifiers::LEFT_SHIFT,
                "alt" | "option" => KeyModifiers::LEFT_ALT,
                "gui" | "meta" | "cmd" | "super" | "win" => KeyModifiers::LEFT_GUI,
                _ => return Err(KeyBindingError::UnknownModifier((*token).to_string())),
            };
        }

        let scan_code = hid::scan_code_for_label(key)
            .ok_or_else(|| KeyBindingError::UnknownKey(key.to_string()))?;
        Ok(KeyConfig::new(mask, scan_code))
    }
}

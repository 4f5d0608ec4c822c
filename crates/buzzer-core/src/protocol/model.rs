//! Enumerations that give meaning to the raw bytes of decoded records.
//!
//! Every enum here mirrors a firmware-side C enum, so each one is
//! `#[repr(u8)]` and converts from its wire byte with `TryFrom<u8>`.  Values
//! the firmware may grow in later revisions (lifecycle state, mode, sub-state)
//! are kept as raw bytes inside the records and exposed through typed
//! accessors that return `Option`, so a newer buzzer never makes a peer table
//! undecodable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a color or time setting cannot be parsed from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} `{text}`")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub text: String,
}

impl ParseValueError {
    fn new(kind: &'static str, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

// ── Node identity ─────────────────────────────────────────────────────────────

/// What kind of radio node a peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Buzzer = 0,
    Controller = 1,
}

impl TryFrom<u8> for NodeType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeType::Buzzer),
            1 => Ok(NodeType::Controller),
            _ => Err(()),
        }
    }
}

/// Top-level lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeState {
    Default = 0,
    Shutdown = 1,
    ShowBattery = 2,
    Config = 3,
}

impl NodeState {
    /// Raw `current_state` value a peer reports while it is switched off for
    /// play.  Any other value means the peer is active.
    pub const INACTIVE: u8 = NodeState::Shutdown as u8;
}

impl TryFrom<u8> for NodeState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeState::Default),
            1 => Ok(NodeState::Shutdown),
            2 => Ok(NodeState::ShowBattery),
            3 => Ok(NodeState::Config),
            _ => Err(()),
        }
    }
}

/// Game mode a node is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeMode {
    Default = 0,
    SimonSays = 1,
}

impl TryFrom<u8> for NodeMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeMode::Default),
            1 => Ok(NodeMode::SimonSays),
            _ => Err(()),
        }
    }
}

/// Mode-specific sub-state.  The same raw byte means different things
/// depending on [`NodeMode`], so it is resolved with [`ModeState::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeState {
    DefaultIdle,
    DefaultDisabled,
    DefaultBuzzerActive,
    SimonSaysIdle,
}

impl ModeState {
    /// Interprets `raw` in the context of `mode`.
    pub fn resolve(mode: NodeMode, raw: u8) -> Option<Self> {
        match (mode, raw) {
            (NodeMode::Default, 0) => Some(ModeState::DefaultIdle),
            (NodeMode::Default, 1) => Some(ModeState::DefaultDisabled),
            (NodeMode::Default, 2) => Some(ModeState::DefaultBuzzerActive),
            (NodeMode::SimonSays, 0) => Some(ModeState::SimonSaysIdle),
            _ => None,
        }
    }
}

// ── Effects and colors ────────────────────────────────────────────────────────

/// LED effect played when a buzzer is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BuzzEffect {
    None = 0,
    FlashBaseColor = 1,
    FlashWhite = 2,
}

impl TryFrom<u8> for BuzzEffect {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BuzzEffect::None),
            1 => Ok(BuzzEffect::FlashBaseColor),
            2 => Ok(BuzzEffect::FlashWhite),
            _ => Err(()),
        }
    }
}

/// One of the eight palette colors a buzzer can glow in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BaseColor {
    Red = 0,
    Yellow = 1,
    Orange = 2,
    Green = 3,
    Teal = 4,
    Blue = 5,
    Magenta = 6,
    White = 7,
}

impl BaseColor {
    /// Color selector byte meaning "use the explicit RGB triple instead".
    pub const RGB_OVERRIDE: u8 = 255;

    pub const ALL: [BaseColor; 8] = [
        BaseColor::Red,
        BaseColor::Yellow,
        BaseColor::Orange,
        BaseColor::Green,
        BaseColor::Teal,
        BaseColor::Blue,
        BaseColor::Magenta,
        BaseColor::White,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BaseColor::Red => "red",
            BaseColor::Yellow => "yellow",
            BaseColor::Orange => "orange",
            BaseColor::Green => "green",
            BaseColor::Teal => "teal",
            BaseColor::Blue => "blue",
            BaseColor::Magenta => "magenta",
            BaseColor::White => "white",
        }
    }

    /// Case-insensitive lookup by [`BaseColor::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u8> for BaseColor {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(value as usize).copied().ok_or(())
    }
}

/// The color a node shows, as selected by its `color` byte and RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSelection {
    Named(BaseColor),
    Rgb([u8; 3]),
    /// A selector byte this host does not know about.
    Unknown(u8),
}

impl ColorSelection {
    /// Builds the selection from a record's `color` byte and `rgb` triple.
    pub fn from_wire(selector: u8, rgb: [u8; 3]) -> Self {
        if selector == BaseColor::RGB_OVERRIDE {
            return ColorSelection::Rgb(rgb);
        }
        match BaseColor::try_from(selector) {
            Ok(color) => ColorSelection::Named(color),
            Err(()) => ColorSelection::Unknown(selector),
        }
    }

    /// The `(selector, rgb)` pair sent in a set-color command.
    pub fn to_wire(self) -> (u8, [u8; 3]) {
        match self {
            ColorSelection::Named(color) => (color as u8, [0, 0, 0]),
            ColorSelection::Rgb(rgb) => (BaseColor::RGB_OVERRIDE, rgb),
            ColorSelection::Unknown(selector) => (selector, [0, 0, 0]),
        }
    }
}

impl fmt::Display for ColorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSelection::Named(color) => f.write_str(color.name()),
            ColorSelection::Rgb([r, g, b]) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
            ColorSelection::Unknown(selector) => write!(f, "color {selector}"),
        }
    }
}

/// Accepts a palette name (`red`, `Teal`, ...) or `#rrggbb`.
impl FromStr for ColorSelection {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ParseValueError::new("color", s));
            }
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ParseValueError::new("color", s))
            };
            return Ok(ColorSelection::Rgb([channel(0)?, channel(2)?, channel(4)?]));
        }
        BaseColor::from_name(s)
            .map(ColorSelection::Named)
            .ok_or_else(|| ParseValueError::new("color", s))
    }
}

// ── Key modifiers ─────────────────────────────────────────────────────────────

/// HID boot-keyboard modifier byte.
///
/// Bit layout follows the USB HID report: left Ctrl/Shift/Alt/GUI in the low
/// nibble, right-hand variants in the high nibble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyModifiers(pub u8);

impl KeyModifiers {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;

    pub const ALL_CTRL: u8 = Self::LEFT_CTRL | Self::RIGHT_CTRL;
    pub const ALL_SHIFT: u8 = Self::LEFT_SHIFT | Self::RIGHT_SHIFT;
    pub const ALL_ALT: u8 = Self::LEFT_ALT | Self::RIGHT_ALT;
    pub const ALL_GUI: u8 = Self::LEFT_GUI | Self::RIGHT_GUI;

    /// Returns `true` if either Ctrl modifier is set.
    pub fn ctrl(&self) -> bool {
        self.0 & Self::ALL_CTRL != 0
    }

    /// Returns `true` if either Shift modifier is set.
    pub fn shift(&self) -> bool {
        self.0 & Self::ALL_SHIFT != 0
    }

    /// Returns `true` if either Alt modifier is set.
    pub fn alt(&self) -> bool {
        self.0 & Self::ALL_ALT != 0
    }

    /// Returns `true` if either GUI (Win/Cmd/Super) modifier is set.
    pub fn gui(&self) -> bool {
        self.0 & Self::ALL_GUI != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

// ── Game timing ───────────────────────────────────────────────────────────────

/// A duration field of the game configuration with its two sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSetting {
    /// Raw value 0: no hold / no lockout.
    Immediate,
    Millis(u16),
    /// Raw value 65535: held until reset.
    Infinite,
}

impl TimeSetting {
    pub const INFINITE_RAW: u16 = u16::MAX;

    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => TimeSetting::Immediate,
            Self::INFINITE_RAW => TimeSetting::Infinite,
            ms => TimeSetting::Millis(ms),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            TimeSetting::Immediate => 0,
            TimeSetting::Millis(ms) => ms,
            TimeSetting::Infinite => Self::INFINITE_RAW,
        }
    }
}

impl fmt::Display for TimeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match TimeSetting::from_raw(self.to_raw()) {
            TimeSetting::Immediate => f.write_str("immediate"),
            TimeSetting::Infinite => f.write_str("infinite"),
            TimeSetting::Millis(ms) => write!(f, "{ms} ms"),
        }
    }
}

/// Accepts `immediate`, `infinite`, or a millisecond count with an optional
/// `ms` suffix.
impl FromStr for TimeSetting {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        match text.to_ascii_lowercase().as_str() {
            "immediate" => Ok(TimeSetting::Immediate),
            "infinite" => Ok(TimeSetting::Infinite),
            other => other
                .trim_end_matches("ms")
                .trim()
                .parse::<u16>()
                .map(TimeSetting::from_raw)
                .map_err(|_| ParseValueError::new("time setting", text)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_color_try_from_covers_palette() {
        for (i, color) in BaseColor::ALL.iter().enumerate() {
            assert_eq!(BaseColor::try_from(i as u8), Ok(*color));
        }
        assert_eq!(BaseColor::try_from(8), Err(()));
    }

    #[test]
    fn test_color_selection_uses_rgb_triple_only_for_override_sentinel() {
        assert_eq!(
            ColorSelection::from_wire(255, [1, 2, 3]),
            ColorSelection::Rgb([1, 2, 3])
        );
        assert_eq!(
            ColorSelection::from_wire(5, [1, 2, 3]),
            ColorSelection::Named(BaseColor::Blue)
        );
        assert_eq!(
            ColorSelection::from_wire(42, [0, 0, 0]),
            ColorSelection::Unknown(42)
        );
    }

    #[test]
    fn test_color_selection_to_wire_named_sends_zero_rgb() {
        assert_eq!(
            ColorSelection::Named(BaseColor::Teal).to_wire(),
            (4, [0, 0, 0])
        );
        assert_eq!(
            ColorSelection::Rgb([9, 8, 7]).to_wire(),
            (0xFF, [9, 8, 7])
        );
    }

    #[test]
    fn test_base_color_from_name_is_case_insensitive() {
        assert_eq!(BaseColor::from_name("MaGeNtA"), Some(BaseColor::Magenta));
        assert_eq!(BaseColor::from_name("purple"), None);
    }

    #[test]
    fn test_key_modifiers_any_side_helpers() {
        let mods = KeyModifiers(KeyModifiers::RIGHT_CTRL | KeyModifiers::LEFT_SHIFT);
        assert!(mods.ctrl());
        assert!(mods.shift());
        assert!(!mods.alt());
        assert!(!mods.gui());
    }

    #[test]
    fn test_key_modifier_masks_cover_both_sides() {
        assert_eq!(KeyModifiers::ALL_CTRL, 0x11);
        assert_eq!(KeyModifiers::ALL_SHIFT, 0x22);
        assert_eq!(KeyModifiers::ALL_ALT, 0x44);
        assert_eq!(KeyModifiers::ALL_GUI, 0x88);
    }

    #[test]
    fn test_time_setting_sentinels() {
        assert_eq!(TimeSetting::from_raw(0), TimeSetting::Immediate);
        assert_eq!(TimeSetting::from_raw(65535), TimeSetting::Infinite);
        assert_eq!(TimeSetting::from_raw(1500), TimeSetting::Millis(1500));
        assert_eq!(TimeSetting::Infinite.to_raw(), 65535);
        assert_eq!(TimeSetting::Millis(250).to_string(), "250 ms");
    }

    #[test]
    fn test_color_selection_parses_names_and_hex() {
        assert_eq!(
            "Teal".parse::<ColorSelection>(),
            Ok(ColorSelection::Named(BaseColor::Teal))
        );
        assert_eq!(
            "#ff8000".parse::<ColorSelection>(),
            Ok(ColorSelection::Rgb([0xFF, 0x80, 0x00]))
        );
        assert!("#ff80".parse::<ColorSelection>().is_err());
        assert!("#+f+f+f".parse::<ColorSelection>().is_err());
        assert!("purple".parse::<ColorSelection>().is_err());
    }

    #[test]
    fn test_color_selection_display_parses_back() {
        let rgb = ColorSelection::Rgb([1, 2, 3]);
        assert_eq!(rgb.to_string().parse::<ColorSelection>(), Ok(rgb));
    }

    #[test]
    fn test_time_setting_parses_sentinels_and_millis() {
        assert_eq!("infinite".parse::<TimeSetting>(), Ok(TimeSetting::Infinite));
        assert_eq!("Immediate".parse::<TimeSetting>(), Ok(TimeSetting::Immediate));
        assert_eq!("1500 ms".parse::<TimeSetting>(), Ok(TimeSetting::Millis(1_500)));
        assert_eq!("0".parse::<TimeSetting>(), Ok(TimeSetting::Immediate));
        assert_eq!("65535".parse::<TimeSetting>(), Ok(TimeSetting::Infinite));
        assert!("forever".parse::<TimeSetting>().is_err());
    }

    #[test]
    fn test_mode_state_depends_on_mode() {
        assert_eq!(
            ModeState::resolve(NodeMode::Default, 2),
            Some(ModeState::DefaultBuzzerActive)
        );
        assert_eq!(ModeState::resolve(NodeMode::SimonSays, 2), None);
        assert_eq!(NodeState::INACTIVE, 1);
    }
}

//! Wire schemas of every record exchanged with the gateway, and the typed
//! structs built on top of them.
//!
//! Layouts (little-endian, sizes in bytes):
//!
//! ```text
//! KeyConfig  (2)  modifiers:u8 scan_code:u8
//! NodeInfo   (20) version:u8 node_type:u8 battery_percent:u8 battery_voltage:u32
//!                 color:u8 rgb:[3] key_config:KeyConfig current_state:u8
//!                 current_mode:u8 current_mode_state:u8 buzzer_active_remaining_ms:u32
//! PeerRecord (38) mac:[6] last_seen:u32 last_sent_ping_us:u32 latency_us:u16
//!                 rssi:i8 valid_version:bool node_info:NodeInfo
//! GameConfig (9)  buzzer_active_time:u16 deactivation_time_after_buzzing:u16
//!                 buzz_effect:u8 can_buzz_while_other_is_active:bool
//!                 must_release_before_pressing:bool crc:u16
//! PeerTable  (n)  PeerRecord repeated until the buffer ends
//! ```

use serde::Serialize;

use crate::protocol::crc::crc16_genibus;
use crate::protocol::mac::MacAddress;
use crate::protocol::model::{
    BuzzEffect, ColorSelection, KeyModifiers, ModeState, NodeMode, NodeState, NodeType,
    TimeSetting,
};
use crate::protocol::schema::{decode, encode, CodecError, Field, FieldKind, Record, Schema, Value};

// ── Schemas ───────────────────────────────────────────────────────────────────

pub const KEY_CONFIG: Schema = Schema::new(
    "key_config",
    &[
        Field::new("modifiers", FieldKind::U8),
        Field::new("scan_code", FieldKind::U8),
    ],
);

pub const NODE_INFO: Schema = Schema::new(
    "node_info",
    &[
        Field::new("version", FieldKind::U8),
        Field::new("node_type", FieldKind::U8),
        Field::new("battery_percent", FieldKind::U8),
        Field::new("battery_voltage", FieldKind::U32),
        Field::new("color", FieldKind::U8),
        Field::new("rgb", FieldKind::Bytes(3)),
        Field::new("key_config", FieldKind::Nested(&KEY_CONFIG)),
        Field::new("current_state", FieldKind::U8),
        Field::new("current_mode", FieldKind::U8),
        Field::new("current_mode_state", FieldKind::U8),
        Field::new("buzzer_active_remaining_ms", FieldKind::U32),
    ],
);

pub const PEER_RECORD: Schema = Schema::new(
    "peer_record",
    &[
        Field::new("mac", FieldKind::Bytes(6)),
        Field::new("last_seen", FieldKind::U32),
        Field::new("last_sent_ping_us", FieldKind::U32),
        Field::new("latency_us", FieldKind::U16),
        Field::new("rssi", FieldKind::I8),
        Field::new("valid_version", FieldKind::Bool),
        Field::new("node_info", FieldKind::Nested(&NODE_INFO)),
    ],
);

pub const PEER_TABLE: Schema = Schema::new(
    "peer_table",
    &[Field::new("peers", FieldKind::RepeatedUntilEnd(&PEER_RECORD))],
);

pub const GAME_CONFIG: Schema = Schema::new(
    "game_config",
    &[
        Field::new("buzzer_active_time", FieldKind::U16),
        Field::new("deactivation_time_after_buzzing", FieldKind::U16),
        Field::new("buzz_effect", FieldKind::U8),
        Field::new("can_buzz_while_other_is_active", FieldKind::Bool),
        Field::new("must_release_before_pressing", FieldKind::Bool),
        Field::new("crc", FieldKind::U16),
    ],
);

/// Every schema this crate decodes, in dependency order.
pub const ALL_SCHEMAS: [&Schema; 5] = [&KEY_CONFIG, &NODE_INFO, &PEER_RECORD, &PEER_TABLE, &GAME_CONFIG];

/// Validates every protocol schema.  Hosts call this once at startup.
///
/// # Errors
///
/// Returns the first [`CodecError::InvalidSchema`] found.
pub fn validate_protocol_schemas() -> Result<(), CodecError> {
    ALL_SCHEMAS.iter().try_for_each(|schema| schema.validate())
}

// ── KeyConfig ─────────────────────────────────────────────────────────────────

/// Key a buzzer types when pressed: modifier byte plus HID usage ID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct KeyConfig {
    pub modifiers: KeyModifiers,
    pub scan_code: u8,
}

impl KeyConfig {
    pub const SIZE: usize = KEY_CONFIG.size();

    pub fn new(modifiers: u8, scan_code: u8) -> Self {
        Self {
            modifiers: KeyModifiers(modifiers),
            scan_code,
        }
    }

    pub fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self::new(record.u8("modifiers")?, record.u8("scan_code")?))
    }

    pub fn to_record(&self) -> Record {
        Record::new(KEY_CONFIG.name)
            .with("modifiers", Value::U8(self.modifiers.0))
            .with("scan_code", Value::U8(self.scan_code))
    }

    /// The two payload bytes of a set-key-config command.
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.modifiers.0, self.scan_code]
    }
}

// ── NodeInfo ──────────────────────────────────────────────────────────────────

/// State a node reports about itself.  Written only by firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub version: u8,
    pub node_type: u8,
    pub battery_percent: u8,
    /// Millivolts.
    pub battery_voltage: u32,
    pub color: u8,
    pub rgb: [u8; 3],
    pub key_config: KeyConfig,
    pub current_state: u8,
    pub current_mode: u8,
    pub current_mode_state: u8,
    pub buzzer_active_remaining_ms: u32,
}

impl NodeInfo {
    pub const SIZE: usize = NODE_INFO.size();

    pub fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            version: record.u8("version")?,
            node_type: record.u8("node_type")?,
            battery_percent: record.u8("battery_percent")?,
            battery_voltage: record.u32("battery_voltage")?,
            color: record.u8("color")?,
            rgb: record.array("rgb")?,
            key_config: KeyConfig::from_record(record.record("key_config")?)?,
            current_state: record.u8("current_state")?,
            current_mode: record.u8("current_mode")?,
            current_mode_state: record.u8("current_mode_state")?,
            buzzer_active_remaining_ms: record.u32("buzzer_active_remaining_ms")?,
        })
    }

    pub fn to_record(&self) -> Record {
        Record::new(NODE_INFO.name)
            .with("version", Value::U8(self.version))
            .with("node_type", Value::U8(self.node_type))
            .with("battery_percent", Value::U8(self.battery_percent))
            .with("battery_voltage", Value::U32(self.battery_voltage))
            .with("color", Value::U8(self.color))
            .with("rgb", Value::Bytes(self.rgb.to_vec()))
            .with("key_config", Value::Record(self.key_config.to_record()))
            .with("current_state", Value::U8(self.current_state))
            .with("current_mode", Value::U8(self.current_mode))
            .with("current_mode_state", Value::U8(self.current_mode_state))
            .with(
                "buzzer_active_remaining_ms",
                Value::U32(self.buzzer_active_remaining_ms),
            )
    }

    pub fn node_type(&self) -> Option<NodeType> {
        NodeType::try_from(self.node_type).ok()
    }

    pub fn state(&self) -> Option<NodeState> {
        NodeState::try_from(self.current_state).ok()
    }

    pub fn mode(&self) -> Option<NodeMode> {
        NodeMode::try_from(self.current_mode).ok()
    }

    pub fn mode_state(&self) -> Option<ModeState> {
        ModeState::resolve(self.mode()?, self.current_mode_state)
    }

    pub fn color_selection(&self) -> ColorSelection {
        ColorSelection::from_wire(self.color, self.rgb)
    }

    /// `true` while the node reports the inactive lifecycle state.
    pub fn reports_inactive(&self) -> bool {
        self.current_state == NodeState::INACTIVE
    }

    /// Battery charge clamped to `0..=100`.
    pub fn battery_percent_clamped(&self) -> u8 {
        self.battery_percent.min(100)
    }

    pub fn battery_volts(&self) -> f32 {
        self.battery_voltage as f32 / 1000.0
    }
}

// ── PeerRecord ────────────────────────────────────────────────────────────────

/// Display bucket for a received signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalQuality {
    Unknown,
    Excellent,
    Good,
    Fair,
    Weak,
    None,
}

impl SignalQuality {
    /// Buckets an RSSI reading in dBm; `0` means no reading yet.
    pub fn from_rssi(rssi: i8) -> Self {
        match rssi {
            0 => SignalQuality::Unknown,
            r if r > -70 => SignalQuality::Excellent,
            r if r > -85 => SignalQuality::Good,
            r if r > -100 => SignalQuality::Fair,
            r if r > -110 => SignalQuality::Weak,
            _ => SignalQuality::None,
        }
    }
}

/// One entry of the gateway's peer table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    pub mac: MacAddress,
    pub last_seen: u32,
    pub last_sent_ping_us: u32,
    pub latency_us: u16,
    /// dBm, `0` when unknown.
    pub rssi: i8,
    /// When `false` the node speaks another protocol revision and
    /// [`PeerRecord::node_info`] must not be trusted.
    pub valid_version: bool,
    pub node_info: NodeInfo,
}

impl PeerRecord {
    pub const SIZE: usize = PEER_RECORD.size();

    /// Decodes one record from the start of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::MalformedBuffer`] if `buf` is shorter than
    /// [`PeerRecord::SIZE`].
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        Self::from_record(&decode(&PEER_RECORD, buf)?)
    }

    /// Encodes to exactly [`PeerRecord::SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Only fails if [`PeerRecord::to_record`] and the schema disagree.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(&PEER_RECORD, &self.to_record())
    }

    pub fn from_record(record: &Record) -> Result<Self, CodecError> {
        Ok(Self {
            mac: MacAddress(record.array("mac")?),
            last_seen: record.u32("last_seen")?,
            last_sent_ping_us: record.u32("last_sent_ping_us")?,
            latency_us: record.u16("latency_us")?,
            rssi: record.i8("rssi")?,
            valid_version: record.bool("valid_version")?,
            node_info: NodeInfo::from_record(record.record("node_info")?)?,
        })
    }

    pub fn to_record(&self) -> Record {
        Record::new(PEER_RECORD.name)
            .with("mac", Value::Bytes(self.mac.0.to_vec()))
            .with("last_seen", Value::U32(self.last_seen))
            .with("last_sent_ping_us", Value::U32(self.last_sent_ping_us))
            .with("latency_us", Value::U16(self.latency_us))
            .with("rssi", Value::I8(self.rssi))
            .with("valid_version", Value::Bool(self.valid_version))
            .with("node_info", Value::Record(self.node_info.to_record()))
    }

    pub fn signal_quality(&self) -> SignalQuality {
        SignalQuality::from_rssi(self.rssi)
    }

    /// Round-trip latency in milliseconds, `None` before the first ping reply.
    pub fn latency_ms(&self) -> Option<f32> {
        (self.latency_us != 0).then(|| self.latency_us as f32 / 1000.0)
    }

    /// Color to show for this peer, `None` when its node info is untrusted.
    pub fn display_color(&self) -> Option<ColorSelection> {
        self.valid_version.then(|| self.node_info.color_selection())
    }
}

/// Decodes a peer-table snapshot into `floor(buf.len() / PeerRecord::SIZE)`
/// records, sentinel entries included.
///
/// # Errors
///
/// Never fails for any buffer length; the `Result` only carries codec
/// invariant violations between the schema and [`PeerRecord::from_record`].
pub fn decode_peer_table(buf: &[u8]) -> Result<Vec<PeerRecord>, CodecError> {
    let table = decode(&PEER_TABLE, buf)?;
    let slots = table.records("peers")?;
    if buf.len() % PEER_RECORD.size() != 0 {
        tracing::trace!(
            "peer table buffer of {} bytes has a partial trailing slot",
            buf.len()
        );
    }
    slots.iter().map(PeerRecord::from_record).collect()
}

// ── GameConfig ────────────────────────────────────────────────────────────────

/// The editable part of the game configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameSettings {
    /// How long a pressed buzzer stays active.
    pub buzzer_active_time: TimeSetting,
    /// Lockout applied to a buzzer after it buzzed.
    pub deactivation_time_after_buzzing: TimeSetting,
    pub buzz_effect: BuzzEffect,
    pub can_buzz_while_other_is_active: bool,
    pub must_release_before_pressing: bool,
}

/// Global match rules plus their CRC-16/GENIBUS checksum.
///
/// The checksum is recomputed by [`GameConfig::new`] and [`GameConfig::update`];
/// a record decoded from a device keeps the device's checksum so that
/// corruption can be detected with [`GameConfig::verify_checksum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GameConfig {
    settings: GameSettings,
    crc: u16,
}

impl GameConfig {
    pub const SIZE: usize = GAME_CONFIG.size();

    /// # Errors
    ///
    /// Only fails if the settings record and [`GAME_CONFIG`] disagree.
    pub fn new(settings: GameSettings) -> Result<Self, CodecError> {
        Ok(Self {
            crc: checksum(&settings)?,
            settings,
        })
    }

    /// Applies `edit` to a copy of the settings and returns the re-checksummed
    /// record.
    ///
    /// # Errors
    ///
    /// Same as [`GameConfig::new`].
    pub fn update(&self, edit: impl FnOnce(&mut GameSettings)) -> Result<Self, CodecError> {
        let mut settings = self.settings;
        edit(&mut settings);
        Self::new(settings)
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// # Errors
    ///
    /// Returns [`CodecError::ChecksumMismatch`] if the stored checksum does not
    /// cover the current settings.
    pub fn verify_checksum(&self) -> Result<(), CodecError> {
        let computed = checksum(&self.settings)?;
        if computed == self.crc {
            Ok(())
        } else {
            Err(CodecError::ChecksumMismatch {
                stored: self.crc,
                computed,
            })
        }
    }

    /// Decodes the record, keeping the stored checksum as-is.
    ///
    /// # Errors
    ///
    /// [`CodecError::MalformedBuffer`] for short buffers and
    /// [`CodecError::UnknownValue`] for an unknown buzz effect.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        Self::from_record(&decode(&GAME_CONFIG, buf)?)
    }

    /// Encodes to exactly [`GameConfig::SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Only fails if [`GameConfig::to_record`] and the schema disagree.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        encode(&GAME_CONFIG, &self.to_record())
    }

    pub fn from_record(record: &Record) -> Result<Self, CodecError> {
        let effect = record.u8("buzz_effect")?;
        let buzz_effect = BuzzEffect::try_from(effect).map_err(|_| CodecError::UnknownValue {
            field: "buzz_effect",
            value: effect,
        })?;
        Ok(Self {
            settings: GameSettings {
                buzzer_active_time: TimeSetting::from_raw(record.u16("buzzer_active_time")?),
                deactivation_time_after_buzzing: TimeSetting::from_raw(
                    record.u16("deactivation_time_after_buzzing")?,
                ),
                buzz_effect,
                can_buzz_while_other_is_active: record.bool("can_buzz_while_other_is_active")?,
                must_release_before_pressing: record.bool("must_release_before_pressing")?,
            },
            crc: record.u16("crc")?,
        })
    }

    pub fn to_record(&self) -> Record {
        settings_record(&self.settings).with("crc", Value::U16(self.crc))
    }
}

fn settings_record(settings: &GameSettings) -> Record {
    Record::new(GAME_CONFIG.name)
        .with(
            "buzzer_active_time",
            Value::U16(settings.buzzer_active_time.to_raw()),
        )
        .with(
            "deactivation_time_after_buzzing",
            Value::U16(settings.deactivation_time_after_buzzing.to_raw()),
        )
        .with("buzz_effect", Value::U8(settings.buzz_effect as u8))
        .with(
            "can_buzz_while_other_is_active",
            Value::Bool(settings.can_buzz_while_other_is_active),
        )
        .with(
            "must_release_before_pressing",
            Value::Bool(settings.must_release_before_pressing),
        )
}

/// CRC over every byte of the encoded record except the trailing checksum.
fn checksum(settings: &GameSettings) -> Result<u16, CodecError> {
    let unsigned = settings_record(settings).with("crc", Value::U16(0));
    let bytes = encode(&GAME_CONFIG, &unsigned)?;
    let covered = bytes.len().saturating_sub(FieldKind::U16.width());
    Ok(crc16_genibus(&bytes[..covered]))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_peer() -> PeerRecord {
        PeerRecord {
            mac: MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]),
            last_seen: 123_456,
            last_sent_ping_us: 654_321,
            latency_us: 2_500,
            rssi: -67,
            valid_version: true,
            node_info: NodeInfo {
                version: 0x13,
                node_type: NodeType::Buzzer as u8,
                battery_percent: 87,
                battery_voltage: 3_950,
                color: 255,
                rgb: [0x10, 0x20, 0x30],
                key_config: KeyConfig::new(KeyModifiers::LEFT_CTRL, 0x04),
                current_state: NodeState::Default as u8,
                current_mode: NodeMode::Default as u8,
                current_mode_state: 2,
                buzzer_active_remaining_ms: 1_500,
            },
        }
    }

    fn sample_settings() -> GameSettings {
        GameSettings {
            buzzer_active_time: TimeSetting::Millis(5_000),
            deactivation_time_after_buzzing: TimeSetting::Infinite,
            buzz_effect: BuzzEffect::FlashWhite,
            can_buzz_while_other_is_active: false,
            must_release_before_pressing: true,
        }
    }

    #[test]
    fn test_record_sizes_match_firmware_structs() {
        assert_eq!(KeyConfig::SIZE, 2);
        assert_eq!(NodeInfo::SIZE, 20);
        assert_eq!(PeerRecord::SIZE, 38);
        assert_eq!(GameConfig::SIZE, 9);
    }

    #[test]
    fn test_protocol_schemas_are_valid() {
        assert_eq!(validate_protocol_schemas(), Ok(()));
    }

    #[test]
    fn test_peer_record_wire_layout() {
        // Arrange
        let peer = sample_peer();

        // Act
        let bytes = peer.encode().expect("encode");

        // Assert
        assert_eq!(bytes.len(), 38);
        assert_eq!(&bytes[0..6], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(&bytes[6..10], &123_456u32.to_le_bytes());
        assert_eq!(&bytes[14..16], &2_500u16.to_le_bytes());
        assert_eq!(bytes[16], (-67i8) as u8);
        assert_eq!(bytes[17], 1);
        // node_info starts at 18
        assert_eq!(bytes[18], 0x13);
        assert_eq!(&bytes[21..25], &3_950u32.to_le_bytes());
        assert_eq!(bytes[25], 255);
        assert_eq!(&bytes[26..29], &[0x10, 0x20, 0x30]);
        assert_eq!(&bytes[29..31], &[0x01, 0x04]);
        assert_eq!(bytes[33], 2);
        assert_eq!(&bytes[34..38], &1_500u32.to_le_bytes());
    }

    #[test]
    fn test_peer_record_decode_matches_encoded_value() {
        let peer = sample_peer();
        let bytes = peer.encode().unwrap();
        assert_eq!(PeerRecord::decode(&bytes).unwrap(), peer);
    }

    #[test]
    fn test_peer_record_decode_short_buffer_fails() {
        assert!(matches!(
            PeerRecord::decode(&[0u8; 37]),
            Err(CodecError::MalformedBuffer { needed: 38, available: 37, .. })
        ));
    }

    #[test]
    fn test_peer_table_decodes_whole_records_only() {
        let one = sample_peer().encode().unwrap();
        let mut buf = one.clone();
        buf.extend_from_slice(&one);
        buf.extend_from_slice(&one[..10]);

        let peers = decode_peer_table(&buf).unwrap();

        assert_eq!(peers.len(), 2);
        assert!(decode_peer_table(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_node_info_typed_accessors() {
        let info = sample_peer().node_info;
        assert_eq!(info.node_type(), Some(NodeType::Buzzer));
        assert_eq!(info.state(), Some(NodeState::Default));
        assert_eq!(info.mode_state(), Some(ModeState::DefaultBuzzerActive));
        assert_eq!(info.color_selection(), ColorSelection::Rgb([0x10, 0x20, 0x30]));
        assert!(!info.reports_inactive());
    }

    #[test]
    fn test_battery_helpers_clamp_and_convert() {
        let mut info = NodeInfo {
            battery_percent: 130,
            battery_voltage: 4_100,
            ..NodeInfo::default()
        };
        assert_eq!(info.battery_percent_clamped(), 100);
        assert!((info.battery_volts() - 4.1).abs() < f32::EPSILON);
        info.current_state = NodeState::INACTIVE;
        assert!(info.reports_inactive());
    }

    #[test]
    fn test_signal_quality_buckets() {
        assert_eq!(SignalQuality::from_rssi(0), SignalQuality::Unknown);
        assert_eq!(SignalQuality::from_rssi(-50), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-70), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-90), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-105), SignalQuality::Weak);
        assert_eq!(SignalQuality::from_rssi(-120), SignalQuality::None);
    }

    #[test]
    fn test_untrusted_peer_has_no_display_color() {
        let mut peer = sample_peer();
        peer.valid_version = false;
        assert_eq!(peer.display_color(), None);
        assert_eq!(peer.latency_ms(), Some(2.5));
    }

    #[test]
    fn test_game_config_crc_covers_all_preceding_bytes() {
        // Arrange
        let config = GameConfig::new(sample_settings()).unwrap();

        // Act
        let bytes = config.encode().unwrap();

        // Assert
        let stored = u16::from_le_bytes([bytes[7], bytes[8]]);
        assert_eq!(stored, crc16_genibus(&bytes[..GameConfig::SIZE - 2]));
        assert_eq!(stored, config.crc());
    }

    #[test]
    fn test_game_config_checksum_follows_schema_layout() {
        // Arrange
        let settings = GameSettings {
            can_buzz_while_other_is_active: true,
            must_release_before_pressing: true,
            ..sample_settings()
        };
        let unsigned = encode(
            &GAME_CONFIG,
            &settings_record(&settings).with("crc", Value::U16(0)),
        )
        .unwrap();

        // Act
        let config = GameConfig::new(settings).unwrap();

        // Assert
        let covered = GAME_CONFIG.size() - 2;
        assert_eq!(config.crc(), crc16_genibus(&unsigned[..covered]));
        assert_eq!(&config.encode().unwrap()[..covered], &unsigned[..covered]);
    }

    #[test]
    fn test_game_config_update_recomputes_crc() {
        let original = GameConfig::new(sample_settings()).unwrap();

        let updated = original
            .update(|s| s.buzzer_active_time = TimeSetting::Immediate)
            .unwrap();

        assert_ne!(updated.crc(), original.crc());
        assert_eq!(updated.verify_checksum(), Ok(()));
        assert_eq!(updated.settings().buzzer_active_time, TimeSetting::Immediate);
    }

    #[test]
    fn test_game_config_decode_keeps_stale_crc_for_detection() {
        let mut bytes = GameConfig::new(sample_settings()).unwrap().encode().unwrap();
        bytes[4] = BuzzEffect::None as u8;

        let decoded = GameConfig::decode(&bytes).unwrap();

        assert!(matches!(
            decoded.verify_checksum(),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_game_config_decode_rejects_unknown_effect() {
        let mut bytes = GameConfig::new(sample_settings()).unwrap().encode().unwrap();
        bytes[4] = 9;
        assert_eq!(
            GameConfig::decode(&bytes),
            Err(CodecError::UnknownValue {
                field: "buzz_effect",
                value: 9
            })
        );
    }

    #[test]
    fn test_game_config_time_sentinels_on_the_wire() {
        let bytes = GameConfig::new(sample_settings()).unwrap().encode().unwrap();
        assert_eq!(&bytes[0..2], &5_000u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &[0xFF, 0xFF]);
    }
}

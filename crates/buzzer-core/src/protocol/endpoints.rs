//! Addresses of every device operation: USB control requests and BLE GATT
//! identifiers, plus the constants both transports share.

use uuid::Uuid;

use crate::protocol::records::PeerRecord;

/// Protocol version this host speaks.  Devices reporting anything else are
/// flagged incompatible.
pub const EXPECTED_DEVICE_VERSION: u8 = 0x13;

/// Capacity of the gateway's peer table.
pub const MAX_PEERS: usize = 20;

/// Byte length of a full peer-table read.
pub const PEER_TABLE_LEN: usize = MAX_PEERS * PeerRecord::SIZE;

/// `bInterfaceClass` of the gateway's vendor-specific interface.
pub const VENDOR_INTERFACE_CLASS: u8 = 0xFF;

/// USB vendor id the gateway enumerates with.
pub const DEFAULT_VENDOR_ID: u16 = 0xCAFE;

/// `(bRequest, wValue, wIndex)` of a vendor-type, device-recipient control
/// transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlRequest {
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// IN, 1 byte.
    pub const READ_VERSION: ControlRequest = ControlRequest::new(0x00, 0x00);
    /// IN/OUT, little-endian `u16` milliseconds.
    pub const PING_INTERVAL: ControlRequest = ControlRequest::new(0x10, 0x10);
    /// IN/OUT, one game configuration record.
    pub const GAME_CONFIG: ControlRequest = ControlRequest::new(0x10, 0x21);
    /// IN, up to [`MAX_PEERS`] peer records.
    pub const PEER_TABLE: ControlRequest = ControlRequest::new(0x20, 0x00);
    /// OUT, MAC + opcode + arguments.
    pub const PEER_COMMAND: ControlRequest = ControlRequest::new(0x30, 0x00);

    pub const fn new(request: u8, value: u16) -> Self {
        Self {
            request,
            value,
            index: 0,
        }
    }

    /// Peer-table read of the single record in `slot`.  The gateway answers
    /// with one record when the requested length is exactly one record.
    pub const fn peer_slot(slot: u16) -> Self {
        Self {
            request: Self::PEER_TABLE.request,
            value: Self::PEER_TABLE.value,
            index: slot,
        }
    }
}

/// GATT identifiers of the gateway's BLE personality.
pub mod gatt {
    use uuid::Uuid;

    pub const SERVICE: Uuid = Uuid::from_u128(0x20d86bb5_f515_4671_8a88_32fddb20920c);
    /// Read: 1 byte protocol version.
    pub const VERSION: Uuid = Uuid::from_u128(0x4d3c98dc_2970_496a_bc20_c1295abc9730);
    /// Read + notify: peer table.
    pub const PEER_LIST: Uuid = Uuid::from_u128(0xf7551fb0_05c3_4dff_a944_4980f40779e1);
    /// Write: command payload.
    pub const EXEC_COMMAND: Uuid = Uuid::from_u128(0xd384392d_e53e_4c21_a598_f7bf8ccfcb66);

    /// Standard Battery Service and its Battery Level characteristic.
    pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
    pub const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

    /// Characteristics that must be present for the service to be usable.
    pub const REQUIRED: [Uuid; 3] = [VERSION, PEER_LIST, EXEC_COMMAND];
}

/// Parses a UUID from configuration text.
pub fn parse_uuid(text: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_table_read_length() {
        assert_eq!(PEER_TABLE_LEN, 760);
    }

    #[test]
    fn test_game_config_and_ping_interval_share_request_number() {
        assert_eq!(ControlRequest::GAME_CONFIG.request, ControlRequest::PING_INTERVAL.request);
        assert_ne!(ControlRequest::GAME_CONFIG.value, ControlRequest::PING_INTERVAL.value);
    }

    #[test]
    fn test_peer_slot_keeps_table_request() {
        let req = ControlRequest::peer_slot(7);
        assert_eq!(req.request, 0x20);
        assert_eq!(req.index, 7);
    }

    #[test]
    fn test_service_uuid_text_form() {
        assert_eq!(
            gatt::SERVICE.to_string(),
            "20d86bb5-f515-4671-8a88-32fddb20920c"
        );
        assert_eq!(parse_uuid("f7551fb0-05c3-4dff-a944-4980f40779e1").unwrap(), gatt::PEER_LIST);
    }
}

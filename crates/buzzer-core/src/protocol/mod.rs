//! Wire protocol between a host and the buzzer gateway: record schemas, the
//! codec that walks them, typed records, commands and device addresses.

pub mod commands;
pub mod crc;
pub mod endpoints;
pub mod mac;
pub mod model;
pub mod records;
pub mod schema;

pub use commands::{peer_command, Opcode, PeerCommand};
pub use endpoints::{ControlRequest, EXPECTED_DEVICE_VERSION, MAX_PEERS, PEER_TABLE_LEN};
pub use mac::{is_broadcast_mac, is_zero_mac, MacAddress};
pub use model::*;
pub use records::{
    decode_peer_table, validate_protocol_schemas, GameConfig, GameSettings, KeyConfig, NodeInfo,
    PeerRecord, SignalQuality,
};
pub use schema::{decode, decode_repeated, encode, CodecError, Record, Schema, Value};

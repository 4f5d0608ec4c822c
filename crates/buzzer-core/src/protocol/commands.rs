//! Peer command opcodes and the payload builder for addressed commands.
//!
//! A command payload is the 6-byte target MAC followed by the opcode byte and
//! its arguments.  It is written as-is to the USB "write command" control
//! transfer or to the BLE command characteristic; there is no further framing.
//!
//! ```rust
//! use buzzer_core::protocol::commands::PeerCommand;
//! use buzzer_core::protocol::mac::MacAddress;
//!
//! let mac: MacAddress = "11:22:33:44:55:66".parse().unwrap();
//! let payload = PeerCommand::Buzz.addressed_to(mac).unwrap();
//! assert_eq!(payload, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x30]);
//! ```

use crate::protocol::mac::{MacAddress, MAC_LEN};
use crate::protocol::model::{ColorSelection, NodeMode};
use crate::protocol::records::{GameConfig, KeyConfig};
use crate::protocol::schema::CodecError;

/// Command opcode, the first byte after the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetPingInterval = 0x10,
    SetColor = 0x20,
    SetGameConfig = 0x21,
    SetKeyConfig = 0x22,
    Buzz = 0x30,
    SetInactive = 0x31,
    SetActive = 0x32,
    Reset = 0x40,
    Shutdown = 0x50,
    SetMode = 0x60,
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Opcode::SetPingInterval),
            0x20 => Ok(Opcode::SetColor),
            0x21 => Ok(Opcode::SetGameConfig),
            0x22 => Ok(Opcode::SetKeyConfig),
            0x30 => Ok(Opcode::Buzz),
            0x31 => Ok(Opcode::SetInactive),
            0x32 => Ok(Opcode::SetActive),
            0x40 => Ok(Opcode::Reset),
            0x50 => Ok(Opcode::Shutdown),
            0x60 => Ok(Opcode::SetMode),
            _ => Err(()),
        }
    }
}

/// A command with its arguments, ready to be addressed to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCommand {
    SetPingInterval(u16),
    SetColor(ColorSelection),
    SetGameConfig(GameConfig),
    SetKeyConfig(KeyConfig),
    Buzz,
    SetInactive,
    SetActive,
    Reset,
    Shutdown,
    SetMode(NodeMode),
}

impl PeerCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            PeerCommand::SetPingInterval(_) => Opcode::SetPingInterval,
            PeerCommand::SetColor(_) => Opcode::SetColor,
            PeerCommand::SetGameConfig(_) => Opcode::SetGameConfig,
            PeerCommand::SetKeyConfig(_) => Opcode::SetKeyConfig,
            PeerCommand::Buzz => Opcode::Buzz,
            PeerCommand::SetInactive => Opcode::SetInactive,
            PeerCommand::SetActive => Opcode::SetActive,
            PeerCommand::Reset => Opcode::Reset,
            PeerCommand::Shutdown => Opcode::Shutdown,
            PeerCommand::SetMode(_) => Opcode::SetMode,
        }
    }

    /// Opcode byte followed by the encoded arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ChecksumMismatch`] for a game configuration whose
    /// checksum is stale; such a record is never put on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![self.opcode() as u8];
        match self {
            PeerCommand::SetPingInterval(ms) => buf.extend_from_slice(&ms.to_le_bytes()),
            PeerCommand::SetColor(selection) => {
                let (selector, rgb) = selection.to_wire();
                buf.push(selector);
                buf.extend_from_slice(&rgb);
            }
            PeerCommand::SetGameConfig(config) => {
                config.verify_checksum()?;
                buf.extend_from_slice(&config.encode()?);
            }
            PeerCommand::SetKeyConfig(key) => buf.extend_from_slice(&key.to_bytes()),
            PeerCommand::SetMode(mode) => buf.push(*mode as u8),
            PeerCommand::Buzz
            | PeerCommand::SetInactive
            | PeerCommand::SetActive
            | PeerCommand::Reset
            | PeerCommand::Shutdown => {}
        }
        Ok(buf)
    }

    /// Full command payload for `mac` ([`MacAddress::BROADCAST`] for every peer).
    ///
    /// # Errors
    ///
    /// See [`PeerCommand::to_bytes`].
    pub fn addressed_to(&self, mac: MacAddress) -> Result<Vec<u8>, CodecError> {
        Ok(peer_command(mac, &self.to_bytes()?))
    }
}

/// Concatenates the target MAC with an opcode and its argument bytes.
pub fn peer_command(mac: MacAddress, opcode_and_args: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(MAC_LEN + opcode_and_args.len());
    payload.extend_from_slice(&mac.0);
    payload.extend_from_slice(opcode_and_args);
    payload
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Peer MAC addresses and the two sentinel patterns found in peer tables.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Length of a radio MAC address in bytes.
pub const MAC_LEN: usize = 6;

/// Returns `true` iff `mac` is exactly six `0xFF` bytes.
pub fn is_broadcast_mac(mac: &[u8]) -> bool {
    mac.len() == MAC_LEN && mac.iter().all(|&b| b == 0xFF)
}

/// Returns `true` iff `mac` is exactly six `0x00` bytes.
pub fn is_zero_mac(mac: &[u8]) -> bool {
    mac.len() == MAC_LEN && mac.iter().all(|&b| b == 0x00)
}

/// Error returned when parsing a MAC address string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid MAC address `{0}`: expected six hex octets like AA:BB:CC:DD:EE:FF")]
pub struct ParseMacError(pub String);

/// A 6-byte radio MAC address, the identity of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; MAC_LEN]);

impl MacAddress {
    /// Addresses every peer at once.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; MAC_LEN]);
    /// Marks an unused peer-table slot.
    pub const ZERO: MacAddress = MacAddress([0x00; MAC_LEN]);

    pub fn octets(&self) -> [u8; MAC_LEN] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        is_broadcast_mac(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        is_zero_mac(&self.0)
    }

    /// `true` for either sentinel pattern.
    pub fn is_sentinel(&self) -> bool {
        self.is_broadcast() || self.is_zero()
    }
}

impl From<[u8; MAC_LEN]> for MacAddress {
    fn from(octets: [u8; MAC_LEN]) -> Self {
        MacAddress(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `:` or `-` separated hex octets, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacError(s.to_string());
        let mut octets = [0u8; MAC_LEN];
        let mut parts = s.split(|c: char| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(err)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(err());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(MacAddress(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

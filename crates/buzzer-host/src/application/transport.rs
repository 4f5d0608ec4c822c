//! The transport-independent capability set every gateway connection offers.
//!
//! [`BuzzerTransport`] is implemented once per physical transport (USB control
//! transfers, BLE GATT characteristics) in `infrastructure::transport`.  The
//! peer synchronization engine, the command issuer and the connection
//! lifecycle are written against this trait only.
//!
//! # Sharing
//!
//! A transport is owned by one [`crate::application::lifecycle::ConnectionLifecycle`]
//! and lent out as `Arc<dyn BuzzerTransport>` to the peer engine and the
//! command issuer.  Every method therefore takes `&self`.  Once the lifecycle
//! closes the transport, borrowed calls fail with [`TransportError`] rather
//! than panicking.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use buzzer_core::protocol::{CodecError, GameConfig, PeerRecord};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Physical link to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Usb,
    Ble,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Usb => f.write_str("USB"),
            TransportKind::Ble => f.write_str("BLE"),
        }
    }
}

/// Errors raised by transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device went away (cable unplugged, GATT link dropped).
    #[error("device disconnected")]
    Disconnected,

    /// The operation was attempted on a closed transport.
    #[error("device is not open")]
    NotOpen,

    /// The device or host stack refused the transfer.
    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("transfer timed out")]
    Timeout,

    /// The transfer was cancelled by the user or by closing the device.
    #[error("transfer aborted")]
    Aborted,

    /// A device, interface or characteristic could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The transport has no way to perform this operation.
    #[error("{operation} is not supported over {transport}")]
    Unsupported {
        transport: TransportKind,
        operation: &'static str,
    },

    /// The device answered with bytes that do not decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),
}

impl TransportError {
    /// `true` for user-initiated cancellation, which is never surfaced.
    pub fn is_abort(&self) -> bool {
        matches!(self, TransportError::Aborted)
    }
}

/// Session details negotiated while claiming the device.  Recreated on every
/// connection and dropped on close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub transport: TransportKind,
    /// Active USB configuration value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<u8>,
    /// Claimed USB interface number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_number: Option<u8>,
    /// Resolved GATT characteristics.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub characteristics: Vec<Uuid>,
}

impl ConnectionInfo {
    pub fn usb(configuration: u8, interface_number: u8) -> Self {
        Self {
            transport: TransportKind::Usb,
            configuration: Some(configuration),
            interface_number: Some(interface_number),
            characteristics: Vec::new(),
        }
    }

    pub fn ble(characteristics: Vec<Uuid>) -> Self {
        Self {
            transport: TransportKind::Ble,
            configuration: None,
            interface_number: None,
            characteristics,
        }
    }
}

/// Receiver that yields one `()` per "peer table changed" notification.
pub type PeerTableUpdates = mpsc::Receiver<()>;

/// Platform notification about the gateway this transport is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A matching device appeared (USB hot-plug or BLE advertisement).
    Arrived,
    /// The device went away.
    Removed,
}

/// Receiver of [`DeviceEvent`]s.  Dropping it stops the watcher.
pub type DeviceEvents = mpsc::Receiver<DeviceEvent>;

/// Uniform operation set over any gateway transport.
///
/// The connection steps (`open`, `select_configuration`, `claim_interface`)
/// are driven in order by the lifecycle manager; the remaining operations are
/// only valid once `claim_interface` succeeded.  No method retries on its own.
#[async_trait]
pub trait BuzzerTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Interval at which the peer table is polled when no notifications are
    /// available.
    fn poll_interval(&self) -> Duration;

    async fn open(&self) -> Result<(), TransportError>;

    /// Releases the device.  Safe to call on an already closed transport.
    async fn close(&self) -> Result<(), TransportError>;

    /// Selects the default configuration if none is active.
    async fn select_configuration(&self) -> Result<(), TransportError>;

    /// Locates and claims the vendor interface (or GATT service).
    ///
    /// Returns [`TransportError::NotFound`] when the device has none.
    async fn claim_interface(&self) -> Result<ConnectionInfo, TransportError>;

    async fn read_version(&self) -> Result<u8, TransportError>;

    /// Reads and decodes the full peer table, sentinel slots included.
    async fn read_peer_table(&self) -> Result<Vec<PeerRecord>, TransportError>;

    /// Writes a complete command payload (MAC + opcode + arguments).
    async fn send_peer_command(&self, payload: &[u8]) -> Result<(), TransportError>;

    async fn read_game_config(&self) -> Result<GameConfig, TransportError>;

    async fn write_game_config(&self, config: &GameConfig) -> Result<(), TransportError>;

    async fn read_ping_interval(&self) -> Result<u16, TransportError>;

    async fn write_ping_interval(&self, interval_ms: u16) -> Result<(), TransportError>;

    /// Subscribes to peer-table change notifications.  Transports without a
    /// push channel keep this default, and callers fall back to polling.
    async fn subscribe_peer_table(&self) -> Result<PeerTableUpdates, TransportError> {
        Err(TransportError::Unsupported {
            transport: self.kind(),
            operation: "peer table notifications",
        })
    }

    /// Watches for the gateway appearing and disappearing, independent of
    /// whether it is currently open.  The watcher outlives `close`.
    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        Err(TransportError::Unsupported {
            transport: self.kind(),
            operation: "device arrival notifications",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_aborted_is_an_abort() {
        assert!(TransportError::Aborted.is_abort());
        assert!(!TransportError::Disconnected.is_abort());
        assert!(!TransportError::Rejected("stall".into()).is_abort());
    }

    #[test]
    fn test_unsupported_message_names_transport() {
        let err = TransportError::Unsupported {
            transport: TransportKind::Ble,
            operation: "game config read",
        };
        assert_eq!(err.to_string(), "game config read is not supported over BLE");
    }

    #[test]
    fn test_connection_info_constructors() {
        let usb = ConnectionInfo::usb(1, 2);
        assert_eq!(usb.transport, TransportKind::Usb);
        assert_eq!(usb.interface_number, Some(2));

        let ble = ConnectionInfo::ble(vec![Uuid::nil()]);
        assert_eq!(ble.transport, TransportKind::Ble);
        assert_eq!(ble.characteristics.len(), 1);
    }
}

//! USB transport: every gateway operation is a vendor control transfer on the
//! gateway's vendor-class interface.
//!
//! [`UsbTransport`] is generic over [`UsbControl`], the thin set of primitives
//! a USB host stack has to provide.  The libusb-backed implementation lives in
//! `rusb_backend` (feature `usb`); unit tests use the `mockall`-generated
//! `MockUsbControl`.
//!
//! # Transfers
//!
//! | Operation          | Direction | bRequest | wValue | Payload                 |
//! |--------------------|-----------|----------|--------|-------------------------|
//! | read version       | IN        | 0x00     | 0x00   | 1 byte                  |
//! | ping interval      | IN / OUT  | 0x10     | 0x10   | `u16` LE milliseconds   |
//! | game configuration | IN / OUT  | 0x10     | 0x21   | 9-byte record           |
//! | peer table         | IN        | 0x20     | 0x00   | up to 20 × 38 bytes     |
//! | peer command       | OUT       | 0x30     | 0x00   | MAC + opcode + args     |

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use buzzer_core::protocol::endpoints::VENDOR_INTERFACE_CLASS;
use buzzer_core::protocol::{
    decode_peer_table, CodecError, ControlRequest, GameConfig, PeerRecord, MAX_PEERS,
    PEER_TABLE_LEN,
};
use tracing::{debug, trace};

use crate::application::transport::{
    BuzzerTransport, ConnectionInfo, DeviceEvents, TransportError, TransportKind,
};

/// Default polling interval for the peer table over USB.
pub const USB_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One interface of the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub class_code: u8,
}

/// Primitives a USB host stack provides for one already-selected device.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsbControl: Send + Sync {
    async fn open(&self) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
    /// `None` when the device is unconfigured.
    async fn active_configuration(&self) -> Result<Option<u8>, TransportError>;
    /// Value of the device's first configuration descriptor.
    async fn default_configuration(&self) -> Result<u8, TransportError>;
    async fn set_configuration(&self, value: u8) -> Result<(), TransportError>;
    async fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>, TransportError>;
    async fn claim_interface(&self, number: u8) -> Result<(), TransportError>;
    async fn release_interface(&self, number: u8) -> Result<(), TransportError>;
    async fn control_in(
        &self,
        request: ControlRequest,
        length: u16,
    ) -> Result<Vec<u8>, TransportError>;
    async fn control_out(&self, request: ControlRequest, data: &[u8]) -> Result<(), TransportError>;
    /// Hot-plug notifications for devices this control would open.
    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError>;
}

#[derive(Debug, Default, Clone, Copy)]
struct Claimed {
    configuration: u8,
    interface: Option<u8>,
}

/// [`BuzzerTransport`] over vendor control transfers.
pub struct UsbTransport<C: UsbControl> {
    control: C,
    poll_interval: Duration,
    claimed: Mutex<Claimed>,
}

impl<C: UsbControl> UsbTransport<C> {
    pub fn new(control: C) -> Self {
        Self::with_poll_interval(control, USB_POLL_INTERVAL)
    }

    pub fn with_poll_interval(control: C, poll_interval: Duration) -> Self {
        Self {
            control,
            poll_interval,
            claimed: Mutex::new(Claimed::default()),
        }
    }

    /// Reads the single peer record in `slot` (0-based).
    ///
    /// # Errors
    ///
    /// [`TransportError::NotFound`] if `slot` is outside the table, otherwise
    /// the transfer or decode error.
    pub async fn read_peer_slot(&self, slot: u16) -> Result<PeerRecord, TransportError> {
        if usize::from(slot) >= MAX_PEERS {
            return Err(TransportError::NotFound(format!("peer slot {slot}")));
        }
        let bytes = self
            .control
            .control_in(ControlRequest::peer_slot(slot), PeerRecord::SIZE as u16)
            .await?;
        Ok(PeerRecord::decode(&bytes)?)
    }

    fn claimed(&self) -> std::sync::MutexGuard<'_, Claimed> {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn exact<const N: usize>(schema: &'static str, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(CodecError::MalformedBuffer {
            schema,
            needed: N,
            available: bytes.len(),
        })
}

#[async_trait]
impl<C: UsbControl> BuzzerTransport for UsbTransport<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn open(&self) -> Result<(), TransportError> {
        self.control.open().await
    }

    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        self.control.watch_devices().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let claimed = std::mem::take(&mut *self.claimed());
        if let Some(number) = claimed.interface {
            if let Err(e) = self.control.release_interface(number).await {
                debug!("release of interface {number} failed: {e}");
            }
        }
        self.control.close().await
    }

    async fn select_configuration(&self) -> Result<(), TransportError> {
        let configuration = match self.control.active_configuration().await? {
            Some(active) => active,
            None => {
                let value = self.control.default_configuration().await?;
                debug!("device unconfigured; selecting configuration {value}");
                self.control.set_configuration(value).await?;
                value
            }
        };
        self.claimed().configuration = configuration;
        Ok(())
    }

    async fn claim_interface(&self) -> Result<ConnectionInfo, TransportError> {
        let interface = self
            .control
            .interfaces()
            .await?
            .into_iter()
            .find(|i| i.class_code == VENDOR_INTERFACE_CLASS)
            .ok_or_else(|| {
                TransportError::NotFound(format!(
                    "interface with class 0x{VENDOR_INTERFACE_CLASS:02X}"
                ))
            })?;

        self.control.claim_interface(interface.number).await?;

        let mut claimed = self.claimed();
        claimed.interface = Some(interface.number);
        Ok(ConnectionInfo::usb(claimed.configuration, interface.number))
    }

    async fn read_version(&self) -> Result<u8, TransportError> {
        let bytes = self.control.control_in(ControlRequest::READ_VERSION, 1).await?;
        let [version] = exact::<1>("version", &bytes)?;
        Ok(version)
    }

    async fn read_peer_table(&self) -> Result<Vec<PeerRecord>, TransportError> {
        let bytes = self
            .control
            .control_in(ControlRequest::PEER_TABLE, PEER_TABLE_LEN as u16)
            .await?;
        trace!("peer table: {} bytes", bytes.len());
        Ok(decode_peer_table(&bytes)?)
    }

    async fn send_peer_command(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.control
            .control_out(ControlRequest::PEER_COMMAND, payload)
            .await
    }

    async fn read_game_config(&self) -> Result<GameConfig, TransportError> {
        let bytes = self
            .control
            .control_in(ControlRequest::GAME_CONFIG, GameConfig::SIZE as u16)
            .await?;
        Ok(GameConfig::decode(&bytes)?)
    }

    async fn write_game_config(&self, config: &GameConfig) -> Result<(), TransportError> {
        config.verify_checksum()?;
        let bytes = config.encode()?;
        self.control
            .control_out(ControlRequest::GAME_CONFIG, &bytes)
            .await
    }

    async fn read_ping_interval(&self) -> Result<u16, TransportError> {
        let bytes = self
            .control
            .control_in(ControlRequest::PING_INTERVAL, 2)
            .await?;
        Ok(u16::from_le_bytes(exact::<2>("ping_interval", &bytes)?))
    }

    async fn write_ping_interval(&self, interval_ms: u16) -> Result<(), TransportError> {
        self.control
            .control_out(ControlRequest::PING_INTERVAL, &interval_ms.to_le_bytes())
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! BLE transport: the gateway's GATT service mapped onto [`BuzzerTransport`].
//!
//! | Characteristic | Access        | Contents                       |
//! |----------------|---------------|--------------------------------|
//! | version        | read          | 1 byte                         |
//! | peer list      | read + notify | peer table (38-byte records)   |
//! | exec command   | write         | MAC + opcode + args            |
//!
//! The service has no characteristic for the game configuration or the ping
//! interval.  Writes of either are therefore sent as broadcast peer commands
//! through the command characteristic, and reads report
//! [`TransportError::Unsupported`].
//!
//! The peer list supports notifications; when subscribing fails the peer
//! engine polls every [`BLE_POLL_INTERVAL`] instead.

use std::time::Duration;

use async_trait::async_trait;
use buzzer_core::protocol::endpoints::gatt;
use buzzer_core::protocol::{
    decode_peer_table, CodecError, GameConfig, MacAddress, PeerCommand, PeerRecord,
};
use tracing::debug;
use uuid::Uuid;

use crate::application::transport::{
    BuzzerTransport, ConnectionInfo, DeviceEvents, PeerTableUpdates, TransportError,
    TransportKind,
};

/// Fallback polling interval when peer-list notifications are unavailable.
pub const BLE_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// GATT primitives for one selected peripheral.
#[async_trait]
pub trait GattLink: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Discovers `service` and returns which of `characteristics` it has.
    ///
    /// Returns [`TransportError::NotFound`] if the service itself is missing.
    async fn discover(
        &self,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<Vec<Uuid>, TransportError>;

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;
    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError>;

    /// Yields one `()` per value notification on `characteristic`.
    async fn subscribe(&self, characteristic: Uuid) -> Result<PeerTableUpdates, TransportError>;

    /// Reports the gateway advertising again and dropping its link.
    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        Err(TransportError::Unsupported {
            transport: TransportKind::Ble,
            operation: "device arrival notifications",
        })
    }
}

/// [`BuzzerTransport`] over GATT.
pub struct BleTransport<G: GattLink> {
    link: G,
    service: Uuid,
    poll_interval: Duration,
}

impl<G: GattLink> BleTransport<G> {
    pub fn new(link: G) -> Self {
        Self::with_service(link, gatt::SERVICE, BLE_POLL_INTERVAL)
    }

    pub fn with_service(link: G, service: Uuid, poll_interval: Duration) -> Self {
        Self {
            link,
            service,
            poll_interval,
        }
    }

    /// Reads the gateway's own battery level (0-100 %) from the standard
    /// Battery Service.
    pub async fn read_battery_level(&self) -> Result<u8, TransportError> {
        let found = self
            .link
            .discover(gatt::BATTERY_SERVICE, &[gatt::BATTERY_LEVEL])
            .await?;
        if !found.contains(&gatt::BATTERY_LEVEL) {
            return Err(TransportError::NotFound("battery level characteristic".into()));
        }
        let bytes = self.link.read(gatt::BATTERY_LEVEL).await?;
        bytes.first().copied().ok_or_else(|| {
            CodecError::MalformedBuffer {
                schema: "battery_level",
                needed: 1,
                available: 0,
            }
            .into()
        })
    }

    async fn broadcast(&self, command: PeerCommand) -> Result<(), TransportError> {
        let payload = command.addressed_to(MacAddress::BROADCAST)?;
        debug!("BLE broadcast {:?}", command.opcode());
        self.send_peer_command(&payload).await
    }

    fn unsupported(operation: &'static str) -> TransportError {
        TransportError::Unsupported {
            transport: TransportKind::Ble,
            operation,
        }
    }
}

#[async_trait]
impl<G: GattLink> BuzzerTransport for BleTransport<G> {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn open(&self) -> Result<(), TransportError> {
        self.link.connect().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.link.disconnect().await
    }

    async fn select_configuration(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn claim_interface(&self) -> Result<ConnectionInfo, TransportError> {
        let found = self.link.discover(self.service, &gatt::REQUIRED).await?;
        if let Some(missing) = gatt::REQUIRED.iter().find(|uuid| !found.contains(*uuid)) {
            return Err(TransportError::NotFound(format!("characteristic {missing}")));
        }
        Ok(ConnectionInfo::ble(found))
    }

    async fn read_version(&self) -> Result<u8, TransportError> {
        let bytes = self.link.read(gatt::VERSION).await?;
        bytes.first().copied().ok_or_else(|| {
            CodecError::MalformedBuffer {
                schema: "version",
                needed: 1,
                available: 0,
            }
            .into()
        })
    }

    async fn read_peer_table(&self) -> Result<Vec<PeerRecord>, TransportError> {
        let bytes = self.link.read(gatt::PEER_LIST).await?;
        Ok(decode_peer_table(&bytes)?)
    }

    async fn send_peer_command(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.link.write(gatt::EXEC_COMMAND, payload).await
    }

    async fn read_game_config(&self) -> Result<GameConfig, TransportError> {
        Err(Self::unsupported("game configuration read"))
    }

    async fn write_game_config(&self, config: &GameConfig) -> Result<(), TransportError> {
        self.broadcast(PeerCommand::SetGameConfig(*config)).await
    }

    async fn read_ping_interval(&self) -> Result<u16, TransportError> {
        Err(Self::unsupported("ping interval read"))
    }

    async fn write_ping_interval(&self, interval_ms: u16) -> Result<(), TransportError> {
        self.broadcast(PeerCommand::SetPingInterval(interval_ms)).await
    }

    async fn subscribe_peer_table(&self) -> Result<PeerTableUpdates, TransportError> {
        self.link.subscribe(gatt::PEER_LIST).await
    }

    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        self.link.watch_devices().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use buzzer_core::protocol::{BuzzEffect, GameSettings, TimeSetting};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// In-memory GATT server that records every write.
    #[derive(Default)]
    struct RecordingGattLink {
        values: HashMap<Uuid, Vec<u8>>,
        characteristics: Vec<Uuid>,
        writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
        should_fail: bool,
    }

    impl RecordingGattLink {
        fn gateway() -> Self {
            let mut values = HashMap::new();
            values.insert(gatt::VERSION, vec![0x13]);
            values.insert(gatt::PEER_LIST, vec![0u8; 2 * PeerRecord::SIZE]);
            values.insert(gatt::BATTERY_LEVEL, vec![87]);
            Self {
                values,
                characteristics: vec![
                    gatt::VERSION,
                    gatt::PEER_LIST,
                    gatt::EXEC_COMMAND,
                    gatt::BATTERY_LEVEL,
                ],
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl GattLink for RecordingGattLink {
        async fn connect(&self) -> Result<(), TransportError> {
            if self.should_fail {
                return Err(TransportError::NotFound("peripheral".into()));
            }
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn discover(
            &self,
            _service: Uuid,
            characteristics: &[Uuid],
        ) -> Result<Vec<Uuid>, TransportError> {
            Ok(characteristics
                .iter()
                .filter(|c| self.characteristics.contains(*c))
                .copied()
                .collect())
        }

        async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
            self.values
                .get(&characteristic)
                .cloned()
                .ok_or_else(|| TransportError::NotFound(characteristic.to_string()))
        }

        async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
            if self.should_fail {
                return Err(TransportError::Rejected("injected failure".into()));
            }
            self.writes
                .lock()
                .unwrap()
                .push((characteristic, value.to_vec()));
            Ok(())
        }

        async fn subscribe(&self, _: Uuid) -> Result<PeerTableUpdates, TransportError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn test_claim_resolves_required_characteristics() {
        // Arrange
        let transport = BleTransport::new(RecordingGattLink::gateway());

        // Act
        let info = transport.claim_interface().await.unwrap();

        // Assert
        assert_eq!(info.transport, TransportKind::Ble);
        assert_eq!(info.characteristics, gatt::REQUIRED.to_vec());
    }

    #[tokio::test]
    async fn test_missing_command_characteristic_is_not_found() {
        let mut link = RecordingGattLink::gateway();
        link.characteristics.retain(|c| *c != gatt::EXEC_COMMAND);
        let transport = BleTransport::new(link);

        let result = transport.claim_interface().await;

        assert!(matches!(result, Err(TransportError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reads_version_and_peer_list() {
        let transport = BleTransport::new(RecordingGattLink::gateway());

        assert_eq!(transport.read_version().await, Ok(0x13));
        assert_eq!(transport.read_peer_table().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_game_config_write_is_broadcast_command() {
        // Arrange
        let config = GameConfig::new(GameSettings {
            buzzer_active_time: TimeSetting::Millis(2_000),
            deactivation_time_after_buzzing: TimeSetting::Immediate,
            buzz_effect: BuzzEffect::FlashWhite,
            can_buzz_while_other_is_active: false,
            must_release_before_pressing: false,
        })
        .unwrap();
        let transport = BleTransport::new(RecordingGattLink::gateway());

        // Act
        transport.write_game_config(&config).await.unwrap();

        // Assert
        let writes = transport.link.writes.lock().unwrap();
        let (uuid, payload) = &writes[0];
        assert_eq!(*uuid, gatt::EXEC_COMMAND);
        assert_eq!(&payload[..6], &[0xFF; 6]);
        assert_eq!(payload[6], 0x21);
        assert_eq!(&payload[7..], config.encode().unwrap().as_slice());
    }

    #[tokio::test]
    async fn test_ping_interval_write_is_broadcast_command() {
        let transport = BleTransport::new(RecordingGattLink::gateway());

        transport.write_ping_interval(0x0102).await.unwrap();

        let writes = transport.link.writes.lock().unwrap();
        assert_eq!(&writes[0].1[6..], &[0x10, 0x02, 0x01]);
    }

    #[tokio::test]
    async fn test_settings_reads_are_unsupported() {
        let transport = BleTransport::new(RecordingGattLink::gateway());

        assert!(matches!(
            transport.read_game_config().await,
            Err(TransportError::Unsupported { .. })
        ));
        assert!(matches!(
            transport.read_ping_interval().await,
            Err(TransportError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_write_is_returned() {
        let mut link = RecordingGattLink::gateway();
        link.should_fail = true;
        let transport = BleTransport::new(link);

        let result = transport.send_peer_command(&[0; 7]).await;

        assert!(matches!(result, Err(TransportError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_battery_level_read() {
        let transport = BleTransport::new(RecordingGattLink::gateway());
        assert_eq!(transport.read_battery_level().await, Ok(87));
    }

    #[test]
    fn test_ble_falls_back_to_one_second_polling() {
        let transport = BleTransport::new(RecordingGattLink::default());
        assert_eq!(transport.poll_interval(), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_device_watch_defaults_to_unsupported() {
        let transport = BleTransport::new(RecordingGattLink::gateway());

        let result = transport.watch_devices().await;

        assert!(matches!(
            result,
            Err(TransportError::Unsupported {
                transport: TransportKind::Ble,
                ..
            })
        ));
    }
}

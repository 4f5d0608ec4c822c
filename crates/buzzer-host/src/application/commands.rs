//! Use case: issue commands to individual peers, to every peer, or to the
//! gateway itself.
//!
//! Commands are fire-and-forget.  A failed write is reported through the
//! shared [`ErrorReporter`] and returned to the caller; nothing is retried or
//! queued.  Activate/deactivate commands additionally record an optimistic
//! toggle in the [`PeerSync`] view so the change is visible before the next
//! table read confirms (or overrules) it.

use std::sync::Arc;

use buzzer_core::protocol::{
    ColorSelection, GameConfig, GameSettings, KeyConfig, MacAddress, NodeMode, PeerCommand,
};
use tracing::{debug, info};

use super::errors::{ErrorReporter, HostError};
use super::peer_sync::PeerSync;
use super::transport::{BuzzerTransport, TransportError};

/// Sends commands over one connected, compatible gateway.
///
/// Obtained from [`crate::application::lifecycle::ConnectionLifecycle::commands`],
/// which only hands one out while the device version matches.
#[derive(Clone)]
pub struct CommandIssuer {
    transport: Arc<dyn BuzzerTransport>,
    sync: Arc<PeerSync>,
    errors: ErrorReporter,
}

impl CommandIssuer {
    pub fn new(
        transport: Arc<dyn BuzzerTransport>,
        sync: Arc<PeerSync>,
        errors: ErrorReporter,
    ) -> Self {
        Self {
            transport,
            sync,
            errors,
        }
    }

    /// Addresses `command` to `target` and writes it.
    ///
    /// # Errors
    ///
    /// [`HostError::CommandRejected`] if the payload cannot be encoded or the
    /// transport refuses the write.
    pub async fn send(&self, target: MacAddress, command: PeerCommand) -> Result<(), HostError> {
        let result = self.write(target, command).await;
        self.errors.check(result)?;

        match command {
            PeerCommand::SetActive | PeerCommand::SetInactive => {
                let active = command == PeerCommand::SetActive;
                if target.is_broadcast() {
                    self.sync.set_all_active_local(active);
                } else {
                    self.sync.set_active_local(target, active);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// [`CommandIssuer::send`] to [`MacAddress::BROADCAST`].
    pub async fn broadcast(&self, command: PeerCommand) -> Result<(), HostError> {
        self.send(MacAddress::BROADCAST, command).await
    }

    pub async fn buzz(&self, target: MacAddress) -> Result<(), HostError> {
        self.send(target, PeerCommand::Buzz).await
    }

    pub async fn set_active(&self, target: MacAddress, active: bool) -> Result<(), HostError> {
        let command = if active {
            PeerCommand::SetActive
        } else {
            PeerCommand::SetInactive
        };
        self.send(target, command).await
    }

    pub async fn set_all_active(&self, active: bool) -> Result<(), HostError> {
        self.set_active(MacAddress::BROADCAST, active).await
    }

    pub async fn set_color(
        &self,
        target: MacAddress,
        color: ColorSelection,
    ) -> Result<(), HostError> {
        self.send(target, PeerCommand::SetColor(color)).await
    }

    pub async fn set_key_config(&self, target: MacAddress, key: KeyConfig) -> Result<(), HostError> {
        self.send(target, PeerCommand::SetKeyConfig(key)).await
    }

    pub async fn set_mode(&self, target: MacAddress, mode: NodeMode) -> Result<(), HostError> {
        self.send(target, PeerCommand::SetMode(mode)).await
    }

    pub async fn reset(&self, target: MacAddress) -> Result<(), HostError> {
        self.send(target, PeerCommand::Reset).await
    }

    pub async fn shutdown(&self, target: MacAddress) -> Result<(), HostError> {
        self.send(target, PeerCommand::Shutdown).await
    }

    // ── Gateway settings ──────────────────────────────────────────────────────

    pub async fn read_game_config(&self) -> Result<GameConfig, HostError> {
        let result = self
            .transport
            .read_game_config()
            .await
            .map_err(HostError::ReadFailed);
        self.errors.check(result)
    }

    /// Writes `config` as-is.  A record whose checksum does not match its
    /// fields is refused before anything is sent.
    pub async fn write_game_config(&self, config: &GameConfig) -> Result<(), HostError> {
        let result = self.write_config(config).await;
        self.errors.check(result)
    }

    /// Read-modify-write of the game configuration.  The checksum is
    /// recomputed after `edit` runs, so the written record is always valid.
    pub async fn update_game_config(
        &self,
        edit: impl FnOnce(&mut GameSettings) + Send,
    ) -> Result<GameConfig, HostError> {
        let current = self.read_game_config().await?;
        let updated = current
            .update(edit)
            .map_err(|e| HostError::CommandRejected(TransportError::Protocol(e)))?;
        self.write_game_config(&updated).await?;
        info!("game configuration updated (crc 0x{:04X})", updated.crc());
        Ok(updated)
    }

    pub async fn read_ping_interval(&self) -> Result<u16, HostError> {
        let result = self
            .transport
            .read_ping_interval()
            .await
            .map_err(HostError::ReadFailed);
        self.errors.check(result)
    }

    pub async fn write_ping_interval(&self, interval_ms: u16) -> Result<(), HostError> {
        let result = self
            .transport
            .write_ping_interval(interval_ms)
            .await
            .map_err(HostError::CommandRejected);
        self.errors.check(result)
    }

    async fn write(&self, target: MacAddress, command: PeerCommand) -> Result<(), HostError> {
        let payload = command
            .addressed_to(target)
            .map_err(|e| HostError::CommandRejected(TransportError::Protocol(e)))?;
        debug!(
            "sending {:?} to {target} ({} bytes)",
            command.opcode(),
            payload.len()
        );
        self.transport
            .send_peer_command(&payload)
            .await
            .map_err(HostError::CommandRejected)
    }

    async fn write_config(&self, config: &GameConfig) -> Result<(), HostError> {
        config
            .verify_checksum()
            .map_err(|e| HostError::CommandRejected(TransportError::Protocol(e)))?;
        self.transport
            .write_game_config(config)
            .await
            .map_err(HostError::CommandRejected)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::MockTransport;
    use buzzer_core::protocol::{BaseColor, BuzzEffect, NodeInfo, PeerRecord, TimeSetting};

    const PEER: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn issuer(mock: &Arc<MockTransport>) -> (CommandIssuer, Arc<PeerSync>, ErrorReporter) {
        let errors = ErrorReporter::new();
        let sync = Arc::new(PeerSync::new(mock.clone(), errors.clone()));
        (
            CommandIssuer::new(mock.clone(), sync.clone(), errors.clone()),
            sync,
            errors,
        )
    }

    fn settings() -> GameSettings {
        GameSettings {
            buzzer_active_time: TimeSetting::Millis(3_000),
            deactivation_time_after_buzzing: TimeSetting::Immediate,
            buzz_effect: BuzzEffect::FlashBaseColor,
            can_buzz_while_other_is_active: false,
            must_release_before_pressing: true,
        }
    }

    #[tokio::test]
    async fn test_buzz_sends_mac_followed_by_opcode() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        let (issuer, _, _) = issuer(&mock);

        // Act
        issuer.buzz(PEER).await.unwrap();

        // Assert
        assert_eq!(
            mock.sent_commands(),
            vec![vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x30]]
        );
    }

    #[tokio::test]
    async fn test_set_color_rgb_payload() {
        let mock = Arc::new(MockTransport::usb());
        let (issuer, _, _) = issuer(&mock);

        issuer
            .set_color(PEER, ColorSelection::Rgb([1, 2, 3]))
            .await
            .unwrap();

        let sent = mock.sent_commands();
        assert_eq!(&sent[0][6..], &[0x20, BaseColor::RGB_OVERRIDE, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_set_all_active_broadcasts_and_updates_view() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        mock.set_peer_table(vec![PeerRecord {
            mac: PEER,
            last_seen: 0,
            last_sent_ping_us: 0,
            latency_us: 0,
            rssi: -50,
            valid_version: true,
            node_info: NodeInfo::default(),
        }]);
        let (issuer, sync, _) = issuer(&mock);
        sync.refresh().await.unwrap();

        // Act
        issuer.set_all_active(false).await.unwrap();

        // Assert
        assert_eq!(&mock.sent_commands()[0][..6], &MacAddress::BROADCAST.0);
        assert!(!sync.latest().get(PEER).unwrap().active);
    }

    #[tokio::test]
    async fn test_rejected_command_is_reported_and_not_retried() {
        let mock = Arc::new(MockTransport::usb());
        mock.fail_next_commands(1, TransportError::Rejected("stall".into()));
        let (issuer, sync, errors) = issuer(&mock);

        let result = issuer.set_active(PEER, false).await;

        assert!(matches!(result, Err(HostError::CommandRejected(_))));
        assert!(errors.latest().is_some());
        assert!(mock.sent_commands().is_empty());
        assert!(sync.latest().get(PEER).is_none());
    }

    #[tokio::test]
    async fn test_aborted_command_is_returned_but_not_surfaced() {
        let mock = Arc::new(MockTransport::usb());
        mock.fail_next_commands(1, TransportError::Aborted);
        let (issuer, _, errors) = issuer(&mock);

        let result = issuer.reset(PEER).await;

        assert!(result.unwrap_err().is_abort());
        assert_eq!(errors.latest(), None);
    }

    #[tokio::test]
    async fn test_update_game_config_recomputes_checksum() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        mock.set_game_config(GameConfig::new(settings()).unwrap());
        let (issuer, _, _) = issuer(&mock);

        // Act
        let updated = issuer
            .update_game_config(|s| s.buzz_effect = BuzzEffect::FlashWhite)
            .await
            .unwrap();

        // Assert
        assert_eq!(updated.settings().buzz_effect, BuzzEffect::FlashWhite);
        assert!(updated.verify_checksum().is_ok());
        assert_eq!(mock.game_config(), Some(updated));
    }

    #[tokio::test]
    async fn test_stale_game_config_is_never_written() {
        let mock = Arc::new(MockTransport::usb());
        let (issuer, _, _) = issuer(&mock);
        let mut bytes = GameConfig::new(settings()).unwrap().encode().unwrap();
        bytes[0] ^= 0xFF;
        let stale = GameConfig::decode(&bytes).unwrap();

        let result = issuer.write_game_config(&stale).await;

        assert!(matches!(
            result,
            Err(HostError::CommandRejected(TransportError::Protocol(_)))
        ));
        assert_eq!(mock.game_config(), None);
    }

    #[tokio::test]
    async fn test_ping_interval_round_trip_through_gateway() {
        let mock = Arc::new(MockTransport::usb());
        let (issuer, _, _) = issuer(&mock);

        issuer.write_ping_interval(250).await.unwrap();

        assert_eq!(issuer.read_ping_interval().await.unwrap(), 250);
    }
}

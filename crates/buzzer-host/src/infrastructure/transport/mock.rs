//! Scripted in-memory transport for tests.
//!
//! [`MockTransport`] behaves like a healthy gateway by default: opening,
//! claiming and version checks succeed, the peer table is empty and every
//! command is accepted.  Tests script failures and table contents up front,
//! then inspect what the code under test did (call log, sent payloads).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use buzzer_core::protocol::{GameConfig, PeerRecord, EXPECTED_DEVICE_VERSION};
use tokio::sync::mpsc;

use crate::application::transport::{
    BuzzerTransport, ConnectionInfo, DeviceEvent, DeviceEvents, PeerTableUpdates, TransportError,
    TransportKind,
};

const USB_POLL_INTERVAL: Duration = Duration::from_millis(500);
const BLE_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug)]
enum Notifications {
    Unsupported,
    Enabled,
    Rejected(TransportError),
}

#[derive(Debug)]
struct MockState {
    open: bool,
    plugged: bool,
    version: u8,
    table: Vec<PeerRecord>,
    game_config: Option<GameConfig>,
    ping_interval_ms: u16,
    claim_error: Option<TransportError>,
    open_failures: VecDeque<TransportError>,
    peer_read_failures: VecDeque<TransportError>,
    command_failures: VecDeque<TransportError>,
    notifications: Notifications,
    notify_tx: Option<mpsc::Sender<()>>,
    device_events: bool,
    device_tx: Option<mpsc::Sender<DeviceEvent>>,
    sent: Vec<Vec<u8>>,
    calls: Vec<&'static str>,
    open_calls: usize,
    peer_reads: usize,
}

/// A [`BuzzerTransport`] whose behaviour is scripted by the test.
pub struct MockTransport {
    kind: TransportKind,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(MockState {
                open: false,
                plugged: true,
                version: EXPECTED_DEVICE_VERSION,
                table: Vec::new(),
                game_config: None,
                ping_interval_ms: 1_000,
                claim_error: None,
                open_failures: VecDeque::new(),
                peer_read_failures: VecDeque::new(),
                command_failures: VecDeque::new(),
                notifications: Notifications::Unsupported,
                notify_tx: None,
                device_events: false,
                device_tx: None,
                sent: Vec::new(),
                calls: Vec::new(),
                open_calls: 0,
                peer_reads: 0,
            })),
        }
    }

    pub fn usb() -> Self {
        Self::new(TransportKind::Usb)
    }

    pub fn ble() -> Self {
        Self::new(TransportKind::Ble)
    }

    // ── Scripting ─────────────────────────────────────────────────────────────

    pub fn set_version(&self, version: u8) {
        self.state().version = version;
    }

    /// Table returned by every subsequent read.
    pub fn set_peer_table(&self, table: Vec<PeerRecord>) {
        self.state().table = table;
    }

    pub fn set_game_config(&self, config: GameConfig) {
        self.state().game_config = Some(config);
    }

    /// The next `count` calls to `open` fail with `err`.
    pub fn fail_next_opens(&self, count: usize, err: TransportError) {
        self.state().open_failures.extend(std::iter::repeat(err).take(count));
    }

    pub fn fail_next_peer_reads(&self, count: usize, err: TransportError) {
        self.state()
            .peer_read_failures
            .extend(std::iter::repeat(err).take(count));
    }

    pub fn fail_next_commands(&self, count: usize, err: TransportError) {
        self.state()
            .command_failures
            .extend(std::iter::repeat(err).take(count));
    }

    pub fn fail_claim(&self, err: TransportError) {
        self.state().claim_error = Some(err);
    }

    /// Makes `subscribe_peer_table` succeed.
    pub fn enable_notifications(&self) {
        self.state().notifications = Notifications::Enabled;
    }

    /// Makes `subscribe_peer_table` fail with `err`.
    pub fn reject_notifications(&self, err: TransportError) {
        self.state().notifications = Notifications::Rejected(err);
    }

    /// Sends one "peer table changed" notification.  Returns `false` if
    /// nobody is subscribed.
    pub fn notify_peer_table_changed(&self) -> bool {
        match &self.state().notify_tx {
            Some(tx) => tx.try_send(()).is_ok(),
            None => false,
        }
    }

    /// Closes the notification stream as if the link dropped it.
    pub fn end_notifications(&self) {
        self.state().notify_tx = None;
    }

    /// Makes `watch_devices` succeed.
    pub fn enable_device_events(&self) {
        self.state().device_events = true;
    }

    /// Pulls the device: every device operation fails with
    /// [`TransportError::Disconnected`], opening fails with `NotFound`, and
    /// watchers receive [`DeviceEvent::Removed`].
    pub fn unplug(&self) {
        let mut state = self.state();
        state.plugged = false;
        state.notify_tx = None;
        if let Some(tx) = &state.device_tx {
            let _ = tx.try_send(DeviceEvent::Removed);
        }
    }

    /// Reattaches the device and sends [`DeviceEvent::Arrived`].
    pub fn plug(&self) {
        let mut state = self.state();
        state.plugged = true;
        if let Some(tx) = &state.device_tx {
            let _ = tx.try_send(DeviceEvent::Arrived);
        }
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn sent_commands(&self) -> Vec<Vec<u8>> {
        self.state().sent.clone()
    }

    pub fn game_config(&self) -> Option<GameConfig> {
        self.state().game_config
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn open_calls(&self) -> usize {
        self.state().open_calls
    }

    pub fn peer_table_reads(&self) -> usize {
        self.state().peer_reads
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }

    fn record(&self, call: &'static str) -> std::sync::MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }

    /// [`MockTransport::record`] for operations that need the device attached.
    fn attached(
        &self,
        call: &'static str,
    ) -> Result<std::sync::MutexGuard<'_, MockState>, TransportError> {
        let state = self.record(call);
        if state.plugged {
            Ok(state)
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

#[async_trait]
impl BuzzerTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn poll_interval(&self) -> Duration {
        match self.kind {
            TransportKind::Usb => USB_POLL_INTERVAL,
            TransportKind::Ble => BLE_POLL_INTERVAL,
        }
    }

    async fn open(&self) -> Result<(), TransportError> {
        let mut state = self.record("open");
        state.open_calls += 1;
        if !state.plugged {
            return Err(TransportError::NotFound("mock gateway".into()));
        }
        if let Some(err) = state.open_failures.pop_front() {
            return Err(err);
        }
        state.open = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut state = self.record("close");
        state.open = false;
        state.notify_tx = None;
        Ok(())
    }

    async fn select_configuration(&self) -> Result<(), TransportError> {
        self.attached("select_configuration")?;
        Ok(())
    }

    async fn claim_interface(&self) -> Result<ConnectionInfo, TransportError> {
        let state = self.attached("claim_interface")?;
        if let Some(err) = state.claim_error.clone() {
            return Err(err);
        }
        Ok(match self.kind {
            TransportKind::Usb => ConnectionInfo::usb(1, 0),
            TransportKind::Ble => ConnectionInfo::ble(Vec::new()),
        })
    }

    async fn read_version(&self) -> Result<u8, TransportError> {
        Ok(self.attached("read_version")?.version)
    }

    async fn read_peer_table(&self) -> Result<Vec<PeerRecord>, TransportError> {
        let mut state = self.record("read_peer_table");
        state.peer_reads += 1;
        if !state.plugged {
            return Err(TransportError::Disconnected);
        }
        if let Some(err) = state.peer_read_failures.pop_front() {
            return Err(err);
        }
        Ok(state.table.clone())
    }

    async fn send_peer_command(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.attached("send_peer_command")?;
        if let Some(err) = state.command_failures.pop_front() {
            return Err(err);
        }
        state.sent.push(payload.to_vec());
        Ok(())
    }

    async fn read_game_config(&self) -> Result<GameConfig, TransportError> {
        self.attached("read_game_config")?
            .game_config
            .ok_or_else(|| TransportError::Rejected("no game configuration".into()))
    }

    async fn write_game_config(&self, config: &GameConfig) -> Result<(), TransportError> {
        self.attached("write_game_config")?.game_config = Some(*config);
        Ok(())
    }

    async fn read_ping_interval(&self) -> Result<u16, TransportError> {
        Ok(self.attached("read_ping_interval")?.ping_interval_ms)
    }

    async fn write_ping_interval(&self, interval_ms: u16) -> Result<(), TransportError> {
        self.attached("write_ping_interval")?.ping_interval_ms = interval_ms;
        Ok(())
    }

    async fn subscribe_peer_table(&self) -> Result<PeerTableUpdates, TransportError> {
        let mut state = self.attached("subscribe_peer_table")?;
        let rejection = match &state.notifications {
            Notifications::Unsupported => Some(TransportError::Unsupported {
                transport: self.kind,
                operation: "peer table notifications",
            }),
            Notifications::Rejected(err) => Some(err.clone()),
            Notifications::Enabled => None,
        };
        if let Some(err) = rejection {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(8);
        state.notify_tx = Some(tx);
        Ok(rx)
    }

    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        let mut state = self.record("watch_devices");
        if !state.device_events {
            return Err(TransportError::Unsupported {
                transport: self.kind,
                operation: "device arrival notifications",
            });
        }
        let (tx, rx) = mpsc::channel(8);
        state.device_tx = Some(tx);
        Ok(rx)
    }
}

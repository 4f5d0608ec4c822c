//! Connection lifecycle: drives a transport from "device present" to
//! "connected" and back.
//!
//! # States (for beginners)
//!
//! ```text
//! Disconnected ─► Opening ─► ConfigSelecting ─► InterfaceClaiming ─► VersionChecking ─► Connected
//!       ▲            │              │                    │                   │               │
//!       │            └──────────────┴────────► Error ◄───┴───────────────────┘               │
//!       └──────────────── close() / DeviceEvent::Removed / link lost ◄───────────────────────┘
//! ```
//!
//! - Opening is retried exactly once: after a failure the transport is
//!   closed, the lifecycle waits the configured backoff (100 ms by default)
//!   and opens again.  A second failure is reported as
//!   [`HostError::OpenFailed`].
//! - A version mismatch is *not* an error state.  The connection reaches
//!   `Connected`, but the device is flagged incompatible: no peer sync runs
//!   and [`ConnectionLifecycle::commands`] hands out nothing.
//! - Closing stops the peer sync task before the transport is released and
//!   discards everything learned from the device.
//! - When a peer-table read reports the device gone, the sync task tears the
//!   connection down the same way and the state returns to `Disconnected` on
//!   its own.  Watch it with [`ConnectionLifecycle::watch_state`]; feed
//!   [`ConnectionLifecycle::device_events`] back into
//!   [`ConnectionLifecycle::handle_event`] to reconnect when the device
//!   returns.

use std::sync::Arc;
use std::time::Duration;

use buzzer_core::protocol::EXPECTED_DEVICE_VERSION;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::commands::CommandIssuer;
use super::errors::{ErrorReporter, HostError};
use super::peer_sync::{PeerSnapshot, PeerSync, SyncHandle};
use super::transport::{BuzzerTransport, ConnectionInfo, DeviceEvents, TransportError, TransportKind};

pub use super::transport::DeviceEvent;

/// Default wait between the failed first open and the retry.
pub const DEFAULT_OPEN_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Opening,
    ConfigSelecting,
    InterfaceClaiming,
    VersionChecking,
    Connected,
    Error,
}

impl ConnectionState {
    /// `true` while a connection attempt is in progress or established.
    pub fn is_busy(self) -> bool {
        !matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub expected_version: u8,
    pub open_retry_backoff: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            expected_version: EXPECTED_DEVICE_VERSION,
            open_retry_backoff: DEFAULT_OPEN_RETRY_BACKOFF,
        }
    }
}

/// Everything learned from the device during one connection.
#[derive(Debug, Clone)]
struct Session {
    info: ConnectionInfo,
    version: u8,
    incompatible: bool,
}

/// Owns one transport and everything derived from it.
pub struct ConnectionLifecycle {
    transport: Arc<dyn BuzzerTransport>,
    options: LifecycleOptions,
    errors: ErrorReporter,
    state: Arc<watch::Sender<ConnectionState>>,
    sync: Arc<PeerSync>,
    sync_task: Option<SyncHandle>,
    session: Option<Session>,
}

impl ConnectionLifecycle {
    pub fn new(
        transport: Arc<dyn BuzzerTransport>,
        options: LifecycleOptions,
        errors: ErrorReporter,
    ) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Disconnected);
        let sync = Arc::new(PeerSync::new(transport.clone(), errors.clone()));
        Self {
            transport,
            options,
            errors,
            state: Arc::new(state),
            sync,
            sync_task: None,
            session: None,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn errors(&self) -> &ErrorReporter {
        &self.errors
    }

    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.session().map(|s| &s.info)
    }

    /// Firmware version of the connected device.
    pub fn device_version(&self) -> Option<u8> {
        self.session().map(|s| s.version)
    }

    pub fn is_incompatible(&self) -> bool {
        self.session().is_some_and(|s| s.incompatible)
    }

    /// `true` once connected to a device with the expected version.
    pub fn is_ready(&self) -> bool {
        self.session().is_some_and(|s| !s.incompatible)
    }

    /// Arrival and removal notifications for this slot's device.
    ///
    /// # Errors
    ///
    /// [`TransportError::Unsupported`] when the backend cannot watch for
    /// devices.
    pub async fn device_events(&self) -> Result<DeviceEvents, TransportError> {
        self.transport.watch_devices().await
    }

    /// Push-based peer view; `None` unless [`ConnectionLifecycle::is_ready`].
    pub fn peers(&self) -> Option<watch::Receiver<PeerSnapshot>> {
        self.is_ready().then(|| self.sync.subscribe())
    }

    /// Pull-based peer view; `None` unless [`ConnectionLifecycle::is_ready`].
    pub fn latest_peers(&self) -> Option<PeerSnapshot> {
        self.is_ready().then(|| self.sync.latest())
    }

    /// Command issuer; `None` unless [`ConnectionLifecycle::is_ready`].
    pub fn commands(&self) -> Option<CommandIssuer> {
        self.is_ready().then(|| {
            CommandIssuer::new(
                self.transport.clone(),
                self.sync.clone(),
                self.errors.clone(),
            )
        })
    }

    /// Runs the full connection sequence.
    ///
    /// Returns `Ok(())` when `Connected` is reached, even if the device turned
    /// out to be incompatible.  Calling this while already busy is a no-op.
    ///
    /// # Errors
    ///
    /// The [`HostError`] that moved the lifecycle to `Error`.  It has
    /// already been reported.
    pub async fn connect(&mut self) -> Result<(), HostError> {
        if self.state().is_busy() {
            debug!("{} connect ignored in state {:?}", self.kind(), self.state());
            return Ok(());
        }
        if let Some(finished) = self.sync_task.take() {
            finished.stop().await;
        }

        self.transition(ConnectionState::Opening);
        if let Err(e) = self.open_with_retry().await {
            return self.fail(HostError::OpenFailed(e)).await;
        }

        self.transition(ConnectionState::ConfigSelecting);
        if let Err(e) = self.transport.select_configuration().await {
            return self.fail(HostError::OpenFailed(e)).await;
        }

        self.transition(ConnectionState::InterfaceClaiming);
        let info = match self.transport.claim_interface().await {
            Ok(info) => info,
            Err(TransportError::NotFound(what)) => {
                debug!("claim failed: {what} not found");
                return self.fail(HostError::NoVendorInterface).await;
            }
            Err(e) => return self.fail(HostError::ClaimFailed(e)).await,
        };

        self.transition(ConnectionState::VersionChecking);
        let version = match self.transport.read_version().await {
            Ok(version) => version,
            Err(e) => return self.fail(HostError::ReadFailed(e)).await,
        };

        let expected = self.options.expected_version;
        let incompatible = version != expected;
        if incompatible {
            self.errors.report(HostError::VersionMismatch {
                actual: version,
                expected,
            });
        }

        self.session = Some(Session {
            info,
            version,
            incompatible,
        });
        self.transition(ConnectionState::Connected);

        if incompatible {
            warn!("{} gateway connected but disabled", self.kind());
        } else {
            info!(
                "{} gateway connected (firmware 0x{version:02X})",
                self.kind()
            );
            self.start_sync();
        }
        Ok(())
    }

    /// Stops peer sync, releases the transport and forgets the session.
    pub async fn close(&mut self) {
        if let Some(task) = self.sync_task.take() {
            task.stop().await;
        }
        self.sync.clear();

        if let Err(e) = self.transport.close().await {
            debug!("{} close: {e}", self.kind());
        }
        if self.session.take().is_some() {
            info!("{} gateway disconnected", self.kind());
        }
        self.transition(ConnectionState::Disconnected);
    }

    /// Reacts to a platform device notification.
    ///
    /// # Errors
    ///
    /// See [`ConnectionLifecycle::connect`].
    pub async fn handle_event(&mut self, event: DeviceEvent) -> Result<(), HostError> {
        match event {
            DeviceEvent::Arrived => self.connect().await,
            DeviceEvent::Removed => {
                self.close().await;
                Ok(())
            }
        }
    }

    /// Starts peer sync.  If the device disappears the task itself releases
    /// the transport and moves the lifecycle to `Disconnected`.
    fn start_sync(&mut self) {
        let kind = self.kind();
        let transport = self.transport.clone();
        let sync = self.sync.clone();
        let state = self.state.clone();
        let on_link_lost = async move {
            warn!("{kind} gateway lost");
            sync.clear();
            if let Err(e) = transport.close().await {
                debug!("{kind} close after link loss: {e}");
            }
            transition(&state, kind, ConnectionState::Disconnected);
        };
        self.sync_task = Some(SyncHandle::spawn_then(self.sync.clone(), on_link_lost));
    }

    async fn open_with_retry(&self) -> Result<(), TransportError> {
        match self.transport.open().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_abort() => Err(e),
            Err(first) => {
                debug!(
                    "{} open failed ({first}); retrying in {:?}",
                    self.kind(),
                    self.options.open_retry_backoff
                );
                if let Err(e) = self.transport.close().await {
                    debug!("close before retry: {e}");
                }
                tokio::time::sleep(self.options.open_retry_backoff).await;
                self.transport.open().await
            }
        }
    }

    async fn fail(&mut self, err: HostError) -> Result<(), HostError> {
        self.errors.report(err.clone());
        if let Err(e) = self.transport.close().await {
            debug!("{} close after failure: {e}", self.kind());
        }
        self.session = None;
        self.transition(ConnectionState::Error);
        Err(err)
    }

    fn session(&self) -> Option<&Session> {
        self.session
            .as_ref()
            .filter(|_| self.state() == ConnectionState::Connected)
    }

    fn transition(&self, next: ConnectionState) {
        transition(&self.state, self.kind(), next);
    }
}

fn transition(state: &watch::Sender<ConnectionState>, kind: TransportKind, next: ConnectionState) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!("{kind} lifecycle: {previous:?} -> {next:?}");
    }
}

// ── Device slots ──────────────────────────────────────────────────────────────

/// One lifecycle per transport kind.  A USB and a BLE gateway may be
/// connected at the same time; they share the error funnel but nothing else.
#[derive(Default)]
pub struct DeviceSlots {
    usb: Option<ConnectionLifecycle>,
    ble: Option<ConnectionLifecycle>,
}

impl DeviceSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `lifecycle` in the slot for its transport kind, closing the
    /// lifecycle it replaces.
    pub async fn attach(&mut self, lifecycle: ConnectionLifecycle) {
        let slot = self.slot_entry(lifecycle.kind());
        if let Some(mut previous) = slot.replace(lifecycle) {
            previous.close().await;
        }
    }

    /// Closes and removes the lifecycle for `kind`.
    pub async fn detach(&mut self, kind: TransportKind) {
        if let Some(mut lifecycle) = self.slot_entry(kind).take() {
            lifecycle.close().await;
        }
    }

    pub fn get(&self, kind: TransportKind) -> Option<&ConnectionLifecycle> {
        match kind {
            TransportKind::Usb => self.usb.as_ref(),
            TransportKind::Ble => self.ble.as_ref(),
        }
    }

    pub fn get_mut(&mut self, kind: TransportKind) -> Option<&mut ConnectionLifecycle> {
        self.slot_entry(kind).as_mut()
    }

    /// Occupied slots, USB first.
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionLifecycle> {
        self.usb.iter().chain(self.ble.iter())
    }

    pub async fn close_all(&mut self) {
        for slot in [&mut self.usb, &mut self.ble] {
            if let Some(lifecycle) = slot.as_mut() {
                lifecycle.close().await;
            }
        }
    }

    fn slot_entry(&mut self, kind: TransportKind) -> &mut Option<ConnectionLifecycle> {
        match kind {
            TransportKind::Usb => &mut self.usb,
            TransportKind::Ble => &mut self.ble,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

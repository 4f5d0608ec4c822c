//! Keeps a live, eventually-consistent view of every peer the gateway knows.
//!
//! # Algorithm
//!
//! Each refresh reads the whole peer table and *replaces* the previous
//! snapshot; there is no diffing or merging because the gateway holds the
//! authoritative table.  Broadcast and all-zero MAC slots are dropped before
//! the snapshot is published.
//!
//! Refreshes are driven by [`PeerSync::run`]:
//!
//! - if the transport offers change notifications, each notification triggers
//!   one re-read;
//! - otherwise (or when subscribing fails, or the notification stream ends)
//!   the table is polled every [`BuzzerTransport::poll_interval`].
//!
//! A read that fails with [`TransportError::Disconnected`] ends the loop; the
//! owner of the [`SyncHandle`] decides what happens to the connection.
//!
//! # The "active" toggle
//!
//! A peer is active unless it reports the inactive lifecycle state.  When the
//! host sends an activate/deactivate command it records an optimistic override
//! so the view reacts immediately.  The override is last-writer-wins and only
//! lives until the first snapshot whose read *started after* the command was
//! issued; from then on the device's own state wins again.
//!
//! # Consumers
//!
//! Pull with [`PeerSync::latest`] or push with [`PeerSync::subscribe`].

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use buzzer_core::protocol::{MacAddress, PeerRecord};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::errors::{ErrorReporter, HostError};
use super::transport::{BuzzerTransport, PeerTableUpdates, TransportError};

// ── Snapshot types ────────────────────────────────────────────────────────────

/// A peer as exposed to consumers: the raw record plus the derived toggle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerView {
    #[serde(flatten)]
    pub record: PeerRecord,
    pub active: bool,
}

impl PeerView {
    pub fn mac(&self) -> MacAddress {
        self.record.mac
    }
}

/// One published view of the peer table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeerSnapshot {
    /// Increments on every publication, including optimistic updates.
    pub sequence: u64,
    /// Number of table slots decoded, sentinel slots included.
    pub raw_count: usize,
    /// Real peers, in table order.
    pub peers: Vec<PeerView>,
}

impl PeerSnapshot {
    pub fn get(&self, mac: MacAddress) -> Option<&PeerView> {
        self.peers.iter().find(|p| p.record.mac == mac)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveOverride {
    active: bool,
    /// Number of refreshes that had started when the override was recorded.
    polls_started_at: u64,
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Peer synchronization engine for one gateway connection slot.
pub struct PeerSync {
    transport: Arc<dyn BuzzerTransport>,
    errors: ErrorReporter,
    snapshot: watch::Sender<PeerSnapshot>,
    table: Mutex<Vec<PeerRecord>>,
    overrides: Mutex<HashMap<MacAddress, ActiveOverride>>,
    polls_started: AtomicU64,
}

impl PeerSync {
    pub fn new(transport: Arc<dyn BuzzerTransport>, errors: ErrorReporter) -> Self {
        let (snapshot, _rx) = watch::channel(PeerSnapshot::default());
        Self {
            transport,
            errors,
            snapshot,
            table: Mutex::new(Vec::new()),
            overrides: Mutex::new(HashMap::new()),
            polls_started: AtomicU64::new(0),
        }
    }

    /// Most recent snapshot.
    pub fn latest(&self) -> PeerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified on every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PeerSnapshot> {
        self.snapshot.subscribe()
    }

    /// Reads the peer table once and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns the transport error unchanged; the previous snapshot stays
    /// published.
    pub async fn refresh(&self) -> Result<PeerSnapshot, TransportError> {
        let started = self.polls_started.fetch_add(1, Ordering::SeqCst) + 1;
        let table = self.transport.read_peer_table().await?;

        lock(&self.overrides).retain(|_, o| o.polls_started_at >= started);
        *lock(&self.table) = table;
        Ok(self.publish())
    }

    /// Records an optimistic active state for `mac` and republishes.
    pub fn set_active_local(&self, mac: MacAddress, active: bool) -> PeerSnapshot {
        let polls_started_at = self.polls_started.load(Ordering::SeqCst);
        lock(&self.overrides).insert(
            mac,
            ActiveOverride {
                active,
                polls_started_at,
            },
        );
        self.publish()
    }

    /// [`PeerSync::set_active_local`] for every peer currently in view.
    pub fn set_all_active_local(&self, active: bool) {
        let macs: Vec<MacAddress> = self.latest().peers.iter().map(PeerView::mac).collect();
        let polls_started_at = self.polls_started.load(Ordering::SeqCst);
        {
            let mut overrides = lock(&self.overrides);
            for mac in macs {
                overrides.insert(
                    mac,
                    ActiveOverride {
                        active,
                        polls_started_at,
                    },
                );
            }
        }
        self.publish();
    }

    /// Discards all derived state and publishes an empty snapshot.
    pub fn clear(&self) {
        lock(&self.table).clear();
        lock(&self.overrides).clear();
        self.publish();
    }

    /// Refresh loop.  Returns only when the transport reports the device
    /// gone ([`TransportError::Disconnected`]); otherwise it runs until the
    /// task is aborted (see [`SyncHandle`]).
    pub async fn run(self: Arc<Self>) {
        if self.refresh_and_report().await.is_break() {
            return;
        }

        let mut updates = match self.transport.subscribe_peer_table().await {
            Ok(rx) => {
                info!("{} peer table notifications enabled", self.transport.kind());
                Some(rx)
            }
            Err(TransportError::Unsupported { .. }) => None,
            Err(TransportError::Disconnected) => {
                self.errors
                    .report(HostError::ReadFailed(TransportError::Disconnected));
                return;
            }
            Err(e) => {
                warn!(
                    "peer table notifications rejected ({e}); polling every {:?}",
                    self.transport.poll_interval()
                );
                None
            }
        };

        let mut ticker = tokio::time::interval(self.transport.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let flow = tokio::select! {
                notified = next_update(&mut updates) => match notified {
                    Some(()) => self.refresh_and_report().await,
                    None => {
                        warn!("peer table notifications ended; falling back to polling");
                        updates = None;
                        ticker.reset();
                        ControlFlow::Continue(())
                    }
                },
                _ = ticker.tick(), if updates.is_none() => self.refresh_and_report().await,
            };
            if flow.is_break() {
                return;
            }
        }
    }

    /// Refreshes once.  Breaks when the device is gone.
    async fn refresh_and_report(&self) -> ControlFlow<()> {
        match self.refresh().await {
            Ok(snapshot) => {
                debug!(
                    "peer table refreshed: {} peers ({} slots)",
                    snapshot.len(),
                    snapshot.raw_count
                );
                ControlFlow::Continue(())
            }
            Err(e) => {
                let gone = e == TransportError::Disconnected;
                self.errors.report(HostError::ReadFailed(e));
                if gone {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        }
    }

    fn publish(&self) -> PeerSnapshot {
        let table = lock(&self.table);
        let overrides = lock(&self.overrides);

        let peers = table
            .iter()
            .filter(|record| !record.mac.is_sentinel())
            .map(|record| PeerView {
                active: overrides
                    .get(&record.mac)
                    .map(|o| o.active)
                    .unwrap_or_else(|| !record.node_info.reports_inactive()),
                record: record.clone(),
            })
            .collect();
        let raw_count = table.len();

        // Numbered under the channel's write lock.
        let mut published = None;
        self.snapshot.send_modify(|current| {
            *current = PeerSnapshot {
                sequence: current.sequence + 1,
                raw_count,
                peers,
            };
            published = Some(current.clone());
        });
        published.unwrap_or_default()
    }
}

async fn next_update(updates: &mut Option<PeerTableUpdates>) -> Option<()> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Locks `mutex`, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Task handle ───────────────────────────────────────────────────────────────

/// Owns the spawned refresh loop.  Stopping (or dropping) it cancels the loop
/// and any in-flight read, which also drops the notification subscription.
pub struct SyncHandle {
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Spawns the loop and runs `on_link_lost` in the same task once the
    /// loop returns because the device is gone.  Stopping the handle cancels
    /// both.
    pub fn spawn_then<F>(sync: Arc<PeerSync>, on_link_lost: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(async move {
                sync.run().await;
                on_link_lost.await;
            }),
        }
    }

    /// `true` once the loop has returned on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the loop and waits until it has fully stopped.
    pub async fn stop(mut self) {
        self.task.abort();
        if let Err(e) = (&mut self.task).await {
            if e.is_panic() {
                warn!("peer sync task panicked: {e}");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::mock::MockTransport;
    use buzzer_core::protocol::{NodeInfo, NodeState};

    fn peer(last: u8, state: NodeState) -> PeerRecord {
        PeerRecord {
            mac: MacAddress([0x24, 0x0A, 0xC4, 0x00, 0x00, last]),
            last_seen: 0,
            last_sent_ping_us: 0,
            latency_us: 0,
            rssi: -60,
            valid_version: true,
            node_info: NodeInfo {
                current_state: state as u8,
                ..NodeInfo::default()
            },
        }
    }

    fn engine(mock: &Arc<MockTransport>) -> PeerSync {
        PeerSync::new(mock.clone(), ErrorReporter::new())
    }

    #[tokio::test]
    async fn test_refresh_filters_sentinel_slots() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        let mut zero = peer(0, NodeState::Default);
        zero.mac = MacAddress::ZERO;
        let mut broadcast = peer(0, NodeState::Default);
        broadcast.mac = MacAddress::BROADCAST;
        mock.set_peer_table(vec![zero, peer(1, NodeState::Default), broadcast]);
        let sync = engine(&mock);

        // Act
        let snapshot = sync.refresh().await.expect("refresh");

        // Assert
        assert_eq!(snapshot.raw_count, 3);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.peers[0].mac(), peer(1, NodeState::Default).mac);
    }

    #[tokio::test]
    async fn test_snapshot_replaces_previous_table_entirely() {
        let mock = Arc::new(MockTransport::usb());
        mock.set_peer_table(vec![peer(1, NodeState::Default), peer(2, NodeState::Default)]);
        let sync = engine(&mock);
        sync.refresh().await.unwrap();

        mock.set_peer_table(vec![peer(3, NodeState::Default)]);
        let snapshot = sync.refresh().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(peer(1, NodeState::Default).mac).is_none());
    }

    #[tokio::test]
    async fn test_active_is_derived_from_reported_state() {
        let mock = Arc::new(MockTransport::usb());
        mock.set_peer_table(vec![peer(1, NodeState::Default), peer(2, NodeState::Shutdown)]);
        let sync = engine(&mock);

        let snapshot = sync.refresh().await.unwrap();

        assert!(snapshot.peers[0].active);
        assert!(!snapshot.peers[1].active);
    }

    #[tokio::test]
    async fn test_optimistic_override_is_visible_until_next_poll() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        let target = peer(1, NodeState::Default);
        mock.set_peer_table(vec![target.clone()]);
        let sync = engine(&mock);
        sync.refresh().await.unwrap();

        // Act
        sync.set_active_local(target.mac, false);
        let optimistic = sync.latest();
        let confirmed = sync.refresh().await.unwrap();

        // Assert: local prediction first, then the device wins
        assert!(!optimistic.get(target.mac).unwrap().active);
        assert!(confirmed.get(target.mac).unwrap().active);
    }

    #[tokio::test]
    async fn test_set_all_active_local_covers_every_peer_in_view() {
        let mock = Arc::new(MockTransport::usb());
        mock.set_peer_table(vec![peer(1, NodeState::Default), peer(2, NodeState::Default)]);
        let sync = engine(&mock);
        sync.refresh().await.unwrap();

        sync.set_all_active_local(false);

        assert!(sync.latest().peers.iter().all(|p| !p.active));
    }

    #[tokio::test]
    async fn test_clear_discards_peers_and_overrides() {
        let mock = Arc::new(MockTransport::usb());
        let target = peer(1, NodeState::Default);
        mock.set_peer_table(vec![target.clone()]);
        let sync = engine(&mock);
        sync.refresh().await.unwrap();
        sync.set_active_local(target.mac, false);

        sync.clear();

        assert!(sync.latest().is_empty());
        assert_eq!(sync.latest().raw_count, 0);
    }

    #[tokio::test]
    async fn test_sequence_increments_on_every_publication() {
        let mock = Arc::new(MockTransport::usb());
        let sync = engine(&mock);
        let first = sync.refresh().await.unwrap().sequence;
        let second = sync.refresh().await.unwrap().sequence;
        assert_eq!(second, first + 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let mock = Arc::new(MockTransport::usb());
        mock.set_peer_table(vec![peer(1, NodeState::Default)]);
        let sync = engine(&mock);
        sync.refresh().await.unwrap();

        mock.fail_next_peer_reads(1, TransportError::Disconnected);
        let result = sync.refresh().await;

        assert_eq!(result.unwrap_err(), TransportError::Disconnected);
        assert_eq!(sync.latest().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_when_device_is_gone() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        let errors = ErrorReporter::new();
        let sync = Arc::new(PeerSync::new(mock.clone(), errors.clone()));
        mock.fail_next_peer_reads(1, TransportError::Timeout);
        mock.fail_next_peer_reads(1, TransportError::Disconnected);

        // Act
        sync.run().await;

        // Assert: a timeout is retried on the next tick, a lost device is not
        assert_eq!(mock.peer_table_reads(), 2);
        assert_eq!(
            errors.latest(),
            Some(HostError::ReadFailed(TransportError::Disconnected))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_then_runs_hook_after_link_loss() {
        let mock = Arc::new(MockTransport::usb());
        mock.fail_next_peer_reads(1, TransportError::Disconnected);
        let sync = Arc::new(engine(&mock));
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = SyncHandle::spawn_then(sync, async move {
            let _ = tx.send(());
        });

        assert!(rx.await.is_ok());
        tokio::task::yield_now().await;
        assert!(handle.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_never_reorder_sequences() {
        // Arrange
        let mock = Arc::new(MockTransport::usb());
        mock.set_peer_table(vec![peer(1, NodeState::Default)]);
        let sync = Arc::new(engine(&mock));
        sync.refresh().await.unwrap();
        let mac = peer(1, NodeState::Default).mac;

        // Act
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let sync = sync.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    for _ in 0..50 {
                        seen.push(sync.set_active_local(mac, i % 2 == 0).sequence);
                    }
                    seen
                })
            })
            .collect();
        let mut all = Vec::new();
        for writer in writers {
            let seen = writer.await.unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            all.extend(seen);
        }

        // Assert: every publication got its own number
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 50);
        assert_eq!(sync.latest().sequence, 1 + 8 * 50);
    }
}

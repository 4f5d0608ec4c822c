//! Integration tests for peer synchronization over a connected gateway.
//!
//! # Purpose
//!
//! These tests connect a `ConnectionLifecycle` to a scripted `MockTransport`
//! and observe the peer view the way a UI would.  They verify:
//!
//! - Snapshots replace each other wholesale and never contain sentinel MACs.
//! - USB polls every 500 ms; BLE re-reads on every notification and falls
//!   back to 1000 ms polling when notifications are unavailable or stop.
//! - Read failures are funnelled through the error reporter; a lost device
//!   stops the refresh loop.
//! - The optimistic active toggle is visible at once and yields to the
//!   device on the next poll.
//!
//! All tests run on Tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use buzzer_core::protocol::{MacAddress, NodeInfo, NodeState, PeerRecord, MAX_PEERS};
use buzzer_host::application::errors::{ErrorReporter, HostError};
use buzzer_host::application::lifecycle::{ConnectionLifecycle, LifecycleOptions};
use buzzer_host::application::transport::TransportError;
use buzzer_host::infrastructure::transport::mock::MockTransport;

const PEER: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

fn peer(mac: MacAddress, state: NodeState) -> PeerRecord {
    PeerRecord {
        mac,
        last_seen: 1_000,
        last_sent_ping_us: 0,
        latency_us: 2_500,
        rssi: -65,
        valid_version: true,
        node_info: NodeInfo {
            version: 0x13,
            battery_percent: 80,
            current_state: state as u8,
            ..NodeInfo::default()
        },
    }
}

/// A full 20-slot table holding one real peer; the other slots are zero.
fn table_with_one_peer() -> Vec<PeerRecord> {
    let mut table = vec![peer(MacAddress::ZERO, NodeState::Default); MAX_PEERS];
    table[3] = peer(PEER, NodeState::Default);
    table
}

async fn connected(mock: &Arc<MockTransport>) -> (ConnectionLifecycle, ErrorReporter) {
    let errors = ErrorReporter::new();
    let mut lc = ConnectionLifecycle::new(mock.clone(), LifecycleOptions::default(), errors.clone());
    lc.connect().await.expect("connect");
    (lc, errors)
}

/// Lets spawned tasks run without moving past the next poll.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ── Snapshots ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_full_table_yields_only_real_peers() {
    // Arrange
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    let (mut lc, _) = connected(&mock).await;
    let mut peers = lc.peers().expect("compatible device");

    // Act
    peers.changed().await.expect("first snapshot");
    let snapshot = peers.borrow().clone();

    // Assert
    assert_eq!(snapshot.raw_count, 20);
    assert_eq!(snapshot.len(), 1);
    let view = snapshot.get(PEER).expect("real peer present");
    assert!(view.active);
    assert_eq!(view.record.latency_ms(), Some(2.5));

    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_mac_slots_are_dropped() {
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(vec![
        peer(MacAddress::BROADCAST, NodeState::Default),
        peer(PEER, NodeState::Shutdown),
    ]);
    let (mut lc, _) = connected(&mock).await;
    settle().await;

    let snapshot = lc.latest_peers().expect("compatible device");

    assert_eq!(snapshot.raw_count, 2);
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot.peers[0].active, "shutdown state reads as inactive");
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_peer_leaving_table_disappears_from_next_snapshot() {
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    let (mut lc, _) = connected(&mock).await;
    settle().await;

    mock.set_peer_table(Vec::new());
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(lc.latest_peers().unwrap().is_empty());
    lc.close().await;
}

// ── Refresh triggers ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_usb_polls_every_500ms() {
    let mock = Arc::new(MockTransport::usb());
    let (mut lc, _) = connected(&mock).await;

    tokio::time::sleep(Duration::from_millis(1_250)).await;

    assert_eq!(mock.peer_table_reads(), 3);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_ble_notifications_trigger_reads_without_polling() {
    // Arrange
    let mock = Arc::new(MockTransport::ble());
    mock.enable_notifications();
    let (mut lc, _) = connected(&mock).await;
    settle().await;

    // Act: a quiet period, then one notification
    tokio::time::sleep(Duration::from_secs(5)).await;
    let reads_when_quiet = mock.peer_table_reads();
    assert!(mock.notify_peer_table_changed());
    settle().await;

    // Assert
    assert_eq!(reads_when_quiet, 1, "only the initial read");
    assert_eq!(mock.peer_table_reads(), 2);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_ble_subscription_falls_back_to_one_second_polling() {
    let mock = Arc::new(MockTransport::ble());
    mock.reject_notifications(TransportError::Rejected("notify not permitted".into()));
    let (mut lc, _) = connected(&mock).await;

    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert_eq!(mock.peer_table_reads(), 3);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_ended_notification_stream_falls_back_to_polling() {
    // Arrange
    let mock = Arc::new(MockTransport::ble());
    mock.enable_notifications();
    let (mut lc, _) = connected(&mock).await;
    settle().await;

    // Act
    mock.end_notifications();
    settle().await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    // Assert
    assert_eq!(mock.peer_table_reads(), 2);
    lc.close().await;
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_read_failure_is_reported_and_polling_continues() {
    // Arrange
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    mock.fail_next_peer_reads(1, TransportError::Timeout);
    let (mut lc, errors) = connected(&mock).await;

    // Act
    settle().await;
    let error_after_first_read = errors.latest();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Assert
    assert_eq!(
        error_after_first_read,
        Some(HostError::ReadFailed(TransportError::Timeout))
    );
    assert_eq!(lc.latest_peers().unwrap().len(), 1);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_aborted_read_is_not_surfaced() {
    let mock = Arc::new(MockTransport::usb());
    mock.fail_next_peer_reads(1, TransportError::Aborted);
    let (mut lc, errors) = connected(&mock).await;

    settle().await;

    assert_eq!(errors.latest(), None);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_lost_device_stops_polling_and_empties_the_view() {
    // Arrange
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    let (lc, _) = connected(&mock).await;
    let mut peers = lc.peers().expect("compatible device");
    settle().await;
    assert_eq!(peers.borrow_and_update().len(), 1);

    // Act
    mock.unplug();
    tokio::time::sleep(Duration::from_secs(3)).await;

    // Assert
    assert_eq!(mock.peer_table_reads(), 2);
    assert!(peers.has_changed().unwrap());
    assert!(peers.borrow_and_update().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ble_link_loss_during_notifications_is_detected_by_fallback_poll() {
    let mock = Arc::new(MockTransport::ble());
    mock.enable_notifications();
    let (lc, _) = connected(&mock).await;
    settle().await;

    mock.unplug();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(mock.peer_table_reads(), 2);
    assert!(!lc.is_ready());
}

// ── Active toggle ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_deactivate_is_optimistic_until_device_reports() {
    // Arrange
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    let (mut lc, _) = connected(&mock).await;
    settle().await;
    let commands = lc.commands().expect("compatible device");

    // Act
    commands.set_active(PEER, false).await.expect("command accepted");
    let optimistic = lc.latest_peers().unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let after_poll = lc.latest_peers().unwrap();

    // Assert: the gateway kept reporting the peer as active, so it wins
    assert!(!optimistic.get(PEER).unwrap().active);
    assert!(after_poll.get(PEER).unwrap().active);
    assert_eq!(&mock.sent_commands()[0], &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x31]);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_confirmed_by_device_stays_inactive() {
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    let (mut lc, _) = connected(&mock).await;
    settle().await;
    let commands = lc.commands().unwrap();

    commands.set_active(PEER, false).await.unwrap();
    let mut table = table_with_one_peer();
    table[3].node_info.current_state = NodeState::INACTIVE;
    mock.set_peer_table(table);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(!lc.latest_peers().unwrap().get(PEER).unwrap().active);
    lc.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_cleared_on_close() {
    let mock = Arc::new(MockTransport::usb());
    mock.set_peer_table(table_with_one_peer());
    let (mut lc, _) = connected(&mock).await;
    let mut peers = lc.peers().unwrap();
    settle().await;

    lc.close().await;

    assert!(peers.borrow_and_update().is_empty());
    assert!(lc.latest_peers().is_none());
}

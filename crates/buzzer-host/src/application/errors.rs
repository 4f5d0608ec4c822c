//! Host-level error taxonomy and the single funnel every failure goes through.
//!
//! Every component (lifecycle, peer engine, command issuer) hands its failures
//! to a shared [`ErrorReporter`].  The reporter:
//!
//! 1. drops aborts (user-initiated cancellation) without a trace,
//! 2. logs everything else with `tracing`,
//! 3. keeps only the most recent user-visible error; nothing accumulates.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use super::transport::{TransportError, TransportKind};

/// Everything that can go wrong between the host and a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host platform has no usable USB or BLE stack.  Fatal, no retry.
    #[error("{0} is not available on this platform")]
    TransportUnavailable(TransportKind),

    /// No device was selected or none matched the filter.  Never shown.
    #[error("no device acquired: {0}")]
    AcquisitionFailed(String),

    /// Opening failed twice (initial attempt plus one retry).
    #[error("failed to open device: {0}")]
    OpenFailed(TransportError),

    #[error("failed to claim device interface: {0}")]
    ClaimFailed(TransportError),

    #[error("device exposes no vendor interface")]
    NoVendorInterface,

    /// The device speaks another protocol revision.  Non-fatal; gates
    /// commands and the peer view until the device changes.
    #[error(
        "incompatible device firmware: version 0x{actual:02X} ({actual}), expected 0x{expected:02X} ({expected})"
    )]
    VersionMismatch { actual: u8, expected: u8 },

    #[error("command rejected: {0}")]
    CommandRejected(TransportError),

    #[error("read failed: {0}")]
    ReadFailed(TransportError),

    #[error("operation aborted")]
    Aborted,
}

impl HostError {
    /// `true` for aborts, including transport aborts wrapped in another variant.
    pub fn is_abort(&self) -> bool {
        match self {
            HostError::Aborted => true,
            HostError::OpenFailed(e)
            | HostError::ClaimFailed(e)
            | HostError::CommandRejected(e)
            | HostError::ReadFailed(e) => e.is_abort(),
            _ => false,
        }
    }

    /// `true` if the error should reach the user.
    pub fn is_user_visible(&self) -> bool {
        !self.is_abort() && !matches!(self, HostError::AcquisitionFailed(_))
    }
}

/// Shared sink for host errors.  Cheap to clone; all clones share one slot.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    latest: Arc<watch::Sender<Option<HostError>>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            latest: Arc::new(tx),
        }
    }

    /// Funnels `err`.  Returns `true` if it became the latest visible error.
    pub fn report(&self, err: HostError) -> bool {
        if err.is_abort() {
            return false;
        }
        if !err.is_user_visible() {
            debug!("ignored: {err}");
            return false;
        }
        match err {
            HostError::VersionMismatch { .. } | HostError::CommandRejected(_) | HostError::ReadFailed(_) => {
                warn!("{err}");
            }
            _ => error!("{err}"),
        }
        self.latest.send_replace(Some(err));
        true
    }

    /// Convenience for `Result`s: reports the error and passes the result on.
    pub fn check<T>(&self, result: Result<T, HostError>) -> Result<T, HostError> {
        if let Err(ref err) = result {
            self.report(err.clone());
        }
        result
    }

    /// Most recent user-visible error, if any.
    pub fn latest(&self) -> Option<HostError> {
        self.latest.borrow().clone()
    }

    pub fn clear(&self) {
        self.latest.send_replace(None);
    }

    /// Push-based view of [`ErrorReporter::latest`].
    pub fn subscribe(&self) -> watch::Receiver<Option<HostError>> {
        self.latest.subscribe()
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

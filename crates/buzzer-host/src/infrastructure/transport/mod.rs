//! Transport adapters implementing
//! [`BuzzerTransport`](crate::application::transport::BuzzerTransport).
//!
//! - [`usb::UsbTransport`] over any [`usb::UsbControl`]; the libusb backend
//!   is compiled with the `usb` feature.
//! - [`ble::BleTransport`] over any [`ble::GattLink`]; the bluest backend is
//!   compiled with the `ble` feature.
//! - [`mock::MockTransport`] for tests.
//!
//! [`build_transport`] picks the concrete backend for a transport kind.
//! Without the matching feature it reports
//! [`HostError::TransportUnavailable`].

pub mod ble;
pub mod mock;
pub mod usb;

#[cfg(feature = "ble")]
pub mod bluest_backend;
#[cfg(feature = "usb")]
pub mod rusb_backend;

use std::sync::Arc;

use crate::application::errors::HostError;
use crate::application::transport::{BuzzerTransport, TransportKind};
use crate::infrastructure::storage::config::{AppConfig, BleConfig, UsbConfig};

/// Creates the hardware transport for `kind` from the configuration.
///
/// # Errors
///
/// - [`HostError::TransportUnavailable`] if the backend is not compiled in or
///   the host has no usable USB/Bluetooth stack.
/// - [`HostError::AcquisitionFailed`] if the transport is disabled in the
///   configuration or no matching device is attached.
pub async fn build_transport(
    kind: TransportKind,
    config: &AppConfig,
) -> Result<Arc<dyn BuzzerTransport>, HostError> {
    match kind {
        TransportKind::Usb if !config.usb.enabled => Err(HostError::AcquisitionFailed(
            "USB is disabled in the configuration".into(),
        )),
        TransportKind::Ble if !config.ble.enabled => Err(HostError::AcquisitionFailed(
            "BLE is disabled in the configuration".into(),
        )),
        TransportKind::Usb => build_usb(&config.usb),
        TransportKind::Ble => build_ble(&config.ble).await,
    }
}

#[cfg(feature = "usb")]
fn build_usb(config: &UsbConfig) -> Result<Arc<dyn BuzzerTransport>, HostError> {
    use rusb_backend::RusbControl;
    use usb::UsbTransport;

    if !RusbControl::is_available() {
        return Err(HostError::TransportUnavailable(TransportKind::Usb));
    }
    let control = RusbControl::new(config.vendor_id, config.product_id, config.control_timeout());
    if !control.is_present() {
        return Err(HostError::AcquisitionFailed(format!(
            "no USB device with vendor id {:04x}",
            config.vendor_id
        )));
    }
    Ok(Arc::new(UsbTransport::with_poll_interval(
        control,
        config.poll_interval(),
    )))
}

#[cfg(not(feature = "usb"))]
fn build_usb(_config: &UsbConfig) -> Result<Arc<dyn BuzzerTransport>, HostError> {
    Err(HostError::TransportUnavailable(TransportKind::Usb))
}

#[cfg(feature = "ble")]
async fn build_ble(config: &BleConfig) -> Result<Arc<dyn BuzzerTransport>, HostError> {
    use ble::BleTransport;
    use bluest_backend::BluestLink;

    let link = BluestLink::new(config.service_uuid, config.scan_timeout())
        .await
        .map_err(|e| {
            tracing::debug!("Bluetooth adapter unavailable: {e}");
            HostError::TransportUnavailable(TransportKind::Ble)
        })?;
    Ok(Arc::new(BleTransport::with_service(
        link,
        config.service_uuid,
        config.fallback_poll_interval(),
    )))
}

#[cfg(not(feature = "ble"))]
async fn build_ble(_config: &BleConfig) -> Result<Arc<dyn BuzzerTransport>, HostError> {
    Err(HostError::TransportUnavailable(TransportKind::Ble))
}

//! libusb-backed [`UsbControl`] (feature `usb`).
//!
//! rusb is a blocking API, so every call runs on Tokio's blocking pool via
//! `spawn_blocking`.  The open handle lives behind a mutex shared with those
//! blocking closures; once [`UsbControl::close`] drops it, further calls fail
//! with [`TransportError::NotOpen`].
//!
//! Hot-plug notifications use libusb's hot-plug callbacks.  A blocking worker
//! pumps libusb events until the receiver is dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use buzzer_core::protocol::ControlRequest;
use rusb::{
    Device, DeviceHandle, Direction, GlobalContext, Hotplug, HotplugBuilder, Recipient,
    RequestType, UsbContext,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::usb::{InterfaceDescriptor, UsbControl};
use crate::application::transport::{DeviceEvent, DeviceEvents, TransportError, TransportKind};

/// How long one libusb event pump waits before checking for a dropped receiver.
const HOTPLUG_PUMP_TIMEOUT: Duration = Duration::from_millis(500);

type SharedHandle = Arc<Mutex<Option<DeviceHandle<GlobalContext>>>>;

/// Selects the first device matching `vendor_id` (and `product_id`, if set).
pub struct RusbControl {
    vendor_id: u16,
    product_id: Option<u16>,
    timeout: Duration,
    handle: SharedHandle,
}

impl RusbControl {
    pub fn new(vendor_id: u16, product_id: Option<u16>, timeout: Duration) -> Self {
        Self {
            vendor_id,
            product_id,
            timeout,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// `true` if libusb can enumerate devices on this host.
    pub fn is_available() -> bool {
        rusb::devices().is_ok()
    }

    /// `true` if a matching device is currently attached.
    pub fn is_present(&self) -> bool {
        rusb::devices()
            .map(|list| {
                list.iter().any(|device| {
                    device
                        .device_descriptor()
                        .map(|d| self.matches(d.vendor_id(), d.product_id()))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        vendor_id == self.vendor_id && self.product_id.map_or(true, |p| p == product_id)
    }

    async fn with_handle<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceHandle<GlobalContext>) -> Result<T, TransportError> + Send + 'static,
    {
        let handle = self.handle.clone();
        blocking(move || {
            let guard = handle
                .lock()
                .map_err(|_| TransportError::Rejected("device handle lock poisoned".into()))?;
            let handle = guard.as_ref().ok_or(TransportError::NotOpen)?;
            op(handle)
        })
        .await
    }
}

async fn blocking<T, F>(op: F) -> Result<T, TransportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, TransportError> + Send + 'static,
{
    tokio::task::spawn_blocking(op).await.map_err(|e| {
        if e.is_cancelled() {
            TransportError::Aborted
        } else {
            TransportError::Rejected(format!("USB worker failed: {e}"))
        }
    })?
}

fn map_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Interrupted => TransportError::Aborted,
        rusb::Error::NoDevice => TransportError::Disconnected,
        rusb::Error::NotFound => TransportError::NotFound("USB resource".into()),
        rusb::Error::Timeout => TransportError::Timeout,
        other => TransportError::Rejected(other.to_string()),
    }
}

/// Forwards libusb hot-plug callbacks into a [`DeviceEvents`] channel.
struct HotplugForwarder {
    tx: mpsc::Sender<DeviceEvent>,
}

impl HotplugForwarder {
    fn forward(&self, event: DeviceEvent, device: &Device<GlobalContext>) {
        debug!(
            "USB {event:?}: bus {} address {}",
            device.bus_number(),
            device.address()
        );
        if let Err(e) = self.tx.try_send(event) {
            warn!("dropped USB {event:?} notification: {e}");
        }
    }
}

impl Hotplug<GlobalContext> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<GlobalContext>) {
        self.forward(DeviceEvent::Arrived, &device);
    }

    fn device_left(&mut self, device: Device<GlobalContext>) {
        self.forward(DeviceEvent::Removed, &device);
    }
}

fn vendor_request(direction: Direction) -> u8 {
    rusb::request_type(direction, RequestType::Vendor, Recipient::Device)
}

#[async_trait]
impl UsbControl for RusbControl {
    async fn open(&self) -> Result<(), TransportError> {
        let (vendor_id, product_id) = (self.vendor_id, self.product_id);
        let handle = blocking(move || {
            let devices = GlobalContext::default().devices().map_err(map_error)?;
            let device = devices
                .iter()
                .find(|device| {
                    device.device_descriptor().is_ok_and(|d| {
                        d.vendor_id() == vendor_id && product_id.map_or(true, |p| p == d.product_id())
                    })
                })
                .ok_or_else(|| TransportError::NotFound(format!("USB device {vendor_id:04x}")))?;
            device.open().map_err(map_error)
        })
        .await?;

        info!(
            "opened USB device {:04x} (bus {}, address {})",
            self.vendor_id,
            handle.device().bus_number(),
            handle.device().address()
        );
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| TransportError::Rejected("device handle lock poisoned".into()))?;
        *slot = Some(handle);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let previous = self
            .handle
            .lock()
            .map_err(|_| TransportError::Rejected("device handle lock poisoned".into()))?
            .take();
        if previous.is_some() {
            debug!("closed USB device {:04x}", self.vendor_id);
        }
        Ok(())
    }

    async fn active_configuration(&self) -> Result<Option<u8>, TransportError> {
        self.with_handle(|h| {
            let value = h.active_configuration().map_err(map_error)?;
            Ok((value != 0).then_some(value))
        })
        .await
    }

    async fn default_configuration(&self) -> Result<u8, TransportError> {
        self.with_handle(|h| {
            let config = h.device().config_descriptor(0).map_err(map_error)?;
            Ok(config.number())
        })
        .await
    }

    async fn set_configuration(&self, value: u8) -> Result<(), TransportError> {
        self.with_handle(move |h| h.set_active_configuration(value).map_err(map_error))
            .await
    }

    async fn interfaces(&self) -> Result<Vec<InterfaceDescriptor>, TransportError> {
        self.with_handle(|h| {
            let config = h.device().active_config_descriptor().map_err(map_error)?;
            Ok(config
                .interfaces()
                .filter_map(|interface| {
                    interface.descriptors().next().map(|d| InterfaceDescriptor {
                        number: interface.number(),
                        class_code: d.class_code(),
                    })
                })
                .collect())
        })
        .await
    }

    async fn claim_interface(&self, number: u8) -> Result<(), TransportError> {
        self.with_handle(move |h| h.claim_interface(number).map_err(map_error))
            .await
    }

    async fn release_interface(&self, number: u8) -> Result<(), TransportError> {
        self.with_handle(move |h| h.release_interface(number).map_err(map_error))
            .await
    }

    async fn control_in(
        &self,
        request: ControlRequest,
        length: u16,
    ) -> Result<Vec<u8>, TransportError> {
        let timeout = self.timeout;
        self.with_handle(move |h| {
            let mut buf = vec![0u8; usize::from(length)];
            let read = h
                .read_control(
                    vendor_request(Direction::In),
                    request.request,
                    request.value,
                    request.index,
                    &mut buf,
                    timeout,
                )
                .map_err(map_error)?;
            buf.truncate(read);
            Ok(buf)
        })
        .await
    }

    async fn control_out(&self, request: ControlRequest, data: &[u8]) -> Result<(), TransportError> {
        let timeout = self.timeout;
        let data = data.to_vec();
        self.with_handle(move |h| {
            let written = h
                .write_control(
                    vendor_request(Direction::Out),
                    request.request,
                    request.value,
                    request.index,
                    &data,
                    timeout,
                )
                .map_err(map_error)?;
            if written != data.len() {
                return Err(TransportError::Rejected(format!(
                    "short write: {written} of {} bytes",
                    data.len()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        if !rusb::has_hotplug() {
            return Err(TransportError::Unsupported {
                transport: TransportKind::Usb,
                operation: "hot-plug notifications",
            });
        }

        let (tx, rx) = mpsc::channel(8);
        let mut builder = HotplugBuilder::new();
        builder.vendor_id(self.vendor_id).enumerate(false);
        if let Some(product_id) = self.product_id {
            builder.product_id(product_id);
        }
        let callback: Box<dyn Hotplug<GlobalContext>> =
            Box::new(HotplugForwarder { tx: tx.clone() });
        let registration = builder
            .register(GlobalContext::default(), callback)
            .map_err(map_error)?;

        let vendor_id = self.vendor_id;
        tokio::task::spawn_blocking(move || {
            let _registration = registration;
            while !tx.is_closed() {
                if let Err(e) = GlobalContext::default().handle_events(Some(HOTPLUG_PUMP_TIMEOUT)) {
                    warn!("USB event handling failed: {e}");
                    break;
                }
            }
            debug!("stopped watching USB device {vendor_id:04x}");
        });
        info!("watching for USB device {:04x}", self.vendor_id);
        Ok(rx)
    }
}

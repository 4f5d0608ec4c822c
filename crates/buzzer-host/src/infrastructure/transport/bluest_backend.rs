//! bluest-backed [`GattLink`] (feature `ble`).
//!
//! Connecting scans for the first peripheral advertising the gateway service,
//! bounded by the configured scan timeout.  Discovered characteristics are
//! cached per connection and dropped on disconnect.
//!
//! Device watching scans for the gateway's advertisement (it only advertises
//! while nobody is connected) and then follows its connection events until
//! the link drops.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ble::GattLink;
use crate::application::transport::{
    DeviceEvent, DeviceEvents, PeerTableUpdates, TransportError,
};

struct Connected {
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
}

pub struct BluestLink {
    adapter: Adapter,
    service: Uuid,
    scan_timeout: Duration,
    connected: Mutex<Option<Connected>>,
}

impl BluestLink {
    /// Opens the default Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotFound`] if the host has no usable adapter.
    pub async fn new(service: Uuid, scan_timeout: Duration) -> Result<Self, TransportError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| TransportError::NotFound("Bluetooth adapter".into()))?;
        adapter.wait_available().await.map_err(map_error)?;
        Ok(Self {
            adapter,
            service,
            scan_timeout,
            connected: Mutex::new(None),
        })
    }

    async fn scan(&self) -> Result<Device, TransportError> {
        let service = self.service;
        let search = async {
            let mut devices = self
                .adapter
                .discover_devices(&[service])
                .await
                .map_err(map_error)?;
            match devices.next().await {
                Some(device) => device.map_err(map_error),
                None => Err(TransportError::NotFound(format!("peripheral advertising {service}"))),
            }
        };
        tokio::time::timeout(self.scan_timeout, search)
            .await
            .map_err(|_| TransportError::NotFound(format!("peripheral advertising {service}")))?
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        let connected = self.connected.lock().await;
        let connected = connected.as_ref().ok_or(TransportError::NotOpen)?;
        connected
            .characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("characteristic {uuid}")))
    }
}

/// Reports the gateway advertising (`Arrived`) and its link dropping
/// (`Removed`) until the receiver goes away.
async fn follow_gateway(
    adapter: &Adapter,
    service: Uuid,
    tx: &mpsc::Sender<DeviceEvent>,
) -> Result<(), bluest::Error> {
    loop {
        let device = {
            let mut advertisements = adapter.scan(&[service]).await?;
            match advertisements.next().await {
                Some(advertisement) => advertisement.device,
                None => return Ok(()),
            }
        };
        if tx.send(DeviceEvent::Arrived).await.is_err() {
            return Ok(());
        }

        let mut events = adapter.device_connection_events(&device).await?;
        while let Some(event) = events.next().await {
            if matches!(event, ConnectionEvent::Disconnected) {
                break;
            }
        }
        if tx.send(DeviceEvent::Removed).await.is_err() {
            return Ok(());
        }
    }
}

fn map_error(err: bluest::Error) -> TransportError {
    use bluest::error::ErrorKind;
    match err.kind() {
        ErrorKind::NotConnected => TransportError::Disconnected,
        ErrorKind::NotFound => TransportError::NotFound(err.to_string()),
        ErrorKind::Timeout => TransportError::Timeout,
        ErrorKind::AdapterUnavailable => TransportError::Disconnected,
        _ => TransportError::Rejected(err.to_string()),
    }
}

#[async_trait]
impl GattLink for BluestLink {
    async fn connect(&self) -> Result<(), TransportError> {
        let device = self.scan().await?;
        self.adapter
            .connect_device(&device)
            .await
            .map_err(map_error)?;
        info!("connected to BLE gateway {:?}", device.name().ok());
        *self.connected.lock().await = Some(Connected {
            device,
            characteristics: HashMap::new(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let previous = self.connected.lock().await.take();
        if let Some(connected) = previous {
            self.adapter
                .disconnect_device(&connected.device)
                .await
                .map_err(map_error)?;
            debug!("disconnected BLE gateway");
        }
        Ok(())
    }

    async fn discover(
        &self,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<Vec<Uuid>, TransportError> {
        let mut guard = self.connected.lock().await;
        let connected = guard.as_mut().ok_or(TransportError::NotOpen)?;

        let services = connected
            .device
            .discover_services_with_uuid(service)
            .await
            .map_err(map_error)?;
        let gatt_service = services
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::NotFound(format!("service {service}")))?;

        let mut found = Vec::new();
        for characteristic in gatt_service.discover_characteristics().await.map_err(map_error)? {
            let uuid = characteristic.uuid();
            if characteristics.contains(&uuid) {
                found.push(uuid);
                connected.characteristics.insert(uuid, characteristic);
            }
        }
        Ok(found)
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        self.characteristic(characteristic)
            .await?
            .read()
            .await
            .map_err(map_error)
    }

    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        self.characteristic(characteristic)
            .await?
            .write(value)
            .await
            .map_err(map_error)
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<PeerTableUpdates, TransportError> {
        let characteristic = self.characteristic(characteristic).await?;
        let (tx, rx) = mpsc::channel(8);
        let (subscribed_tx, subscribed_rx) = oneshot::channel();

        // The stream borrows the characteristic; the task owns both.
        // Dropping `rx` ends the task and the subscription.
        tokio::spawn(async move {
            let notifications = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = subscribed_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = subscribed_tx.send(Err(map_error(e)));
                    return;
                }
            };
            futures_util::pin_mut!(notifications);
            while let Some(value) = notifications.next().await {
                match value {
                    Ok(_) => {
                        if tx.send(()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("BLE notification stream ended: {e}");
                        break;
                    }
                }
            }
        });

        subscribed_rx.await.map_err(|_| TransportError::Aborted)??;
        Ok(rx)
    }

    async fn watch_devices(&self) -> Result<DeviceEvents, TransportError> {
        let adapter = self.adapter.clone();
        let service = self.service;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => {}
                result = follow_gateway(&adapter, service, &tx) => {
                    if let Err(e) = result {
                        warn!("stopped watching for the BLE gateway: {e}");
                    }
                }
            }
        });
        Ok(rx)
    }
}

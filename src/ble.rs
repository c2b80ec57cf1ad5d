//! Real device link backed by btleplug.
//!
//! Selection policy: scan on the first available system adapter, filtered
//! to the requested service, and take the first peripheral advertising it.
//! There is no scan timeout; with no matching device in range the selection
//! pends until one appears.

use async_trait::async_trait;
use btleplug::api::{
    bleuuid::uuid_from_u16, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LinkError;
use crate::link::{CharacteristicId, DeviceHandle, DeviceLink, LinkEvent, ServiceId};

impl From<btleplug::Error> for LinkError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::DeviceNotFound => LinkError::NotFound,
            btleplug::Error::PermissionDenied => LinkError::PermissionDenied,
            btleplug::Error::NotConnected => LinkError::NotConnected,
            other => LinkError::Other(other.to_string()),
        }
    }
}

/// Device link over the first available system Bluetooth adapter.
pub struct BtleplugLink {
    adapter: Option<Adapter>,
}

impl BtleplugLink {
    /// Probe the system for a Bluetooth adapter. A host without one yields
    /// a link that reports itself unavailable.
    pub async fn new() -> Self {
        let adapter = match Manager::new().await {
            Ok(manager) => match manager.adapters().await {
                Ok(mut adapters) => {
                    if adapters.is_empty() {
                        None
                    } else {
                        Some(adapters.remove(0))
                    }
                }
                Err(_) => None,
            },
            Err(_) => None,
        };

        BtleplugLink { adapter }
    }
}

async fn advertises_service(peripheral: &Peripheral, service: Uuid) -> bool {
    match peripheral.properties().await {
        Ok(Some(props)) => props.services.contains(&service),
        _ => false,
    }
}

#[async_trait]
impl DeviceLink for BtleplugLink {
    fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    async fn select_device(&self, service: ServiceId) -> Result<Box<dyn DeviceHandle>, LinkError> {
        let adapter = self.adapter.as_ref().ok_or(LinkError::NotFound)?;
        let service_uuid = uuid_from_u16(service);

        let mut events = adapter.events().await?;
        adapter
            .start_scan(ScanFilter {
                services: vec![service_uuid],
            })
            .await?;
        info!("scanning for devices advertising service {service:#06x}");

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDiscovered(id) = event {
                let peripheral = adapter.peripheral(&id).await?;
                if !advertises_service(&peripheral, service_uuid).await {
                    continue;
                }

                let name = match peripheral.properties().await {
                    Ok(Some(props)) => props.local_name,
                    _ => None,
                };
                info!(id = ?id, name = ?name, "discovered device");

                if let Err(err) = adapter.stop_scan().await {
                    debug!(error = %err, "failed to stop scan after selection");
                }

                return Ok(Box::new(BtleplugDevice {
                    adapter: adapter.clone(),
                    peripheral,
                    name,
                    subscribed: Mutex::new(None),
                }));
            }
        }

        // The adapter's event stream ended without a match.
        Err(LinkError::NotFound)
    }
}

struct BtleplugDevice {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    subscribed: Mutex<Option<Characteristic>>,
}

#[async_trait]
impl DeviceHandle for BtleplugDevice {
    fn id(&self) -> String {
        format!("{:?}", self.peripheral.id())
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn open(&self) -> Result<(), LinkError> {
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn start_notifications(
        &self,
        characteristic: CharacteristicId,
    ) -> Result<BoxStream<'static, LinkEvent>, LinkError> {
        self.peripheral.discover_services().await?;

        let target = uuid_from_u16(characteristic);
        let found = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == target)
            .ok_or_else(|| {
                LinkError::Other(format!("characteristic {characteristic:#06x} not found"))
            })?;

        self.peripheral.subscribe(&found).await?;
        *self.subscribed.lock().unwrap() = Some(found);

        let measurements = self
            .peripheral
            .notifications()
            .await?
            .filter_map(move |notification| {
                futures::future::ready(
                    (notification.uuid == target)
                        .then(|| LinkEvent::Measurement(notification.value)),
                )
            });

        let device_id = self.peripheral.id();
        let drops = self.adapter.events().await?.filter_map(move |event| {
            futures::future::ready(match event {
                CentralEvent::DeviceDisconnected(id) if id == device_id => {
                    Some(LinkEvent::Dropped)
                }
                _ => None,
            })
        });

        Ok(futures::stream::select(measurements, drops).boxed())
    }

    async fn stop_notifications(&self) -> Result<(), LinkError> {
        let subscribed = self.subscribed.lock().unwrap().take();
        if let Some(characteristic) = subscribed {
            self.peripheral.unsubscribe(&characteristic).await?;
        }
        Ok(())
    }
}

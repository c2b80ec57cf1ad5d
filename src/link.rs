//! The device link capability boundary.
//!
//! The session manager never talks to a Bluetooth stack directly; it drives
//! a [`DeviceLink`] it was handed at construction. [`crate::ble`] implements
//! the traits against real hardware, and the integration tests implement
//! them as a scripted in-memory double.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::LinkError;

/// 16-bit Bluetooth SIG assigned number identifying a service.
pub type ServiceId = u16;
/// 16-bit Bluetooth SIG assigned number identifying a characteristic.
pub type CharacteristicId = u16;

pub const HEART_RATE_SERVICE_UUID: ServiceId = 0x180D;
pub const HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID: CharacteristicId = 0x2A37;

/// Events delivered by an open notification stream.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    /// One raw characteristic value from a value-changed notification.
    Measurement(Vec<u8>),
    /// The link dropped without an explicit disconnect request.
    Dropped,
}

/// Device discovery and selection.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Whether the capability is present on this host at all.
    fn is_available(&self) -> bool;

    /// Select a device advertising the given service.
    ///
    /// Pends until a device is chosen; there is no timeout, so a selection
    /// that never resolves blocks the caller indefinitely.
    async fn select_device(&self, service: ServiceId) -> Result<Box<dyn DeviceHandle>, LinkError>;
}

/// A handle to one selected device.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    /// Opaque stable identifier for the device.
    fn id(&self) -> String;

    /// Display name, if the platform knows one.
    fn name(&self) -> Option<String>;

    /// Establish the link.
    async fn open(&self) -> Result<(), LinkError>;

    /// Whether the link is currently established.
    async fn is_open(&self) -> bool;

    /// Tear the link down.
    async fn close(&self) -> Result<(), LinkError>;

    /// Discover the characteristic and start value-change notifications.
    ///
    /// The returned stream yields one [`LinkEvent::Measurement`] per
    /// notification and a [`LinkEvent::Dropped`] if the link goes away
    /// underneath us. Drop reporting only begins with the stream: a link
    /// that dies between [`DeviceHandle::open`] and this call surfaces as
    /// a failure from this method instead.
    async fn start_notifications(
        &self,
        characteristic: CharacteristicId,
    ) -> Result<BoxStream<'static, LinkEvent>, LinkError>;

    /// Stop notifications. Safe to call when none are active.
    async fn stop_notifications(&self) -> Result<(), LinkError>;
}

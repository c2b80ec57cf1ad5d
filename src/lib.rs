//! Live heart rate readings from a BLE sensor.
//!
//! A [`HeartRateSession`] drives a single device connection over an
//! injected [`DeviceLink`], decodes Heart Rate Measurement notification
//! frames, keeps a bounded history of readings, and fans state changes out
//! to subscribers. [`ble::BtleplugLink`] is the production link; tests
//! inject an in-memory double instead.

pub mod ble;
pub mod error;
pub mod heartrate_measurement;
pub mod link;
mod observable;
pub mod session;

pub use error::{LinkError, SessionError};
pub use heartrate_measurement::{decode, Measurement};
pub use link::{DeviceHandle, DeviceLink, LinkEvent};
pub use observable::Subscription;
pub use session::{Device, HeartRateSession, HISTORY_CAPACITY};

//! The heart rate session: owns one device link and publishes state slices.
//!
//! A [`HeartRateSession`] holds at most one active device at a time and
//! exposes four independently subscribable state slices: the reading
//! history, the current device, the last error, and the connecting flag.
//! Every mutation publishes a snapshot of the affected slice to that
//! slice's subscribers, synchronously and in registration order.
//!
//! Sessions are cheap to clone; clones share state. Constructing over a
//! [`DeviceLink`] test double gives a fully isolated instance, so tests
//! never share a global session.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::heartrate_measurement::{self, Measurement};
use crate::link::{
    DeviceHandle, DeviceLink, LinkEvent, HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID,
    HEART_RATE_SERVICE_UUID,
};
use crate::observable::{ListenerSet, Subscription};

/// Maximum number of retained measurements, newest first.
pub const HISTORY_CAPACITY: usize = 100;

const FALLBACK_DEVICE_NAME: &str = "Unknown Device";

/// Identity of the currently targeted sensor.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Device {
    /// Opaque stable identifier from the device link.
    pub id: String,
    /// Display name, or a fixed placeholder if the link supplied none.
    pub name: String,
    /// True only while notifications are actively flowing.
    pub connected: bool,
}

struct State {
    device: Option<Device>,
    history: VecDeque<Measurement>,
    error: Option<SessionError>,
    connecting: bool,
}

struct Inner {
    link: Arc<dyn DeviceLink>,
    state: Mutex<State>,
    // The open handle is awaited through during teardown, so it lives
    // behind an async mutex rather than in `state`.
    handle: tokio::sync::Mutex<Option<Box<dyn DeviceHandle>>>,
    pump: Mutex<Option<tokio::task::JoinHandle<()>>>,
    heart_rate_listeners: ListenerSet<Vec<Measurement>>,
    device_listeners: ListenerSet<Option<Device>>,
    error_listeners: ListenerSet<Option<SessionError>>,
    connecting_listeners: ListenerSet<bool>,
}

impl Inner {
    fn publish_heart_rate(&self) {
        let snapshot: Vec<Measurement> = {
            let state = self.state.lock().unwrap();
            state.history.iter().cloned().collect()
        };
        self.heart_rate_listeners.notify(&snapshot);
    }

    fn publish_device(&self) {
        let snapshot = self.state.lock().unwrap().device.clone();
        self.device_listeners.notify(&snapshot);
    }

    fn publish_error(&self) {
        let snapshot = self.state.lock().unwrap().error.clone();
        self.error_listeners.notify(&snapshot);
    }

    fn publish_connecting(&self) {
        let snapshot = self.state.lock().unwrap().connecting;
        self.connecting_listeners.notify(&snapshot);
    }
}

/// A live heart rate monitoring session over an injected device link.
#[derive(Clone)]
pub struct HeartRateSession {
    inner: Arc<Inner>,
}

impl HeartRateSession {
    pub fn new(link: Arc<dyn DeviceLink>) -> Self {
        HeartRateSession {
            inner: Arc::new(Inner {
                link,
                state: Mutex::new(State {
                    device: None,
                    history: VecDeque::new(),
                    error: None,
                    connecting: false,
                }),
                handle: tokio::sync::Mutex::new(None),
                pump: Mutex::new(None),
                heart_rate_listeners: ListenerSet::new(),
                device_listeners: ListenerSet::new(),
                error_listeners: ListenerSet::new(),
                connecting_listeners: ListenerSet::new(),
            }),
        }
    }

    /// Whether the device link capability is present at all.
    pub fn is_supported(&self) -> bool {
        self.inner.link.is_available()
    }

    /// Select a heart rate device, open its link, and start consuming
    /// measurement notifications.
    ///
    /// Never returns an error: every failure is classified into a
    /// [`SessionError`] and published through the error slice, with the
    /// device reset to `None` and the connecting flag cleared. There is no
    /// timeout; a device selection that never resolves keeps this call
    /// pending with `connecting` still true.
    pub async fn connect(&self) {
        let inner = &self.inner;

        {
            let mut state = inner.state.lock().unwrap();
            state.connecting = true;
            state.error = None;
        }
        inner.publish_connecting();
        inner.publish_error();

        let result = if inner.link.is_available() {
            self.establish().await
        } else {
            Err(SessionError::Unsupported)
        };

        if let Err(err) = result {
            warn!(error = %err, "connect attempt failed");
            {
                let mut state = inner.state.lock().unwrap();
                state.error = Some(err);
                state.device = None;
            }
            inner.publish_device();
            inner.publish_error();
        }

        inner.state.lock().unwrap().connecting = false;
        inner.publish_connecting();
    }

    async fn establish(&self) -> Result<(), SessionError> {
        let inner = &self.inner;

        let handle = inner
            .link
            .select_device(HEART_RATE_SERVICE_UUID)
            .await
            .map_err(SessionError::classify)?;

        let device = Device {
            id: handle.id(),
            name: handle
                .name()
                .unwrap_or_else(|| FALLBACK_DEVICE_NAME.to_string()),
            connected: false,
        };
        info!(id = %device.id, name = %device.name, "selected heart rate device");
        inner.state.lock().unwrap().device = Some(device);
        inner.publish_device();

        handle.open().await.map_err(SessionError::classify)?;
        if !handle.is_open().await {
            return Err(SessionError::LinkFailure);
        }

        let events = handle
            .start_notifications(HEART_RATE_MEASUREMENT_CHARACTERISTIC_UUID)
            .await
            .map_err(SessionError::classify)?;

        let pump = tokio::spawn(pump_events(Arc::downgrade(inner), events));
        if let Some(previous) = inner.pump.lock().unwrap().replace(pump) {
            previous.abort();
        }
        *inner.handle.lock().await = Some(handle);

        {
            let mut state = inner.state.lock().unwrap();
            if let Some(device) = state.device.as_mut() {
                device.connected = true;
            }
        }
        inner.publish_device();
        info!("notifications started");
        Ok(())
    }

    /// Stop notifications and tear the link down.
    ///
    /// Teardown failures are swallowed; the link is going away regardless.
    /// The device identity is retained with `connected` cleared so callers
    /// can distinguish "disconnected" from "no device". History is cleared.
    /// Safe to call when nothing is connected.
    pub async fn disconnect(&self) {
        let inner = &self.inner;

        // Stop the pump first so no further frames land mid-teardown.
        if let Some(pump) = inner.pump.lock().unwrap().take() {
            pump.abort();
        }

        let handle = inner.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.stop_notifications().await {
                debug!(error = %err, "failed to stop notifications during teardown");
            }
            if handle.is_open().await {
                if let Err(err) = handle.close().await {
                    debug!(error = %err, "failed to close link during teardown");
                }
            }
        }

        {
            let mut state = inner.state.lock().unwrap();
            if let Some(device) = state.device.as_mut() {
                device.connected = false;
            }
            state.history.clear();
        }
        inner.publish_device();
        inner.publish_heart_rate();
        info!("session disconnected");
    }

    /// Empty the reading history. Independent of connection state.
    pub fn clear_data(&self) {
        self.inner.state.lock().unwrap().history.clear();
        self.inner.publish_heart_rate();
    }

    /// Subscribe to history snapshots (newest first). The current snapshot
    /// is replayed synchronously before this returns.
    pub fn subscribe_heart_rate(
        &self,
        callback: impl Fn(&[Measurement]) + Send + Sync + 'static,
    ) -> Subscription {
        let snapshot: Vec<Measurement> = {
            let state = self.inner.state.lock().unwrap();
            state.history.iter().cloned().collect()
        };
        self.inner
            .heart_rate_listeners
            .subscribe(&snapshot, move |history| callback(history.as_slice()))
    }

    /// Subscribe to device snapshots.
    pub fn subscribe_device(
        &self,
        callback: impl Fn(Option<&Device>) + Send + Sync + 'static,
    ) -> Subscription {
        let snapshot = self.inner.state.lock().unwrap().device.clone();
        self.inner
            .device_listeners
            .subscribe(&snapshot, move |device| callback(device.as_ref()))
    }

    /// Subscribe to the last published failure.
    pub fn subscribe_error(
        &self,
        callback: impl Fn(Option<&SessionError>) + Send + Sync + 'static,
    ) -> Subscription {
        let snapshot = self.inner.state.lock().unwrap().error.clone();
        self.inner
            .error_listeners
            .subscribe(&snapshot, move |error| callback(error.as_ref()))
    }

    /// Subscribe to the connecting flag.
    pub fn subscribe_connecting(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        let snapshot = self.inner.state.lock().unwrap().connecting;
        self.inner
            .connecting_listeners
            .subscribe(&snapshot, move |connecting| callback(*connecting))
    }

    pub fn device(&self) -> Option<Device> {
        self.inner.state.lock().unwrap().device.clone()
    }

    /// Retained measurements, newest first.
    pub fn heart_rate_data(&self) -> Vec<Measurement> {
        let state = self.inner.state.lock().unwrap();
        state.history.iter().cloned().collect()
    }

    pub fn error(&self) -> Option<SessionError> {
        self.inner.state.lock().unwrap().error.clone()
    }

    pub fn is_connecting(&self) -> bool {
        self.inner.state.lock().unwrap().connecting
    }

    /// The newest reading's BPM, if any readings are retained.
    pub fn current_heart_rate(&self) -> Option<u16> {
        let state = self.inner.state.lock().unwrap();
        state.history.front().map(|m| m.heart_rate)
    }
}

/// Consume link events until the stream ends or the session is dropped.
///
/// Decoding is synchronous; there is no suspension point between receiving
/// a frame and publishing its measurement.
async fn pump_events(inner: Weak<Inner>, mut events: BoxStream<'static, LinkEvent>) {
    while let Some(event) = events.next().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        match event {
            LinkEvent::Measurement(frame) => {
                let measurement = heartrate_measurement::decode(&frame);
                debug!(heart_rate = measurement.heart_rate, "measurement received");
                {
                    let mut state = inner.state.lock().unwrap();
                    state.history.push_front(measurement);
                    state.history.truncate(HISTORY_CAPACITY);
                }
                inner.publish_heart_rate();
            }
            LinkEvent::Dropped => {
                warn!("device link dropped unexpectedly");
                {
                    let mut state = inner.state.lock().unwrap();
                    if let Some(device) = state.device.as_mut() {
                        device.connected = false;
                    }
                    state.error = Some(SessionError::Disconnected);
                }
                // History is deliberately left intact on an unexpected drop.
                inner.publish_device();
                inner.publish_error();
            }
        }
    }
}

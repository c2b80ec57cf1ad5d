//! Error types for heartlink.

use thiserror::Error;

/// Failures reported by the device link capability boundary.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The selection filter matched nothing, or selection was cancelled.
    #[error("no matching device found")]
    NotFound,

    /// The platform refused access to the device link.
    #[error("permission to use the device link was denied")]
    PermissionDenied,

    /// The link is not connected.
    #[error("link is not connected")]
    NotConnected,

    /// Any other failure from the underlying platform.
    #[error("{0}")]
    Other(String),
}

/// Failures published through the session's error slice.
///
/// `Display` is the human-readable message handed to error subscribers. The
/// session keeps at most one of these at a time; each new failure overwrites
/// the previous one, and a fresh connect attempt clears it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The host has no device link capability at all.
    #[error("Bluetooth is not available on this platform")]
    Unsupported,

    /// Device selection matched nothing or was cancelled.
    #[error("No heart rate device found; make sure the sensor is broadcasting")]
    DeviceNotFound,

    /// The device link requires a secure context that is not present.
    #[error("A secure context is required to access Bluetooth devices")]
    InsecureContext,

    /// The link failed to come up, or a step between service discovery and
    /// notification start failed.
    #[error("Failed to connect to the device, please try again")]
    LinkFailure,

    /// The link dropped without an explicit disconnect request.
    #[error("Device disconnected")]
    Disconnected,

    /// Anything else, with the underlying message passed through.
    #[error("{0}")]
    Other(String),
}

impl SessionError {
    /// Map a capability-boundary failure onto the published taxonomy.
    pub(crate) fn classify(err: LinkError) -> Self {
        match err {
            LinkError::NotFound => SessionError::DeviceNotFound,
            LinkError::PermissionDenied => SessionError::InsecureContext,
            LinkError::NotConnected => SessionError::LinkFailure,
            LinkError::Other(message) if !message.is_empty() => SessionError::Other(message),
            LinkError::Other(_) => SessionError::Other("Connection failed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            SessionError::classify(LinkError::NotFound),
            SessionError::DeviceNotFound
        );
        assert_eq!(
            SessionError::classify(LinkError::PermissionDenied),
            SessionError::InsecureContext
        );
        assert_eq!(
            SessionError::classify(LinkError::NotConnected),
            SessionError::LinkFailure
        );
        assert_eq!(
            SessionError::classify(LinkError::Other("gatt failure".to_string())),
            SessionError::Other("gatt failure".to_string())
        );
    }

    #[test]
    fn empty_platform_message_gets_fallback() {
        let err = SessionError::classify(LinkError::Other(String::new()));
        assert_eq!(err.to_string(), "Connection failed");
    }
}

//! Error types for glidelink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, protocol decode
//! errors, slot state conflicts and bulk-operation failures are all
//! captured here.

/// The error type for all glidelink operations.
///
/// Variants cover the failure modes of a device link: physical transport
/// failures, protocol decode errors, timeouts, slot state conflicts
/// (busy, overlapping configurations) and failed bulk operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed sentence, bad bulk-transfer frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A protocol step exceeded its deadline.
    ///
    /// This typically indicates the instrument is powered off, the baud rate
    /// is wrong, or the instrument is not in its transfer mode.
    #[error("timeout waiting for response")]
    Timeout,

    /// The requested operation is not supported by this driver or port kind.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed to an operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The slot or transport has no live connection.
    #[error("not connected")]
    NotConnected,

    /// The connection to the instrument was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The port or driver could not be opened.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// A bulk operation is already running on this slot.
    #[error("device is busy")]
    Busy,

    /// The configuration for `slot` claims the same resource as `with`.
    #[error("slot {slot} overlaps slot {with}")]
    Overlap {
        /// The slot whose configuration was rejected.
        slot: usize,
        /// The earlier, already accepted slot.
        with: usize,
    },

    /// A sentence failed checksum validation or was malformed.
    #[error("checksum error: {0}")]
    Checksum(String),

    /// A bulk operation failed; names the device and what was attempted.
    #[error("{action} on {device} failed: {source}")]
    Operation {
        /// Display name of the device.
        device: String,
        /// The attempted action, e.g. "declare".
        action: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap `self` as the cause of a failed bulk operation.
    pub fn during(self, device: &str, action: &str) -> Error {
        Error::Operation {
            device: device.to_string(),
            action: action.to_string(),
            source: Box::new(self),
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_busy() {
        assert_eq!(Error::Busy.to_string(), "device is busy");
    }

    #[test]
    fn error_display_overlap() {
        let e = Error::Overlap { slot: 3, with: 1 };
        assert_eq!(e.to_string(), "slot 3 overlaps slot 1");
    }

    #[test]
    fn error_display_operation_names_device_and_action() {
        let e = Error::Timeout.during("Volkslogger", "declare");
        assert_eq!(
            e.to_string(),
            "declare on Volkslogger failed: timeout waiting for response"
        );
        assert!(matches!(e, Error::Operation { ref source, .. } if matches!(**source, Error::Timeout)));
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}

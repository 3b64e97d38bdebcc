//! The two error hierarchies the node exposes: radio API return codes that
//! the stack above is expected to handle, and fatal node-level errors that
//! end the process.

use core::fmt;

/// Radio API return codes, mirroring the platform radio API's error surface.
///
/// These are recoverable: every radio operation either succeeds or returns
/// one of these, and the coarse radio state after a failure is always
/// well-defined.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RadioError {
    /// Operation attempted in the wrong coarse radio state.
    InvalidState,
    /// Out-of-range channel, interval, or other argument.
    InvalidArgs,
    /// Sleep requested mid-receive, or energy scan already running.
    Busy,
    /// Expected ACK not received before `max_ack_wait`.
    NoAck,
    /// CCA indicated the channel was busy, or TX was attempted during an
    /// in-progress receive (the tie-break rule).
    ChannelAccessFailure,
    /// Capability not implemented by this platform.
    NotImplemented,
    /// Message buffer allocation failed.
    NoBufs,
    /// Security processing failed (e.g. key-ID-1 ACK lookup miss).
    Security,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RadioError::InvalidState => "operation invalid in current radio state",
            RadioError::InvalidArgs => "argument out of range",
            RadioError::Busy => "radio busy",
            RadioError::NoAck => "no acknowledgment received",
            RadioError::ChannelAccessFailure => "channel access failure",
            RadioError::NotImplemented => "capability not implemented",
            RadioError::NoBufs => "no buffers available",
            RadioError::Security => "security processing failed",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for RadioError {}

/// Fatal, process-ending conditions: the event loop cannot meaningfully
/// continue after any of these.
#[derive(Debug)]
#[non_exhaustive]
pub enum NodeError {
    /// CLI arguments were missing or out of range.
    InvalidArgs(String),
    /// The simulator socket produced a short read or was closed unexpectedly.
    ShortRead { expected: usize, got: usize },
    /// An event carried a payload too small for its declared type.
    PayloadTooSmall { event_type: u8, len: usize },
    /// The simulator sent an event type the node doesn't recognize.
    UnknownEventType(u8),
    /// Low-level I/O failure talking to the simulator or a side channel.
    Io(std::io::Error),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            NodeError::ShortRead { expected, got } => {
                write!(f, "short read from simulator socket: expected {} bytes, got {}", expected, got)
            }
            NodeError::PayloadTooSmall { event_type, len } => write!(
                f,
                "event type {} payload too small ({} bytes)",
                event_type, len
            ),
            NodeError::UnknownEventType(ty) => write!(f, "unrecognized event type {}", ty),
            NodeError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_error_display_is_non_empty() {
        for e in &[
            RadioError::InvalidState,
            RadioError::InvalidArgs,
            RadioError::Busy,
            RadioError::NoAck,
            RadioError::ChannelAccessFailure,
            RadioError::NotImplemented,
            RadioError::NoBufs,
            RadioError::Security,
        ] {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn node_error_wraps_io_error_as_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: NodeError = io.into();
        assert!(err.source().is_some());
    }
}

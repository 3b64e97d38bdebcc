//! Thin UART shim: the node has no real serial port, so `otPlatUartSend`'s
//! entire job is to wrap the bytes in a `UART_WRITE` event and immediately
//! report completion — there is nothing to wait for.

use crate::error::NodeError;
use crate::event::event_type;
use crate::transport::Transport;

/// Receives inbound `UART_WRITE` payloads. The Thread stack's UART receive
/// path would implement this; out of scope here, so the node only needs a
/// place to hand bytes to.
pub trait UartSink {
    fn on_uart_received(&mut self, data: &[u8]);
}

/// A sink that discards everything, for nodes that never wire one up.
pub struct NullUartSink;

impl UartSink for NullUartSink {
    fn on_uart_received(&mut self, _data: &[u8]) {}
}

/// The outbound half of the UART shim.
pub struct UartPort;

impl UartPort {
    pub fn send(transport: &mut impl Transport, bytes: &[u8]) -> Result<(), NodeError> {
        transport.send(event_type::UART_WRITE, 0, 0, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeTransport;

    struct RecordingSink {
        received: Vec<Vec<u8>>,
    }

    impl UartSink for RecordingSink {
        fn on_uart_received(&mut self, data: &[u8]) {
            self.received.push(data.to_vec());
        }
    }

    #[test]
    fn send_wraps_bytes_as_uart_write_event() {
        let mut t = FakeTransport::new();
        UartPort::send(&mut t, b"hello").unwrap();
        assert_eq!(t.outbound.len(), 1);
        assert_eq!(t.outbound[0].0, event_type::UART_WRITE);
        assert_eq!(t.outbound[0].3, b"hello");
    }

    #[test]
    fn sink_receives_forwarded_bytes() {
        let mut sink = RecordingSink { received: Vec::new() };
        sink.on_uart_received(b"abc");
        assert_eq!(sink.received, vec![b"abc".to_vec()]);
    }
}

//! Framing of [`crate::event`] structures onto a byte stream.
//!
//! Every outbound event is a single `write()` of header-then-payload;
//! every inbound event is read as exactly 19 header bytes followed by
//! exactly `data_len` payload bytes. A short read anywhere in this dance is
//! fatal — the stream protocol gives no way to resynchronize.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::NodeError;
use crate::event::{EventHeader, MAX_DATA_LEN};

/// One fully-decoded inbound event: header plus its exact-length payload.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub header: EventHeader,
    pub data: Vec<u8>,
}

/// The channel the event loop talks to the simulator through. Abstracted so
/// tests can drive the node without a real socket.
pub trait Transport {
    fn send(&mut self, event_type: u8, delay_us: u64, msg_id: u64, payload: &[u8]) -> Result<(), NodeError>;
    fn recv(&mut self) -> Result<RawEvent, NodeError>;
}

fn map_read_error(e: io::Error, expected: usize, got: usize) -> NodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        NodeError::ShortRead { expected, got }
    } else {
        NodeError::Io(e)
    }
}

/// A [`Transport`] backed by a connected Unix `SOCK_STREAM` to the
/// simulator.
pub struct UnixSocketTransport {
    stream: UnixStream,
}

impl UnixSocketTransport {
    pub fn connect(path: &str) -> Result<Self, NodeError> {
        let stream = UnixStream::connect(path)?;
        Ok(UnixSocketTransport { stream })
    }
}

impl Transport for UnixSocketTransport {
    fn send(&mut self, event_type: u8, delay_us: u64, msg_id: u64, payload: &[u8]) -> Result<(), NodeError> {
        assert!(payload.len() <= MAX_DATA_LEN, "event payload exceeds protocol maximum");

        let header = EventHeader {
            delay_us,
            event_type,
            msg_id,
            data_len: payload.len() as u16,
        };
        let mut out = vec![0u8; EventHeader::WIRE_LEN + payload.len()];
        {
            let mut w = ByteWriter::new(&mut out[..EventHeader::WIRE_LEN]);
            header.encode(&mut w).expect("header always fits its own buffer");
        }
        out[EventHeader::WIRE_LEN..].copy_from_slice(payload);

        self.stream.write_all(&out)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<RawEvent, NodeError> {
        let mut hdr_buf = [0u8; EventHeader::WIRE_LEN];
        self.stream
            .read_exact(&mut hdr_buf)
            .map_err(|e| map_read_error(e, EventHeader::WIRE_LEN, 0))?;
        let header =
            EventHeader::decode(&mut ByteReader::new(&hdr_buf)).expect("fixed-size header buffer always decodes");

        let data_len = header.data_len as usize;
        assert!(data_len <= MAX_DATA_LEN, "simulator declared an oversized payload");

        let mut data = vec![0u8; data_len];
        if data_len > 0 {
            self.stream
                .read_exact(&mut data)
                .map_err(|e| map_read_error(e, data_len, 0))?;
        }

        Ok(RawEvent { header, data })
    }
}

/// A [`Transport`] shared between the event loop and the logging backend:
/// both the node's own sends and every `log` record go out over the same
/// socket, exactly as the platform's single global file descriptor carries
/// both. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SharedTransport(std::sync::Arc<std::sync::Mutex<UnixSocketTransport>>);

impl SharedTransport {
    pub fn new(inner: UnixSocketTransport) -> Self {
        SharedTransport(std::sync::Arc::new(std::sync::Mutex::new(inner)))
    }
}

impl Transport for SharedTransport {
    fn send(&mut self, event_type: u8, delay_us: u64, msg_id: u64, payload: &[u8]) -> Result<(), NodeError> {
        self.0
            .lock()
            .expect("transport mutex poisoned by a panicking holder")
            .send(event_type, delay_us, msg_id, payload)
    }

    fn recv(&mut self) -> Result<RawEvent, NodeError> {
        self.0.lock().expect("transport mutex poisoned by a panicking holder").recv()
    }
}

/// An in-memory [`Transport`] for tests: a queue of events to hand back on
/// `recv`, and a log of everything sent.
#[cfg(test)]
pub struct FakeTransport {
    pub inbound: std::collections::VecDeque<RawEvent>,
    pub outbound: Vec<(u8, u64, u64, Vec<u8>)>,
    next_msg_id: u64,
}

#[cfg(test)]
impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            inbound: std::collections::VecDeque::new(),
            outbound: Vec::new(),
            next_msg_id: 1,
        }
    }

    pub fn push_inbound(&mut self, event_type: u8, delay_us: u64, payload: Vec<u8>) {
        let msg_id = self.next_msg_id;
        self.next_msg_id += 1;
        self.inbound.push_back(RawEvent {
            header: EventHeader {
                delay_us,
                event_type,
                msg_id,
                data_len: payload.len() as u16,
            },
            data: payload,
        });
    }
}

#[cfg(test)]
impl Transport for FakeTransport {
    fn send(&mut self, event_type: u8, delay_us: u64, msg_id: u64, payload: &[u8]) -> Result<(), NodeError> {
        self.outbound.push((event_type, delay_us, msg_id, payload.to_vec()));
        Ok(())
    }

    fn recv(&mut self) -> Result<RawEvent, NodeError> {
        self.inbound
            .pop_front()
            .ok_or_else(|| NodeError::ShortRead { expected: EventHeader::WIRE_LEN, got: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_type;

    #[test]
    fn fake_transport_replays_pushed_events_in_order() {
        let mut t = FakeTransport::new();
        t.push_inbound(event_type::ALARM_FIRED, 10, vec![]);
        t.push_inbound(event_type::UART_WRITE, 0, vec![1, 2, 3]);

        let first = t.recv().unwrap();
        assert_eq!(first.header.event_type, event_type::ALARM_FIRED);
        assert_eq!(first.header.delay_us, 10);

        let second = t.recv().unwrap();
        assert_eq!(second.data, vec![1, 2, 3]);
    }

    #[test]
    fn send_records_outbound_event() {
        let mut t = FakeTransport::new();
        t.send(event_type::NODE_INFO, 0, 5, &[1, 0, 0, 0]).unwrap();
        assert_eq!(t.outbound.len(), 1);
        assert_eq!(t.outbound[0].0, event_type::NODE_INFO);
    }
}

//! Wire types for the simulator protocol: the fixed event header and the
//! payload structures carried inside it. Every field is serialized
//! individually through [`crate::bytes`] — never via native struct layout —
//! since the simulator is a separately-compiled peer.

use crate::bytes::{ByteReader, ByteWriter, Eof};

/// Maximum payload size for one event, matching `OT_EVENT_DATA_MAX_SIZE`.
pub const MAX_DATA_LEN: usize = 2048;

/// Numeric event-type IDs, fixed by the externally-defined simulator
/// protocol enumeration. A few legacy/reserved values exist in that
/// enumeration but are never constructed or expected here: `1`
/// (superseded by `RADIO_COMM_START`/`RADIO_RX_DONE`), `3` (spinel
/// passthrough, NCP-only), `4` (unused), `14`/`15` (simulator-side only).
pub mod event_type {
    pub const ALARM_FIRED: u8 = 0;
    pub const UART_WRITE: u8 = 2;
    pub const OTNS_STATUS_PUSH: u8 = 5;
    pub const RADIO_COMM_START: u8 = 6;
    pub const RADIO_TX_DONE: u8 = 7;
    pub const RADIO_CHAN_SAMPLE: u8 = 8;
    pub const RADIO_STATE: u8 = 9;
    pub const RADIO_RX_DONE: u8 = 10;
    pub const EXT_ADDR: u8 = 11;
    pub const NODE_INFO: u8 = 12;
    pub const RFSIM_PARAM_GET: u8 = 16;
    pub const RFSIM_PARAM_SET: u8 = 17;
    pub const RFSIM_PARAM_RSP: u8 = 18;
    pub const LOG_WRITE: u8 = 19;
    pub const UDP_TO_HOST: u8 = 20;
    pub const IP6_TO_HOST: u8 = 21;
    pub const UDP_FROM_HOST: u8 = 22;
    pub const IP6_FROM_HOST: u8 = 23;
}

/// Parameter IDs used with `RFSIM_PARAM_GET`/`_SET`/`_RSP`.
pub mod param {
    pub const RX_SENSITIVITY: u8 = 0;
    pub const CCA_THRESHOLD: u8 = 1;
    pub const CSL_ACCURACY: u8 = 2;
    pub const CSL_UNCERTAINTY: u8 = 3;
    pub const TX_INTERFERER: u8 = 4;
    pub const CLOCK_DRIFT: u8 = 5;
    pub const PHY_BITRATE: u8 = 6;
    pub const UNKNOWN: u8 = 255;
}

/// The fixed 19-byte header that precedes every event's payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub delay_us: u64,
    pub event_type: u8,
    pub msg_id: u64,
    pub data_len: u16,
}

impl EventHeader {
    pub const WIRE_LEN: usize = 8 + 1 + 8 + 2;

    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), Eof> {
        w.write_u64_le(self.delay_us)?;
        w.write_u8(self.event_type)?;
        w.write_u64_le(self.msg_id)?;
        w.write_u16_le(self.data_len)?;
        Ok(())
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, Eof> {
        let delay_us = r.read_u64_le()?;
        let event_type = r.read_u8()?;
        let msg_id = r.read_u64_le()?;
        let data_len = r.read_u16_le()?;
        Ok(EventHeader {
            delay_us,
            event_type,
            msg_id,
            data_len,
        })
    }
}

/// `error` field discriminator values carried in [`RadioCommEventData`].
pub mod radio_comm_error {
    /// Normal frame, no error.
    pub const NONE: u8 = 0;
    /// Wi-Fi-style interferer burst.
    pub const INTERFERER: u8 = 192;
}

/// Parameters of one radio communication event: a transmitted frame, an
/// interferer burst, or a CCA/energy-scan channel sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RadioCommEventData {
    pub channel: u8,
    pub power_dbm: i8,
    pub error: u8,
    pub duration_us: u64,
}

impl RadioCommEventData {
    pub const WIRE_LEN: usize = 1 + 1 + 1 + 8;

    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), Eof> {
        w.write_u8(self.channel)?;
        w.write_i8(self.power_dbm)?;
        w.write_u8(self.error)?;
        w.write_u64_le(self.duration_us)?;
        Ok(())
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, Eof> {
        Ok(RadioCommEventData {
            channel: r.read_u8()?,
            power_dbm: r.read_i8()?,
            error: r.read_u8()?,
            duration_us: r.read_u64_le()?,
        })
    }
}

/// A snapshot of the radio's externally-observable state, emitted whenever
/// any field changes or the deadline to the next sub-state transition does.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RadioStateEventData {
    pub channel: u8,
    pub tx_power_dbm: i8,
    pub rx_sensitivity_dbm: i8,
    pub energy_state: u8,
    pub sub_state: u8,
    pub ot_state: u8,
    pub radio_time_us: u64,
}

impl RadioStateEventData {
    pub const WIRE_LEN: usize = 1 + 1 + 1 + 1 + 1 + 1 + 8;

    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), Eof> {
        w.write_u8(self.channel)?;
        w.write_i8(self.tx_power_dbm)?;
        w.write_i8(self.rx_sensitivity_dbm)?;
        w.write_u8(self.energy_state)?;
        w.write_u8(self.sub_state)?;
        w.write_u8(self.ot_state)?;
        w.write_u64_le(self.radio_time_us)?;
        Ok(())
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, Eof> {
        Ok(RadioStateEventData {
            channel: r.read_u8()?,
            tx_power_dbm: r.read_i8()?,
            rx_sensitivity_dbm: r.read_i8()?,
            energy_state: r.read_u8()?,
            sub_state: r.read_u8()?,
            ot_state: r.read_u8()?,
            radio_time_us: r.read_u64_le()?,
        })
    }
}

/// A GET/SET/RSP parameter exchange payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RfSimParamEventData {
    pub param: u8,
    pub value: i32,
}

impl RfSimParamEventData {
    pub const WIRE_LEN: usize = 1 + 4;

    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), Eof> {
        w.write_u8(self.param)?;
        w.write_i32_le(self.value)?;
        Ok(())
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, Eof> {
        Ok(RfSimParamEventData {
            param: r.read_u8()?,
            value: r.read_i32_le()?,
        })
    }
}

/// Metadata header preceding a forwarded UDP/IPv6 datagram to or from the
/// simulated host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MsgToHostEventData {
    pub src_port: u16,
    pub dst_port: u16,
    pub src_ip6: [u8; 16],
    pub dst_ip6: [u8; 16],
}

impl MsgToHostEventData {
    pub const WIRE_LEN: usize = 2 + 2 + 16 + 16;

    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), Eof> {
        w.write_u16_le(self.src_port)?;
        w.write_u16_le(self.dst_port)?;
        w.write_slice(&self.src_ip6)?;
        w.write_slice(&self.dst_ip6)?;
        Ok(())
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, Eof> {
        let src_port = r.read_u16_le()?;
        let dst_port = r.read_u16_le()?;
        let src_ip6 = r.read_array::<16>()?;
        let dst_ip6 = r.read_array::<16>()?;
        Ok(MsgToHostEventData {
            src_port,
            dst_port,
            src_ip6,
            dst_ip6,
        })
    }

    pub fn is_dst_unspecified(&self) -> bool {
        self.dst_ip6 == [0u8; 16]
    }
}

/// The wire image of a 15.4 PHY frame: a channel byte plus the PSDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioMessage {
    pub channel: u8,
    pub psdu: Vec<u8>,
}

impl RadioMessage {
    /// Maximum PSDU length for an 802.15.4 frame (aMaxPHYPacketSize).
    pub const MAX_PSDU_LEN: usize = 127;

    pub fn encode(&self, w: &mut ByteWriter<'_>) -> Result<(), Eof> {
        w.write_u8(self.channel)?;
        w.write_slice(&self.psdu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_header(delay_us: u64, event_type: u8, msg_id: u64, data_len: u16) {
        let h = EventHeader {
            delay_us,
            event_type,
            msg_id,
            data_len,
        };
        let mut buf = [0u8; EventHeader::WIRE_LEN];
        h.encode(&mut ByteWriter::new(&mut buf)).unwrap();
        let decoded = EventHeader::decode(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn header_round_trips_for_boundary_payload_lengths() {
        round_trip_header(0, event_type::ALARM_FIRED, 1, 0);
        round_trip_header(12345, event_type::RADIO_COMM_START, 42, 1);
        round_trip_header(0, event_type::RADIO_STATE, u64::max_value(), MAX_DATA_LEN as u16);
    }

    #[test]
    fn radio_comm_event_round_trips() {
        let d = RadioCommEventData {
            channel: 11,
            power_dbm: -90,
            error: radio_comm_error::NONE,
            duration_us: 4256,
        };
        let mut buf = [0u8; RadioCommEventData::WIRE_LEN];
        d.encode(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(RadioCommEventData::decode(&mut ByteReader::new(&buf)).unwrap(), d);
    }

    #[test]
    fn msg_to_host_header_detects_unspecified_destination() {
        let local = MsgToHostEventData {
            src_port: 1,
            dst_port: 2,
            src_ip6: [0; 16],
            dst_ip6: [0; 16],
        };
        assert!(local.is_dst_unspecified());

        let mut remote = local;
        remote.dst_ip6[15] = 1;
        assert!(!remote.is_dst_unspecified());
    }
}

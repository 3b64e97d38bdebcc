//! Typed UDP/IPv6-to-host forwarding: the `UDP_FROM_HOST`/`IP6_FROM_HOST`/
//! `UDP_TO_HOST`/`IP6_TO_HOST` event family.
//!
//! An unspecified destination IPv6 address on an inbound `IP6_FROM_HOST`
//! datagram means it's addressed to the node itself and should be handed to
//! the node's own UDP receive path, rather than routed onward as if it had
//! arrived over the air. This crate only ships a no-op [`HostBridge`] that
//! logs and drops — a real Thread stack would own the IPv6/UDP layers this
//! would actually forward into.

use log::debug;

use crate::event::MsgToHostEventData;

/// One forwarded datagram: its header plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMessage {
    pub header: MsgToHostEventData,
    pub payload: Vec<u8>,
}

/// What the node does with datagrams crossing the host boundary in either
/// direction. A real Thread stack implements this against its own IPv6/UDP
/// layers; this crate ships only [`NullHostBridge`].
pub trait HostBridge {
    /// A `UDP_FROM_HOST` datagram arrived, destined for a specific UDP port.
    fn on_udp_from_host(&mut self, msg: HostMessage);

    /// An `IP6_FROM_HOST` datagram arrived. `msg.header.is_dst_unspecified()`
    /// tells the implementation whether to deliver it locally or route it
    /// onward over the simulated radio.
    fn on_ip6_from_host(&mut self, msg: HostMessage);
}

/// Logs and drops every forwarded datagram.
#[derive(Debug, Default)]
pub struct NullHostBridge;

impl HostBridge for NullHostBridge {
    fn on_udp_from_host(&mut self, msg: HostMessage) {
        debug!(
            "dropping UDP_FROM_HOST datagram ({} bytes) to port {}",
            msg.payload.len(),
            msg.header.dst_port
        );
    }

    fn on_ip6_from_host(&mut self, msg: HostMessage) {
        if msg.header.is_dst_unspecified() {
            debug!("dropping IP6_FROM_HOST datagram ({} bytes) addressed to this node", msg.payload.len());
        } else {
            debug!("dropping IP6_FROM_HOST datagram ({} bytes) to be routed onward", msg.payload.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(dst_unspecified: bool) -> MsgToHostEventData {
        MsgToHostEventData {
            src_port: 1234,
            dst_port: 5683,
            src_ip6: [0xfe; 16],
            dst_ip6: if dst_unspecified { [0; 16] } else { [0xab; 16] },
        }
    }

    #[test]
    fn null_bridge_accepts_both_directions_without_panicking() {
        let mut bridge = NullHostBridge::default();
        bridge.on_udp_from_host(HostMessage { header: header(false), payload: vec![1, 2, 3] });
        bridge.on_ip6_from_host(HostMessage { header: header(true), payload: vec![4, 5] });
        bridge.on_ip6_from_host(HostMessage { header: header(false), payload: vec![6] });
    }

    #[test]
    fn unspecified_destination_is_detected_on_the_header() {
        assert!(header(true).is_dst_unspecified());
        assert!(!header(false).is_dst_unspecified());
    }
}

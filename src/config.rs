//! Stack configuration trait.
//!
//! Generalizes the parts of the node that legitimately vary between a real
//! run (Unix socket, OS RNG) and a test harness (in-memory transport,
//! deterministic RNG), the same way Rubble's `Config` trait parameterizes
//! the BLE stack over its timer, transmitter, and channel mapper. The
//! virtual clock itself is not part of this trait: every deployment of this
//! node is driven by the same simulator protocol, so there is only ever one
//! real implementation of it, and threading it through a generic would be
//! generalizing a seam that doesn't exist.

use rand::RngCore;

use crate::ble::BleConnectedSink;
use crate::host_bridge::HostBridge;
use crate::mac::MacFrameBuilder;
use crate::source_match::SourceMatchTable;
use crate::transport::Transport;
use crate::uart::UartSink;

/// Binds together the parts of the node that differ between production and
/// test builds.
pub trait Config {
    /// The channel to the simulator (or a fake, in tests).
    type Transport: Transport;

    /// Backing store for the radio's source-match (frame-pending) table.
    type SourceMatch: SourceMatchTable;

    /// Randomness source for backoff delays and interferer-mode timing.
    type Rng: RngCore;

    /// The Thread stack's view into MAC frame content — sequence numbers,
    /// ACK requests, addressing, and ACK construction. This crate parses no
    /// frame content itself; see [`crate::mac`].
    type MacFrameBuilder: MacFrameBuilder;

    /// Inbound `UART_WRITE` sink, e.g. the stack's CLI/spinel receive path.
    type UartSink: UartSink;

    /// Inbound UDP/IPv6-from-host forwarding, e.g. the stack's border
    /// routing layer.
    type HostBridge: HostBridge;

    /// Notified the first time a peer connects over the BLE UDP side
    /// channel, when BLE is enabled.
    type BleSink: BleConnectedSink;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::NullBleSink;
    use crate::host_bridge::NullHostBridge;
    use crate::mac::{CslIe, FrameVersion};
    use crate::source_match::{MacAddress, VecSourceMatchTable};
    use crate::transport::FakeTransport;
    use crate::uart::NullUartSink;
    use rand::rngs::mock::StepRng;

    struct TestBuilder;

    impl MacFrameBuilder for TestBuilder {
        fn frame_version(&self, _psdu: &[u8]) -> FrameVersion {
            FrameVersion::Ieee2006
        }
        fn sequence_number(&self, _psdu: &[u8]) -> u8 {
            0
        }
        fn ack_requested(&self, _psdu: &[u8]) -> bool {
            false
        }
        fn source_address(&self, _psdu: &[u8]) -> Option<MacAddress> {
            None
        }
        fn is_unicast_to_us(&self, _psdu: &[u8]) -> bool {
            false
        }
        fn build_imm_ack(&self, _seq_num: u8, _frame_pending: bool) -> Vec<u8> {
            Vec::new()
        }
        fn build_enh_ack(&self, _seq_num: u8, _frame_pending: bool, _csl_ie: Option<CslIe>, _probing_ie: Option<&[u8]>) -> Vec<u8> {
            Vec::new()
        }
    }

    struct TestConfig;

    impl Config for TestConfig {
        type Transport = FakeTransport;
        type SourceMatch = VecSourceMatchTable;
        type Rng = StepRng;
        type MacFrameBuilder = TestBuilder;
        type UartSink = NullUartSink;
        type HostBridge = NullHostBridge;
        type BleSink = NullBleSink;
    }

    #[test]
    fn test_config_satisfies_the_trait() {
        fn assert_config<C: Config>() {}
        assert_config::<TestConfig>();
    }
}

//! 802.15.4 PHY/MAC timing constants and the seam between the radio FSM and
//! frame content.
//!
//! Parsing and building actual MAC frames (addressing, security, the Enh-Ack
//! Information Elements) is explicitly out of scope for this node: that is
//! the Thread stack's job. What the radio FSM needs from a frame — its
//! sequence number, whether it wants an ACK, its source address, its frame
//! version — it gets through [`MacFrameBuilder`], a thin interface the
//! stack implements. The timing math (CSL phase, on-air duration) stays
//! here because it only depends on numbers the radio itself already knows.

use crate::source_match::MacAddress;

/// O-QPSK 2.4 GHz PHY symbol duration.
pub const SYMBOL_TIME_US: u64 = 16;
/// Symbols per PSDU octet for this PHY.
pub const SYMBOLS_PER_OCTET: u64 = 2;

pub const LIFS_TIME_US: u64 = 40 * SYMBOL_TIME_US;
pub const SIFS_TIME_US: u64 = 12 * SYMBOL_TIME_US;
pub const AIFS_TIME_US: u64 = 12 * SYMBOL_TIME_US;
pub const CCA_TIME_US: u64 = 8 * SYMBOL_TIME_US;
pub const SHR_DURATION_US: u64 = 5 * SYMBOLS_PER_OCTET * SYMBOL_TIME_US;
pub const SHR_PHR_LENGTH_BYTES: u64 = 6;
pub const SHR_PHR_DURATION_US: u64 = SHR_PHR_LENGTH_BYTES * SYMBOLS_PER_OCTET * SYMBOL_TIME_US;
pub const MAX_TURNAROUND_TIME_US: u64 = 12 * SYMBOL_TIME_US;
pub const MAX_ACK_WAIT_US: u64 = AIFS_TIME_US + 10 * SYMBOL_TIME_US;
/// Max frame length (bytes) still considered "short" per aMaxSifsFrameSize.
pub const MAX_SIFS_FRAME_SIZE: usize = 18;
/// The 10-symbol unit CSL periods and phases are expressed in.
pub const US_PER_TEN_SYMBOLS: u64 = 10 * SYMBOL_TIME_US;

pub const WIFI_MAX_TXTIME_US: u64 = 5484;
pub const WIFI_SLOT_TIME_US: u64 = 9;
pub const WIFI_CCA_TIME_US: u64 = 28;
pub const WIFI_CWMIN_SLOTS: u32 = 32;

pub const RX_SENSITIVITY_DEFAULT_DBM: i8 = -100;
pub const CCA_ED_THRESHOLD_DEFAULT_DBM: i8 = -75;
pub const TX_POWER_DEFAULT_DBM: i8 = 0;
pub const CSL_ACCURACY_DEFAULT_PPM: u8 = 20;
pub const CSL_UNCERTAINTY_DEFAULT_10US: u8 = 10;
pub const TURNAROUND_TIME_NORMAL_US: u64 = 40;
pub const TURNAROUND_TIME_INTERFERER_US: u64 = 9;
pub const STARTUP_TIME_US: u64 = 140;
pub const RAMPUP_TIME_US: u64 = 40;
pub const FAILSAFE_TIME_US: u64 = 1;

/// On-air duration of a frame of `psdu_len` bytes, including the 6-byte
/// SHR+PHR preamble that the simulator's accounting includes.
pub fn frame_duration_us(psdu_len: usize) -> u64 {
    (6 + psdu_len as u64) * SYMBOLS_PER_OCTET * SYMBOL_TIME_US
}

/// CSL period and phase carried in a transmitted frame's CSL IE.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CslIe {
    pub period: u16,
    pub phase: u16,
}

/// Computes the CSL phase for a frame about to be transmitted *right now*.
///
/// `tx_time_us` is the current virtual-clock reading — CSL phase must be
/// computed at the actual TX instant, not when the frame was queued, since
/// only the former is meaningful to the receiver's sample-time schedule.
/// `csl_period` is in 10-symbol units; `csl_sample_time_us` is the next
/// instant (mod `csl_period`) this node expects to sample the channel.
pub fn csl_phase(tx_time_us: u32, csl_period: u16, csl_sample_time_us: u32) -> u16 {
    let period_us = u32::from(csl_period) * US_PER_TEN_SYMBOLS as u32;
    if period_us == 0 {
        return 0;
    }
    let mhr_start = tx_time_us.wrapping_add(SHR_PHR_DURATION_US as u32);
    let mut diff = (csl_sample_time_us % period_us)
        .wrapping_sub(mhr_start % period_us)
        .wrapping_add(period_us)
        % period_us;
    if diff % US_PER_TEN_SYMBOLS as u32 > 0 {
        diff += US_PER_TEN_SYMBOLS as u32;
    }
    (diff / US_PER_TEN_SYMBOLS as u32) as u16
}

/// 802.15.4 frame version, determining Imm-Ack vs Enh-Ack.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameVersion {
    /// 2006 and earlier: immediate, unsecured, IE-less ACK.
    Ieee2006,
    /// 2015 and later: Enhanced ACK, may carry IEs and be secured.
    Ieee2015,
}

/// What the radio FSM needs to know about a frame it's about to receive an
/// ACK request for, or about one it's about to transmit — without parsing
/// or building the frame itself.
pub trait MacFrameBuilder {
    fn frame_version(&self, psdu: &[u8]) -> FrameVersion;
    fn sequence_number(&self, psdu: &[u8]) -> u8;
    fn ack_requested(&self, psdu: &[u8]) -> bool;
    fn source_address(&self, psdu: &[u8]) -> Option<MacAddress>;
    fn is_unicast_to_us(&self, psdu: &[u8]) -> bool;

    /// Builds an Imm-Ack PSDU for a 2006-era frame.
    fn build_imm_ack(&self, seq_num: u8, frame_pending: bool) -> Vec<u8>;

    /// Builds an Enh-Ack PSDU for a 2015-era frame, optionally carrying a
    /// CSL IE and an Enh-Ack Probing IE.
    fn build_enh_ack(&self, seq_num: u8, frame_pending: bool, csl_ie: Option<CslIe>, probing_ie: Option<&[u8]>) -> Vec<u8>;
}

/// A builder that never requests or recognizes anything: every frame is
/// foreign, nothing ever wants an ACK. Lets the node run standalone, without
/// a Thread stack plugged into [`crate::config::Config::MacFrameBuilder`].
#[derive(Debug, Default)]
pub struct NullMacFrameBuilder;

impl MacFrameBuilder for NullMacFrameBuilder {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_matches_shr_phr_plus_payload() {
        // 6-byte preamble accounting + a 20-byte PSDU, 2 symbols/octet, 16us/symbol.
        assert_eq!(frame_duration_us(20), (6 + 20) * 2 * 16);
    }

    #[test]
    fn csl_phase_is_zero_for_zero_period() {
        assert_eq!(csl_phase(1000, 0, 5000), 0);
    }

    #[test]
    fn csl_phase_rounds_up_fractional_remainders() {
        // period = 10 * 160us = 1600us; sample at 1650, tx at 1000 (mhr at 1192).
        let phase = csl_phase(1000, 10, 1650);
        let period_us = 10 * US_PER_TEN_SYMBOLS as u32;
        let mhr_start = 1000u32 + SHR_PHR_DURATION_US as u32;
        let raw_diff = (1650u32 % period_us).wrapping_sub(mhr_start % period_us).wrapping_add(period_us) % period_us;
        let expected = (raw_diff / US_PER_TEN_SYMBOLS as u32) + if raw_diff % US_PER_TEN_SYMBOLS as u32 > 0 { 1 } else { 0 };
        assert_eq!(phase as u32, expected);
    }

    #[test]
    fn csl_phase_handles_wraparound_near_period_boundary() {
        let period_us = 4 * US_PER_TEN_SYMBOLS as u32;
        // tx instant chosen so mhr_start lands just past the sample time, forcing the wrap term.
        let phase = csl_phase(period_us - 10, 4, 10);
        assert!((phase as u32) * US_PER_TEN_SYMBOLS as u32 <= period_us);
    }
}

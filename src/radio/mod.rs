//! The two-level radio state machine: a coarse OT-visible state crossed
//! with a fine sub-state that sequences CCA, on-air transmission,
//! inter-frame spacing, and acknowledgment generation/reception.
//!
//! Every sub-state transition either waits for a timer deadline (checked by
//! the caller on each event-loop iteration via [`Radio::process`]) or for a
//! matching event from the simulator (delivered through
//! `handle_rx_start`/`handle_rx_done`/`handle_cca_done`/`handle_tx_done`).
//! This mirrors `platformRadioProcess` and its sibling `platformRadioRx*`/
//! `platformRadioCcaDone`/`platformRadioTxDone` handlers, translated from a
//! set of file-scope statics into a struct and from `void` side effects
//! into a small returned command list, the way Rubble's link layer returns
//! a [`Cmd`](crate::radio::Cmd) instead of poking a radio driver directly.

pub mod interferer;

use crate::config::Config;
use crate::error::RadioError;
use crate::event::{radio_comm_error, RadioCommEventData, RadioStateEventData};
use crate::mac::{self, CslIe, FrameVersion, MacFrameBuilder};
use crate::source_match::{MacAddress, SourceMatchTable};

pub const MIN_CHANNEL: u8 = 11;
pub const MAX_CHANNEL: u8 = 26;
const NUM_CHANNELS: usize = (MAX_CHANNEL - MIN_CHANNEL + 1) as usize;

/// Sentinel "no deadline scheduled" value for `next_radio_event_time`.
pub const UNDEFINED_TIME_US: u64 = u64::max_value();

const RSSI_INVALID: i8 = 127;
const CHANNEL_MAX_POWER_INVALID: i8 = i8::max_value();

/// Coarse, OT-visible radio state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OtState {
    Disabled,
    Sleep,
    Receive,
    Transmit,
}

/// Fine-grained sub-state, shared across all coarse states.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubState {
    Startup,
    Ready,
    IfsWait,
    TxCca,
    TxCcaToTx,
    TxFrameOngoing,
    TxTxToRx,
    TxTxToAifs,
    TxAifsWait,
    TxAckRxOngoing,
    RxFrameOngoing,
    RxAifsWait,
    RxAckTxOngoing,
    RxTxToRx,
    RxEnergyScan,
    /// Wi-Fi-interferer-mode sub-states; only reachable via
    /// [`interferer::Interferer`].
    AwaitCca,
    CwBackoff,
}

/// A scheduled side effect the caller must carry out: send something to the
/// simulator, or hand something up to the stack.
#[derive(Debug, Clone)]
pub enum RadioCmd {
    /// Request a CCA channel sample before transmitting.
    StartCca { channel: u8, duration_us: u64 },
    /// Transmit a frame now; `psdu` is the frame payload (without the
    /// leading channel byte, which the transport layer prepends).
    /// `is_interference` marks a Wi-Fi-interferer burst, reported to the
    /// simulator with the interferer error code instead of `NONE`.
    Transmit { channel: u8, power_dbm: i8, psdu: Vec<u8>, duration_us: u64, is_interference: bool },
    /// The stack's outstanding TX completed.
    TxDone { result: Result<Option<Vec<u8>>, RadioError> },
    /// A non-ACK, non-promiscuous-filtered frame was delivered to the stack.
    FrameReceived { psdu: Vec<u8>, rssi: i8 },
    /// An energy scan finished.
    EnergyScanDone { rssi: i8 },
}

/// Per-channel maximum TX power table, indexed by `channel - MIN_CHANNEL`.
#[derive(Debug, Clone)]
struct ChannelPowerTable([i8; NUM_CHANNELS]);

impl Default for ChannelPowerTable {
    fn default() -> Self {
        ChannelPowerTable([CHANNEL_MAX_POWER_INVALID; NUM_CHANNELS])
    }
}

impl ChannelPowerTable {
    fn get(&self, channel: u8) -> i8 {
        self.0[(channel - MIN_CHANNEL) as usize]
    }

    fn set(&mut self, channel: u8, power: i8) {
        self.0[(channel - MIN_CHANNEL) as usize] = power;
    }
}

/// A pending transmit request: the frame handed down by the stack, parked
/// here until the FSM is ready to act on it.
#[derive(Debug, Clone)]
struct PendingTx {
    psdu: Vec<u8>,
    channel: u8,
}

/// The received frame a radio-generated ACK will answer, captured at
/// `RX_DONE` time and consumed once AIFS elapses and the ACK is actually
/// built and sent.
#[derive(Debug, Clone)]
struct PendingAck {
    seq_num: u8,
    frame_version: FrameVersion,
    source: Option<MacAddress>,
}

/// The simulated radio's full state, generic over the table/transport seam
/// defined by [`Config`].
pub struct Radio<C: Config> {
    ot_state: OtState,
    sub_state: SubState,
    next_radio_event_time_us: u64,
    /// The virtual-clock reading as of the most recent call into this
    /// radio. Sub-state deadlines are always computed relative to this,
    /// since every public method that can start a timed wait receives
    /// `now` from the caller rather than owning a clock itself.
    last_now_us: u64,

    current_channel: u8,
    ongoing_operation_channel: u8,
    pan_id: u16,
    short_address: u16,
    /// Stored MSB-first (reversed) for comparison against received frames,
    /// matching `ReverseExtAddress` in the platform reference.
    ext_address_reversed: [u8; 8],
    promiscuous: bool,

    tx_power_dbm: i8,
    cca_ed_threshold_dbm: i8,
    rx_sensitivity_dbm: i8,
    channel_max_tx_power: ChannelPowerTable,

    csl_period: u16,
    csl_sample_time_us: u32,
    csl_accuracy: u8,
    csl_uncertainty: u8,

    /// Key material the stack has installed for MAC security. This node
    /// never performs the CCM transform itself (out of scope); it only
    /// holds the fields so `otPlatRadioSetMacKey`-equivalent calls have
    /// somewhere to go.
    mac_key_id: u8,
    mac_frame_counter: u32,

    region_code: u16,

    tx_wait: bool,
    delay_sleep: bool,
    tx_interferer_level: u8,
    turnaround_time_us: u64,

    pending_tx: Option<PendingTx>,
    last_tx_error: Option<RadioError>,
    /// Length of the frame just handed to [`RadioCmd::Transmit`], kept around
    /// past the point `pending_tx` is taken so the TX-side IFS decision can
    /// still see it (mirrors the RX side, which has `psdu` in hand already).
    last_tx_psdu_len: usize,

    energy_scanning: bool,
    energy_scan_end_time_ms: u32,
    energy_scan_result: i8,

    receive_timestamp_us: u64,
    pending_ack: Option<PendingAck>,

    last_reported: Option<RadioStateEventData>,

    source_match: C::SourceMatch,
}

impl<C: Config> Radio<C> {
    pub fn new(source_match: C::SourceMatch) -> Self {
        Radio {
            ot_state: OtState::Disabled,
            sub_state: SubState::Startup,
            next_radio_event_time_us: UNDEFINED_TIME_US,
            last_now_us: 0,
            current_channel: MIN_CHANNEL,
            ongoing_operation_channel: MIN_CHANNEL,
            pan_id: 0xffff,
            short_address: 0xffff,
            ext_address_reversed: [0; 8],
            promiscuous: false,
            tx_power_dbm: mac::TX_POWER_DEFAULT_DBM,
            cca_ed_threshold_dbm: mac::CCA_ED_THRESHOLD_DEFAULT_DBM,
            rx_sensitivity_dbm: mac::RX_SENSITIVITY_DEFAULT_DBM,
            channel_max_tx_power: ChannelPowerTable::default(),
            csl_period: 0,
            csl_sample_time_us: 0,
            csl_accuracy: mac::CSL_ACCURACY_DEFAULT_PPM,
            csl_uncertainty: mac::CSL_UNCERTAINTY_DEFAULT_10US,
            mac_key_id: 0,
            mac_frame_counter: 0,
            region_code: 0,
            tx_wait: false,
            delay_sleep: false,
            tx_interferer_level: 0,
            turnaround_time_us: mac::TURNAROUND_TIME_NORMAL_US,
            pending_tx: None,
            last_tx_error: None,
            last_tx_psdu_len: 0,
            energy_scanning: false,
            energy_scan_end_time_ms: 0,
            energy_scan_result: RSSI_INVALID,
            receive_timestamp_us: 0,
            pending_ack: None,
            last_reported: None,
            source_match,
        }
    }

    pub fn ot_state(&self) -> OtState {
        self.ot_state
    }

    pub fn sub_state(&self) -> SubState {
        self.sub_state
    }

    pub fn is_enabled(&self) -> bool {
        self.ot_state != OtState::Disabled
    }

    fn set_ot_state(&mut self, state: OtState) {
        if state != self.ot_state {
            if state == OtState::Disabled {
                self.set_sub_state(SubState::Startup, Some(mac::STARTUP_TIME_US));
            }
            self.ot_state = state;
        }
    }

    fn set_sub_state(&mut self, state: SubState, time_to_remain_us: Option<u64>) {
        self.next_radio_event_time_us = match time_to_remain_us {
            None => UNDEFINED_TIME_US,
            Some(d) => self.now_hint().wrapping_add(d),
        };
        self.sub_state = state;
    }

    /// The FSM needs "now" to schedule sub-state deadlines, but doesn't own
    /// the clock; callers pass it into every method that can cause a
    /// transition. This helper exists only so `set_sub_state` (called from
    /// many call sites, each of which already has `now`) has a single,
    /// obviously-named place that would need changing if that changed.
    fn now_hint(&self) -> u64 {
        self.last_now_us
    }

    // --- Public radio API, mirroring otPlatRadio* -------------------------------------------

    pub fn enable(&mut self, now_us: u64) -> Result<(), RadioError> {
        self.last_now_us = now_us;
        if !self.is_enabled() {
            self.set_ot_state(OtState::Sleep);
            self.set_sub_state(SubState::Startup, Some(mac::STARTUP_TIME_US));
        }
        Ok(())
    }

    pub fn disable(&mut self, now_us: u64) -> Result<(), RadioError> {
        self.last_now_us = now_us;
        if !self.is_enabled() {
            return Ok(());
        }
        if self.ot_state != OtState::Sleep {
            return Err(RadioError::InvalidState);
        }
        self.delay_sleep = false;
        self.set_ot_state(OtState::Disabled);
        Ok(())
    }

    pub fn sleep(&mut self, now_us: u64) -> Result<(), RadioError> {
        self.last_now_us = now_us;
        if matches!(self.sub_state, SubState::RxFrameOngoing | SubState::RxAckTxOngoing | SubState::RxAifsWait) {
            self.delay_sleep = true;
            return Err(RadioError::Busy);
        }
        if matches!(self.ot_state, OtState::Sleep | OtState::Receive) {
            self.delay_sleep = false;
            self.set_ot_state(OtState::Sleep);
            return Ok(());
        }
        Err(RadioError::InvalidState)
    }

    pub fn receive(&mut self, now_us: u64, channel: u8) -> Result<(), RadioError> {
        self.last_now_us = now_us;
        if self.ot_state == OtState::Disabled {
            return Err(RadioError::InvalidState);
        }
        if self.ot_state == OtState::Sleep && self.sub_state != SubState::Startup {
            self.set_sub_state(SubState::Startup, Some(mac::RAMPUP_TIME_US));
        }
        self.tx_wait = false;
        self.delay_sleep = false;
        self.current_channel = channel;
        self.set_ot_state(OtState::Receive);
        Ok(())
    }

    /// Hands a frame to the radio for transmission. The actual CCA/TX
    /// sequence is driven by [`Radio::process`]; this call only arms it
    /// (mirroring `otPlatRadioTransmit`, which merely flips the coarse
    /// state and lets `platformRadioProcess` do the rest).
    pub fn transmit(&mut self, now_us: u64, channel: u8, psdu: Vec<u8>) -> Result<(), RadioError> {
        self.last_now_us = now_us;
        if self.ot_state != OtState::Receive {
            return Err(RadioError::InvalidState);
        }
        self.delay_sleep = false;
        self.current_channel = channel;
        self.pending_tx = Some(PendingTx { psdu, channel });
        self.tx_wait = false;
        self.set_ot_state(OtState::Transmit);
        Ok(())
    }

    pub fn energy_scan(&mut self, now_ms: u32, channel: u8, duration_ms: u16) -> Result<(), RadioError> {
        if self.energy_scanning {
            return Err(RadioError::Busy);
        }
        self.ongoing_operation_channel = channel;
        self.energy_scan_result = RSSI_INVALID;
        self.energy_scanning = true;
        self.energy_scan_end_time_ms = now_ms.wrapping_add(u32::from(duration_ms));
        self.set_sub_state(SubState::RxEnergyScan, None);
        Ok(())
    }

    pub fn set_promiscuous(&mut self, enabled: bool) {
        self.promiscuous = enabled;
    }

    pub fn set_pan_id(&mut self, pan_id: u16) {
        self.pan_id = pan_id;
    }

    pub fn set_short_address(&mut self, addr: u16) {
        self.short_address = addr;
    }

    pub fn set_extended_address(&mut self, addr_le: [u8; 8]) {
        for i in 0..8 {
            self.ext_address_reversed[i] = addr_le[7 - i];
        }
    }

    pub fn set_tx_power(&mut self, dbm: i8) {
        self.tx_power_dbm = dbm;
    }

    pub fn set_channel_max_transmit_power(&mut self, channel: u8, dbm: i8) -> Result<(), RadioError> {
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
            return Err(RadioError::InvalidArgs);
        }
        self.channel_max_tx_power.set(channel, dbm);
        Ok(())
    }

    pub fn current_channel(&self) -> u8 {
        self.current_channel
    }

    pub fn tx_power_dbm(&self) -> i8 {
        self.tx_power_dbm
    }

    pub fn cca_ed_threshold(&self) -> i8 {
        self.cca_ed_threshold_dbm
    }

    pub fn set_cca_ed_threshold(&mut self, dbm: i8) {
        self.cca_ed_threshold_dbm = dbm;
    }

    pub fn rx_sensitivity(&self) -> i8 {
        self.rx_sensitivity_dbm
    }

    pub fn set_rx_sensitivity(&mut self, dbm: i8) {
        self.rx_sensitivity_dbm = dbm;
    }

    pub fn csl_accuracy(&self) -> u8 {
        self.csl_accuracy
    }

    pub fn set_csl_accuracy(&mut self, accuracy: u8) {
        self.csl_accuracy = accuracy;
    }

    pub fn csl_uncertainty(&self) -> u8 {
        self.csl_uncertainty
    }

    pub fn set_csl_uncertainty(&mut self, uncertainty: u8) {
        self.csl_uncertainty = uncertainty;
    }

    pub fn set_csl_period(&mut self, period: u16) {
        self.csl_period = period;
    }

    pub fn set_csl_sample_time(&mut self, sample_time_us: u32) {
        self.csl_sample_time_us = sample_time_us;
    }

    pub fn set_mac_key(&mut self, key_id: u8) {
        self.mac_key_id = key_id;
    }

    pub fn set_mac_frame_counter(&mut self, counter: u32) {
        self.mac_frame_counter = counter;
    }

    pub fn set_region(&mut self, region: u16) {
        self.region_code = region;
    }

    pub fn region(&self) -> u16 {
        self.region_code
    }

    pub fn set_source_match_enabled(&mut self, enabled: bool) {
        self.source_match.set_enabled(enabled);
    }

    pub fn source_match_mut(&mut self) -> &mut C::SourceMatch {
        &mut self.source_match
    }

    pub fn set_tx_interferer_level(&mut self, level: u8) {
        self.tx_interferer_level = level.min(100);
        self.turnaround_time_us = if self.tx_interferer_level > 0 {
            mac::TURNAROUND_TIME_INTERFERER_US
        } else {
            mac::TURNAROUND_TIME_NORMAL_US
        };
    }

    pub fn tx_interferer_level(&self) -> u8 {
        self.tx_interferer_level
    }

    pub fn is_transmit_pending(&self) -> bool {
        self.ot_state == OtState::Transmit && !self.tx_wait
    }

    /// Whether the radio is mid-transition: armed for TX/RX but not yet
    /// `READY`. The event loop uses this (together with
    /// [`Self::is_transmit_pending`]) to decide whether it's safe to sleep.
    pub fn is_busy(&self) -> bool {
        matches!(self.ot_state, OtState::Transmit | OtState::Receive) && self.sub_state != SubState::Ready
    }

    /// Whether the normal (non-interferer) FSM should run at all. When a
    /// TX_INTERFERER level is set, `process` is a no-op and
    /// [`interferer::Interferer`] drives the radio instead.
    pub fn is_interferer_active(&self) -> bool {
        self.tx_interferer_level > 0
    }

    // --- Event-loop driven processing --------------------------------------------------------

    /// Advances timer-driven sub-state transitions. Call once per
    /// event-loop iteration with the current virtual-clock reading.
    pub fn process(&mut self, now_us: u64, builder: &impl MacFrameBuilder) -> Vec<RadioCmd> {
        self.last_now_us = now_us;
        let mut cmds = Vec::new();

        if self.is_interferer_active() {
            return cmds;
        }

        // Tie-break: a TX handed over mid-RX fails immediately rather than waiting for
        // the RX to finish, so dense scenarios don't get CCA-period-synchronized.
        if self.is_transmit_pending()
            && matches!(self.sub_state, SubState::RxFrameOngoing | SubState::RxAckTxOngoing | SubState::RxAifsWait)
        {
            cmds.push(self.signal_tx_done(Err(RadioError::ChannelAccessFailure)));
        }

        if now_us < self.next_radio_event_time_us {
            return cmds;
        }

        let ifs_time_us = self.ifs_time_for_pending_tx();

        match self.sub_state {
            SubState::Startup => {
                self.set_sub_state(SubState::Ready, None);
            }
            SubState::Ready => {
                self.ongoing_operation_channel = self.current_channel;
                if self.is_transmit_pending() {
                    let channel = self.pending_tx.as_ref().map(|p| p.channel).unwrap_or(self.current_channel);
                    self.set_sub_state(SubState::TxCca, Some(mac::CCA_TIME_US + mac::FAILSAFE_TIME_US));
                    self.tx_wait = true;
                    self.last_tx_error = None;
                    cmds.push(RadioCmd::StartCca { channel, duration_us: mac::CCA_TIME_US });
                }
            }
            SubState::TxCca => {
                // CCA period timed out without a sample from the simulator; shouldn't happen.
                cmds.push(self.signal_tx_done(Err(RadioError::ChannelAccessFailure)));
                self.set_sub_state(SubState::Ready, None);
                self.tx_wait = false;
            }
            SubState::TxCcaToTx => {
                if let Some(pending) = self.pending_tx.take() {
                    self.last_tx_psdu_len = pending.psdu.len();
                    let duration_us = mac::frame_duration_us(pending.psdu.len());
                    let max_power = self.channel_max_tx_power.get(pending.channel);
                    let power = self.tx_power_dbm.min(max_power);
                    cmds.push(RadioCmd::Transmit {
                        channel: pending.channel,
                        power_dbm: power,
                        psdu: pending.psdu,
                        duration_us,
                        is_interference: false,
                    });
                    self.set_sub_state(SubState::TxFrameOngoing, Some(duration_us + mac::FAILSAFE_TIME_US));
                }
            }
            SubState::TxFrameOngoing => {
                self.set_sub_state(SubState::TxTxToRx, Some(self.turnaround_time_us));
            }
            SubState::TxTxToRx => {
                let remaining = ifs_time_us.saturating_sub(self.turnaround_time_us);
                self.set_sub_state(SubState::IfsWait, Some(remaining));
            }
            SubState::TxTxToAifs => {
                self.set_sub_state(SubState::TxAifsWait, Some(mac::MAX_ACK_WAIT_US));
            }
            SubState::TxAifsWait => {
                self.set_sub_state(SubState::Ready, None);
                cmds.push(self.signal_tx_done(Err(RadioError::NoAck)));
                self.tx_wait = false;
            }
            SubState::TxAckRxOngoing => {
                self.set_sub_state(SubState::IfsWait, Some(ifs_time_us));
                cmds.push(self.signal_tx_done(Err(RadioError::NoAck)));
            }
            SubState::IfsWait => {
                self.set_sub_state(SubState::Ready, None);
                self.tx_wait = false;
            }
            SubState::RxFrameOngoing => {
                // Failsafe: the simulator's RX_DONE never arrived.
                self.set_sub_state(SubState::IfsWait, Some(self.turnaround_time_us));
            }
            SubState::RxAifsWait => {
                if let Some(ack_cmd) = self.build_and_send_ack(now_us, builder) {
                    cmds.push(ack_cmd);
                }
            }
            SubState::RxAckTxOngoing => {
                self.set_sub_state(SubState::RxTxToRx, Some(self.turnaround_time_us));
                self.apply_delayed_sleep();
            }
            SubState::RxTxToRx => {
                self.set_sub_state(SubState::IfsWait, Some(self.turnaround_time_us));
            }
            SubState::RxEnergyScan => {
                cmds.push(RadioCmd::EnergyScanDone { rssi: self.energy_scan_result });
                self.set_sub_state(SubState::Ready, None);
                self.energy_scanning = false;
            }
            SubState::AwaitCca | SubState::CwBackoff => {
                self.set_sub_state(SubState::Ready, Some(0));
            }
        }

        cmds
    }

    fn ifs_time_for_pending_tx(&self) -> u64 {
        if self.last_tx_psdu_len > mac::MAX_SIFS_FRAME_SIZE {
            mac::LIFS_TIME_US
        } else {
            mac::SIFS_TIME_US
        }
    }

    fn apply_delayed_sleep(&mut self) {
        if self.delay_sleep {
            self.set_ot_state(OtState::Sleep);
            self.delay_sleep = false;
        }
    }

    fn signal_tx_done(&mut self, result: Result<Option<Vec<u8>>, RadioError>) -> RadioCmd {
        if self.tx_interferer_level == 0 && self.ot_state == OtState::Transmit {
            self.set_ot_state(OtState::Receive);
        }
        self.last_tx_error = result.as_ref().err().copied();
        RadioCmd::TxDone { result }
    }

    fn build_and_send_ack(&mut self, now_us: u64, builder: &impl MacFrameBuilder) -> Option<RadioCmd> {
        // CSL phase and frame-pending are recomputed here, at the actual AIFS-elapsed TX
        // instant, never at RX time, so a receiver's CSL schedule sees an accurate phase.
        let pending = self.pending_ack.take()?;
        let frame_pending = self.source_match.has_frame_pending(pending.source);

        let ack_psdu = match pending.frame_version {
            FrameVersion::Ieee2006 => builder.build_imm_ack(pending.seq_num, frame_pending),
            FrameVersion::Ieee2015 => {
                let csl_ie = if self.csl_period > 0 {
                    Some(CslIe {
                        period: self.csl_period,
                        phase: mac::csl_phase(now_us as u32, self.csl_period, self.csl_sample_time_us),
                    })
                } else {
                    None
                };
                builder.build_enh_ack(pending.seq_num, frame_pending, csl_ie, None)
            }
        };

        let duration_us = mac::frame_duration_us(ack_psdu.len());
        self.set_sub_state(SubState::RxAckTxOngoing, Some(duration_us));
        Some(RadioCmd::Transmit {
            channel: self.ongoing_operation_channel,
            power_dbm: self.tx_power_dbm,
            psdu: ack_psdu,
            duration_us,
            is_interference: false,
        })
    }

    /// Produces a state report iff any externally-observable field changed
    /// since the last report (or `force`), mirroring
    /// `platformRadioReportStateToSimulator`.
    pub fn report_state(&mut self, now_us: u64, force: bool) -> Option<RadioStateEventData> {
        let energy_state = match self.sub_state {
            SubState::TxFrameOngoing | SubState::RxAckTxOngoing => OtState::Transmit,
            _ if self.ot_state == OtState::Transmit || self.sub_state == SubState::RxFrameOngoing => OtState::Receive,
            _ => self.ot_state,
        };

        let report = RadioStateEventData {
            channel: self.ongoing_operation_channel,
            tx_power_dbm: self.tx_power_dbm,
            rx_sensitivity_dbm: self.rx_sensitivity_dbm,
            energy_state: ot_state_wire(energy_state),
            sub_state: sub_state_wire(self.sub_state),
            ot_state: ot_state_wire(self.ot_state),
            radio_time_us: now_us,
        };

        let changed = force
            || self.last_reported.map_or(true, |prev| {
                prev.ot_state != report.ot_state
                    || prev.channel != report.channel
                    || prev.sub_state != report.sub_state
                    || prev.rx_sensitivity_dbm != report.rx_sensitivity_dbm
            });

        if changed {
            self.last_reported = Some(report);
            Some(report)
        } else {
            None
        }
    }

    pub fn next_deadline_us(&self) -> Option<u64> {
        if self.next_radio_event_time_us == UNDEFINED_TIME_US {
            None
        } else {
            Some(self.next_radio_event_time_us)
        }
    }

    // --- Simulator event handlers, mirroring platformRadioRx*/CcaDone/TxDone --------------------

    pub fn handle_rx_start(&mut self, now_us: u64, comm: &RadioCommEventData) {
        self.last_now_us = now_us;
        if self.ongoing_operation_channel != comm.channel {
            return;
        }
        if !matches!(self.ot_state, OtState::Receive | OtState::Transmit) {
            return;
        }
        if !matches!(self.sub_state, SubState::Ready | SubState::IfsWait | SubState::TxAifsWait) {
            return;
        }
        if comm.error != radio_comm_error::NONE {
            return;
        }

        if self.sub_state == SubState::TxAifsWait {
            self.set_sub_state(SubState::TxAckRxOngoing, Some(comm.duration_us + mac::FAILSAFE_TIME_US));
        } else {
            self.set_sub_state(SubState::RxFrameOngoing, Some(comm.duration_us + mac::FAILSAFE_TIME_US));
        }
        self.receive_timestamp_us = now_us.wrapping_add(mac::SHR_DURATION_US);
    }

    pub fn handle_rx_done(
        &mut self,
        now_us: u64,
        psdu: Vec<u8>,
        comm: &RadioCommEventData,
        builder: &impl MacFrameBuilder,
    ) -> Vec<RadioCmd> {
        self.last_now_us = now_us;
        let mut cmds = Vec::new();

        if !matches!(self.sub_state, SubState::RxFrameOngoing | SubState::TxAckRxOngoing) {
            return cmds;
        }

        let frame_version = builder.frame_version(&psdu);
        let is_ack = psdu_is_ack(&psdu);
        let ack_requested = builder.ack_requested(&psdu);
        let addressed_to_me = builder.is_unicast_to_us(&psdu);

        if self.sub_state == SubState::RxFrameOngoing
            && ack_requested
            && !is_ack
            && addressed_to_me
            && comm.error == radio_comm_error::NONE
        {
            self.pending_ack = Some(PendingAck {
                seq_num: builder.sequence_number(&psdu),
                frame_version,
                source: builder.source_address(&psdu),
            });
            self.set_sub_state(SubState::RxAifsWait, Some(mac::AIFS_TIME_US));
        } else if self.sub_state == SubState::RxFrameOngoing {
            self.set_sub_state(SubState::IfsWait, Some(self.turnaround_time_us));
            self.apply_delayed_sleep();
        } else if self.sub_state == SubState::TxAckRxOngoing {
            let ifs = if psdu.len() > mac::MAX_SIFS_FRAME_SIZE { mac::LIFS_TIME_US } else { mac::SIFS_TIME_US };
            self.set_sub_state(SubState::IfsWait, Some(ifs));
        }

        let was_waiting_for_ack = self.tx_wait && self.pending_tx.is_none();
        if was_waiting_for_ack {
            let seq_matches = is_ack && comm.error == radio_comm_error::NONE;
            self.tx_wait = false;
            let result = if seq_matches { Ok(Some(psdu)) } else { Err(RadioError::NoAck) };
            cmds.push(self.signal_tx_done(result));
        } else if !is_ack || self.promiscuous {
            cmds.push(RadioCmd::FrameReceived { psdu, rssi: comm.power_dbm });
        }

        cmds
    }

    pub fn handle_cca_done(&mut self, now_us: u64, comm: &RadioCommEventData) -> Vec<RadioCmd> {
        self.last_now_us = now_us;
        let mut cmds = Vec::new();

        if self.sub_state != SubState::TxCca {
            return cmds;
        }

        let channel_clear = comm.power_dbm < self.cca_ed_threshold_dbm || comm.power_dbm == RSSI_INVALID;
        if channel_clear {
            self.set_sub_state(SubState::TxCcaToTx, Some(self.turnaround_time_us));
        } else {
            self.tx_wait = false;
            self.last_tx_error = Some(RadioError::ChannelAccessFailure);
            if self.tx_interferer_level == 0 {
                self.set_sub_state(SubState::Ready, None);
                cmds.push(self.signal_tx_done(Err(RadioError::ChannelAccessFailure)));
            } else {
                self.set_sub_state(SubState::Ready, Some(1));
            }
        }

        cmds
    }

    pub fn handle_tx_done(&mut self, now_us: u64, error: Option<RadioError>, ack_requested: bool) -> Vec<RadioCmd> {
        self.last_now_us = now_us;
        let mut cmds = Vec::new();

        match self.sub_state {
            SubState::RxAckTxOngoing => {
                self.set_sub_state(SubState::RxTxToRx, Some(self.turnaround_time_us));
            }
            SubState::TxFrameOngoing => {
                if !ack_requested || error.is_some() {
                    self.set_sub_state(SubState::TxTxToRx, Some(self.turnaround_time_us));
                    if self.tx_interferer_level == 0 {
                        cmds.push(self.signal_tx_done(error.map_or(Ok(None), Err)));
                    }
                } else {
                    self.set_sub_state(SubState::TxTxToAifs, Some(self.turnaround_time_us));
                }
            }
            _ => {}
        }

        cmds
    }
}

fn psdu_is_ack(psdu: &[u8]) -> bool {
    // Frame Type is the low 3 bits of the first octet of the MAC header; 0b010 = Ack.
    psdu.first().map_or(false, |b| b & 0x07 == 0x02)
}

fn ot_state_wire(state: OtState) -> u8 {
    match state {
        OtState::Disabled => 0,
        OtState::Sleep => 1,
        OtState::Receive => 2,
        OtState::Transmit => 3,
    }
}

fn sub_state_wire(state: SubState) -> u8 {
    match state {
        SubState::Startup => 0,
        SubState::Ready => 1,
        SubState::IfsWait => 2,
        SubState::TxCca => 3,
        SubState::TxCcaToTx => 4,
        SubState::TxFrameOngoing => 5,
        SubState::TxTxToRx => 6,
        SubState::TxTxToAifs => 7,
        SubState::TxAifsWait => 8,
        SubState::TxAckRxOngoing => 9,
        SubState::RxFrameOngoing => 10,
        SubState::RxAifsWait => 11,
        SubState::RxAckTxOngoing => 12,
        SubState::RxTxToRx => 13,
        SubState::RxEnergyScan => 14,
        SubState::AwaitCca => 15,
        SubState::CwBackoff => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::MacFrameBuilder;
    use crate::source_match::VecSourceMatchTable;

    struct TestBuilder;
    impl MacFrameBuilder for TestBuilder {
        fn frame_version(&self, _psdu: &[u8]) -> FrameVersion {
            FrameVersion::Ieee2006
        }
        fn sequence_number(&self, psdu: &[u8]) -> u8 {
            psdu.get(2).copied().unwrap_or(0)
        }
        fn ack_requested(&self, psdu: &[u8]) -> bool {
            psdu.first().map_or(false, |b| b & 0x20 != 0)
        }
        fn source_address(&self, _psdu: &[u8]) -> Option<MacAddress> {
            None
        }
        fn is_unicast_to_us(&self, _psdu: &[u8]) -> bool {
            true
        }
        fn build_imm_ack(&self, seq_num: u8, frame_pending: bool) -> Vec<u8> {
            vec![0x02, 0x00, seq_num, frame_pending as u8]
        }
        fn build_enh_ack(&self, seq_num: u8, frame_pending: bool, _csl: Option<CslIe>, _probing: Option<&[u8]>) -> Vec<u8> {
            self.build_imm_ack(seq_num, frame_pending)
        }
    }

    struct TestConfig;
    impl Config for TestConfig {
        type Transport = crate::transport::FakeTransport;
        type SourceMatch = VecSourceMatchTable;
        type Rng = rand::rngs::mock::StepRng;
        type MacFrameBuilder = TestBuilder;
        type UartSink = crate::uart::NullUartSink;
        type HostBridge = crate::host_bridge::NullHostBridge;
        type BleSink = crate::ble::NullBleSink;
    }

    fn new_radio() -> Radio<TestConfig> {
        Radio::new(VecSourceMatchTable::new())
    }

    #[test]
    fn enable_moves_from_disabled_to_sleep_after_startup() {
        let mut radio = new_radio();
        radio.enable(0).unwrap();
        assert_eq!(radio.ot_state(), OtState::Sleep);
        assert_eq!(radio.sub_state(), SubState::Startup);
        let cmds = radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        assert!(cmds.is_empty());
        assert_eq!(radio.sub_state(), SubState::Ready);
    }

    #[test]
    fn sleep_during_rx_ongoing_is_busy_and_deferred() {
        let mut radio = new_radio();
        radio.enable(0).unwrap();
        radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        radio.receive(mac::STARTUP_TIME_US, 11).unwrap();
        radio.handle_rx_start(
            mac::STARTUP_TIME_US,
            &RadioCommEventData { channel: 11, power_dbm: -60, error: radio_comm_error::NONE, duration_us: 500 },
        );
        assert_eq!(radio.sleep(mac::STARTUP_TIME_US), Err(RadioError::Busy));
        assert!(radio.delay_sleep);
    }

    #[test]
    fn transmit_requires_receive_state() {
        let mut radio = new_radio();
        assert_eq!(radio.transmit(0, 11, vec![1, 2, 3]), Err(RadioError::InvalidState));
    }

    #[test]
    fn tie_break_fails_new_tx_immediately_during_rx_aifs_wait() {
        let mut radio = new_radio();
        radio.enable(0).unwrap();
        radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        radio.receive(mac::STARTUP_TIME_US, 11).unwrap();
        radio.set_sub_state(SubState::RxAifsWait, Some(mac::AIFS_TIME_US));
        radio.transmit(mac::STARTUP_TIME_US, 11, vec![0x21, 0x00, 7]).unwrap();

        let cmds = radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        assert!(matches!(
            cmds.first(),
            Some(RadioCmd::TxDone { result: Err(RadioError::ChannelAccessFailure) })
        ));
        assert_eq!(radio.sub_state(), SubState::RxAifsWait);
    }

    #[test]
    fn cca_clear_moves_to_cca_to_tx() {
        let mut radio = new_radio();
        radio.enable(0).unwrap();
        radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        radio.receive(mac::STARTUP_TIME_US, 11).unwrap();
        radio.transmit(mac::STARTUP_TIME_US, 11, vec![0x01, 0x00, 1]).unwrap();
        radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        assert_eq!(radio.sub_state(), SubState::TxCca);

        radio.handle_cca_done(
            mac::STARTUP_TIME_US,
            &RadioCommEventData { channel: 11, power_dbm: -95, error: radio_comm_error::NONE, duration_us: 0 },
        );
        assert_eq!(radio.sub_state(), SubState::TxCcaToTx);
    }

    #[test]
    fn long_frame_transmit_uses_lifs_not_sifs() {
        let mut radio = new_radio();
        radio.enable(0).unwrap();
        radio.process(mac::STARTUP_TIME_US, &TestBuilder);
        radio.receive(mac::STARTUP_TIME_US, 11).unwrap();

        let long_psdu = vec![0u8; mac::MAX_SIFS_FRAME_SIZE + 5];
        radio.transmit(mac::STARTUP_TIME_US, 11, long_psdu).unwrap();

        let mut now = mac::STARTUP_TIME_US;
        radio.process(now, &TestBuilder);
        assert_eq!(radio.sub_state(), SubState::TxCca);

        radio.handle_cca_done(
            now,
            &RadioCommEventData { channel: 11, power_dbm: -95, error: radio_comm_error::NONE, duration_us: 0 },
        );
        assert_eq!(radio.sub_state(), SubState::TxCcaToTx);

        now = radio.next_radio_event_time_us;
        let cmds = radio.process(now, &TestBuilder);
        assert!(matches!(cmds.first(), Some(RadioCmd::Transmit { .. })));
        assert_eq!(radio.sub_state(), SubState::TxFrameOngoing);
        assert!(radio.last_tx_psdu_len > mac::MAX_SIFS_FRAME_SIZE);

        now = radio.next_radio_event_time_us;
        radio.process(now, &TestBuilder);
        assert_eq!(radio.sub_state(), SubState::TxTxToRx);

        now = radio.next_radio_event_time_us;
        radio.process(now, &TestBuilder);
        assert_eq!(radio.sub_state(), SubState::IfsWait);

        let expected_remaining = mac::LIFS_TIME_US.saturating_sub(radio.turnaround_time_us);
        assert_eq!(radio.next_radio_event_time_us, now.wrapping_add(expected_remaining));
    }
}

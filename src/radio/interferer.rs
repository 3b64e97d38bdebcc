//! Wi-Fi-style 802.11n interferer mode.
//!
//! When `TX_INTERFERER` is set to a nonzero level, the ordinary radio FSM
//! ([`super::Radio::process`]) steps aside and this state machine drives the
//! radio instead: it transmits random-length interference bursts at a rate
//! proportional to the configured level, with DCF-style backoff after a
//! simulated CCA failure. Mirrors `platformRadioInterfererProcess`.

use rand::Rng;

use crate::mac;

use super::{RadioCmd, SubState, UNDEFINED_TIME_US};

/// Drives the interferer sub-state machine. Constructed once per radio and
/// only stepped while `tx_interferer_level > 0`.
pub struct Interferer {
    sub_state: SubState,
    next_event_time_us: u64,
    last_error: bool,
}

impl Default for Interferer {
    fn default() -> Self {
        Self::new()
    }
}

impl Interferer {
    pub fn new() -> Self {
        Interferer { sub_state: SubState::Startup, next_event_time_us: 0, last_error: false }
    }

    pub fn sub_state(&self) -> SubState {
        self.sub_state
    }

    fn set_sub_state(&mut self, state: SubState, now_us: u64, delay_us: u64) {
        self.next_event_time_us = now_us.wrapping_add(delay_us);
        self.sub_state = state;
    }

    pub fn note_cca_failure(&mut self) {
        self.last_error = true;
    }

    pub fn note_cca_success(&mut self) {
        self.last_error = false;
    }

    /// Advances the interferer's own timer-driven transitions. `rng` supplies
    /// the random delay/backoff/burst-length draws.
    pub fn process(&mut self, now_us: u64, channel: u8, tx_power_dbm: i8, level: u8, rng: &mut impl Rng) -> Vec<RadioCmd> {
        let mut cmds = Vec::new();
        if now_us < self.next_event_time_us {
            return cmds;
        }

        match self.sub_state {
            SubState::Startup => {
                self.set_sub_state(SubState::Ready, now_us, 1);
            }
            SubState::Ready => {
                if self.last_error {
                    let delay = u64::from(rng.gen_range(0, mac::WIFI_CWMIN_SLOTS)) * mac::WIFI_SLOT_TIME_US;
                    self.set_sub_state(SubState::CwBackoff, now_us, delay);
                } else {
                    let delay = if level >= 100 {
                        1
                    } else {
                        rng.gen_range(1, 1_000_000 - u32::from(level) * 10_000) as u64
                    };
                    self.set_sub_state(SubState::AwaitCca, now_us, delay);
                }
            }
            SubState::CwBackoff | SubState::AwaitCca => {
                self.set_sub_state(SubState::TxCca, now_us, mac::WIFI_CCA_TIME_US + mac::FAILSAFE_TIME_US);
                cmds.push(RadioCmd::StartCca { channel, duration_us: mac::WIFI_CCA_TIME_US });
            }
            SubState::TxCcaToTx => {
                let duration_us = u64::from(rng.gen_range((mac::WIFI_MAX_TXTIME_US / 6) as u32, (mac::WIFI_MAX_TXTIME_US + 1) as u32));
                self.set_sub_state(SubState::TxFrameOngoing, now_us, duration_us + mac::FAILSAFE_TIME_US);
                cmds.push(RadioCmd::Transmit {
                    channel,
                    power_dbm: tx_power_dbm,
                    psdu: Vec::new(),
                    duration_us,
                    is_interference: true,
                });
            }
            SubState::TxCca | SubState::TxFrameOngoing | SubState::TxTxToRx => {
                self.set_sub_state(SubState::Ready, now_us, 1);
            }
            _ => {
                self.set_sub_state(SubState::Ready, now_us, 1);
            }
        }

        cmds
    }

    /// Drives the TX_DONE transition: the burst finished transmitting, so
    /// move into the turnaround wait before returning to `Ready`, mirroring
    /// the normal FSM's `TxFrameOngoing -> TxTxToRx` step.
    pub fn handle_tx_done(&mut self, now_us: u64) {
        if self.sub_state == SubState::TxFrameOngoing {
            self.set_sub_state(SubState::TxTxToRx, now_us, mac::TURNAROUND_TIME_INTERFERER_US);
        }
    }

    pub fn handle_cca_done(&mut self, now_us: u64, channel_clear: bool) {
        if self.sub_state != SubState::TxCca {
            return;
        }
        if channel_clear {
            self.note_cca_success();
            self.set_sub_state(SubState::TxCcaToTx, now_us, 0);
        } else {
            self.note_cca_failure();
            self.set_sub_state(SubState::Ready, now_us, 1);
        }
    }

    pub fn next_deadline_us(&self) -> Option<u64> {
        if self.next_event_time_us == UNDEFINED_TIME_US {
            None
        } else {
            Some(self.next_event_time_us)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn starts_up_into_ready() {
        let mut intf = Interferer::new();
        let mut rng = StepRng::new(0, 1);
        let cmds = intf.process(1, 11, 0, 50, &mut rng);
        assert!(cmds.is_empty());
        assert_eq!(intf.sub_state(), SubState::Ready);
    }

    #[test]
    fn cca_failure_leads_to_backoff_not_await_cca() {
        let mut intf = Interferer::new();
        intf.note_cca_failure();
        let mut rng = StepRng::new(0, 1);
        intf.process(1, 11, 0, 50, &mut rng);
        let cmds = intf.process(2, 11, 0, 50, &mut rng);
        assert!(cmds.is_empty());
        assert_eq!(intf.sub_state(), SubState::CwBackoff);
    }

    #[test]
    fn cca_done_clear_moves_to_cca_to_tx() {
        let mut intf = Interferer::new();
        intf.process(1, 11, 0, 50, &mut StepRng::new(0, 1));
        intf.process(2, 11, 0, 50, &mut StepRng::new(0, 1));
        assert_eq!(intf.sub_state(), SubState::TxCca);
        intf.handle_cca_done(2, true);
        assert_eq!(intf.sub_state(), SubState::TxCcaToTx);
    }

    #[test]
    fn tx_done_moves_frame_ongoing_into_turnaround_wait() {
        let mut intf = Interferer::new();
        intf.process(1, 11, 0, 50, &mut StepRng::new(0, 1));
        intf.process(2, 11, 0, 50, &mut StepRng::new(0, 1));
        intf.handle_cca_done(2, true);
        assert_eq!(intf.sub_state(), SubState::TxCcaToTx);
        intf.process(2, 11, 0, 50, &mut StepRng::new(0, 1));
        assert_eq!(intf.sub_state(), SubState::TxFrameOngoing);

        intf.handle_tx_done(3);
        assert_eq!(intf.sub_state(), SubState::TxTxToRx);
        assert_eq!(intf.next_deadline_us(), Some(3 + mac::TURNAROUND_TIME_INTERFERER_US));
    }

    #[test]
    fn tx_done_outside_frame_ongoing_is_a_no_op() {
        let mut intf = Interferer::new();
        intf.handle_tx_done(5);
        assert_eq!(intf.sub_state(), SubState::Startup);
    }
}

//! Virtual time: a monotonic microsecond clock with parts-per-million drift,
//! and the millisecond/microsecond alarm services the stack's two timer
//! platforms are built on.
//!
//! Nothing in this module ever reads a real clock. `VirtualClock::advance`
//! is the only way `now_us` moves, and it only moves because the simulator
//! told the event loop how much virtual time to skip.

use core::fmt;

/// Microseconds per millisecond.
pub const US_PER_MS: u64 = 1_000;
/// Picoseconds per microsecond, used for the drift remainder.
const PS_PER_US: i64 = 1_000_000;

/// A single alarm holding a 32-bit deadline in some truncated time view.
///
/// The deadline and the "now" it's compared against share the same 32-bit
/// view (milliseconds or microseconds), so a wrapped subtraction followed by
/// a signed reinterpretation gives a wrap-safe "is it due yet" comparison,
/// exactly like the alarm deadlines the OpenThread platform layer tracks.
#[derive(Copy, Clone, Debug, Default)]
struct Alarm {
    running: bool,
    deadline: u32,
}

impl Alarm {
    const fn new() -> Self {
        Alarm {
            running: false,
            deadline: 0,
        }
    }

    fn start_at(&mut self, t0: u32, dt: u32) {
        self.deadline = t0.wrapping_add(dt);
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    /// Signed microseconds (or milliseconds) remaining until this alarm
    /// fires, or `None` if it isn't armed. Negative means overdue.
    fn remaining(&self, now: u32) -> Option<i32> {
        if !self.running {
            return None;
        }
        Some(self.deadline.wrapping_sub(now) as i32)
    }
}

/// The node's virtual-time clock: a 64-bit microsecond counter that only
/// advances when told to, plus the millisecond/microsecond alarms built on
/// top of its truncated views.
pub struct VirtualClock {
    now_us: u64,
    drift_ppm: i16,
    drift_remainder_ps: i64,
    ms_alarm: Alarm,
    us_alarm: Alarm,
}

impl VirtualClock {
    pub fn new() -> Self {
        VirtualClock {
            now_us: 0,
            drift_ppm: 0,
            drift_remainder_ps: 0,
            ms_alarm: Alarm::new(),
            us_alarm: Alarm::new(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    pub fn now_ms_truncated(&self) -> u32 {
        (self.now_us / US_PER_MS) as u32
    }

    pub fn now_us_truncated(&self) -> u32 {
        self.now_us as u32
    }

    /// Advances the clock by `delta_us` microseconds, applying the
    /// configured drift with sub-microsecond (picosecond) precision.
    pub fn advance(&mut self, delta_us: u64) {
        self.now_us += delta_us;

        self.drift_remainder_ps += i64::from(self.drift_ppm) * delta_us as i64;
        if self.drift_remainder_ps >= PS_PER_US || self.drift_remainder_ps <= -PS_PER_US {
            let adjust = self.drift_remainder_ps / PS_PER_US;
            if adjust >= 0 {
                self.now_us += adjust as u64;
            } else {
                self.now_us -= (-adjust) as u64;
            }
            self.drift_remainder_ps -= adjust * PS_PER_US;
        }
    }

    pub fn set_drift_ppm(&mut self, ppm: i16) {
        self.drift_ppm = ppm;
    }

    pub fn drift_ppm(&self) -> i16 {
        self.drift_ppm
    }

    pub fn ms_alarm_start_at(&mut self, t0_ms: u32, dt_ms: u32) {
        self.ms_alarm.start_at(t0_ms, dt_ms);
    }

    pub fn ms_alarm_stop(&mut self) {
        self.ms_alarm.stop();
    }

    pub fn us_alarm_start_at(&mut self, t0_us: u32, dt_us: u32) {
        self.us_alarm.start_at(t0_us, dt_us);
    }

    pub fn us_alarm_stop(&mut self) {
        self.us_alarm.stop();
    }

    /// Remaining virtual microseconds until the soonest armed alarm, or a
    /// very large sentinel if neither alarm is running.
    pub fn next_deadline_us(&self) -> u64 {
        let mut remaining = u64::max_value() / 2;

        if let Some(ms_rem) = self.ms_alarm.remaining(self.now_ms_truncated()) {
            let r = if ms_rem < 0 { 0 } else { ms_rem as u64 * US_PER_MS };
            remaining = remaining.min(r);
        }
        if let Some(us_rem) = self.us_alarm.remaining(self.now_us_truncated()) {
            let r = if us_rem < 0 { 0 } else { us_rem as u64 };
            remaining = remaining.min(r);
        }

        remaining
    }

    /// Fires any alarm whose deadline has passed. The running flag is
    /// cleared before the corresponding callback runs, so the callback may
    /// legally re-arm the same alarm.
    pub fn alarm_process(&mut self, on_ms_fired: impl FnOnce(), on_us_fired: impl FnOnce()) {
        if let Some(rem) = self.ms_alarm.remaining(self.now_ms_truncated()) {
            if rem <= 0 {
                self.ms_alarm.stop();
                on_ms_fired();
            }
        }
        if let Some(rem) = self.us_alarm.remaining(self.now_us_truncated()) {
            if rem <= 0 {
                self.us_alarm.stop();
                on_us_fired();
            }
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now_us", &self.now_us)
            .field("drift_ppm", &self.drift_ppm)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_without_drift() {
        let mut clock = VirtualClock::new();
        let deltas = [1u64, 2, 3, 1000, 999_999];
        let sum: u64 = deltas.iter().sum();
        for d in &deltas {
            clock.advance(*d);
        }
        assert_eq!(clock.now_us(), sum);
    }

    #[test]
    fn positive_drift_accumulates() {
        let mut clock = VirtualClock::new();
        clock.set_drift_ppm(100);
        clock.advance(10_000_000);
        assert_eq!(clock.now_us(), 10_001_000);
    }

    #[test]
    fn drift_accumulation_scenario() {
        let mut clock = VirtualClock::new();
        clock.set_drift_ppm(127);
        for _ in 0..1000 {
            clock.advance(1_000_000);
        }
        let expected = 1_000_000_000u64 + 127_000;
        assert!((clock.now_us() as i64 - expected as i64).abs() <= 1);
    }

    #[test]
    fn negative_drift_can_hold_clock_back_relative_to_ideal() {
        let mut clock = VirtualClock::new();
        clock.set_drift_ppm(-50);
        clock.advance(20_000_000);
        assert_eq!(clock.now_us(), 20_000_000 - 1000);
    }

    #[test]
    fn alarm_fires_when_due_and_clears_running_first() {
        let mut clock = VirtualClock::new();
        clock.us_alarm_start_at(0, 100);
        clock.advance(100);
        let mut fired = false;
        clock.alarm_process(|| {}, || fired = true);
        assert!(fired);
        assert_eq!(clock.next_deadline_us(), u64::max_value() / 2);
    }

    #[test]
    fn alarm_start_survives_32bit_wraparound() {
        let mut clock = VirtualClock::new();
        // t0 close to the top of the u32 range; t0 + dt wraps.
        clock.us_alarm_start_at(u32::max_value() - 10, 20);
        // Advance the clock so its truncated view matches the wrapped deadline.
        clock.advance(u64::from(u32::max_value()) - 10 + 20);
        let mut fired = false;
        clock.alarm_process(|| {}, || fired = true);
        assert!(fired);
    }

    #[test]
    fn next_deadline_is_minimum_of_both_alarms() {
        let mut clock = VirtualClock::new();
        clock.ms_alarm_start_at(0, 5);
        clock.us_alarm_start_at(0, 2_000);
        assert_eq!(clock.next_deadline_us(), 2_000);
    }
}

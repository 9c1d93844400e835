//! Displayed-SOC convergence while charging.
//!
//! The displayed SOC (`dsoc`) never jumps to the coulomb SOC (`rsoc`). A rate
//! `linek` (x1000) is planned so that `dsoc` meets `rsoc` at a point three gaps
//! further along the charge, and every tick the capacity gained since the last
//! anchor is applied to a fixed-point `dsoc` accumulator at that rate. Once the
//! two meet the rate drops to parity and `dsoc` simply follows `rsoc`.

use core::time::Duration;

use crate::fixed::nonzero;

/// One-to-one tracking rate.
pub const PARITY_RATE: i32 = 1000;
/// Rate forced at 99 % so 100 % waits for the counter.
pub const FULL_RATE: i32 = 400;
/// Rate forced near the top of charge while current is still high.
pub const TERM_RATE: i32 = 650;
/// SOC from which [`TERM_RATE`] applies.
pub const TERM_DSOC: i32 = 90;
/// Average current above which [`TERM_RATE`] applies.
pub const TERM_CURRENT_MA: i32 = 600;

const MILLI: i32 = 1000;

/// Rate, accumulator, and anchor of the smooth-charge algorithm.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConvergenceState {
    linek: i32,
    accumulator: i32,
    anchor_cap: i32,
    meet_soc: i32,
}

/// Per-tick inputs to [`ConvergenceState::step`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConvergenceInput {
    pub dsoc: i32,
    pub rsoc: i32,
    pub remain_cap: i32,
    pub fcc: i32,
    pub current_avg_ma: i32,
}

/// Result of one tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ConvergenceStep {
    pub dsoc: i32,
    /// `dsoc` reached `rsoc` this tick and the rate returned to parity.
    pub met: bool,
}

impl Default for ConvergenceState {
    fn default() -> Self {
        Self::seed(0, 0, 0)
    }
}

impl ConvergenceState {
    /// Plans the rate that brings `dsoc` onto `rsoc` and anchors the
    /// accumulator at the current capacity.
    #[must_use]
    pub fn seed(dsoc: i32, rsoc: i32, remain_cap: i32) -> Self {
        let delta = (dsoc - rsoc).abs();
        let diff = delta * 3;
        let linek = match dsoc.cmp(&rsoc) {
            core::cmp::Ordering::Less => MILLI * (delta + diff) / nonzero(diff),
            core::cmp::Ordering::Greater => MILLI * diff / nonzero(delta + diff),
            core::cmp::Ordering::Equal => PARITY_RATE,
        };

        Self {
            linek,
            accumulator: dsoc * MILLI,
            anchor_cap: remain_cap,
            meet_soc: dsoc.max(rsoc) + diff,
        }
    }

    #[must_use]
    pub const fn linek(&self) -> i32 {
        self.linek
    }

    #[must_use]
    pub const fn accumulator(&self) -> i32 {
        self.accumulator
    }

    #[must_use]
    pub const fn anchor_cap(&self) -> i32 {
        self.anchor_cap
    }

    /// SOC at which the planned rate rejoins `rsoc`.
    #[must_use]
    pub const fn meet_soc(&self) -> i32 {
        self.meet_soc
    }

    /// Moves the anchor down by capacity the counter gained beyond FCC, so the
    /// clamp does not show up as progress.
    pub fn rebase_anchor(&mut self, excess_mah: i32) {
        self.anchor_cap -= excess_mah;
    }

    /// Applies the capacity gained since the anchor to `dsoc`.
    pub fn step(&mut self, input: ConvergenceInput) -> ConvergenceStep {
        let mut dsoc = input.dsoc;
        let mut met = false;

        if dsoc == 99 {
            self.linek = FULL_RATE;
        } else if dsoc >= TERM_DSOC && input.current_avg_ma > TERM_CURRENT_MA {
            self.linek = TERM_RATE;
        }

        let ydsoc = self.scaled_gain(input.remain_cap, input.fcc);
        if ydsoc > 0 {
            if (self.accumulator + 1) / MILLI != dsoc {
                self.accumulator = dsoc * MILLI;
            }
            self.accumulator = self.accumulator.saturating_add(ydsoc);
            dsoc = (self.accumulator + 1) / MILLI;
            self.anchor_cap = input.remain_cap;

            if dsoc == input.rsoc && self.linek != FULL_RATE && self.linek != TERM_RATE {
                met = self.linek != PARITY_RATE;
                self.linek = PARITY_RATE;
            }
        }

        if self.linek == PARITY_RATE || dsoc >= 100 {
            if self.linek == PARITY_RATE {
                dsoc = input.rsoc;
            }
            self.accumulator = dsoc * MILLI;
        }

        ConvergenceStep { dsoc, met }
    }

    fn scaled_gain(&self, remain_cap: i32, fcc: i32) -> i32 {
        let delta_cap = i64::from(remain_cap - self.anchor_cap);
        let ydsoc = i64::from(self.linek) * delta_cap * 100 / i64::from(nonzero(fcc));
        i32::try_from(ydsoc).unwrap_or(if ydsoc > 0 { i32::MAX } else { i32::MIN })
    }
}

/// Time-based ramp toward 100 % while the charger reports termination.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FinishRamp {
    base: Duration,
}

impl FinishRamp {
    #[must_use]
    pub const fn new(now: Duration) -> Self {
        Self { base: now }
    }

    pub fn restart(&mut self, now: Duration) {
        self.base = now;
    }

    /// Time the ramp has been running since the last step or restart.
    #[must_use]
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.base)
    }

    /// Seconds per percentage point: `fcc * 3600 / 100 / current`.
    #[must_use]
    pub fn interval(fcc: i32, current_ma: i32) -> Duration {
        let seconds = i64::from(fcc.max(0)) * 3600 / 100 / i64::from(nonzero(current_ma));
        Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
    }

    /// Returns `true` when `dsoc` should advance by one point.
    pub fn step(&mut self, now: Duration, dsoc: i32, fcc: i32, current_ma: i32) -> bool {
        if dsoc >= 100 || self.elapsed(now) < Self::interval(fcc, current_ma) {
            return false;
        }
        self.base = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::soc_from_capacity;

    fn input(dsoc: i32, remain_cap: i32, fcc: i32) -> ConvergenceInput {
        ConvergenceInput {
            dsoc,
            rsoc: soc_from_capacity(remain_cap, fcc),
            remain_cap,
            fcc,
            current_avg_ma: 500,
        }
    }

    #[test]
    fn seed_plans_catch_up_and_slow_down() {
        let behind = ConvergenceState::seed(40, 50, 2000);
        assert_eq!(behind.linek(), 1333);
        assert_eq!(behind.meet_soc(), 80);
        assert_eq!(behind.accumulator(), 40_000);
        assert_eq!(behind.anchor_cap(), 2000);

        let ahead = ConvergenceState::seed(60, 50, 2000);
        assert_eq!(ahead.linek(), 750);
        assert_eq!(ahead.meet_soc(), 90);

        assert_eq!(ConvergenceState::seed(50, 50, 2000).linek(), PARITY_RATE);
    }

    #[test]
    fn lagging_dsoc_catches_up_without_overshooting() {
        let fcc = 4000;
        let mut cap = 2000;
        let mut dsoc = 40;
        let mut state = ConvergenceState::seed(dsoc, soc_from_capacity(cap, fcc), cap);
        let mut met_at = None;

        for tick in 0..200 {
            cap += 20;
            let tick_input = input(dsoc, cap, fcc);
            let step = state.step(tick_input);
            assert!(step.dsoc >= dsoc, "dsoc went backwards at tick {tick}");
            assert!(step.dsoc <= tick_input.rsoc, "overshoot at tick {tick}");
            dsoc = step.dsoc;
            if step.met {
                met_at = Some(dsoc);
                break;
            }
        }

        assert_eq!(met_at, Some(81));
        assert_eq!(state.linek(), PARITY_RATE);
    }

    #[test]
    fn leading_dsoc_waits_for_rsoc() {
        let fcc = 4000;
        let mut cap = 2000;
        let mut dsoc = 60;
        let mut state = ConvergenceState::seed(dsoc, soc_from_capacity(cap, fcc), cap);

        loop {
            cap += 20;
            let tick_input = input(dsoc, cap, fcc);
            let step = state.step(tick_input);
            assert!(step.dsoc >= tick_input.rsoc);
            dsoc = step.dsoc;
            if step.met {
                break;
            }
            assert!(cap < fcc, "never converged");
        }
        assert_eq!(dsoc, 85);
    }

    #[test]
    fn parity_tracks_rsoc() {
        let mut state = ConvergenceState::seed(50, 50, 2000);
        let step = state.step(input(50, 2100, 4000));
        assert_eq!(step.dsoc, 53);
        assert!(!step.met);
    }

    #[test]
    fn discharge_does_not_move_dsoc_off_parity_plan() {
        let mut state = ConvergenceState::seed(40, 50, 2000);
        let step = state.step(input(40, 1900, 4000));
        assert_eq!(step.dsoc, 40);
        assert_eq!(state.anchor_cap(), 2000);
    }

    #[test]
    fn top_of_charge_overrides_rate() {
        let mut state = ConvergenceState::seed(99, 99, 3960);
        state.step(input(99, 3961, 4000));
        assert_eq!(state.linek(), FULL_RATE);

        let mut state = ConvergenceState::seed(92, 92, 3680);
        let mut charging = input(92, 3681, 4000);
        charging.current_avg_ma = 900;
        state.step(charging);
        assert_eq!(state.linek(), TERM_RATE);
    }

    #[test]
    fn rebased_anchor_absorbs_clamped_excess() {
        let mut state = ConvergenceState::seed(95, 98, 3900);
        state.rebase_anchor(150);
        assert_eq!(state.anchor_cap(), 3750);
    }

    #[test]
    fn finish_ramp_steps_every_interval() {
        assert_eq!(FinishRamp::interval(4000, 600), Duration::from_secs(240));
        assert_eq!(FinishRamp::interval(4000, 0), Duration::from_secs(144_000));

        let mut ramp = FinishRamp::new(Duration::ZERO);
        assert!(!ramp.step(Duration::from_secs(235), 95, 4000, 600));
        assert!(ramp.step(Duration::from_secs(240), 95, 4000, 600));
        assert!(!ramp.step(Duration::from_secs(475), 96, 4000, 600));
        assert!(ramp.step(Duration::from_secs(480), 96, 4000, 600));
        assert!(!ramp.step(Duration::from_secs(2000), 100, 4000, 600));
    }
}

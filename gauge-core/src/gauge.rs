//! The fuel-gauge engine.
//!
//! [`FuelGauge`] owns the PMIC capability, the settle delay, the board charger
//! sense, and every piece of mutable estimator state. [`FuelGauge::start`] runs
//! once per boot; [`FuelGauge::update`] is called from the host loop and runs
//! the smoothing step every [`TICK_INTERVAL`]. Entry points take `&mut self`, so
//! a multi-task host has to serialize access to the whole instance.

use core::{fmt, time::Duration};

use embedded_hal::delay::DelayNs;

use crate::calibration::{CalibrationOutcome, CalibrationState, calibrate_current_offset};
use crate::charger::{
    ChargerPolicy, ChargerSense, ChargerType, DetectError, SenseError, program_charger,
};
use crate::converge::{ConvergenceInput, ConvergenceState, FinishRamp};
use crate::events::{EventLog, GaugeEvent};
use crate::fixed::{clamp_percent, soc_from_capacity};
use crate::profile::BatteryProfile;
use crate::reconcile::{PowerOnPath, PowerOnReport, PowerOnSnapshot, decide, reset_due};
use crate::registers::{ChargeStatus, Flag, Pmic, RegisterBus, addr};
use crate::telemetry::{TelemetrySnapshot, compensate_ir, current_from_code};

/// Cadence of the smoothing step.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);
/// Delay after start-up before voltage sampling switches to averaged mode.
pub const VOLTAGE_AVERAGING_DELAY: Duration = Duration::from_secs(10);
/// Voltage reported while the estimate is not trustworthy.
pub const FALLBACK_VOLTAGE_MV: i32 = 4200;
/// Capacity reported while the estimate is not trustworthy.
pub const FALLBACK_CAPACITY_PERCENT: u8 = 66;

/// Status handed to the host every update.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BatteryStatus {
    pub voltage_uv: i32,
    pub capacity_percent: u8,
    pub charger: ChargerType,
}

impl BatteryStatus {
    /// Synthesized status for virtual power and uninitialized sessions.
    #[must_use]
    pub const fn fallback(charger: ChargerType) -> Self {
        Self {
            voltage_uv: FALLBACK_VOLTAGE_MV * 1000,
            capacity_percent: FALLBACK_CAPACITY_PERCENT,
            charger,
        }
    }
}

impl Default for BatteryStatus {
    fn default() -> Self {
        Self::fallback(ChargerType::Undefined)
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% {}.{:03}V charger={}",
            self.capacity_percent,
            self.voltage_uv / 1_000_000,
            (self.voltage_uv / 1000) % 1000,
            self.charger
        )
    }
}

/// Failures surfaced by [`FuelGauge::start`] and [`FuelGauge::try_update`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GaugeError<E> {
    Bus(E),
    Sense(SenseError),
    /// `update` was called before a successful `start`.
    NotStarted,
}

impl<E> From<DetectError<E>> for GaugeError<E> {
    fn from(error: DetectError<E>) -> Self {
        match error {
            DetectError::Bus(error) => GaugeError::Bus(error),
            DetectError::Sense(error) => GaugeError::Sense(error),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for GaugeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaugeError::Bus(error) => write!(f, "register bus error: {error:?}"),
            GaugeError::Sense(error) => write!(f, "charger sense error: {error}"),
            GaugeError::NotStarted => f.write_str("fuel gauge not started"),
        }
    }
}

/// Live estimate, mutated by start-up and the smoothing step.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeEstimate {
    /// Coulomb counter capacity, mAh.
    pub remain_cap: i32,
    /// SOC derived from `remain_cap`.
    pub rsoc: i32,
    /// SOC shown to the user.
    pub dsoc: i32,
    pub fcc: i32,
    pub telemetry: TelemetrySnapshot,
    pub charger: ChargerType,
}

/// Point-in-time copy of the engine state for consoles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Diagnostics {
    pub power_on: Option<PowerOnReport>,
    pub estimate: RuntimeEstimate,
    pub convergence: ConvergenceState,
    pub calibration: CalibrationState,
    /// Offset calibration will run at the next termination tick.
    pub calibration_armed: bool,
    pub virtual_power: bool,
    pub started: bool,
}

/// Last values this instance wrote to the persisted SOC and capacity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct PersistCache {
    dsoc: Option<u8>,
    remain_cap: Option<i32>,
}

/// Battery fuel gauge bound to one PMIC.
pub struct FuelGauge<B, D, S> {
    pmic: Pmic<B>,
    delay: D,
    sense: S,
    profile: BatteryProfile,
    calibration: CalibrationState,
    estimate: RuntimeEstimate,
    convergence: ConvergenceState,
    ramp: FinishRamp,
    policy: ChargerPolicy,
    saved: PersistCache,
    power_on: Option<PowerOnReport>,
    events: EventLog,
    started: bool,
    last_smooth: Option<Duration>,
    averaging_at: Option<Duration>,
    calibration_armed: bool,
    status: BatteryStatus,
}

impl<B, D, S> FuelGauge<B, D, S>
where
    B: RegisterBus,
    D: DelayNs,
    S: ChargerSense,
{
    #[must_use]
    pub fn new(bus: B, delay: D, sense: S, profile: BatteryProfile) -> Self {
        Self {
            pmic: Pmic::new(bus),
            delay,
            sense,
            profile,
            calibration: CalibrationState::default(),
            estimate: RuntimeEstimate::default(),
            convergence: ConvergenceState::default(),
            ramp: FinishRamp::default(),
            policy: ChargerPolicy::new(),
            saved: PersistCache::default(),
            power_on: None,
            events: EventLog::new(),
            started: false,
            last_smooth: None,
            averaging_at: None,
            calibration_armed: true,
            status: BatteryStatus::default(),
        }
    }

    /// Brings the gauge up and seeds the estimate.
    ///
    /// Enables the gauge block, loads calibration, reconciles the persisted
    /// state when a charger is present, and programs the charger.
    ///
    /// # Errors
    ///
    /// Bus failures, and charger sense failures during detection.
    pub fn start(&mut self, now: Duration) -> Result<BatteryStatus, GaugeError<B::Error>> {
        self.prepare_gauge(now).map_err(GaugeError::Bus)?;

        let charger = self
            .policy
            .detect(&mut self.pmic, &mut self.sense, &self.profile)?;
        self.estimate.charger = charger;

        self.seed_estimate(charger, now).map_err(GaugeError::Bus)?;
        self.started = true;
        self.status = self.read_status().map_err(GaugeError::Bus)?;
        Ok(self.status)
    }

    /// Runs one host update and always yields a status.
    ///
    /// Failures are recorded as fault events and the last good status is
    /// returned in their place.
    pub fn update(&mut self, now: Duration) -> BatteryStatus {
        match self.try_update(now) {
            Ok(status) => status,
            Err(error) => {
                match error {
                    GaugeError::Bus(_) => {
                        self.events.record(GaugeEvent::BusFault, now);
                    }
                    GaugeError::Sense(error) => {
                        self.events.record(GaugeEvent::SenseFault(error), now);
                    }
                    GaugeError::NotStarted => {}
                }
                self.status
            }
        }
    }

    /// Applies the charger policy, runs the smoothing step when due, and reads
    /// the status.
    ///
    /// # Errors
    ///
    /// [`GaugeError::NotStarted`] before `start`, otherwise bus and sense
    /// failures.
    pub fn try_update(&mut self, now: Duration) -> Result<BatteryStatus, GaugeError<B::Error>> {
        if !self.started {
            return Err(GaugeError::NotStarted);
        }

        let charger = self
            .policy
            .detect(&mut self.pmic, &mut self.sense, &self.profile)?;
        self.estimate.charger = charger;
        if let Some(from) = self
            .policy
            .apply(&mut self.pmic, charger, &self.profile)
            .map_err(GaugeError::Bus)?
        {
            self.events
                .record(GaugeEvent::ChargerChanged { from, to: charger }, now);
        }

        let due = match self.last_smooth {
            None => {
                self.last_smooth = Some(now);
                false
            }
            Some(last) => now.saturating_sub(last) >= TICK_INTERVAL,
        };
        if due {
            self.last_smooth = Some(now);
            self.smooth_step(now).map_err(GaugeError::Bus)?;
        }

        self.status = self.read_status().map_err(GaugeError::Bus)?;
        Ok(self.status)
    }

    #[must_use]
    pub fn status(&self) -> BatteryStatus {
        self.status
    }

    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            power_on: self.power_on,
            estimate: self.estimate,
            convergence: self.convergence,
            calibration: self.calibration,
            calibration_armed: self.calibration_armed,
            virtual_power: self.profile.virtual_power(),
            started: self.started,
        }
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    #[must_use]
    pub fn estimate(&self) -> &RuntimeEstimate {
        &self.estimate
    }

    #[must_use]
    pub fn profile(&self) -> &BatteryProfile {
        &self.profile
    }

    pub fn bus(&self) -> &B {
        self.pmic.bus()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.pmic.bus_mut()
    }

    pub fn sense_mut(&mut self) -> &mut S {
        &mut self.sense
    }

    /// Releases the bus, delay, and sense.
    pub fn into_parts(self) -> (B, D, S) {
        (self.pmic.into_inner(), self.delay, self.sense)
    }

    fn prepare_gauge(&mut self, now: Duration) -> Result<(), B::Error> {
        if !self.profile.virtual_power() && !self.pmic.flag(Flag::BatteryPresent)? {
            self.profile.force_virtual_power();
        }
        if self.profile.virtual_power() {
            self.events.record(GaugeEvent::VirtualPower, now);
        }

        self.pmic.set_flag(Flag::GaugeEnable, true)?;
        self.pmic.set_flag(Flag::VoltageInstant, true)?;
        self.calibration = CalibrationState::load(&mut self.pmic)?;
        self.pmic.set_flag(Flag::Initialized, false)?;

        self.estimate.dsoc = clamp_percent(i32::from(self.pmic.read(addr::SOC)?));
        self.estimate.fcc = self
            .profile
            .bound_fcc(self.pmic.read_u32(addr::NEW_FCC)? as i32);
        self.refresh_capacity()?;
        Ok(())
    }

    fn seed_estimate(&mut self, charger: ChargerType, now: Duration) -> Result<(), B::Error> {
        let estimated_mv = self.estimated_voltage()?;
        let reconcile = charger.is_present()
            && (estimated_mv < self.profile.screen_on_voltage_mv() || self.profile.charge_in_boot());
        if reconcile {
            self.reconcile(charger, now)?;
        } else {
            self.events
                .record(GaugeEvent::ReconcileSkipped { estimated_mv }, now);
        }

        program_charger(&mut self.pmic, &self.profile, self.estimate.fcc)?;
        self.estimate.telemetry = self.sample_telemetry()?;
        self.convergence = ConvergenceState::seed(
            self.estimate.dsoc,
            self.estimate.rsoc,
            self.estimate.remain_cap,
        );
        self.ramp.restart(now);
        self.averaging_at = Some(now + VOLTAGE_AVERAGING_DELAY);
        Ok(())
    }

    /// Only called with a charger present; marks the session initialized.
    fn reconcile(&mut self, charger: ChargerType, now: Duration) -> Result<(), B::Error> {
        let off_minutes = self.pmic.take_off_minutes()?;
        let first_boot = self.pmic.take_flag(Flag::BatteryConnected)?;
        let reset_now = self.pmic.flag(Flag::ResetNow)?;
        let reset_late = self.pmic.flag(Flag::ResetLate)?;
        let reset_requested = reset_due(reset_now, reset_late, off_minutes);
        if reset_requested {
            self.pmic.set_flag(Flag::ResetLate, false)?;
            self.pmic.set_flag(Flag::ResetNow, false)?;
        }

        if first_boot || reset_requested {
            let design = self.profile.design_capacity_mah();
            self.pmic.write_u32(addr::NEW_FCC, design as u32)?;
        }

        let snapshot = PowerOnSnapshot {
            first_boot,
            reset_requested,
            off_minutes,
            fcc: self
                .profile
                .bound_fcc(self.pmic.read_u32(addr::NEW_FCC)? as i32),
            persisted_dsoc: i32::from(self.pmic.read(addr::SOC)?),
            persisted_cap: self.pmic.read_u32(addr::REMAIN_CAP)? as i32,
            coulomb_cap: self.pmic.coulomb_capacity()?,
            ocv_mv: self.ocv_voltage()?,
        };
        let decision = decide(&snapshot, &self.profile);

        let mut halt_count = self.pmic.read(addr::HALT_CNT)?;
        if decision.path == PowerOnPath::HaltRecovery {
            halt_count = halt_count.saturating_add(1);
            self.pmic.write(addr::HALT_CNT, halt_count)?;
        }

        self.estimate.fcc = decision.fcc;
        self.estimate.dsoc = decision.dsoc;
        self.init_capacity(decision.remain_cap)?;

        let event = match decision.path {
            PowerOnPath::FirstBoot => Some(GaugeEvent::FirstPowerOn {
                soc: decision.dsoc,
                capacity_mah: self.estimate.remain_cap,
            }),
            PowerOnPath::SoftwareReset => Some(GaugeEvent::SoftwareReset {
                soc: decision.dsoc,
                capacity_mah: self.estimate.remain_cap,
            }),
            PowerOnPath::HaltRecovery => Some(GaugeEvent::Halt {
                persisted_mah: snapshot.persisted_cap,
                coulomb_mah: snapshot.coulomb_cap,
                halt_count,
            }),
            PowerOnPath::OcvResync => Some(GaugeEvent::OcvResync {
                ocv_soc: decision.ocv_soc.unwrap_or(decision.dsoc),
                capacity_mah: self.estimate.remain_cap,
            }),
            PowerOnPath::Resume => None,
        };
        if let Some(event) = event {
            self.events.record(event, now);
        }
        if decision.max_offset_triggered {
            self.events.record(
                GaugeEvent::MaxSocOffset {
                    from: clamp_percent(snapshot.persisted_dsoc),
                    to: decision.dsoc,
                },
                now,
            );
        }

        self.power_on = Some(PowerOnReport {
            path: decision.path,
            off_minutes,
            persisted_dsoc: snapshot.persisted_dsoc,
            persisted_cap: snapshot.persisted_cap,
            coulomb_cap: snapshot.coulomb_cap,
            ocv_mv: snapshot.ocv_mv,
            dsoc: self.estimate.dsoc,
            remain_cap: self.estimate.remain_cap,
            halt_count,
            max_offset_triggered: decision.max_offset_triggered,
        });

        self.pmic.set_flag(Flag::Initialized, true)?;
        self.events.record(
            GaugeEvent::Initialized {
                soc: self.estimate.dsoc,
                charger,
            },
            now,
        );
        self.persist()
    }

    fn smooth_step(&mut self, now: Duration) -> Result<(), B::Error> {
        if self.averaging_at.is_some_and(|at| now >= at) {
            self.pmic.set_flag(Flag::VoltageInstant, false)?;
            self.averaging_at = None;
            self.events.record(GaugeEvent::VoltageAveraging, now);
        }

        if !self.estimate.charger.is_present() || !self.pmic.flag(Flag::Initialized)? {
            return Ok(());
        }

        let status = self.pmic.charge_status()?;
        self.refresh_capacity()?;
        self.estimate.telemetry = self.sample_telemetry()?;

        let fcc = self.estimate.fcc;
        if self.estimate.remain_cap > fcc {
            let excess_mah = self.estimate.remain_cap - fcc;
            self.convergence.rebase_anchor(excess_mah);
            self.init_capacity(fcc)?;
            self.events
                .record(GaugeEvent::CounterClamped { excess_mah }, now);
        }

        if status == ChargeStatus::Finished {
            if self.calibration_armed {
                self.run_calibration(now)?;
            }
            let current_ma = self.profile.finish_ramp_current_ma();
            if self.ramp.step(now, self.estimate.dsoc, fcc, current_ma) {
                self.estimate.dsoc += 1;
                self.events.record(
                    GaugeEvent::FinishStep {
                        soc: self.estimate.dsoc,
                    },
                    now,
                );
            }
            self.init_capacity(fcc)?;
        } else {
            self.calibration_armed = true;
            self.ramp.restart(now);
            let step = self.convergence.step(ConvergenceInput {
                dsoc: self.estimate.dsoc,
                rsoc: self.estimate.rsoc,
                remain_cap: self.estimate.remain_cap,
                fcc,
                current_avg_ma: self.estimate.telemetry.current_avg_ma,
            });
            self.estimate.dsoc = step.dsoc;
            if step.met {
                self.events
                    .record(GaugeEvent::ConvergenceMet { soc: step.dsoc }, now);
            }
        }

        self.estimate.dsoc = clamp_percent(self.estimate.dsoc);
        self.persist()
    }

    fn run_calibration(&mut self, now: Duration) -> Result<(), B::Error> {
        let current_ma = self.estimate.telemetry.current_avg_ma;
        match calibrate_current_offset(&mut self.pmic, &mut self.delay, current_ma)? {
            CalibrationOutcome::Calibrated { poffset, attempts } => {
                self.calibration.poffset = poffset;
                self.calibration_armed = false;
                self.events
                    .record(GaugeEvent::CalibrationApplied { poffset, attempts }, now);
            }
            CalibrationOutcome::Unresolved => {
                self.calibration_armed = false;
                self.events.record(GaugeEvent::CalibrationPending, now);
            }
            CalibrationOutcome::NotIdle => {}
        }
        Ok(())
    }

    /// Loads `capacity_mah` into the counter unless the estimate already
    /// holds it, then re-reads the counter.
    fn init_capacity(&mut self, capacity_mah: i32) -> Result<(), B::Error> {
        if capacity_mah == self.estimate.remain_cap {
            return Ok(());
        }
        self.pmic.seed_coulomb_counter(capacity_mah)?;
        self.refresh_capacity()
    }

    fn refresh_capacity(&mut self) -> Result<(), B::Error> {
        self.estimate.remain_cap = self.pmic.coulomb_capacity()?;
        self.estimate.rsoc =
            clamp_percent(soc_from_capacity(self.estimate.remain_cap, self.estimate.fcc));
        Ok(())
    }

    /// Writes the displayed SOC and capacity when they differ from what this
    /// instance last wrote.
    fn persist(&mut self) -> Result<(), B::Error> {
        let dsoc = clamp_percent(self.estimate.dsoc) as u8;
        if self.saved.dsoc != Some(dsoc) {
            self.pmic.write(addr::SOC, dsoc)?;
            self.saved.dsoc = Some(dsoc);
        }

        let remain_cap = self
            .estimate
            .remain_cap
            .clamp(0, self.profile.design_qmax_mah());
        if self.saved.remain_cap != Some(remain_cap) {
            self.pmic.write_u32(addr::REMAIN_CAP, remain_cap as u32)?;
            self.saved.remain_cap = Some(remain_cap);
        }
        Ok(())
    }

    fn average_voltage(&mut self) -> Result<i32, B::Error> {
        let code = self.pmic.read_u16(addr::BAT_VOL)?;
        Ok(self.calibration.scale.to_millivolts(code))
    }

    fn ocv_voltage(&mut self) -> Result<i32, B::Error> {
        let code = self.pmic.read_u16(addr::BAT_OCV)?;
        Ok(self.calibration.scale.to_millivolts(code))
    }

    fn average_current(&mut self) -> Result<i32, B::Error> {
        Ok(current_from_code(self.pmic.read_u16(addr::BAT_CUR_AVG)?))
    }

    fn estimated_voltage(&mut self) -> Result<i32, B::Error> {
        let avg_mv = self.average_voltage()?;
        let avg_ma = self.average_current()?;
        Ok(compensate_ir(
            avg_mv,
            avg_ma,
            self.profile.series_resistance_mohm(),
        ))
    }

    fn sample_telemetry(&mut self) -> Result<TelemetrySnapshot, B::Error> {
        Ok(TelemetrySnapshot {
            voltage_avg_mv: self.average_voltage()?,
            voltage_ocv_mv: self.ocv_voltage()?,
            current_avg_ma: self.average_current()?,
        })
    }

    fn read_status(&mut self) -> Result<BatteryStatus, B::Error> {
        let charger = self.estimate.charger;
        if self.profile.virtual_power()
            || !self.calibration.scale.is_calibrated()
            || !self.pmic.flag(Flag::Initialized)?
        {
            return Ok(BatteryStatus::fallback(charger));
        }

        Ok(BatteryStatus {
            voltage_uv: self.estimated_voltage()?.saturating_mul(1000),
            capacity_percent: clamp_percent(self.estimate.dsoc) as u8,
            charger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charger::UsbLineState;
    use crate::profile::ProfileConfig;
    use crate::sim::RegisterFile;

    const TABLE: [u16; 7] = [3600, 3700, 3800, 3900, 4000, 4100, 4200];

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    struct Lines(UsbLineState);

    impl ChargerSense for Lines {
        fn dc_gpio_level(&mut self) -> Result<bool, SenseError> {
            Err(SenseError::Unavailable)
        }

        fn dc_adc_sample(&mut self) -> Result<u16, SenseError> {
            Err(SenseError::Unavailable)
        }

        fn usb_lines(&mut self) -> Result<UsbLineState, SenseError> {
            Ok(self.0)
        }
    }

    fn profile() -> BatteryProfile {
        BatteryProfile::from_config(&ProfileConfig {
            ocv_table: Some(&TABLE),
            design_capacity_mah: Some(4000),
            design_qmax_mah: Some(4400),
            ..ProfileConfig::default()
        })
        .unwrap()
    }

    fn plugged_file() -> RegisterFile {
        let mut file = RegisterFile::with_factory_calibration();
        file.poke_flag(Flag::PlugIn, true);
        file.poke_flag(Flag::BatteryConnected, true);
        file.set_voltage_mv(3900);
        file.set_ocv_mv(3900);
        file
    }

    #[test]
    fn update_before_start_reports_fallback() {
        let mut gauge = FuelGauge::new(
            plugged_file(),
            NoDelay,
            Lines(UsbLineState::DedicatedCharger),
            profile(),
        );
        assert_eq!(
            gauge.try_update(Duration::ZERO),
            Err(GaugeError::NotStarted)
        );
        assert_eq!(gauge.update(Duration::ZERO), BatteryStatus::default());
    }

    #[test]
    fn missing_pack_forces_virtual_power() {
        let mut file = plugged_file();
        file.poke_flag(Flag::BatteryPresent, false);
        let mut gauge = FuelGauge::new(file, NoDelay, Lines(UsbLineState::Floating), profile());

        let status = gauge.start(Duration::ZERO).unwrap();

        assert_eq!(status, BatteryStatus::fallback(ChargerType::Dc));
        assert!(gauge.diagnostics().virtual_power);
        assert!(gauge.events().any(|event| *event == GaugeEvent::VirtualPower));
    }

    #[test]
    fn unplugged_start_skips_reconciliation() {
        let mut file = plugged_file();
        file.poke_flag(Flag::PlugIn, false);
        file.poke_flag(Flag::BatteryConnected, true);
        let mut gauge = FuelGauge::new(file, NoDelay, Lines(UsbLineState::Floating), profile());

        let status = gauge.start(Duration::ZERO).unwrap();

        assert_eq!(status, BatteryStatus::fallback(ChargerType::None));
        assert!(gauge.diagnostics().power_on.is_none());
        assert!(gauge.bus().peek_flag(Flag::BatteryConnected));
        assert!(gauge.bus().peek_flag(Flag::GaugeEnable));
    }

    #[test]
    fn charger_change_rewrites_input_limit_once() {
        let mut gauge = FuelGauge::new(
            plugged_file(),
            NoDelay,
            Lines(UsbLineState::DedicatedCharger),
            profile(),
        );
        gauge.start(Duration::ZERO).unwrap();
        gauge.bus_mut().clear_write_counts();

        gauge.update(Duration::from_secs(1));
        gauge.update(Duration::from_secs(2));

        assert_eq!(gauge.bus().writes_to(addr::USB_CTRL), 1);
        assert!(gauge.events().any(|event| matches!(
            event,
            GaugeEvent::ChargerChanged {
                to: ChargerType::Ac,
                ..
            }
        )));
    }

    #[test]
    fn averaging_mode_switches_after_delay() {
        let mut gauge = FuelGauge::new(
            plugged_file(),
            NoDelay,
            Lines(UsbLineState::StandardDownstream),
            profile(),
        );
        gauge.start(Duration::ZERO).unwrap();
        assert!(gauge.bus().peek_flag(Flag::VoltageInstant));

        for second in (0..=15).step_by(5) {
            gauge.update(Duration::from_secs(second));
        }

        assert!(!gauge.bus().peek_flag(Flag::VoltageInstant));
        assert!(gauge.events().any(|event| *event == GaugeEvent::VoltageAveraging));
    }

    #[test]
    fn status_reports_microvolts_after_initialization() {
        let mut gauge = FuelGauge::new(
            plugged_file(),
            NoDelay,
            Lines(UsbLineState::DedicatedCharger),
            profile(),
        );
        let status = gauge.start(Duration::ZERO).unwrap();
        assert_eq!(status.voltage_uv, 3_900_000);
        assert_eq!(status.capacity_percent, 50);
        assert_eq!(status.charger, ChargerType::Ac);
    }
}

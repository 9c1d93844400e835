use std::mem;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use gauge_core::charger::{ChargerSense, SenseError, UsbLineState};
use gauge_core::events::EventId;
use gauge_core::profile::DcDetectMethod;
use gauge_core::registers::Flag;
use gauge_core::sim::RegisterFile;
use gauge_core::{BatteryProfile, FuelGauge, ProfileConfig, ProfileError};

use crate::battery::{BatteryModel, PlugKind, record_power_off};
use crate::command::{Command, HELP_TOPICS, ResetKind};

/// Pack open-circuit voltage in millivolts at 0, 5, .., 100 % charge.
pub const OCV_TABLE_MV: [u16; 21] = [
    3400, 3599, 3671, 3701, 3728, 3746, 3762, 3772, 3781, 3792, 3816, 3836, 3866, 3910, 3942,
    3977, 4016, 4060, 4112, 4165, 4216,
];

const DESIGN_CAPACITY_MAH: i32 = 4000;
const SERIES_RESISTANCE_MOHM: i32 = 120;
const INITIAL_SOC: i32 = 50;
/// Simulation step while advancing time.
const STEP: Duration = Duration::from_secs(1);

pub fn profile_config() -> ProfileConfig<'static> {
    ProfileConfig {
        ocv_table: Some(&OCV_TABLE_MV),
        design_capacity_mah: Some(DESIGN_CAPACITY_MAH),
        design_qmax_mah: Some(4400),
        series_resistance_mohm: Some(SERIES_RESISTANCE_MOHM),
        dc_detect: Some(DcDetectMethod::Gpio { active_high: true }),
        ..ProfileConfig::default()
    }
}

/// Settle delays complete instantly in simulated time.
#[derive(Debug, Default)]
pub struct SimDelay;

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Charger sense answering from the emulated plug.
#[derive(Debug)]
pub struct SimSense {
    pub plug: PlugKind,
}

impl ChargerSense for SimSense {
    fn dc_gpio_level(&mut self) -> Result<bool, SenseError> {
        Ok(self.plug == PlugKind::Dc)
    }

    fn dc_adc_sample(&mut self) -> Result<u16, SenseError> {
        Err(SenseError::Unavailable)
    }

    fn usb_lines(&mut self) -> Result<UsbLineState, SenseError> {
        Ok(self.plug.usb_lines())
    }
}

pub type EmulatedGauge = FuelGauge<RegisterFile, SimDelay, SimSense>;

pub struct Session {
    gauge: EmulatedGauge,
    battery: BatteryModel,
    profile: BatteryProfile,
    uptime: Duration,
    boots: u32,
    last_event: Option<EventId>,
}

impl Session {
    /// Fresh PMIC with a newly connected pack on an AC adapter.
    ///
    /// # Errors
    ///
    /// [`ProfileError`] when the emulated profile does not validate.
    pub fn new() -> Result<Self, ProfileError> {
        let profile = BatteryProfile::from_config(&profile_config())?;
        let mut battery = BatteryModel::new(
            &OCV_TABLE_MV,
            DESIGN_CAPACITY_MAH,
            SERIES_RESISTANCE_MOHM,
            INITIAL_SOC,
        );
        battery.set_plug(PlugKind::Ac);

        let mut file = RegisterFile::with_factory_calibration();
        file.poke_flag(Flag::BatteryConnected, true);
        battery.latch_ocv(&mut file);
        battery.sync(&mut file);

        let gauge = FuelGauge::new(
            file,
            SimDelay,
            SimSense {
                plug: battery.plug(),
            },
            profile.clone(),
        );

        Ok(Self {
            gauge,
            battery,
            profile,
            uptime: Duration::ZERO,
            boots: 0,
            last_event: None,
        })
    }

    pub fn gauge(&self) -> &EmulatedGauge {
        &self.gauge
    }

    pub fn battery(&self) -> &BatteryModel {
        &self.battery
    }

    /// Starts the gauge and reports how it came up.
    pub fn power_on(&mut self) -> Vec<String> {
        self.boots += 1;
        let mut lines = match self.gauge.start(self.uptime) {
            Ok(status) => {
                let path = self
                    .gauge
                    .diagnostics()
                    .power_on
                    .map_or("not-reconciled", |report| report.path.label());
                vec![format!("OK boot #{} path={path} {status}", self.boots)]
            }
            Err(error) => vec![format!("ERR boot #{} {error}", self.boots)],
        };
        lines.extend(self.new_events());
        lines
    }

    pub fn execute(&mut self, command: Command) -> Vec<String> {
        match command {
            Command::Status => self.status_lines(),
            Command::Plug(plug) => {
                self.battery.set_plug(plug);
                self.gauge.sense_mut().plug = plug;
                self.settle(format!("OK plug {}", plug.label()))
            }
            Command::Current(milliamps) => {
                self.battery.set_current_ma(milliamps);
                self.settle(format!("OK current {milliamps}mA"))
            }
            Command::Advance(span) => self.advance(span),
            Command::Finish => {
                if self.battery.plug() == PlugKind::None {
                    return vec!["ERR finish needs a charger".to_string()];
                }
                self.battery.finish();
                self.settle("OK charger terminated".to_string())
            }
            Command::PowerOff { minutes } => {
                let plug = self.battery.plug();
                let mut lines = vec![format!("OK power-off {minutes}min")];
                lines.extend(self.reboot(|file, battery| {
                    battery.rest();
                    record_power_off(file, minutes);
                }));
                self.battery.set_plug(plug);
                lines
            }
            Command::Halt { drain_mah } => {
                let drain = i32::try_from(drain_mah).unwrap_or(i32::MAX);
                let mut lines = vec![format!("OK halt, pack drained {drain}mAh")];
                lines.extend(self.reboot(|_, battery| battery.drain(drain)));
                lines
            }
            Command::Reset(kind) => {
                let (flag, label) = match kind {
                    ResetKind::Now => (Flag::ResetNow, "now"),
                    ResetKind::Late => (Flag::ResetLate, "late"),
                };
                let mut lines = vec![format!("OK reset {label}")];
                lines.extend(self.reboot(|file, _| file.poke_flag(flag, true)));
                lines
            }
            Command::Events => {
                let lines: Vec<String> = self
                    .gauge
                    .events()
                    .to_vec()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                if lines.is_empty() {
                    vec!["no events recorded".to_string()]
                } else {
                    lines
                }
            }
            Command::Help => {
                let mut lines = vec!["Available commands:".to_string()];
                lines.extend(HELP_TOPICS.iter().map(|(_, detail)| format!("  {detail}")));
                lines
            }
            Command::Exit => vec!["Session closed.".to_string()],
        }
    }

    /// Pushes model changes into the registers and runs one gauge update.
    fn settle(&mut self, head: String) -> Vec<String> {
        self.battery.sync(self.gauge.bus_mut());
        let status = self.gauge.update(self.uptime);
        let mut lines = vec![head, format!("status {status}")];
        lines.extend(self.new_events());
        lines
    }

    fn advance(&mut self, span: Duration) -> Vec<String> {
        let target = self.uptime + span;
        while self.uptime < target {
            let step = STEP.min(target - self.uptime);
            self.battery.advance(step);
            self.battery.sync(self.gauge.bus_mut());
            self.uptime += step;
            self.gauge.update(self.uptime);
        }

        let mut lines = vec![format!(
            "OK t={}s status {}",
            self.uptime.as_secs(),
            self.gauge.status()
        )];
        lines.extend(self.new_events());
        lines
    }

    /// Tears the gauge down, lets `prepare` act on the powered-down PMIC
    /// and pack, and boots a fresh instance on the same registers.
    fn reboot<F>(&mut self, prepare: F) -> Vec<String>
    where
        F: FnOnce(&mut RegisterFile, &mut BatteryModel),
    {
        let placeholder = FuelGauge::new(
            RegisterFile::new(),
            SimDelay,
            SimSense {
                plug: PlugKind::None,
            },
            self.profile.clone(),
        );
        let (mut file, delay, sense) = mem::replace(&mut self.gauge, placeholder).into_parts();

        prepare(&mut file, &mut self.battery);
        self.battery.latch_ocv(&mut file);
        self.battery.sync(&mut file);

        self.gauge = FuelGauge::new(file, delay, sense, self.profile.clone());
        self.uptime = Duration::ZERO;
        self.last_event = None;
        self.power_on()
    }

    fn status_lines(&self) -> Vec<String> {
        let diagnostics = self.gauge.diagnostics();
        let estimate = diagnostics.estimate;
        let battery = self.battery();
        let soc = battery.soc_permille();

        let mut lines = vec![
            format!("status {}", self.gauge.status()),
            format!(
                "estimate dsoc={} rsoc={} remain={}mAh fcc={}mAh linek={} charger={}",
                estimate.dsoc,
                estimate.rsoc,
                estimate.remain_cap,
                estimate.fcc,
                diagnostics.convergence.linek(),
                estimate.charger
            ),
            format!(
                "pack soc={}.{}% charge={}mAh current={:+}mA ocv={}mV charger-status={}",
                soc / 10,
                soc % 10,
                battery.charge_mah(),
                battery.current_ma(),
                battery.ocv_mv(),
                battery.status().label()
            ),
        ];
        if let Some(report) = diagnostics.power_on {
            lines.push(format!(
                "boot #{} path={} off={}min halt-count={} max-offset={}",
                self.boots,
                report.path.label(),
                report.off_minutes,
                report.halt_count,
                report.max_offset_triggered
            ));
        }
        lines.push(format!(
            "uptime={}s calibration-armed={} poffset={}",
            self.uptime.as_secs(),
            diagnostics.calibration_armed,
            diagnostics.calibration.poffset
        ));
        lines
    }

    fn new_events(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        for record in self.gauge.events().since(self.last_event) {
            lines.push(format!("  event {record}"));
            self.last_event = Some(record.id);
        }
        lines
    }
}

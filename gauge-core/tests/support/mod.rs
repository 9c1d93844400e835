#![allow(dead_code)]

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use gauge_core::charger::{ChargerSense, SenseError, UsbLineState};
use gauge_core::registers::{ChargeStatus, Flag, addr};
use gauge_core::sim::RegisterFile;
use gauge_core::{BatteryProfile, FuelGauge, ProfileConfig};

pub const TABLE: [u16; 7] = [3600, 3700, 3800, 3900, 4000, 4100, 4200];

pub type SimGauge = FuelGauge<RegisterFile, NoDelay, BoardSense>;

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Board sense with fixed answers.
pub struct BoardSense {
    pub gpio: Result<bool, SenseError>,
    pub adc: Result<u16, SenseError>,
    pub lines: Result<UsbLineState, SenseError>,
}

impl BoardSense {
    pub fn lines(lines: UsbLineState) -> Self {
        Self {
            gpio: Err(SenseError::Unavailable),
            adc: Err(SenseError::Unavailable),
            lines: Ok(lines),
        }
    }
}

impl ChargerSense for BoardSense {
    fn dc_gpio_level(&mut self) -> Result<bool, SenseError> {
        self.gpio
    }

    fn dc_adc_sample(&mut self) -> Result<u16, SenseError> {
        self.adc
    }

    fn usb_lines(&mut self) -> Result<UsbLineState, SenseError> {
        self.lines
    }
}

pub fn config() -> ProfileConfig<'static> {
    ProfileConfig {
        ocv_table: Some(&TABLE),
        design_capacity_mah: Some(4000),
        design_qmax_mah: Some(4400),
        ..ProfileConfig::default()
    }
}

pub fn profile() -> BatteryProfile {
    BatteryProfile::from_config(&config()).unwrap()
}

/// Pack present, charger plugged, 3900 mV at rest.
pub fn plugged() -> RegisterFile {
    let mut file = RegisterFile::with_factory_calibration();
    file.poke_flag(Flag::PlugIn, true);
    file.set_voltage_mv(3900);
    file.set_ocv_mv(3900);
    file.set_charge_status(ChargeStatus::CcCv);
    file
}

/// A previous session left `dsoc` and `persisted_cap` behind and the counter
/// now reads `coulomb_cap`.
pub fn resumed(dsoc: u8, persisted_cap: i32, coulomb_cap: i32) -> RegisterFile {
    let mut file = plugged();
    file.poke(addr::SOC, dsoc);
    file.poke_u32(addr::REMAIN_CAP, persisted_cap as u32);
    file.poke_u32(addr::NEW_FCC, 4000);
    file.set_coulomb_capacity(coulomb_cap);
    file
}

/// Sets the non-active timer so the next start reads `minutes` off time.
pub fn power_off_for(file: &mut RegisterFile, minutes: u8) {
    let saved = file.peek(addr::NON_ACT_TIMER_CNT_SAVE);
    file.poke(addr::NON_ACT_TIMER_CNT, saved.wrapping_add(minutes));
}

pub fn started(file: RegisterFile, profile: BatteryProfile) -> SimGauge {
    let mut gauge = FuelGauge::new(
        file,
        NoDelay,
        BoardSense::lines(UsbLineState::DedicatedCharger),
        profile,
    );
    gauge.start(Duration::ZERO).unwrap();
    gauge
}

pub fn secs(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

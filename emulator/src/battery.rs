//! Simulated pack and charger wired into the PMIC register file.
//!
//! The model integrates pack current into a true charge level, derives the
//! terminal voltage from the OCV curve plus the IR drop, and runs a small
//! charge-status machine. [`BatteryModel::sync`] writes the result into the
//! registers the gauge reads.

use std::time::Duration;

use gauge_core::charger::UsbLineState;
use gauge_core::registers::{ChargeStatus, Flag, addr};
use gauge_core::sim::RegisterFile;

const MICROAMP_HOURS_PER_MAH: i64 = 1000;
const MICROS_PER_HOUR: i64 = 3_600_000_000;
/// Pack current once the charger reports termination.
const TERMINATION_CURRENT_MA: i32 = 0;

/// Charger the emulated pack is plugged into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlugKind {
    None,
    Usb,
    Ac,
    Dc,
}

impl PlugKind {
    pub fn label(self) -> &'static str {
        match self {
            PlugKind::None => "none",
            PlugKind::Usb => "usb",
            PlugKind::Ac => "ac",
            PlugKind::Dc => "dc",
        }
    }

    /// Charge current the adapter can supply.
    pub fn supply_ma(self) -> i32 {
        match self {
            PlugKind::None => 0,
            PlugKind::Usb => 450,
            PlugKind::Ac | PlugKind::Dc => 1500,
        }
    }

    /// Data-line state a charging-port probe would observe.
    pub fn usb_lines(self) -> UsbLineState {
        match self {
            PlugKind::None | PlugKind::Dc => UsbLineState::Floating,
            PlugKind::Usb => UsbLineState::StandardDownstream,
            PlugKind::Ac => UsbLineState::DedicatedCharger,
        }
    }
}

/// Pack state and the charger driving it.
#[derive(Clone, Debug)]
pub struct BatteryModel {
    ocv_table: Vec<u16>,
    capacity_mah: i32,
    resistance_mohm: i32,
    charge_uah: i64,
    /// Charge already pushed into the coulomb counter.
    counted_uah: i64,
    current_ma: i32,
    plug: PlugKind,
    status: ChargeStatus,
}

impl BatteryModel {
    pub fn new(ocv_table: &[u16], capacity_mah: i32, resistance_mohm: i32, soc: i32) -> Self {
        let charge_uah =
            i64::from(capacity_mah) * MICROAMP_HOURS_PER_MAH * i64::from(soc.clamp(0, 100)) / 100;
        Self {
            ocv_table: ocv_table.to_vec(),
            capacity_mah,
            resistance_mohm,
            charge_uah,
            counted_uah: charge_uah,
            current_ma: 0,
            plug: PlugKind::None,
            status: ChargeStatus::Off,
        }
    }

    pub fn plug(&self) -> PlugKind {
        self.plug
    }

    pub fn current_ma(&self) -> i32 {
        self.current_ma
    }

    pub fn status(&self) -> ChargeStatus {
        self.status
    }

    /// True charge level in tenths of a percent.
    pub fn soc_permille(&self) -> i32 {
        let full = i64::from(self.capacity_mah) * MICROAMP_HOURS_PER_MAH;
        if full <= 0 {
            return 0;
        }
        (self.charge_uah * 1000 / full) as i32
    }

    pub fn charge_mah(&self) -> i32 {
        (self.charge_uah / MICROAMP_HOURS_PER_MAH) as i32
    }

    /// Connects `plug`; a charger starts constant-current charging at its
    /// supply limit, unplugging leaves an idle pack.
    pub fn set_plug(&mut self, plug: PlugKind) {
        self.plug = plug;
        if plug == PlugKind::None {
            self.status = ChargeStatus::Off;
            self.current_ma = self.current_ma.min(0);
        } else {
            self.status = ChargeStatus::CcCv;
            self.current_ma = plug.supply_ma();
        }
        self.settle_status();
    }

    /// Overrides the pack current; positive charges.
    pub fn set_current_ma(&mut self, milliamps: i32) {
        self.current_ma = milliamps;
        self.settle_status();
    }

    /// Forces the charger into termination.
    pub fn finish(&mut self) {
        if self.plug != PlugKind::None {
            self.status = ChargeStatus::Finished;
            self.current_ma = TERMINATION_CURRENT_MA;
        }
    }

    /// Pack at rest, as during a power-off.
    pub fn rest(&mut self) {
        self.current_ma = 0;
    }

    /// Integrates the pack current over `elapsed`.
    pub fn advance(&mut self, elapsed: Duration) {
        let micros = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
        let delta = i64::from(self.current_ma) * MICROAMP_HOURS_PER_MAH * micros / MICROS_PER_HOUR;
        let full = i64::from(self.capacity_mah) * MICROAMP_HOURS_PER_MAH;
        self.charge_uah = (self.charge_uah + delta).clamp(0, full);
        self.settle_status();
    }

    /// Open-circuit voltage for the current charge level.
    pub fn ocv_mv(&self) -> i32 {
        let points = &self.ocv_table;
        let segments = points.len().saturating_sub(1) as i32;
        if segments == 0 {
            return points.first().map_or(0, |&mv| i32::from(mv));
        }

        let position = self.soc_permille().clamp(0, 1000) * segments;
        let index = (position / 1000).min(segments - 1) as usize;
        let low = i32::from(points[index]);
        let high = i32::from(points[index + 1]);
        low + (high - low) * (position - index as i32 * 1000) / 1000
    }

    /// Terminal voltage including the IR drop across the pack.
    pub fn terminal_mv(&self) -> i32 {
        self.ocv_mv() + self.current_ma * self.resistance_mohm / 1000
    }

    /// Publishes the pack state into `file` and feeds whole mAh of counted
    /// charge to the coulomb counter.
    pub fn sync(&mut self, file: &mut RegisterFile) {
        let uncounted = self.charge_uah - self.counted_uah;
        let whole_mah = uncounted / MICROAMP_HOURS_PER_MAH;
        if whole_mah != 0 {
            file.accumulate(whole_mah as i32);
            self.counted_uah += whole_mah * MICROAMP_HOURS_PER_MAH;
        }

        file.set_voltage_mv(self.terminal_mv());
        file.set_load_current_ma(self.current_ma);
        file.set_charge_status(self.status);
        file.poke_flag(Flag::PlugIn, self.plug != PlugKind::None);
    }

    /// Latches the resting voltage the PMIC samples at power-on.
    pub fn latch_ocv(&self, file: &mut RegisterFile) {
        file.set_ocv_mv(self.ocv_mv());
    }

    /// Removes charge in one step. The counter picks it up on the next sync,
    /// as it does while the host is down and the PMIC keeps counting.
    pub fn drain(&mut self, milliamp_hours: i32) {
        let delta = i64::from(milliamp_hours) * MICROAMP_HOURS_PER_MAH;
        self.charge_uah = (self.charge_uah - delta).max(0);
        self.settle_status();
    }

    fn settle_status(&mut self) {
        if self.plug == PlugKind::None {
            self.status = ChargeStatus::Off;
            return;
        }
        if self.soc_permille() >= 1000 && self.status == ChargeStatus::CcCv {
            self.status = ChargeStatus::Finished;
            self.current_ma = TERMINATION_CURRENT_MA;
        }
    }
}

/// Advances the PMIC's non-active timer by `minutes` of power-off.
pub fn record_power_off(file: &mut RegisterFile, minutes: u32) {
    let minutes = u8::try_from(minutes).unwrap_or(u8::MAX);
    file.poke(addr::NON_ACT_TIMER_CNT, minutes);
}

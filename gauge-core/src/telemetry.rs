//! Raw ADC codes to calibrated millivolts and milliamps.

use crate::fixed::{nonzero, saturate_i32};

/// Factory reference voltage paired with `VCALIB0`.
pub const VCALIB0_MV: i32 = 3000;
/// Factory reference voltage paired with `VCALIB1`.
pub const VCALIB1_MV: i32 = 4200;
/// Estimated voltages at or below this level fall back to the averaged reading.
pub const MIN_ESTIMATED_MV: i32 = 2800;

const ADC_GAIN_NUM: i32 = 1100;
const ADC_GAIN_DEN: i32 = 1000;
const CURRENT_NUM: i32 = 1506;
const CURRENT_DEN: i32 = 1000;

/// Linear voltage scale solved from the two factory calibration codes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VoltageScale {
    /// Slope, x1000.
    pub k: i32,
    /// Offset in millivolts.
    pub b: i32,
}

impl VoltageScale {
    /// Scale before the calibration registers are read.
    pub const UNCALIBRATED: Self = Self { k: 0, b: 0 };

    /// Solves `k` and `b` from the codes sampled at 3000 mV and 4200 mV.
    #[must_use]
    pub fn from_references(vcalib0: u16, vcalib1: u16) -> Self {
        let span = i32::from(vcalib1) - i32::from(vcalib0);
        let k = (VCALIB1_MV - VCALIB0_MV) * 1000 / nonzero(span);
        let b = i64::from(VCALIB1_MV) - i64::from(k) * i64::from(vcalib1) / 1000;
        Self {
            k,
            b: saturate_i32(b),
        }
    }

    #[must_use]
    pub const fn is_calibrated(self) -> bool {
        self.k != 0
    }

    /// Converts a voltage ADC code into millivolts.
    #[must_use]
    pub fn to_millivolts(self, code: u16) -> i32 {
        let millivolts = i64::from(self.k) * i64::from(code) / 1000 + i64::from(self.b);
        saturate_i32(millivolts * i64::from(ADC_GAIN_NUM) / i64::from(ADC_GAIN_DEN))
    }

    /// Smallest code reading at or above `millivolts`; the inverse used by
    /// simulated hardware.
    #[must_use]
    pub fn code_for(self, millivolts: i32) -> u16 {
        if self.k <= 0 {
            return 0;
        }
        let target = i64::from(millivolts) * i64::from(ADC_GAIN_DEN) / i64::from(ADC_GAIN_NUM);
        let estimate =
            ((target - i64::from(self.b)) * 1000 / i64::from(self.k)).clamp(0, i64::from(u16::MAX));
        let mut code = u16::try_from(estimate).unwrap_or(u16::MAX).saturating_sub(2);
        while code < u16::MAX && self.to_millivolts(code) < millivolts {
            code += 1;
        }
        code
    }
}

/// Sign-extends the 12-bit two's complement current field.
#[must_use]
pub const fn sign_extend_12(code: u16) -> i32 {
    let value = (code & 0x0fff) as i32;
    if value & 0x800 != 0 { value - 4096 } else { value }
}

/// Converts a current register pair into milliamps.
#[must_use]
pub const fn current_from_code(code: u16) -> i32 {
    sign_extend_12(code) * CURRENT_NUM / CURRENT_DEN
}

/// Code whose reading lands closest to `milliamps`; the inverse used by
/// simulated hardware.
#[must_use]
pub fn code_for_current(milliamps: i32) -> u16 {
    let estimate = milliamps * CURRENT_DEN / CURRENT_NUM;
    let best = (estimate - 1..=estimate + 1)
        .min_by_key(|&code| (code * CURRENT_NUM / CURRENT_DEN - milliamps).abs())
        .unwrap_or(estimate)
        .clamp(-2048, 2047);
    (best as u16) & 0x0fff
}

/// Terminal voltage corrected for the IR drop across the series resistance.
///
/// Corrections that land at or below [`MIN_ESTIMATED_MV`] are discarded in
/// favour of the uncorrected reading.
#[must_use]
pub const fn compensate_ir(avg_mv: i32, avg_ma: i32, resistance_mohm: i32) -> i32 {
    let estimated = avg_mv - resistance_mohm * avg_ma / 1000;
    if estimated > MIN_ESTIMATED_MV {
        estimated
    } else {
        avg_mv
    }
}

/// Last sampled electrical state of the pack.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TelemetrySnapshot {
    pub voltage_avg_mv: i32,
    pub voltage_ocv_mv: i32,
    pub current_avg_ma: i32,
}

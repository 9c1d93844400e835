//! Voltage scale and current-sense offset calibration.
//!
//! The voltage scale comes straight from the factory codes. The current offset
//! is zeroed iteratively: the residual reading is folded into the calibration
//! offset register, the ADC is given time to settle, and the result is checked.

use embedded_hal::delay::DelayNs;

use crate::registers::{Pmic, RegisterBus, addr};
use crate::telemetry::{VoltageScale, sign_extend_12};

/// Residual current code considered zero.
pub const ADC_CALIB_THRESHOLD: i32 = 4;
/// Offset adjustments tried per calibration run.
pub const ADC_CALIB_ATTEMPTS: usize = 5;
/// Settle time after each offset write.
pub const ADC_SETTLE_MS: u32 = 200;

/// Calibration values derived at start-up and refined at charge termination.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CalibrationState {
    pub scale: VoltageScale,
    /// Calibration offset minus the factory current offset.
    pub poffset: i32,
}

impl CalibrationState {
    /// Reads the factory voltage codes and the current offset registers.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn load<B: RegisterBus>(pmic: &mut Pmic<B>) -> Result<Self, B::Error> {
        let vcalib0 = pmic.read_u16(addr::VCALIB0)?;
        let vcalib1 = pmic.read_u16(addr::VCALIB1)?;
        Ok(Self {
            scale: VoltageScale::from_references(vcalib0, vcalib1),
            poffset: read_poffset(pmic)?,
        })
    }
}

/// Result of one offset calibration run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationOutcome {
    /// The residual dropped below threshold and `poffset` was persisted.
    Calibrated { poffset: i32, attempts: u8 },
    /// Every attempt left a residual; the previous offset stays in place.
    Unresolved,
    /// Load current was too high to calibrate against.
    NotIdle,
}

/// Zeroes the current-sense offset while the pack is idle.
///
/// Runs only when `avg_current_ma` is below [`ADC_CALIB_THRESHOLD`] in
/// magnitude. A failed attempt restores the offset it started from before the
/// next one.
///
/// # Errors
///
/// Propagates the transport error.
pub fn calibrate_current_offset<B, D>(
    pmic: &mut Pmic<B>,
    delay: &mut D,
    avg_current_ma: i32,
) -> Result<CalibrationOutcome, B::Error>
where
    B: RegisterBus,
    D: DelayNs,
{
    if avg_current_ma.abs() >= ADC_CALIB_THRESHOLD {
        return Ok(CalibrationOutcome::NotIdle);
    }

    for attempt in 1..=ADC_CALIB_ATTEMPTS {
        let residual = read_current_code(pmic)?;
        let offset = pmic.read_u16(addr::CAL_OFFSET)?;
        pmic.write_u16(addr::CAL_OFFSET, offset.wrapping_add_signed(residual as i16))?;
        delay.delay_ms(ADC_SETTLE_MS);

        if read_current_code(pmic)?.abs() < ADC_CALIB_THRESHOLD {
            let poffset = read_poffset(pmic)?;
            pmic.write(addr::POFFSET, poffset as u8)?;
            return Ok(CalibrationOutcome::Calibrated {
                poffset,
                attempts: attempt as u8,
            });
        }

        pmic.write_u16(addr::CAL_OFFSET, offset)?;
        delay.delay_ms(ADC_SETTLE_MS);
    }

    Ok(CalibrationOutcome::Unresolved)
}

fn read_current_code<B: RegisterBus>(pmic: &mut Pmic<B>) -> Result<i32, B::Error> {
    Ok(sign_extend_12(pmic.read_u16(addr::BAT_CUR_AVG)?))
}

fn read_poffset<B: RegisterBus>(pmic: &mut Pmic<B>) -> Result<i32, B::Error> {
    let coffset = i32::from(pmic.read_u16(addr::CAL_OFFSET)?);
    let ioffset = i32::from(pmic.read_u16(addr::IOFFSET)?);
    Ok(coffset - ioffset)
}

//! In-memory PMIC register file for host targets.
//!
//! Reads and writes behave like plain memory except for two hardware side
//! effects the gauge depends on:
//!
//! - the final (base address) write to the coulomb calibration block latches it
//!   into the coulomb counter;
//! - writes to the current-sense calibration offset re-derive the average
//!   current code from the simulated load and sense bias.
//!
//! Every bus write is counted per address so tests can assert which registers
//! were touched.

use core::convert::Infallible;

use crate::registers::{ChargeStatus, Flag, GASCNT_PER_MAH, RegisterBus, addr};
use crate::telemetry::{VoltageScale, code_for_current, sign_extend_12};

/// Calibration codes that yield `k = 1000`, `b = 0`.
pub const FACTORY_VCALIB: (u16, u16) = (3000, 4200);

/// Register map backed by a 256-byte array.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    registers: [u8; 256],
    writes: [u16; 256],
    load_code: i32,
    sense_bias: i32,
    sense_frozen: bool,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// All registers zeroed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registers: [0; 256],
            writes: [0; 256],
            load_code: 0,
            sense_bias: 0,
            sense_frozen: false,
        }
    }

    /// Zeroed map with factory voltage calibration codes and a present pack.
    #[must_use]
    pub fn with_factory_calibration() -> Self {
        let mut file = Self::new();
        file.poke_u16(addr::VCALIB0, FACTORY_VCALIB.0);
        file.poke_u16(addr::VCALIB1, FACTORY_VCALIB.1);
        file.poke_flag(Flag::BatteryPresent, true);
        file
    }

    /// Voltage scale implied by the stored calibration codes.
    #[must_use]
    pub fn voltage_scale(&self) -> VoltageScale {
        VoltageScale::from_references(self.peek_u16(addr::VCALIB0), self.peek_u16(addr::VCALIB1))
    }

    #[must_use]
    pub const fn peek(&self, register: u8) -> u8 {
        self.registers[register as usize]
    }

    /// Stores a byte without side effects or write accounting.
    pub fn poke(&mut self, register: u8, value: u8) {
        self.registers[usize::from(register)] = value;
    }

    #[must_use]
    pub fn peek_u16(&self, base: u8) -> u16 {
        u16::from_le_bytes([self.peek(base), self.peek(base.wrapping_add(1))])
    }

    pub fn poke_u16(&mut self, base: u8, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.poke(base, low);
        self.poke(base.wrapping_add(1), high);
    }

    #[must_use]
    pub fn peek_u32(&self, base: u8) -> u32 {
        u32::from_le_bytes([
            self.peek(base),
            self.peek(base.wrapping_add(1)),
            self.peek(base.wrapping_add(2)),
            self.peek(base.wrapping_add(3)),
        ])
    }

    pub fn poke_u32(&mut self, base: u8, value: u32) {
        for (offset, byte) in (0u8..).zip(value.to_le_bytes()) {
            self.poke(base.wrapping_add(offset), byte);
        }
    }

    #[must_use]
    pub const fn peek_flag(&self, flag: Flag) -> bool {
        let (register, mask) = flag.location();
        self.peek(register) & mask != 0
    }

    pub fn poke_flag(&mut self, flag: Flag, on: bool) {
        let (register, mask) = flag.location();
        let value = self.peek(register);
        self.poke(register, if on { value | mask } else { value & !mask });
    }

    /// Number of bus writes that targeted `register`.
    #[must_use]
    pub const fn writes_to(&self, register: u8) -> u16 {
        self.writes[register as usize]
    }

    pub fn clear_write_counts(&mut self) {
        self.writes = [0; 256];
    }

    /// Coulomb counter contents in mAh.
    #[must_use]
    pub fn coulomb_capacity(&self) -> i32 {
        self.peek_u32(addr::GASCNT) as i32 / GASCNT_PER_MAH
    }

    pub fn set_coulomb_capacity(&mut self, capacity_mah: i32) {
        self.poke_u32(addr::GASCNT, (capacity_mah.max(0) * GASCNT_PER_MAH) as u32);
    }

    /// Adds `delta_mah` to the coulomb counter, flooring at zero.
    pub fn accumulate(&mut self, delta_mah: i32) {
        let raw = self.peek_u32(addr::GASCNT) as i32;
        let next = raw.saturating_add(delta_mah.saturating_mul(GASCNT_PER_MAH));
        self.poke_u32(addr::GASCNT, next.max(0) as u32);
    }

    /// Average voltage register, encoded through the stored calibration.
    pub fn set_voltage_mv(&mut self, millivolts: i32) {
        let code = self.voltage_scale().code_for(millivolts);
        self.poke_u16(addr::BAT_VOL, code);
    }

    /// OCV register, encoded through the stored calibration.
    pub fn set_ocv_mv(&mut self, millivolts: i32) {
        let code = self.voltage_scale().code_for(millivolts);
        self.poke_u16(addr::BAT_OCV, code);
    }

    /// True pack current; the sensed value also carries the sense bias.
    pub fn set_load_current_ma(&mut self, milliamps: i32) {
        self.load_code = sign_extend_12(code_for_current(milliamps));
        self.refresh_current_sense();
    }

    /// ADC offset, in codes, that calibration has to cancel.
    pub fn set_sense_bias(&mut self, code: i32) {
        self.sense_bias = code;
        self.refresh_current_sense();
    }

    /// Stops calibration offset writes from affecting the current reading.
    pub fn freeze_current_sense(&mut self, frozen: bool) {
        self.sense_frozen = frozen;
    }

    pub fn set_charge_status(&mut self, status: ChargeStatus) {
        let value = self.peek(addr::SUP_STS) & !ChargeStatus::MASK;
        self.poke(addr::SUP_STS, value | status.to_sup_sts());
    }

    /// Current-sense calibration offset as a signed value.
    #[must_use]
    pub fn calibration_offset(&self) -> i32 {
        i32::from(self.peek_u16(addr::CAL_OFFSET) as i16)
    }

    fn refresh_current_sense(&mut self) {
        let sensed = self.load_code + self.sense_bias - self.calibration_offset();
        let code = (sensed.clamp(-2048, 2047) as u16) & 0x0fff;
        self.poke_u16(addr::BAT_CUR_AVG, code);
    }

    fn latch_coulomb_calibration(&mut self) {
        let value = self.peek_u32(addr::GASCNT_CAL);
        self.poke_u32(addr::GASCNT, value);
    }
}

impl RegisterBus for RegisterFile {
    type Error = Infallible;

    fn read(&mut self, register: u8) -> Result<u8, Self::Error> {
        Ok(self.peek(register))
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        let index = usize::from(register);
        self.registers[index] = value;
        self.writes[index] = self.writes[index].saturating_add(1);

        match register {
            addr::GASCNT_CAL => self.latch_coulomb_calibration(),
            r if r == addr::CAL_OFFSET || r == addr::CAL_OFFSET + 1 => {
                if !self.sense_frozen {
                    self.refresh_current_sense();
                }
            }
            _ => {}
        }

        Ok(())
    }
}

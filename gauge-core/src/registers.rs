//! PMIC register map and bus capability.
//!
//! The gauge never addresses the bus directly; it goes through [`Pmic`], which
//! owns an already-bound [`RegisterBus`] and layers the multi-byte and
//! flag-oriented accessors on top of single-byte reads and writes.
//!
//! Multi-byte values are little-endian over consecutive addresses: the base
//! address holds the least significant byte. 32-bit values are written most
//! significant byte first so the write to the base address lands last; the
//! coulomb calibration block latches on that final write.

/// Byte-wide register transport bound to one device.
pub trait RegisterBus {
    type Error;

    /// Reads one register.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    fn read(&mut self, register: u8) -> Result<u8, Self::Error>;

    /// Writes one register.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    fn write(&mut self, register: u8, value: u8) -> Result<(), Self::Error>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    type Error = B::Error;

    fn read(&mut self, register: u8) -> Result<u8, Self::Error> {
        (**self).read(register)
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        (**self).write(register, value)
    }
}

/// Register addresses of the charger and gauge blocks.
pub mod addr {
    pub const VB_MON: u8 = 0x21;
    pub const THERMAL: u8 = 0x22;

    pub const SUP_STS: u8 = 0xA0;
    pub const USB_CTRL: u8 = 0xA1;
    pub const CHRG_CTRL1: u8 = 0xA3;
    pub const CHRG_CTRL2: u8 = 0xA4;
    pub const CHRG_CTRL3: u8 = 0xA5;
    pub const TS_CTRL: u8 = 0xAC;

    pub const GGCON: u8 = 0xB0;
    pub const GGSTS: u8 = 0xB1;
    /// Coulomb counter calibration, 4 bytes.
    pub const GASCNT_CAL: u8 = 0xB4;
    /// Coulomb counter, 4 bytes.
    pub const GASCNT: u8 = 0xB8;
    /// Average current code, 2 bytes.
    pub const BAT_CUR_AVG: u8 = 0xBC;
    /// Open-circuit voltage code, 2 bytes.
    pub const BAT_OCV: u8 = 0xC2;
    /// Average voltage code, 2 bytes.
    pub const BAT_VOL: u8 = 0xC4;
    pub const IOFFSET: u8 = 0xCA;
    pub const CAL_OFFSET: u8 = 0xCE;
    pub const VCALIB0: u8 = 0xD0;
    pub const VCALIB1: u8 = 0xD2;
    pub const NON_ACT_TIMER_CNT: u8 = 0xD6;

    // Battery-backed data registers used for persistence.
    pub const SOC: u8 = 0xE0;
    /// Remaining capacity in mAh, 4 bytes.
    pub const REMAIN_CAP: u8 = 0xE1;
    /// Full charge capacity in mAh, 4 bytes.
    pub const NEW_FCC: u8 = 0xE5;
    pub const MISC_MARK: u8 = 0xE9;
    pub const HALT_CNT: u8 = 0xEA;
    pub const POFFSET: u8 = 0xEB;
    pub const NON_ACT_TIMER_CNT_SAVE: u8 = 0xEC;
}

/// Coulomb counter units per mAh.
pub const GASCNT_PER_MAH: i32 = 2390;

/// Named single-bit flags spread over the status and mark registers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flag {
    /// Pack was (re)connected since the last boot; cleared on read.
    BatteryConnected,
    /// Voltage ADC samples instantaneously instead of averaging.
    VoltageInstant,
    GaugeEnable,
    /// Gauge state was reconciled this session.
    Initialized,
    /// Reset requested once the pack has rested for at least 30 minutes.
    ResetLate,
    ResetNow,
    PlugIn,
    BatteryPresent,
    AdcCurrentMode,
    InputCurrentLimitTimer,
    DigitalTermination,
    CcCvTimer,
    UsbVoltageLimit,
    UsbCurrentLimit,
}

impl Flag {
    /// Register and bit mask holding this flag.
    #[must_use]
    pub const fn location(self) -> (u8, u8) {
        match self {
            Flag::BatteryConnected => (addr::GGSTS, 1 << 4),
            Flag::VoltageInstant => (addr::GGSTS, 1 << 0),
            Flag::GaugeEnable => (addr::TS_CTRL, 1 << 7),
            Flag::Initialized => (addr::MISC_MARK, 1 << 3),
            Flag::ResetLate => (addr::MISC_MARK, 1 << 1),
            Flag::ResetNow => (addr::MISC_MARK, 1 << 0),
            Flag::PlugIn => (addr::VB_MON, 1 << 6),
            Flag::BatteryPresent => (addr::SUP_STS, 1 << 7),
            Flag::AdcCurrentMode => (addr::GGCON, 1 << 1),
            Flag::InputCurrentLimitTimer => (addr::USB_CTRL, 1 << 7),
            Flag::DigitalTermination => (addr::CHRG_CTRL3, 1 << 5),
            Flag::CcCvTimer => (addr::CHRG_CTRL3, 1 << 2),
            Flag::UsbVoltageLimit => (addr::SUP_STS, 1 << 3),
            Flag::UsbCurrentLimit => (addr::SUP_STS, 1 << 2),
        }
    }
}

/// Charger state machine position reported by the PMIC.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChargeStatus {
    Off,
    DeadCharge,
    Trickle,
    CcCv,
    Finished,
    UsbOverVoltage,
    ThermalFault,
    TimerFault,
}

impl ChargeStatus {
    const SHIFT: u8 = 4;
    pub const MASK: u8 = 0x70;

    /// Decodes the status field of `SUP_STS`.
    #[must_use]
    pub const fn from_sup_sts(value: u8) -> Self {
        match (value & Self::MASK) >> Self::SHIFT {
            0 => ChargeStatus::Off,
            1 => ChargeStatus::DeadCharge,
            2 => ChargeStatus::Trickle,
            3 => ChargeStatus::CcCv,
            4 => ChargeStatus::Finished,
            5 => ChargeStatus::UsbOverVoltage,
            6 => ChargeStatus::ThermalFault,
            _ => ChargeStatus::TimerFault,
        }
    }

    /// Encodes the status into the `SUP_STS` field position.
    #[must_use]
    pub const fn to_sup_sts(self) -> u8 {
        let code = match self {
            ChargeStatus::Off => 0,
            ChargeStatus::DeadCharge => 1,
            ChargeStatus::Trickle => 2,
            ChargeStatus::CcCv => 3,
            ChargeStatus::Finished => 4,
            ChargeStatus::UsbOverVoltage => 5,
            ChargeStatus::ThermalFault => 6,
            ChargeStatus::TimerFault => 7,
        };
        code << Self::SHIFT
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ChargeStatus::Off => "off",
            ChargeStatus::DeadCharge => "dead-charge",
            ChargeStatus::Trickle => "trickle",
            ChargeStatus::CcCv => "cc/cv",
            ChargeStatus::Finished => "finished",
            ChargeStatus::UsbOverVoltage => "usb-over-voltage",
            ChargeStatus::ThermalFault => "thermal-fault",
            ChargeStatus::TimerFault => "timer-fault",
        }
    }
}

/// Register-level view of the PMIC over a bound bus.
pub struct Pmic<B> {
    bus: B,
}

impl<B: RegisterBus> Pmic<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_inner(self) -> B {
        self.bus
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn read(&mut self, register: u8) -> Result<u8, B::Error> {
        self.bus.read(register)
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn write(&mut self, register: u8, value: u8) -> Result<(), B::Error> {
        self.bus.write(register, value)
    }

    /// Replaces the bits under `mask` with `bits`.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn modify(&mut self, register: u8, mask: u8, bits: u8) -> Result<(), B::Error> {
        let current = self.read(register)?;
        self.write(register, (current & !mask) | (bits & mask))
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn flag(&mut self, flag: Flag) -> Result<bool, B::Error> {
        let (register, mask) = flag.location();
        Ok(self.read(register)? & mask != 0)
    }

    /// Sets or clears `flag` with a read-modify-write.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn set_flag(&mut self, flag: Flag, on: bool) -> Result<(), B::Error> {
        let (register, mask) = flag.location();
        self.modify(register, mask, if on { mask } else { 0 })
    }

    /// Returns `flag` and clears it when it was set.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn take_flag(&mut self, flag: Flag) -> Result<bool, B::Error> {
        let (register, mask) = flag.location();
        let current = self.read(register)?;
        if current & mask == 0 {
            return Ok(false);
        }
        self.write(register, current & !mask)?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn read_u16(&mut self, base: u8) -> Result<u16, B::Error> {
        let low = self.read(base)?;
        let high = self.read(base.wrapping_add(1))?;
        Ok(u16::from_le_bytes([low, high]))
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn write_u16(&mut self, base: u8, value: u16) -> Result<(), B::Error> {
        let [low, high] = value.to_le_bytes();
        self.write(base, low)?;
        self.write(base.wrapping_add(1), high)
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn read_u32(&mut self, base: u8) -> Result<u32, B::Error> {
        let mut bytes = [0u8; 4];
        for offset in (0..4u8).rev() {
            bytes[usize::from(offset)] = self.read(base.wrapping_add(offset))?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Writes a 32-bit value, most significant byte first.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn write_u32(&mut self, base: u8, value: u32) -> Result<(), B::Error> {
        let bytes = value.to_le_bytes();
        for offset in (0..4u8).rev() {
            self.write(base.wrapping_add(offset), bytes[usize::from(offset)])?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn charge_status(&mut self) -> Result<ChargeStatus, B::Error> {
        Ok(ChargeStatus::from_sup_sts(self.read(addr::SUP_STS)?))
    }

    /// Capacity held by the coulomb counter in mAh.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn coulomb_capacity(&mut self) -> Result<i32, B::Error> {
        let raw = self.read_u32(addr::GASCNT)? as i32;
        Ok(raw / GASCNT_PER_MAH)
    }

    /// Loads `capacity_mah` into the coulomb counter.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn seed_coulomb_counter(&mut self, capacity_mah: i32) -> Result<(), B::Error> {
        let raw = capacity_mah.max(0).saturating_mul(GASCNT_PER_MAH) as u32;
        self.write_u32(addr::GASCNT_CAL, raw)
    }

    /// Minutes the PMIC spent without activity since the previous call.
    ///
    /// The running counter is copied into the save register; an unchanged
    /// counter reads as zero.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn take_off_minutes(&mut self) -> Result<u8, B::Error> {
        let current = self.read(addr::NON_ACT_TIMER_CNT)?;
        let last = self.read(addr::NON_ACT_TIMER_CNT_SAVE)?;
        self.write(addr::NON_ACT_TIMER_CNT_SAVE, current)?;
        Ok(if current == last { 0 } else { current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RegisterFile;

    #[test]
    fn wide_values_are_little_endian() {
        let mut pmic = Pmic::new(RegisterFile::new());
        pmic.write_u32(addr::NEW_FCC, 0x0102_0304).unwrap();
        assert_eq!(pmic.read(addr::NEW_FCC).unwrap(), 0x04);
        assert_eq!(pmic.read(addr::NEW_FCC + 3).unwrap(), 0x01);
        assert_eq!(pmic.read_u32(addr::NEW_FCC).unwrap(), 0x0102_0304);

        pmic.write_u16(addr::CAL_OFFSET, 0xBEEF).unwrap();
        assert_eq!(pmic.read(addr::CAL_OFFSET).unwrap(), 0xEF);
        assert_eq!(pmic.read_u16(addr::CAL_OFFSET).unwrap(), 0xBEEF);
    }

    #[test]
    fn flags_use_read_modify_write() {
        let mut pmic = Pmic::new(RegisterFile::new());
        pmic.write(addr::MISC_MARK, 0b1010_0000).unwrap();
        pmic.set_flag(Flag::Initialized, true).unwrap();
        assert_eq!(pmic.read(addr::MISC_MARK).unwrap(), 0b1010_1000);
        assert!(pmic.flag(Flag::Initialized).unwrap());

        pmic.set_flag(Flag::Initialized, false).unwrap();
        assert_eq!(pmic.read(addr::MISC_MARK).unwrap(), 0b1010_0000);
    }

    #[test]
    fn take_flag_clears_only_when_set() {
        let mut pmic = Pmic::new(RegisterFile::new());
        assert!(!pmic.take_flag(Flag::BatteryConnected).unwrap());
        assert_eq!(pmic.bus().writes_to(addr::GGSTS), 0);

        pmic.write(addr::GGSTS, 0x11).unwrap();
        assert!(pmic.take_flag(Flag::BatteryConnected).unwrap());
        assert_eq!(pmic.read(addr::GGSTS).unwrap(), 0x01);
        assert!(!pmic.take_flag(Flag::BatteryConnected).unwrap());
    }

    #[test]
    fn off_minutes_read_zero_when_counter_unchanged() {
        let mut pmic = Pmic::new(RegisterFile::new());
        pmic.write(addr::NON_ACT_TIMER_CNT, 45).unwrap();
        assert_eq!(pmic.take_off_minutes().unwrap(), 45);
        assert_eq!(pmic.take_off_minutes().unwrap(), 0);
    }

    #[test]
    fn coulomb_counter_round_trips_through_calibration_block() {
        let mut pmic = Pmic::new(RegisterFile::new());
        pmic.seed_coulomb_counter(1500).unwrap();
        assert_eq!(pmic.coulomb_capacity().unwrap(), 1500);
    }

    #[test]
    fn charge_status_decodes_field() {
        assert_eq!(ChargeStatus::from_sup_sts(0x80 | 0x40), ChargeStatus::Finished);
        assert_eq!(ChargeStatus::from_sup_sts(0x30), ChargeStatus::CcCv);
        assert_eq!(
            ChargeStatus::from_sup_sts(ChargeStatus::TimerFault.to_sup_sts()),
            ChargeStatus::TimerFault
        );
    }
}

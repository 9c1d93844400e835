//! Board adapters that bind `gauge-core` capabilities to real peripherals.
//!
//! The PMIC transport is generic over `embedded-hal` I2C so it is exercised on
//! the host as well; the charger sense wiring lives in [`sense`].

pub mod sense;

use embedded_hal::i2c::I2c;
use gauge_core::registers::RegisterBus;

/// 7-bit I2C address of the PMIC.
pub const PMIC_I2C_ADDRESS: u8 = 0x1a;

/// Register transport over a blocking I2C bus.
///
/// Reads issue a one-byte register pointer followed by a repeated-start read,
/// writes send pointer and value in a single transfer.
pub struct I2cRegisterBus<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> I2cRegisterBus<I> {
    /// Binds the bus to the PMIC at its default address.
    pub const fn new(i2c: I) -> Self {
        Self::with_address(i2c, PMIC_I2C_ADDRESS)
    }

    pub const fn with_address(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }
}

impl<I: I2c> RegisterBus for I2cRegisterBus<I> {
    type Error = I::Error;

    fn read(&mut self, register: u8) -> Result<u8, Self::Error> {
        let mut value = [0u8; 1];
        self.i2c.write_read(self.address, &[register], &mut value)?;
        Ok(value[0])
    }

    fn write(&mut self, register: u8, value: u8) -> Result<(), Self::Error> {
        self.i2c.write(self.address, &[register, value])
    }
}

#![no_std]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Battery fuel-gauge engine shared by the MCU firmware and the host emulator.
//
// The crate stays portable by avoiding the Rust standard library: all PMIC
// access goes through the register capability in [`registers`], settle delays
// through `embedded-hal`, and diagnostics land in a bounded event ring instead
// of a logger.

pub mod calibration;
pub mod charger;
pub mod converge;
pub mod events;
pub mod fixed;
pub mod gauge;
pub mod ocv;
pub mod profile;
pub mod reconcile;
pub mod registers;
pub mod sim;
pub mod telemetry;

pub use charger::ChargerType;
pub use events::{EventLog, EventRecord, GaugeEvent};
pub use gauge::{BatteryStatus, Diagnostics, FuelGauge, GaugeError};
pub use profile::{BatteryProfile, ProfileConfig, ProfileError};

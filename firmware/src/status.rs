#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared battery status for the firmware target.
//!
//! The gauge task publishes every status it computes into lightweight atomics
//! so other tasks can read a [`BatteryStatus`] without borrowing the gauge.

use gauge_core::{BatteryStatus, ChargerType};
use portable_atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

/// Battery voltage in microvolts.
static VOLTAGE_UV: AtomicI32 = AtomicI32::new(0);
/// Displayed state of charge, percent.
static CAPACITY_PERCENT: AtomicU8 = AtomicU8::new(0);
/// Encoded [`ChargerType`].
static CHARGER: AtomicU8 = AtomicU8::new(charger_code(ChargerType::Undefined));
/// Set once the first status has been published.
static PUBLISHED: AtomicBool = AtomicBool::new(false);
/// Number of update faults seen since boot.
static FAULTS: AtomicU32 = AtomicU32::new(0);

const fn charger_code(charger: ChargerType) -> u8 {
    match charger {
        ChargerType::None => 0,
        ChargerType::Usb => 1,
        ChargerType::Ac => 2,
        ChargerType::Dc => 3,
        ChargerType::Undefined => 4,
    }
}

const fn charger_from_code(code: u8) -> ChargerType {
    match code {
        0 => ChargerType::None,
        1 => ChargerType::Usb,
        2 => ChargerType::Ac,
        3 => ChargerType::Dc,
        _ => ChargerType::Undefined,
    }
}

/// Stores the latest status from the gauge task.
pub fn publish(status: BatteryStatus) {
    VOLTAGE_UV.store(status.voltage_uv, Ordering::Relaxed);
    CAPACITY_PERCENT.store(status.capacity_percent, Ordering::Relaxed);
    CHARGER.store(charger_code(status.charger), Ordering::Relaxed);
    PUBLISHED.store(true, Ordering::Relaxed);
}

/// Returns the last published status, if the gauge has reported yet.
pub fn latest() -> Option<BatteryStatus> {
    if !PUBLISHED.load(Ordering::Relaxed) {
        return None;
    }
    Some(BatteryStatus {
        voltage_uv: VOLTAGE_UV.load(Ordering::Relaxed),
        capacity_percent: CAPACITY_PERCENT.load(Ordering::Relaxed),
        charger: charger_from_code(CHARGER.load(Ordering::Relaxed)),
    })
}

pub fn record_fault() {
    FAULTS.fetch_add(1, Ordering::Relaxed);
}

pub fn fault_count() -> u32 {
    FAULTS.load(Ordering::Relaxed)
}

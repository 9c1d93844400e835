use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Pull};
use embassy_stm32::i2c::{Config as I2cConfig, I2c};
use embassy_stm32::time::Hertz;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use gauge_core::{BatteryProfile, FuelGauge};

use crate::board;
use crate::hw::I2cRegisterBus;
use crate::hw::sense::{BoardSense, Stm32DcAdc, UsbBcd};
use crate::telemetry::EventDrain;

mod gauge_task;
mod plug_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Raised by the plug watcher on every VBUS edge.
pub(super) static PLUG_EDGE: Signal<ThreadModeRawMutex, ()> = Signal::new();

const PMIC_I2C_FREQUENCY: Hertz = Hertz(400_000);

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        I2C1,
        PB6,
        PB7,
        PA8,
        PA9,
        EXTI9,
        ADC1,
        USB,
        ..
    } = hal::init(config);

    let mut i2c_config = I2cConfig::default();
    i2c_config.frequency = PMIC_I2C_FREQUENCY;
    let i2c = I2c::new_blocking(I2C1, PB6, PB7, i2c_config);
    let bus = I2cRegisterBus::new(i2c);

    // PA0 (ADC1_IN0) stays in its reset analog mode.
    let sense = BoardSense::new(
        Some(Input::new(PA8, Pull::None)),
        Some(Stm32DcAdc::new(
            Adc::new(ADC1),
            board::DC_DETECT_ADC_CHANNEL,
        )),
        UsbBcd::new(USB),
    );

    let profile = match BatteryProfile::from_config(&board::profile_config()) {
        Ok(profile) => profile,
        Err(error) => {
            defmt::error!("gauge: invalid board profile: {}", defmt::Debug2Format(&error));
            core::future::pending::<()>().await;
            return;
        }
    };

    let gauge = FuelGauge::new(bus, Delay, sense, profile);
    let vbus = ExtiInput::new(PA9, EXTI9, Pull::Down);

    spawner
        .spawn(plug_task::run(vbus, &PLUG_EDGE))
        .expect("failed to spawn plug watcher task");
    spawner
        .spawn(gauge_task::run(gauge, EventDrain::new(), &PLUG_EDGE))
        .expect("failed to spawn gauge task");

    core::future::pending::<()>().await;
}

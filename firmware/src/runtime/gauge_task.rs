use core::time::Duration as CoreDuration;

use embassy_futures::select::{Either, select};
use embassy_stm32::gpio::Input;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Delay, Duration, Instant, Ticker};
use gauge_core::FuelGauge;
use gauge_core::gauge::TICK_INTERVAL;

use crate::hw::I2cRegisterBus;
use crate::hw::sense::{BoardSense, Stm32DcAdc, UsbBcd};
use crate::status;
use crate::telemetry::EventDrain;

pub type BoardGauge = FuelGauge<
    I2cRegisterBus<I2c<'static, Blocking>>,
    Delay,
    BoardSense<Input<'static>, Stm32DcAdc<'static>, UsbBcd<'static>>,
>;

fn uptime() -> CoreDuration {
    CoreDuration::from_micros(Instant::now().as_micros())
}

/// Brings the gauge up, logging and counting a failure.
fn try_start(gauge: &mut BoardGauge) -> bool {
    match gauge.start(uptime()) {
        Ok(initial) => {
            defmt::info!("gauge: started {}", defmt::Display2Format(&initial));
            status::publish(initial);
            true
        }
        Err(error) => {
            defmt::error!("gauge: start failed: {}", defmt::Display2Format(&error));
            status::record_fault();
            false
        }
    }
}

#[embassy_executor::task]
pub async fn run(
    mut gauge: BoardGauge,
    mut drain: EventDrain,
    plug_edge: &'static Signal<ThreadModeRawMutex, ()>,
) -> ! {
    let mut started = try_start(&mut gauge);
    drain.drain(gauge.events());

    let mut ticker = Ticker::every(Duration::from_secs(TICK_INTERVAL.as_secs()));
    loop {
        if let Either::Second(()) = select(ticker.next(), plug_edge.wait()).await {
            defmt::debug!("gauge: plug edge");
        }

        if !started {
            started = try_start(&mut gauge);
            drain.drain(gauge.events());
            continue;
        }

        let before = gauge.events().latest().map(|record| record.id);
        let current = gauge.update(uptime());
        if status::latest() != Some(current) {
            defmt::info!("gauge: {}", defmt::Display2Format(&current));
        }
        status::publish(current);

        if drain.drain(gauge.events()) > 0
            && gauge
                .events()
                .since(before)
                .any(|record| record.event.is_fault())
        {
            status::record_fault();
        }
    }
}

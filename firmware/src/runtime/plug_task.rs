use embassy_stm32::exti::ExtiInput;
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::signal::Signal;

#[embassy_executor::task]
pub async fn run(mut vbus: ExtiInput<'static>, edge: &'static Signal<ThreadModeRawMutex, ()>) -> ! {
    loop {
        vbus.wait_for_any_edge().await;
        defmt::debug!("plug: vbus edge, level={}", vbus.is_high());
        edge.signal(());
    }
}

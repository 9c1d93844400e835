//! Charger sense wiring: DC-detect pin, DC-detect ADC channel, and USB battery
//! charging detection on the data lines.

use embedded_hal::digital::InputPin;
use gauge_core::charger::{
    ADC_POLL_LIMIT, ChargerSense, SarAdc, SenseError, UsbLineState, convert_bounded,
};

/// Raw outcome of a USB battery-charging detection sequence.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PortProbe {
    /// Data pins made contact during DCD.
    pub data_contact: bool,
    /// Primary detection saw a charging port.
    pub primary: bool,
    /// Secondary detection saw D+ and D- shorted.
    pub secondary: bool,
}

impl PortProbe {
    pub const fn classify(self) -> UsbLineState {
        if !self.data_contact {
            UsbLineState::Floating
        } else if !self.primary {
            UsbLineState::StandardDownstream
        } else if self.secondary {
            UsbLineState::DedicatedCharger
        } else {
            UsbLineState::ChargingDownstream
        }
    }
}

/// Runs the battery-charging detection sequence on the USB port.
pub trait ChargingPortDetect {
    /// # Errors
    ///
    /// [`SenseError::Unavailable`] when the port cannot be probed.
    fn probe(&mut self) -> Result<PortProbe, SenseError>;
}

/// Board charger sense. Either DC input may be absent on a given board.
pub struct BoardSense<P, A, D> {
    dc_pin: Option<P>,
    dc_adc: Option<A>,
    port: D,
}

impl<P, A, D> BoardSense<P, A, D> {
    pub const fn new(dc_pin: Option<P>, dc_adc: Option<A>, port: D) -> Self {
        Self {
            dc_pin,
            dc_adc,
            port,
        }
    }
}

impl<P, A, D> ChargerSense for BoardSense<P, A, D>
where
    P: InputPin,
    A: SarAdc,
    D: ChargingPortDetect,
{
    fn dc_gpio_level(&mut self) -> Result<bool, SenseError> {
        let pin = self.dc_pin.as_mut().ok_or(SenseError::Unavailable)?;
        pin.is_high().map_err(|_| SenseError::Unavailable)
    }

    fn dc_adc_sample(&mut self) -> Result<u16, SenseError> {
        let adc = self.dc_adc.as_mut().ok_or(SenseError::Unavailable)?;
        Ok(convert_bounded(adc, ADC_POLL_LIMIT)?)
    }

    fn usb_lines(&mut self) -> Result<UsbLineState, SenseError> {
        self.port.probe().map(PortProbe::classify)
    }
}

#[cfg(target_os = "none")]
pub use target::{Stm32DcAdc, UsbBcd};

#[cfg(target_os = "none")]
mod target {
    use embassy_stm32::Peri;
    use embassy_stm32::adc::{Adc, SampleTime};
    use embassy_stm32::pac;
    use embassy_stm32::peripherals::{ADC1, USB};
    use embassy_time::{Duration, block_for};
    use gauge_core::charger::{SarAdc, SenseError};

    use super::{ChargingPortDetect, PortProbe};

    const DATA_CONTACT_TIMEOUT: Duration = Duration::from_millis(300);
    const DATA_CONTACT_POLL: Duration = Duration::from_millis(10);
    const DETECTION_SETTLE: Duration = Duration::from_millis(40);

    /// Single-channel conversions on ADC1 driven at register level so the
    /// ready poll stays bounded.
    pub struct Stm32DcAdc<'d> {
        _adc: Adc<'d, ADC1>,
        channel: u8,
    }

    impl<'d> Stm32DcAdc<'d> {
        pub fn new(mut adc: Adc<'d, ADC1>, channel: u8) -> Self {
            adc.set_sample_time(SampleTime::CYCLES79_5);
            Self { _adc: adc, channel }
        }
    }

    impl SarAdc for Stm32DcAdc<'_> {
        fn start_conversion(&mut self) {
            let regs = pac::ADC1;
            regs.chselr()
                .write_value(pac::adc::regs::Chselr(1 << self.channel));
            regs.isr().write(|w| w.set_eoc(true));
            regs.cr().modify(|w| w.set_adstart(true));
        }

        fn is_ready(&mut self) -> bool {
            pac::ADC1.isr().read().eoc()
        }

        fn data(&mut self) -> u16 {
            (pac::ADC1.dr().read().0 & 0x0fff) as u16
        }
    }

    /// Battery charging detection through the USB peripheral's BCD block.
    pub struct UsbBcd<'d> {
        _usb: Peri<'d, USB>,
    }

    impl<'d> UsbBcd<'d> {
        pub fn new(usb: Peri<'d, USB>) -> Self {
            embassy_stm32::rcc::enable_and_reset::<USB>();
            Self { _usb: usb }
        }
    }

    impl ChargingPortDetect for UsbBcd<'_> {
        fn probe(&mut self) -> Result<PortProbe, SenseError> {
            let bcdr = pac::USB.bcdr();
            bcdr.modify(|w| w.set_bcden(true));

            bcdr.modify(|w| w.set_dcden(true));
            let mut waited = Duration::from_ticks(0);
            let mut data_contact = bcdr.read().dcdet();
            while !data_contact && waited < DATA_CONTACT_TIMEOUT {
                block_for(DATA_CONTACT_POLL);
                waited += DATA_CONTACT_POLL;
                data_contact = bcdr.read().dcdet();
            }
            bcdr.modify(|w| w.set_dcden(false));

            bcdr.modify(|w| w.set_pden(true));
            block_for(DETECTION_SETTLE);
            let primary = bcdr.read().pdet();
            bcdr.modify(|w| w.set_pden(false));

            let mut secondary = false;
            if primary {
                bcdr.modify(|w| w.set_sden(true));
                block_for(DETECTION_SETTLE);
                secondary = bcdr.read().sdet();
                bcdr.modify(|w| w.set_sden(false));
            }

            bcdr.modify(|w| w.set_bcden(false));
            Ok(PortProbe {
                data_contact,
                primary,
                secondary,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    struct Level(bool);

    impl ErrorType for Level {
        type Error = Infallible;
    }

    impl InputPin for Level {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.0)
        }
    }

    /// ADC that becomes ready after `latency` polls, or never.
    struct SlowAdc {
        latency: Option<u32>,
        polls: u32,
        value: u16,
    }

    impl SarAdc for SlowAdc {
        fn start_conversion(&mut self) {
            self.polls = 0;
        }

        fn is_ready(&mut self) -> bool {
            self.polls += 1;
            self.latency.is_some_and(|latency| self.polls > latency)
        }

        fn data(&mut self) -> u16 {
            self.value
        }
    }

    struct FixedPort(Result<PortProbe, SenseError>);

    impl ChargingPortDetect for FixedPort {
        fn probe(&mut self) -> Result<PortProbe, SenseError> {
            self.0
        }
    }

    fn probe(data_contact: bool, primary: bool, secondary: bool) -> PortProbe {
        PortProbe {
            data_contact,
            primary,
            secondary,
        }
    }

    #[test]
    fn probe_classification() {
        assert_eq!(probe(false, true, true).classify(), UsbLineState::Floating);
        assert_eq!(
            probe(true, false, false).classify(),
            UsbLineState::StandardDownstream
        );
        assert_eq!(
            probe(true, true, false).classify(),
            UsbLineState::ChargingDownstream
        );
        assert_eq!(
            probe(true, true, true).classify(),
            UsbLineState::DedicatedCharger
        );
    }

    #[test]
    fn missing_inputs_are_unavailable() {
        let mut sense: BoardSense<Level, SlowAdc, _> =
            BoardSense::new(None, None, FixedPort(Err(SenseError::Unavailable)));

        assert_eq!(sense.dc_gpio_level(), Err(SenseError::Unavailable));
        assert_eq!(sense.dc_adc_sample(), Err(SenseError::Unavailable));
        assert_eq!(sense.usb_lines(), Err(SenseError::Unavailable));
    }

    #[test]
    fn adc_poll_is_bounded() {
        let adc = SlowAdc {
            latency: Some(3),
            polls: 0,
            value: 412,
        };
        let mut sense = BoardSense::new(
            Some(Level(true)),
            Some(adc),
            FixedPort(Ok(probe(true, true, true))),
        );
        assert_eq!(sense.dc_gpio_level(), Ok(true));
        assert_eq!(sense.dc_adc_sample(), Ok(412));
        assert_eq!(sense.usb_lines(), Ok(UsbLineState::DedicatedCharger));

        let stuck = SlowAdc {
            latency: None,
            polls: 0,
            value: 0,
        };
        let mut sense = BoardSense::new(
            None::<Level>,
            Some(stuck),
            FixedPort(Ok(PortProbe::default())),
        );
        assert_eq!(sense.dc_adc_sample(), Err(SenseError::AdcTimeout));
    }
}

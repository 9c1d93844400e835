//! Charger detection and programming.
//!
//! Detection walks a fixed priority: virtual power, the PMIC plug sense, the
//! board's DC sense, then USB data-line classification. The resulting type maps
//! onto an input current ceiling which is written only when the type changes.

use core::fmt;

use crate::profile::{BatteryProfile, DcDetectMethod};
use crate::registers::{Flag, Pmic, RegisterBus, addr};

/// Charge voltage selector table, mV.
pub const CHRG_VOL_SEL: [i32; 7] = [4050, 4100, 4150, 4200, 4250, 4300, 4350];
/// Charge current selector table, mA.
pub const CHRG_CUR_SEL: [i32; 8] = [1000, 1200, 1400, 1600, 1800, 2000, 2250, 2400];
/// Input current selector table, mA.
pub const CHRG_CUR_INPUT: [i32; 8] = [450, 800, 850, 1000, 1250, 1500, 1750, 2000];

/// Input selector for the 450 mA ceiling.
pub const ILIM_450MA: u8 = 0x00;

const INPUT_CUR_MASK: u8 = 0x0f;
const FINISH_CUR_MASK: u8 = 0xc7;
const FB_TEMP_MASK: u8 = 0x0c;
const TEMP_115C: u8 = 0x03 << 2;

/// Upper bound on SAR ADC ready polls.
pub const ADC_POLL_LIMIT: u32 = 1_000;

/// Power source classification.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChargerType {
    None,
    Usb,
    Ac,
    Dc,
    #[default]
    Undefined,
}

impl ChargerType {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ChargerType::None => "none",
            ChargerType::Usb => "usb",
            ChargerType::Ac => "ac",
            ChargerType::Dc => "dc",
            ChargerType::Undefined => "undef",
        }
    }

    #[must_use]
    pub const fn is_present(self) -> bool {
        matches!(self, ChargerType::Usb | ChargerType::Ac | ChargerType::Dc)
    }
}

impl fmt::Display for ChargerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// USB data-line classification from the PHY.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UsbLineState {
    Floating,
    StandardDownstream,
    DedicatedCharger,
    ChargingDownstream,
}

/// Board-level charger sense failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SenseError {
    /// ADC never raised its ready flag.
    AdcTimeout,
    /// The board has no such sense wired.
    Unavailable,
}

impl fmt::Display for SenseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenseError::AdcTimeout => f.write_str("adc-timeout"),
            SenseError::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Bounded wait expired before the hardware reported ready.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PollTimeout;

impl From<PollTimeout> for SenseError {
    fn from(_: PollTimeout) -> Self {
        SenseError::AdcTimeout
    }
}

/// Board inputs used to classify the charger.
pub trait ChargerSense {
    /// Raw level of the DC-detect GPIO.
    ///
    /// # Errors
    ///
    /// [`SenseError::Unavailable`] when the pin is not wired.
    fn dc_gpio_level(&mut self) -> Result<bool, SenseError>;

    /// One SAR ADC conversion of the DC-detect channel.
    ///
    /// # Errors
    ///
    /// [`SenseError::AdcTimeout`] when the conversion does not complete.
    fn dc_adc_sample(&mut self) -> Result<u16, SenseError>;

    /// USB data-line classification.
    ///
    /// # Errors
    ///
    /// [`SenseError::Unavailable`] when no PHY detection is available.
    fn usb_lines(&mut self) -> Result<UsbLineState, SenseError>;
}

impl<S: ChargerSense + ?Sized> ChargerSense for &mut S {
    fn dc_gpio_level(&mut self) -> Result<bool, SenseError> {
        (**self).dc_gpio_level()
    }

    fn dc_adc_sample(&mut self) -> Result<u16, SenseError> {
        (**self).dc_adc_sample()
    }

    fn usb_lines(&mut self) -> Result<UsbLineState, SenseError> {
        (**self).usb_lines()
    }
}

/// Register-level SAR ADC with a start/ready/data handshake.
pub trait SarAdc {
    fn start_conversion(&mut self);
    fn is_ready(&mut self) -> bool;
    fn data(&mut self) -> u16;
}

/// Starts a conversion and polls for completion at most `limit` times.
///
/// # Errors
///
/// [`PollTimeout`] when the ready flag is not seen within `limit` polls.
pub fn convert_bounded<A: SarAdc>(adc: &mut A, limit: u32) -> Result<u16, PollTimeout> {
    adc.start_conversion();
    for _ in 0..limit {
        if adc.is_ready() {
            return Ok(adc.data());
        }
    }
    Err(PollTimeout)
}

/// Selector indices derived from the profile's charge limits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChargerSelection {
    pub voltage: u8,
    pub current: u8,
    pub input: u8,
}

impl ChargerSelection {
    #[must_use]
    pub fn from_profile(profile: &BatteryProfile) -> Self {
        Self {
            voltage: select_index(&CHRG_VOL_SEL, profile.max_charge_voltage_mv()),
            current: select_index(&CHRG_CUR_SEL, profile.max_charge_current_ma()),
            input: select_index(&CHRG_CUR_INPUT, profile.max_input_current_ma()),
        }
    }

    /// `CHRG_CTRL1` value: charge enable, voltage and current selectors.
    #[must_use]
    pub const fn chrg_ctrl1(self) -> u8 {
        (1 << 7) | (self.voltage << 4) | self.current
    }
}

/// Index of the largest entry not above `request`, or 0 when every entry is.
#[must_use]
pub fn select_index(table: &[i32], request: i32) -> u8 {
    let index = table
        .iter()
        .take_while(|&&entry| entry <= request)
        .count()
        .saturating_sub(1);
    u8::try_from(index).unwrap_or(u8::MAX)
}

/// Termination current bits for `CHRG_CTRL2`, by pack size.
#[must_use]
pub const fn finish_current_bits(fcc: i32) -> u8 {
    let code = if fcc > 5000 {
        3
    } else if fcc >= 4000 {
        2
    } else if fcc >= 3000 {
        1
    } else {
        0
    };
    code << 6
}

/// Programs charge limits, termination, thermal feedback, and ADC mode.
///
/// # Errors
///
/// Propagates the transport error.
pub fn program_charger<B: RegisterBus>(
    pmic: &mut Pmic<B>,
    profile: &BatteryProfile,
    fcc: i32,
) -> Result<ChargerSelection, B::Error> {
    let selection = ChargerSelection::from_profile(profile);

    pmic.set_flag(Flag::AdcCurrentMode, true)?;
    pmic.set_flag(Flag::UsbVoltageLimit, true)?;
    pmic.set_flag(Flag::UsbCurrentLimit, true)?;
    pmic.modify(addr::USB_CTRL, INPUT_CUR_MASK, selection.input)?;
    pmic.set_flag(Flag::InputCurrentLimitTimer, true)?;
    pmic.modify(addr::THERMAL, FB_TEMP_MASK, TEMP_115C)?;
    pmic.write(addr::CHRG_CTRL1, selection.chrg_ctrl1())?;
    pmic.modify(addr::CHRG_CTRL2, FINISH_CUR_MASK, finish_current_bits(fcc))?;
    pmic.set_flag(Flag::DigitalTermination, true)?;
    pmic.set_flag(Flag::CcCvTimer, false)?;

    Ok(selection)
}

/// Errors raised while classifying the charger.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectError<E> {
    Bus(E),
    Sense(SenseError),
}

impl<E> From<SenseError> for DetectError<E> {
    fn from(error: SenseError) -> Self {
        Self::Sense(error)
    }
}

/// Tracks the last charger type applied to the input limit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChargerPolicy {
    applied: ChargerType,
}

impl ChargerPolicy {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            applied: ChargerType::Undefined,
        }
    }

    #[must_use]
    pub const fn applied(&self) -> ChargerType {
        self.applied
    }

    /// Classifies the current power source.
    ///
    /// # Errors
    ///
    /// Bus failures reading the plug sense, or board sense failures.
    pub fn detect<B, S>(
        &self,
        pmic: &mut Pmic<B>,
        sense: &mut S,
        profile: &BatteryProfile,
    ) -> Result<ChargerType, DetectError<B::Error>>
    where
        B: RegisterBus,
        S: ChargerSense,
    {
        if profile.virtual_power() {
            return Ok(ChargerType::Dc);
        }

        let plugged = pmic.flag(Flag::PlugIn).map_err(DetectError::Bus)?;
        if !plugged {
            return Ok(ChargerType::None);
        }

        let dc = match profile.dc_detect() {
            DcDetectMethod::None => false,
            DcDetectMethod::Gpio { active_high } => sense.dc_gpio_level()? == active_high,
            DcDetectMethod::Adc { threshold } => sense.dc_adc_sample()? >= threshold,
        };
        if dc {
            return Ok(ChargerType::Dc);
        }

        Ok(match sense.usb_lines()? {
            UsbLineState::Floating => ChargerType::Dc,
            UsbLineState::StandardDownstream | UsbLineState::ChargingDownstream => {
                ChargerType::Usb
            }
            UsbLineState::DedicatedCharger => ChargerType::Ac,
        })
    }

    /// Writes the input current ceiling for `charger` when it differs from the
    /// last applied type. Returns the previous type on change.
    ///
    /// # Errors
    ///
    /// Propagates the transport error.
    pub fn apply<B: RegisterBus>(
        &mut self,
        pmic: &mut Pmic<B>,
        charger: ChargerType,
        profile: &BatteryProfile,
    ) -> Result<Option<ChargerType>, B::Error> {
        if charger == self.applied {
            return Ok(None);
        }

        let input = match charger {
            ChargerType::None | ChargerType::Usb => Some(ILIM_450MA),
            ChargerType::Ac | ChargerType::Dc => {
                Some(ChargerSelection::from_profile(profile).input)
            }
            ChargerType::Undefined => None,
        };
        if let Some(input) = input {
            pmic.modify(addr::USB_CTRL, INPUT_CUR_MASK, input)?;
        }

        let previous = self.applied;
        self.applied = charger;
        Ok(Some(previous))
    }
}

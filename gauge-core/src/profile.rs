//! Battery profile and board configuration.
//!
//! [`ProfileConfig`] mirrors the board description one field at a time, every
//! field optional. [`BatteryProfile::from_config`] fills defaults, validates the
//! required values, and produces the immutable profile the engine runs on.

use core::fmt;

use crate::ocv::{OcvTable, OcvTableError};

/// Smallest FCC accepted from the persisted register before falling back to
/// the design capacity.
pub const MIN_FCC_MAH: i32 = 500;

/// Default charge voltage ceiling.
pub const DEFAULT_MAX_CHARGE_VOLTAGE_MV: i32 = 4200;
/// Default input current ceiling.
pub const DEFAULT_MAX_INPUT_CURRENT_MA: i32 = 2000;
/// Default charge current ceiling.
pub const DEFAULT_MAX_CHARGE_CURRENT_MA: i32 = 1200;
/// Default bound on one-shot SOC correction at power-on.
pub const DEFAULT_MAX_SOC_OFFSET: i32 = 70;
/// Default series resistance used for IR compensation.
pub const DEFAULT_SERIES_RESISTANCE_MOHM: i32 = 135;
/// Default current used to pace the finish ramp.
pub const DEFAULT_FINISH_RAMP_CURRENT_MA: i32 = 1500;
/// Default estimated voltage below which start-up always reconciles.
pub const DEFAULT_SCREEN_ON_VOLTAGE_MV: i32 = 3500;
/// SAR ADC reading at or above which the DC adapter counts as present.
pub const DC_ADC_TRIGGER: u16 = 150;

/// How the board senses a DC adapter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DcDetectMethod {
    /// No DC sense wired.
    None,
    /// DC present when the GPIO reads `active_high`.
    Gpio { active_high: bool },
    /// DC present when the SAR ADC reads at least `threshold`.
    Adc { threshold: u16 },
}

impl DcDetectMethod {
    /// ADC detection with the stock trigger level.
    #[must_use]
    pub const fn adc() -> Self {
        Self::Adc {
            threshold: DC_ADC_TRIGGER,
        }
    }
}

/// Board description as loaded from configuration; every field is optional.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ProfileConfig<'a> {
    pub ocv_table: Option<&'a [u16]>,
    pub design_capacity_mah: Option<i32>,
    pub design_qmax_mah: Option<i32>,
    pub max_charge_voltage_mv: Option<i32>,
    pub max_input_current_ma: Option<i32>,
    pub max_charge_current_ma: Option<i32>,
    pub max_soc_offset: Option<i32>,
    pub series_resistance_mohm: Option<i32>,
    pub virtual_power: Option<bool>,
    pub dc_detect: Option<DcDetectMethod>,
    pub finish_ramp_current_ma: Option<i32>,
    pub screen_on_voltage_mv: Option<i32>,
    pub charge_in_boot: Option<bool>,
}

/// Configuration problems that stop the gauge from initializing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProfileError {
    MissingOcvTable,
    OcvTable(OcvTableError),
    MissingDesignCapacity,
    MissingQmax,
    /// A value that must be strictly positive was zero or negative.
    NonPositive(&'static str),
    QmaxBelowDesign { design: i32, qmax: i32 },
}

impl From<OcvTableError> for ProfileError {
    fn from(error: OcvTableError) -> Self {
        Self::OcvTable(error)
    }
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileError::MissingOcvTable => f.write_str("ocv table missing"),
            ProfileError::OcvTable(OcvTableError::TooShort) => {
                f.write_str("ocv table needs at least two points")
            }
            ProfileError::OcvTable(OcvTableError::TooLong) => f.write_str("ocv table too long"),
            ProfileError::OcvTable(OcvTableError::NotIncreasing { index }) => {
                write!(f, "ocv table not increasing at index {index}")
            }
            ProfileError::MissingDesignCapacity => f.write_str("design capacity missing"),
            ProfileError::MissingQmax => f.write_str("design qmax missing"),
            ProfileError::NonPositive(field) => write!(f, "{field} must be positive"),
            ProfileError::QmaxBelowDesign { design, qmax } => {
                write!(f, "qmax {qmax} below design capacity {design}")
            }
        }
    }
}

/// Immutable battery and charger description.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatteryProfile {
    ocv: OcvTable,
    design_capacity_mah: i32,
    design_qmax_mah: i32,
    max_charge_voltage_mv: i32,
    max_input_current_ma: i32,
    max_charge_current_ma: i32,
    max_soc_offset: i32,
    series_resistance_mohm: i32,
    virtual_power: bool,
    dc_detect: DcDetectMethod,
    finish_ramp_current_ma: i32,
    screen_on_voltage_mv: i32,
    charge_in_boot: bool,
}

impl BatteryProfile {
    /// Validates `config` and fills defaults for optional fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the OCV table, design capacity, or Qmax is
    /// missing or malformed.
    pub fn from_config(config: &ProfileConfig<'_>) -> Result<Self, ProfileError> {
        let ocv = OcvTable::new(config.ocv_table.ok_or(ProfileError::MissingOcvTable)?)?;
        let design = positive(
            config
                .design_capacity_mah
                .ok_or(ProfileError::MissingDesignCapacity)?,
            "design capacity",
        )?;
        let qmax = positive(
            config.design_qmax_mah.ok_or(ProfileError::MissingQmax)?,
            "design qmax",
        )?;
        if qmax < design {
            return Err(ProfileError::QmaxBelowDesign { design, qmax });
        }

        let finish_ramp_current_ma = positive(
            config
                .finish_ramp_current_ma
                .unwrap_or(DEFAULT_FINISH_RAMP_CURRENT_MA),
            "finish ramp current",
        )?;

        Ok(Self {
            ocv,
            design_capacity_mah: design,
            design_qmax_mah: qmax,
            max_charge_voltage_mv: config
                .max_charge_voltage_mv
                .unwrap_or(DEFAULT_MAX_CHARGE_VOLTAGE_MV),
            max_input_current_ma: config
                .max_input_current_ma
                .unwrap_or(DEFAULT_MAX_INPUT_CURRENT_MA),
            max_charge_current_ma: config
                .max_charge_current_ma
                .unwrap_or(DEFAULT_MAX_CHARGE_CURRENT_MA),
            max_soc_offset: config.max_soc_offset.unwrap_or(DEFAULT_MAX_SOC_OFFSET),
            series_resistance_mohm: config
                .series_resistance_mohm
                .unwrap_or(DEFAULT_SERIES_RESISTANCE_MOHM),
            virtual_power: config.virtual_power.unwrap_or(false),
            dc_detect: config.dc_detect.unwrap_or(DcDetectMethod::None),
            finish_ramp_current_ma,
            screen_on_voltage_mv: config
                .screen_on_voltage_mv
                .unwrap_or(DEFAULT_SCREEN_ON_VOLTAGE_MV),
            charge_in_boot: config.charge_in_boot.unwrap_or(true),
        })
    }

    /// Clamps a persisted FCC into `design..=qmax`.
    ///
    /// Values under [`MIN_FCC_MAH`] are treated as unset and replaced with the
    /// design capacity.
    #[must_use]
    pub fn bound_fcc(&self, raw: i32) -> i32 {
        if raw < MIN_FCC_MAH {
            self.design_capacity_mah
        } else {
            raw.clamp(self.design_capacity_mah, self.design_qmax_mah)
        }
    }

    /// Switches the profile to virtual power; used when no pack is fitted.
    pub fn force_virtual_power(&mut self) {
        self.virtual_power = true;
    }

    pub fn ocv(&self) -> &OcvTable {
        &self.ocv
    }

    #[must_use]
    pub const fn design_capacity_mah(&self) -> i32 {
        self.design_capacity_mah
    }

    #[must_use]
    pub const fn design_qmax_mah(&self) -> i32 {
        self.design_qmax_mah
    }

    #[must_use]
    pub const fn max_charge_voltage_mv(&self) -> i32 {
        self.max_charge_voltage_mv
    }

    #[must_use]
    pub const fn max_input_current_ma(&self) -> i32 {
        self.max_input_current_ma
    }

    #[must_use]
    pub const fn max_charge_current_ma(&self) -> i32 {
        self.max_charge_current_ma
    }

    #[must_use]
    pub const fn max_soc_offset(&self) -> i32 {
        self.max_soc_offset
    }

    #[must_use]
    pub const fn series_resistance_mohm(&self) -> i32 {
        self.series_resistance_mohm
    }

    #[must_use]
    pub const fn virtual_power(&self) -> bool {
        self.virtual_power
    }

    #[must_use]
    pub const fn dc_detect(&self) -> DcDetectMethod {
        self.dc_detect
    }

    #[must_use]
    pub const fn finish_ramp_current_ma(&self) -> i32 {
        self.finish_ramp_current_ma
    }

    #[must_use]
    pub const fn screen_on_voltage_mv(&self) -> i32 {
        self.screen_on_voltage_mv
    }

    #[must_use]
    pub const fn charge_in_boot(&self) -> bool {
        self.charge_in_boot
    }
}

fn positive(value: i32, field: &'static str) -> Result<i32, ProfileError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ProfileError::NonPositive(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [u16; 7] = [3600, 3700, 3800, 3900, 4000, 4100, 4200];

    fn config() -> ProfileConfig<'static> {
        ProfileConfig {
            ocv_table: Some(&TABLE),
            design_capacity_mah: Some(4000),
            design_qmax_mah: Some(4400),
            ..ProfileConfig::default()
        }
    }

    #[test]
    fn fills_defaults_for_optional_fields() {
        let profile = BatteryProfile::from_config(&config()).unwrap();
        assert_eq!(profile.max_charge_voltage_mv(), 4200);
        assert_eq!(profile.max_input_current_ma(), 2000);
        assert_eq!(profile.max_charge_current_ma(), 1200);
        assert_eq!(profile.max_soc_offset(), 70);
        assert_eq!(profile.series_resistance_mohm(), 135);
        assert!(!profile.virtual_power());
        assert_eq!(profile.dc_detect(), DcDetectMethod::None);
        assert_eq!(profile.finish_ramp_current_ma(), 1500);
        assert!(profile.charge_in_boot());
    }

    #[test]
    fn required_fields_are_reported() {
        let mut missing = config();
        missing.ocv_table = None;
        assert_eq!(
            BatteryProfile::from_config(&missing),
            Err(ProfileError::MissingOcvTable)
        );

        let mut missing = config();
        missing.design_capacity_mah = None;
        assert_eq!(
            BatteryProfile::from_config(&missing),
            Err(ProfileError::MissingDesignCapacity)
        );

        let mut missing = config();
        missing.design_qmax_mah = None;
        assert_eq!(
            BatteryProfile::from_config(&missing),
            Err(ProfileError::MissingQmax)
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        let mut bad = config();
        bad.ocv_table = Some(&[3600, 3600]);
        assert_eq!(
            BatteryProfile::from_config(&bad),
            Err(ProfileError::OcvTable(OcvTableError::NotIncreasing {
                index: 1
            }))
        );

        let mut bad = config();
        bad.design_qmax_mah = Some(3000);
        assert_eq!(
            BatteryProfile::from_config(&bad),
            Err(ProfileError::QmaxBelowDesign {
                design: 4000,
                qmax: 3000
            })
        );

        let mut bad = config();
        bad.design_capacity_mah = Some(0);
        assert!(matches!(
            BatteryProfile::from_config(&bad),
            Err(ProfileError::NonPositive(_))
        ));
    }

    #[test]
    fn fcc_is_bounded_by_design_and_qmax() {
        let profile = BatteryProfile::from_config(&config()).unwrap();
        assert_eq!(profile.bound_fcc(0), 4000);
        assert_eq!(profile.bound_fcc(499), 4000);
        assert_eq!(profile.bound_fcc(3500), 4000);
        assert_eq!(profile.bound_fcc(4200), 4200);
        assert_eq!(profile.bound_fcc(9000), 4400);
    }
}

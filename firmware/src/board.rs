//! Battery and charger description for the board.

use gauge_core::ProfileConfig;
use gauge_core::profile::DcDetectMethod;

/// Pack open-circuit voltage in millivolts at 0, 5, .., 100 % charge.
pub const OCV_TABLE_MV: [u16; 21] = [
    3400, 3599, 3671, 3701, 3728, 3746, 3762, 3772, 3781, 3792, 3816, 3836, 3866, 3910, 3942,
    3977, 4016, 4060, 4112, 4165, 4216,
];

/// ADC1 channel wired to the DC-jack divider.
pub const DC_DETECT_ADC_CHANNEL: u8 = 0;

pub const fn profile_config() -> ProfileConfig<'static> {
    ProfileConfig {
        ocv_table: Some(&OCV_TABLE_MV),
        design_capacity_mah: Some(4000),
        design_qmax_mah: Some(4200),
        max_charge_voltage_mv: Some(4200),
        max_input_current_ma: Some(2000),
        max_charge_current_ma: Some(1800),
        max_soc_offset: Some(60),
        series_resistance_mohm: Some(120),
        virtual_power: Some(false),
        dc_detect: Some(DcDetectMethod::Gpio { active_high: false }),
        finish_ramp_current_ma: None,
        screen_on_voltage_mv: None,
        charge_in_boot: Some(true),
    }
}

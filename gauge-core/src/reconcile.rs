//! Power-on reconciliation.
//!
//! Decides how the runtime estimate is seeded at boot from the persisted
//! state, the coulomb counter, and the OCV reading. [`decide`] is pure; the
//! register reads that feed it and the writes that apply it live in the gauge.

use crate::fixed::{clamp_percent, soc_from_capacity};
use crate::profile::BatteryProfile;

/// Off time after which the OCV reading is trusted.
pub const OCV_REST_MINUTES: u8 = 30;

/// Capacity drift, as a divisor of FCC, that marks an unclean halt.
pub const HALT_DRIFT_DIVISOR: i32 = 20;

/// Branch taken by the reconciler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerOnPath {
    FirstBoot,
    SoftwareReset,
    HaltRecovery,
    OcvResync,
    Resume,
}

impl PowerOnPath {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PowerOnPath::FirstBoot => "first-boot",
            PowerOnPath::SoftwareReset => "software-reset",
            PowerOnPath::HaltRecovery => "halt-recovery",
            PowerOnPath::OcvResync => "ocv-resync",
            PowerOnPath::Resume => "resume",
        }
    }
}

/// Everything read from the PMIC before deciding.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PowerOnSnapshot {
    /// Battery-connect flag (already consumed).
    pub first_boot: bool,
    /// Software reset request (already consumed).
    pub reset_requested: bool,
    pub off_minutes: u8,
    /// Bounded FCC from the persisted register.
    pub fcc: i32,
    pub persisted_dsoc: i32,
    pub persisted_cap: i32,
    pub coulomb_cap: i32,
    pub ocv_mv: i32,
}

/// Seed values chosen by [`decide`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Reconciliation {
    pub path: PowerOnPath,
    pub fcc: i32,
    pub dsoc: i32,
    /// Capacity to load into the coulomb counter.
    pub remain_cap: i32,
    /// OCV-derived SOC, when the OCV was consulted.
    pub ocv_soc: Option<i32>,
    pub max_offset_triggered: bool,
}

/// `true` when the pending reset request should be honoured.
#[must_use]
pub const fn reset_due(reset_now: bool, reset_late: bool, off_minutes: u8) -> bool {
    reset_now || (reset_late && off_minutes >= OCV_REST_MINUTES)
}

/// Chooses the reconciliation branch and its seed values.
#[must_use]
pub fn decide(snapshot: &PowerOnSnapshot, profile: &BatteryProfile) -> Reconciliation {
    let ocv = profile.ocv();

    if snapshot.first_boot || snapshot.reset_requested {
        let fcc = profile.design_capacity_mah();
        let soc = ocv.soc_at(snapshot.ocv_mv);
        return Reconciliation {
            path: if snapshot.first_boot {
                PowerOnPath::FirstBoot
            } else {
                PowerOnPath::SoftwareReset
            },
            fcc,
            dsoc: clamp_percent(soc),
            remain_cap: ocv.capacity_at(snapshot.ocv_mv, fcc),
            ocv_soc: Some(soc),
            max_offset_triggered: false,
        };
    }

    let fcc = snapshot.fcc;
    let persisted_dsoc = clamp_percent(snapshot.persisted_dsoc);

    if halted(snapshot.persisted_cap, snapshot.coulomb_cap, fcc) {
        let remain_cap = snapshot.coulomb_cap.max(0);
        return Reconciliation {
            path: PowerOnPath::HaltRecovery,
            fcc,
            dsoc: clamp_percent(soc_from_capacity(remain_cap, fcc)),
            remain_cap,
            ocv_soc: None,
            max_offset_triggered: false,
        };
    }

    if snapshot.off_minutes >= OCV_REST_MINUTES {
        let ocv_soc = ocv.soc_at(snapshot.ocv_mv);
        let triggered = (ocv_soc - persisted_dsoc).abs() > profile.max_soc_offset();
        return Reconciliation {
            path: PowerOnPath::OcvResync,
            fcc,
            dsoc: if triggered {
                clamp_percent(ocv_soc)
            } else {
                persisted_dsoc
            },
            remain_cap: ocv.capacity_at(snapshot.ocv_mv, fcc),
            ocv_soc: Some(ocv_soc),
            max_offset_triggered: triggered,
        };
    }

    Reconciliation {
        path: PowerOnPath::Resume,
        fcc,
        dsoc: persisted_dsoc,
        remain_cap: snapshot.coulomb_cap.max(0),
        ocv_soc: None,
        max_offset_triggered: false,
    }
}

/// `true` when the live counter drifted more than 5 % of FCC from the
/// persisted capacity.
#[must_use]
pub const fn halted(persisted_cap: i32, coulomb_cap: i32, fcc: i32) -> bool {
    (coulomb_cap - persisted_cap).abs() > fcc / HALT_DRIFT_DIVISOR
}

/// What start-up did, kept for diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerOnReport {
    pub path: PowerOnPath,
    pub off_minutes: u8,
    pub persisted_dsoc: i32,
    pub persisted_cap: i32,
    pub coulomb_cap: i32,
    pub ocv_mv: i32,
    pub dsoc: i32,
    pub remain_cap: i32,
    pub halt_count: u8,
    pub max_offset_triggered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileConfig;

    const TABLE: [u16; 7] = [3600, 3700, 3800, 3900, 4000, 4100, 4200];

    fn profile() -> BatteryProfile {
        BatteryProfile::from_config(&ProfileConfig {
            ocv_table: Some(&TABLE),
            design_capacity_mah: Some(4000),
            design_qmax_mah: Some(4400),
            ..ProfileConfig::default()
        })
        .unwrap()
    }

    fn resume_snapshot() -> PowerOnSnapshot {
        PowerOnSnapshot {
            fcc: 4000,
            persisted_dsoc: 40,
            persisted_cap: 1600,
            coulomb_cap: 1620,
            ocv_mv: 3900,
            ..PowerOnSnapshot::default()
        }
    }

    #[test]
    fn first_boot_seeds_from_ocv_with_design_capacity() {
        let snapshot = PowerOnSnapshot {
            first_boot: true,
            fcc: 4400,
            ..resume_snapshot()
        };
        let decision = decide(&snapshot, &profile());

        assert_eq!(decision.path, PowerOnPath::FirstBoot);
        assert_eq!(decision.fcc, 4000);
        assert_eq!(decision.dsoc, 50);
        assert_eq!(decision.remain_cap, 1992);
    }

    #[test]
    fn reset_request_behaves_like_first_boot() {
        let snapshot = PowerOnSnapshot {
            reset_requested: true,
            ..resume_snapshot()
        };
        let decision = decide(&snapshot, &profile());
        assert_eq!(decision.path, PowerOnPath::SoftwareReset);
        assert_eq!(decision.dsoc, 50);
    }

    #[test]
    fn reset_late_waits_for_rest() {
        assert!(reset_due(true, false, 0));
        assert!(!reset_due(false, true, 29));
        assert!(reset_due(false, true, 30));
        assert!(!reset_due(false, false, 200));
    }

    #[test]
    fn drift_beyond_five_percent_is_a_halt() {
        let snapshot = PowerOnSnapshot {
            persisted_cap: 2000,
            coulomb_cap: 1500,
            off_minutes: 45,
            ..resume_snapshot()
        };
        let decision = decide(&snapshot, &profile());

        assert_eq!(decision.path, PowerOnPath::HaltRecovery);
        assert_eq!(decision.remain_cap, 1500);
        assert_eq!(decision.dsoc, 38);
        assert!(!halted(2000, 1800, 4000));
        assert!(halted(2000, 1799, 4000));
    }

    #[test]
    fn negative_counter_reseeds_at_empty() {
        let snapshot = PowerOnSnapshot {
            persisted_cap: 300,
            coulomb_cap: -50,
            ..resume_snapshot()
        };
        let decision = decide(&snapshot, &profile());
        assert_eq!(decision.path, PowerOnPath::HaltRecovery);
        assert_eq!(decision.remain_cap, 0);
        assert_eq!(decision.dsoc, 0);
    }

    #[test]
    fn long_rest_rebases_capacity_but_keeps_dsoc_within_offset() {
        let snapshot = PowerOnSnapshot {
            off_minutes: 45,
            ocv_mv: 4052,
            ..resume_snapshot()
        };
        let decision = decide(&snapshot, &profile());

        assert_eq!(decision.path, PowerOnPath::OcvResync);
        assert_eq!(decision.ocv_soc, Some(75));
        assert_eq!(decision.dsoc, 40);
        assert_eq!(decision.remain_cap, 3000);
        assert!(!decision.max_offset_triggered);
    }

    #[test]
    fn long_rest_snaps_dsoc_beyond_offset() {
        let snapshot = PowerOnSnapshot {
            off_minutes: 45,
            persisted_dsoc: 5,
            persisted_cap: 200,
            coulomb_cap: 200,
            ocv_mv: 4200,
            ..resume_snapshot()
        };
        let decision = decide(&snapshot, &profile());

        assert_eq!(decision.path, PowerOnPath::OcvResync);
        assert!(decision.max_offset_triggered);
        assert_eq!(decision.dsoc, 100);
    }

    #[test]
    fn offset_equal_to_limit_keeps_persisted_dsoc() {
        let limited = |offset| {
            BatteryProfile::from_config(&ProfileConfig {
                ocv_table: Some(&TABLE),
                design_capacity_mah: Some(4000),
                design_qmax_mah: Some(4400),
                max_soc_offset: Some(offset),
                ..ProfileConfig::default()
            })
            .unwrap()
        };
        let snapshot = PowerOnSnapshot {
            off_minutes: 45,
            ocv_mv: 4052,
            ..resume_snapshot()
        };

        // OCV reads 75 %, persisted 40 %: a gap of exactly 35 points.
        let at_limit = decide(&snapshot, &limited(35));
        assert_eq!(at_limit.ocv_soc, Some(75));
        assert!(!at_limit.max_offset_triggered);
        assert_eq!(at_limit.dsoc, 40);

        let past_limit = decide(&snapshot, &limited(34));
        assert!(past_limit.max_offset_triggered);
        assert_eq!(past_limit.dsoc, 75);
    }

    #[test]
    fn short_rest_resumes_with_live_counter() {
        let decision = decide(&resume_snapshot(), &profile());
        assert_eq!(decision.path, PowerOnPath::Resume);
        assert_eq!(decision.dsoc, 40);
        assert_eq!(decision.remain_cap, 1620);
    }

    #[test]
    fn garbage_persisted_soc_is_clamped() {
        let snapshot = PowerOnSnapshot {
            persisted_dsoc: 255,
            ..resume_snapshot()
        };
        assert_eq!(decide(&snapshot, &profile()).dsoc, 100);
    }
}

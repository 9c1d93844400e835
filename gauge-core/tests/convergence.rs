mod support;

use gauge_core::converge::PARITY_RATE;
use gauge_core::registers::{ChargeStatus, Flag, addr};
use gauge_core::{BatteryProfile, GaugeEvent, ProfileConfig};

use support::{config, profile, resumed, secs, started};

#[test]
fn charging_pulls_lagging_soc_up_without_overshoot() {
    let mut gauge = started(resumed(40, 2000, 2000), profile());
    assert_eq!(gauge.estimate().rsoc, 50);
    gauge.update(secs(0));

    let mut previous = gauge.estimate().dsoc;
    let mut met = false;
    for tick in 1..=120 {
        gauge.bus_mut().accumulate(20);
        gauge.update(secs(tick * 5));

        let estimate = *gauge.estimate();
        assert!(estimate.dsoc >= previous, "dsoc fell at tick {tick}");
        assert!(estimate.dsoc <= estimate.rsoc, "overshoot at tick {tick}");
        previous = estimate.dsoc;

        if gauge
            .events()
            .any(|event| matches!(event, GaugeEvent::ConvergenceMet { .. }))
        {
            met = true;
            break;
        }
    }

    assert!(met);
    assert_eq!(gauge.estimate().dsoc, gauge.estimate().rsoc);
    assert_eq!(gauge.diagnostics().convergence.linek(), PARITY_RATE);
}

#[test]
fn unchanged_state_is_persisted_once() {
    let mut gauge = started(resumed(60, 2400, 2400), profile());
    gauge.update(secs(0));
    gauge.bus_mut().clear_write_counts();

    gauge.bus_mut().accumulate(40);
    gauge.update(secs(5));
    gauge.update(secs(10));
    gauge.update(secs(15));

    assert_eq!(gauge.bus().writes_to(addr::REMAIN_CAP), 1);
    assert_eq!(gauge.bus().peek_u32(addr::REMAIN_CAP), 2440);
    assert_eq!(gauge.bus().writes_to(addr::SOC), 1);
    assert_eq!(gauge.bus().peek(addr::SOC), 61);
}

#[test]
fn counter_above_fcc_is_clamped() {
    let mut gauge = started(resumed(97, 3900, 3900), profile());
    gauge.update(secs(0));

    gauge.bus_mut().set_coulomb_capacity(4300);
    gauge.update(secs(5));

    let estimate = *gauge.estimate();
    assert_eq!(estimate.remain_cap, 4000);
    assert!(estimate.rsoc <= 100);
    assert_eq!(gauge.bus().coulomb_capacity(), 4000);
    assert!(
        gauge
            .events()
            .any(|event| *event == GaugeEvent::CounterClamped { excess_mah: 300 })
    );
    assert!(estimate.dsoc <= 100);
}

#[test]
fn termination_ramps_one_point_per_interval() {
    let profile = BatteryProfile::from_config(&ProfileConfig {
        finish_ramp_current_ma: Some(600),
        ..config()
    })
    .unwrap();
    let mut file = resumed(95, 3800, 3800);
    file.set_charge_status(ChargeStatus::Finished);
    let mut gauge = started(file, profile);

    let mut steps = Vec::new();
    for tick in 0..=100 {
        let now = tick * 5;
        gauge.update(secs(now));
        if steps.last().map_or(95, |&(_, soc)| soc) != gauge.estimate().dsoc {
            steps.push((now, gauge.estimate().dsoc));
        }
    }

    assert_eq!(steps, vec![(240, 96), (480, 97)]);
    assert_eq!(gauge.estimate().remain_cap, 4000);
    assert!(
        gauge
            .events()
            .any(|event| matches!(event, GaugeEvent::CalibrationApplied { .. }))
    );
}

#[test]
fn leaving_termination_restarts_the_ramp() {
    let profile = BatteryProfile::from_config(&ProfileConfig {
        finish_ramp_current_ma: Some(600),
        ..config()
    })
    .unwrap();
    let mut file = resumed(95, 4000, 4000);
    file.set_charge_status(ChargeStatus::Finished);
    let mut gauge = started(file, profile);

    for tick in 0..=40 {
        gauge.update(secs(tick * 5));
    }
    gauge.bus_mut().set_charge_status(ChargeStatus::CcCv);
    gauge.update(secs(205));
    gauge.bus_mut().set_charge_status(ChargeStatus::Finished);
    for tick in 42..=88 {
        gauge.update(secs(tick * 5));
    }

    assert_eq!(gauge.estimate().dsoc, 95);
    gauge.update(secs(89 * 5));
    assert_eq!(gauge.estimate().dsoc, 96);
}

#[test]
fn discharge_without_charger_leaves_estimate_alone() {
    let mut file = resumed(70, 2800, 2800);
    file.poke_flag(Flag::PlugIn, false);
    let mut gauge = started(file, profile());

    gauge.update(secs(0));
    gauge.bus_mut().accumulate(-200);
    gauge.update(secs(5));

    assert_eq!(gauge.estimate().dsoc, 70);
    assert_eq!(gauge.bus().writes_to(addr::SOC), 0);
}

//! Gauge event catalog and the fixed-capacity ring that stores it.
//!
//! The core never prints. Every decision worth surfacing (reconciliation
//! branches, charger changes, calibration results, ramp steps, faults) is
//! recorded here with a monotonically increasing id and the caller-supplied
//! uptime. Firmware drains the ring into defmt, the emulator prints it on
//! demand.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::charger::{ChargerType, SenseError};

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Number of events retained in memory.
pub const EVENT_RING_CAPACITY: usize = 48;

/// Everything the gauge reports about its own behaviour.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GaugeEvent {
    /// Battery connected for the first time; SOC seeded from OCV.
    FirstPowerOn { soc: i32, capacity_mah: i32 },
    /// Software reset request honoured; SOC reseeded from OCV.
    SoftwareReset { soc: i32, capacity_mah: i32 },
    /// Previous session ended without persisting its capacity.
    Halt {
        persisted_mah: i32,
        coulomb_mah: i32,
        halt_count: u8,
    },
    /// Capacity rebased to OCV after a long rest.
    OcvResync { ocv_soc: i32, capacity_mah: i32 },
    /// OCV disagreed with the persisted SOC by more than the allowed offset.
    MaxSocOffset { from: i32, to: i32 },
    /// Start-up skipped reconciliation and kept the persisted state.
    ReconcileSkipped { estimated_mv: i32 },
    /// Session marked initialized.
    Initialized { soc: i32, charger: ChargerType },
    /// No pack detected; status is synthesized.
    VirtualPower,
    ChargerChanged { from: ChargerType, to: ChargerType },
    /// Voltage sampling switched from instant to averaged.
    VoltageAveraging,
    CalibrationApplied { poffset: i32, attempts: u8 },
    CalibrationPending,
    /// Finish ramp raised the displayed SOC by one point.
    FinishStep { soc: i32 },
    /// Displayed SOC met the coulomb SOC; rate back to parity.
    ConvergenceMet { soc: i32 },
    /// Coulomb counter exceeded FCC and was pulled back.
    CounterClamped { excess_mah: i32 },
    BusFault,
    SenseFault(SenseError),
}

impl fmt::Display for GaugeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaugeEvent::FirstPowerOn { soc, capacity_mah } => {
                write!(f, "first-power-on soc={soc} cap={capacity_mah}mAh")
            }
            GaugeEvent::SoftwareReset { soc, capacity_mah } => {
                write!(f, "software-reset soc={soc} cap={capacity_mah}mAh")
            }
            GaugeEvent::Halt {
                persisted_mah,
                coulomb_mah,
                halt_count,
            } => write!(
                f,
                "halt pre={persisted_mah}mAh now={coulomb_mah}mAh count={halt_count}"
            ),
            GaugeEvent::OcvResync {
                ocv_soc,
                capacity_mah,
            } => write!(f, "ocv-resync soc={ocv_soc} cap={capacity_mah}mAh"),
            GaugeEvent::MaxSocOffset { from, to } => write!(f, "max-soc-offset {from} -> {to}"),
            GaugeEvent::ReconcileSkipped { estimated_mv } => {
                write!(f, "reconcile-skipped est={estimated_mv}mV")
            }
            GaugeEvent::Initialized { soc, charger } => {
                write!(f, "initialized soc={soc} charger={charger}")
            }
            GaugeEvent::VirtualPower => f.write_str("virtual-power"),
            GaugeEvent::ChargerChanged { from, to } => write!(f, "charger {from} -> {to}"),
            GaugeEvent::VoltageAveraging => f.write_str("voltage-averaging"),
            GaugeEvent::CalibrationApplied { poffset, attempts } => {
                write!(f, "calibration poffset={poffset} attempts={attempts}")
            }
            GaugeEvent::CalibrationPending => f.write_str("calibration-pending"),
            GaugeEvent::FinishStep { soc } => write!(f, "finish-step soc={soc}"),
            GaugeEvent::ConvergenceMet { soc } => write!(f, "convergence-met soc={soc}"),
            GaugeEvent::CounterClamped { excess_mah } => {
                write!(f, "counter-clamped excess={excess_mah}mAh")
            }
            GaugeEvent::BusFault => f.write_str("bus-fault"),
            GaugeEvent::SenseFault(error) => write!(f, "sense-fault {error}"),
        }
    }
}

impl GaugeEvent {
    /// `true` for events that indicate degraded operation.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(
            self,
            GaugeEvent::BusFault | GaugeEvent::SenseFault(_) | GaugeEvent::Halt { .. }
        )
    }
}

/// Event stored in the ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    pub uptime: Duration,
    pub event: GaugeEvent,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} t={}.{:03}s {}",
            self.id,
            self.uptime.as_secs(),
            self.uptime.subsec_millis(),
            self.event
        )
    }
}

/// Records gauge events into a fixed-size ring buffer.
pub struct EventLog<const CAPACITY: usize = EVENT_RING_CAPACITY> {
    ring: HistoryBuf<EventRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> EventLog<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends `event`, evicting the oldest record when full.
    pub fn record(&mut self, event: GaugeEvent, uptime: Duration) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(EventRecord { id, uptime, event });
        id
    }

    /// Records in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, EventRecord> {
        self.ring.oldest_ordered()
    }

    /// Records newer than `last_seen`, oldest first.
    pub fn since(&self, last_seen: Option<EventId>) -> impl Iterator<Item = &EventRecord> {
        self.ring
            .oldest_ordered()
            .filter(move |record| last_seen.is_none_or(|seen| record.id > seen))
    }

    pub fn latest(&self) -> Option<&EventRecord> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// `true` when any retained record matches `predicate`.
    pub fn any(&self, predicate: impl Fn(&GaugeEvent) -> bool) -> bool {
        self.ring.oldest_ordered().any(|record| predicate(&record.event))
    }

    /// Owned copy of the retained records, oldest first.
    #[cfg(feature = "alloc")]
    #[must_use]
    pub fn to_vec(&self) -> alloc::vec::Vec<EventRecord> {
        self.ring.oldest_ordered().copied().collect()
    }
}

impl<const CAPACITY: usize> Default for EventLog<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

//! Gauge event forwarding.
//!
//! The core keeps its diagnostics in a fixed-capacity ring. [`EventDrain`]
//! remembers the last id it forwarded and mirrors newer records to defmt on
//! target and stdout on host builds.

use gauge_core::events::EventId;
use gauge_core::{EventLog, EventRecord};

/// Cursor over the gauge event ring.
#[derive(Debug, Default)]
pub struct EventDrain {
    last_seen: Option<EventId>,
}

impl EventDrain {
    pub const fn new() -> Self {
        Self { last_seen: None }
    }

    /// Emits every record newer than the cursor and returns how many were
    /// forwarded.
    pub fn drain(&mut self, log: &EventLog) -> usize {
        let mut forwarded = 0;
        for record in log.since(self.last_seen) {
            emit_record(record);
            self.last_seen = Some(record.id);
            forwarded += 1;
        }
        forwarded
    }

    pub const fn last_seen(&self) -> Option<EventId> {
        self.last_seen
    }
}

#[cfg(target_os = "none")]
fn emit_record(record: &EventRecord) {
    let uptime_ms = record.uptime.as_millis() as u64;
    if record.event.is_fault() {
        defmt::warn!(
            "gauge#{} t={}ms {}",
            record.id,
            uptime_ms,
            defmt::Display2Format(&record.event)
        );
    } else {
        defmt::info!(
            "gauge#{} t={}ms {}",
            record.id,
            uptime_ms,
            defmt::Display2Format(&record.event)
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_record(record: &EventRecord) {
    println!("gauge {record}");
}

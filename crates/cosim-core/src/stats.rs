//! Saturating run counters reported at termination.

use std::fmt;

use crate::DivergenceClass;

/// Counters accumulated over one co-simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CosimStats {
    /// Reference events produced.
    pub events_stepped: u64,
    /// Fetch traps absorbed by the event source.
    pub fetch_traps: u64,
    /// Hardware retirements matched to an event.
    pub commits: u64,
    /// Trap-flagged events committed alongside a trap successor.
    pub trap_coalesces: u64,
    /// Events popped from the queue.
    pub pops: u64,
    /// Register writes compared against the reference.
    pub register_checks: u64,
    /// Multi-cycle results matched on the long-latency port.
    pub multi_cycle_matches: u64,
    /// Instruction-cache line refills answered from memory.
    pub fetch_refills: u64,
    /// Line acquires answered from event snapshots.
    pub acquires: u64,
    /// Releases acknowledged.
    pub releases: u64,
    /// Single-word reads answered.
    pub gets: u64,
    /// Single-word writes checked.
    pub puts: u64,
    /// Beats handed to the hardware.
    pub beats_sent: u64,
    /// Memory-class divergences.
    pub divergences_memory: u64,
    /// Register-class divergences.
    pub divergences_register: u64,
    /// Retirement-class divergences.
    pub divergences_retirement: u64,
    /// Protocol-class divergences.
    pub divergences_protocol: u64,
    /// Reference-class divergences.
    pub divergences_reference: u64,
}

macro_rules! counter {
    ($name:ident, $field:ident, $doc:literal) => {
        #[doc = $doc]
        pub fn $name(&mut self) {
            self.$field = self.$field.saturating_add(1);
        }
    };
}

impl CosimStats {
    counter!(record_event, events_stepped, "Counts a produced event.");
    counter!(record_fetch_trap, fetch_traps, "Counts an absorbed fetch trap.");
    counter!(record_commit, commits, "Counts a matched retirement.");
    counter!(record_register_check, register_checks, "Counts a compared register write.");
    counter!(record_multi_cycle_match, multi_cycle_matches, "Counts a resolved multi-cycle match.");
    counter!(record_fetch_refill, fetch_refills, "Counts a fetch-bank fill.");
    counter!(record_acquire, acquires, "Counts an acquire-bank fill.");
    counter!(record_release, releases, "Counts a release acknowledgement.");
    counter!(record_get, gets, "Counts a single-word read.");
    counter!(record_put, puts, "Counts a single-word write.");
    counter!(record_beat, beats_sent, "Counts a consumed response beat.");

    /// Counts trap-flagged events committed in one coalesced commit.
    pub fn record_trap_coalesce(&mut self, count: usize) {
        self.trap_coalesces = self.trap_coalesces.saturating_add(count as u64);
    }

    /// Counts popped events.
    pub fn record_pops(&mut self, count: usize) {
        self.pops = self.pops.saturating_add(count as u64);
    }

    /// Counts a divergence under its class.
    pub fn record_divergence(&mut self, class: DivergenceClass) {
        let counter = match class {
            DivergenceClass::Memory => &mut self.divergences_memory,
            DivergenceClass::Register => &mut self.divergences_register,
            DivergenceClass::Retirement => &mut self.divergences_retirement,
            DivergenceClass::Protocol => &mut self.divergences_protocol,
            DivergenceClass::Reference => &mut self.divergences_reference,
        };
        *counter = counter.saturating_add(1);
    }

    /// Total divergences over all classes.
    #[must_use]
    pub const fn divergences(&self) -> u64 {
        self.divergences_memory
            + self.divergences_register
            + self.divergences_retirement
            + self.divergences_protocol
            + self.divergences_reference
    }
}

impl fmt::Display for CosimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events={} fetch_traps={} commits={} trap_coalesces={} pops={} reg_checks={} \
             multi_cycle={} refills={} acquires={} releases={} gets={} puts={} beats={} \
             divergences={}",
            self.events_stepped,
            self.fetch_traps,
            self.commits,
            self.trap_coalesces,
            self.pops,
            self.register_checks,
            self.multi_cycle_matches,
            self.fetch_refills,
            self.acquires,
            self.releases,
            self.gets,
            self.puts,
            self.beats_sent,
            self.divergences()
        )
    }
}

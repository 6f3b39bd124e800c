//! Matching hardware write-back against queued reference events.

use log::{info, warn};

use crate::isa::is_csr;
use crate::{CosimConfig, CosimStats, Divergence, LookaheadQueue};

/// Write-back signals sampled in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[allow(clippy::struct_excessive_bools)]
pub struct CommitSignal {
    /// Register file write enable.
    pub rf_wen: bool,
    /// An instruction retires this cycle.
    pub wb_valid: bool,
    /// Destination register.
    pub rf_waddr: u8,
    /// Value written.
    pub wdata: u64,
    /// Retiring pc.
    pub pc: u64,
    /// Retiring instruction bits.
    pub insn: u32,
    /// Long-latency write-back port is active instead of normal retirement.
    pub ll_wen: bool,
}

impl CommitSignal {
    /// Joins the two 32-bit write-data halves the hardware exposes.
    #[must_use]
    pub const fn wdata_from_halves(high: u32, low: u32) -> u64 {
        ((high as u64) << 32) | low as u64
    }
}

/// Multi-cycle result expected on the long-latency port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingMatch {
    /// Destination register.
    pub reg: u8,
    /// Expected value under the register mask.
    pub value: u64,
    /// Pc of the multi-cycle instruction.
    pub pc: u64,
}

/// What one `commit` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing retired this cycle.
    Idle,
    /// Long-latency write-back observed.
    SideChannel {
        /// It resolved the pending multi-cycle match.
        resolved: bool,
    },
    /// The retiring instruction was matched and committed.
    Committed {
        /// Retiring pc.
        pc: u64,
        /// Trap-flagged events committed alongside it.
        coalesced: usize,
        /// Events popped from the queue afterwards.
        popped: usize,
    },
    /// Retirement without a queued event, tolerated in lenient mode.
    Unmatched {
        /// Retiring pc.
        pc: u64,
    },
    /// The pass address retired.
    Passed {
        /// Retiring pc.
        pc: u64,
    },
}

/// Per-cycle retirement checker; holds the single pending multi-cycle match.
#[derive(Debug, Clone)]
pub struct CommitMatcher {
    pending: Option<PendingMatch>,
    pass_address: u64,
    trap_successor_pc: u64,
    xlen_mask: u64,
    strict_retirement: bool,
}

impl CommitMatcher {
    /// Creates a matcher with no pending match.
    #[must_use]
    pub const fn new(config: &CosimConfig) -> Self {
        Self {
            pending: None,
            pass_address: config.pass_address,
            trap_successor_pc: config.trap_successor_pc,
            xlen_mask: config.xlen_mask(),
            strict_retirement: config.strict_retirement,
        }
    }

    /// Multi-cycle result still awaited on the long-latency port.
    #[must_use]
    pub const fn pending(&self) -> Option<&PendingMatch> {
        self.pending.as_ref()
    }

    /// Checks one cycle of write-back signals.
    ///
    /// # Errors
    ///
    /// Returns [`Divergence::UnmatchedRegisterWrite`] or
    /// [`Divergence::RegisterWriteMismatch`] when the register write disagrees
    /// with the queue, and [`Divergence::UnmatchedRetirement`] when strict
    /// retirement is enabled and no queued event has the retiring pc.
    pub fn commit(
        &mut self,
        signal: &CommitSignal,
        queue: &mut LookaheadQueue,
        stats: &mut CosimStats,
    ) -> Result<CommitOutcome, Divergence> {
        if signal.ll_wen {
            return Ok(CommitOutcome::SideChannel {
                resolved: self.resolve_pending(signal, stats),
            });
        }
        if !signal.wb_valid {
            return Ok(CommitOutcome::Idle);
        }

        let pc = signal.pc;
        info!("RTL write back insn {pc:08X}");
        if pc == self.pass_address {
            return Ok(CommitOutcome::Passed { pc });
        }

        if signal.rf_wen && signal.rf_waddr != 0 {
            self.check_register_write(signal, queue, stats)?;
        }

        let Some(event) = queue.find_by_pc(pc) else {
            if self.strict_retirement {
                queue.dump();
                return Err(Divergence::UnmatchedRetirement { pc });
            }
            warn!("RTL wb without reference event in pc = {pc:08X}");
            return Ok(CommitOutcome::Unmatched { pc });
        };
        event.is_committed = true;
        let coalesce = event.is_trap || event.pc == self.trap_successor_pc;
        info!("set reference {pc:08X} as committed");
        stats.record_commit();

        let coalesced = if coalesce { queue.commit_traps() } else { 0 };
        if coalesced > 0 {
            info!("committed {coalesced} trapped event(s) with pc = {pc:08X}");
            stats.record_trap_coalesce(coalesced);
        }

        let popped = queue.pop_committed().len();
        stats.record_pops(popped);
        Ok(CommitOutcome::Committed {
            pc,
            coalesced,
            popped,
        })
    }

    fn resolve_pending(&mut self, signal: &CommitSignal, stats: &mut CosimStats) -> bool {
        match self.pending {
            Some(pending) if pending.reg == signal.rf_waddr && pending.value == signal.wdata => {
                info!("match multi-cycle insn pc = {:08x}", pending.pc);
                self.pending = None;
                stats.record_multi_cycle_match();
                true
            }
            Some(pending) => {
                warn!(
                    "long-latency write Reg({})={:#x} does not match pending pc={:08X} Reg({})={:#x}",
                    signal.rf_waddr, signal.wdata, pending.pc, pending.reg, pending.value
                );
                false
            }
            None => {
                warn!(
                    "long-latency write Reg({})={:#x} without a pending multi-cycle insn",
                    signal.rf_waddr, signal.wdata
                );
                false
            }
        }
    }

    fn check_register_write(
        &mut self,
        signal: &CommitSignal,
        queue: &mut LookaheadQueue,
        stats: &mut CosimStats,
    ) -> Result<(), Divergence> {
        let (pc, reg, wdata) = (signal.pc, signal.rf_waddr, signal.wdata);
        if is_csr(signal.insn) {
            info!("RTL csr insn write reg({reg}) = {wdata:08X}, pc = {pc:08X}");
            return Ok(());
        }
        info!("RTL write reg({reg}) = {wdata:08X}, pc = {pc:08X}");

        let Some(event) = queue.find_uncommitted_write(pc, reg) else {
            queue.dump();
            return Err(Divergence::UnmatchedRegisterWrite { pc, reg });
        };
        let expected = event.rd_new & self.xlen_mask;

        if event.is_store {
            info!("found store insn at pc = {pc:08X}");
        } else if event.is_multi_cycle {
            if let Some(stale) = self.pending {
                warn!("replacing unresolved multi-cycle match at pc = {:08X}", stale.pc);
            }
            self.pending = Some(PendingMatch {
                reg: event.rd,
                value: expected,
                pc,
            });
            info!("found multi-cycle insn pc = {pc:08X}");
        } else {
            stats.record_register_check();
            if wdata != expected {
                return Err(Divergence::RegisterWriteMismatch {
                    pc,
                    reg,
                    expected,
                    actual: wdata,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CommitMatcher, CommitOutcome, CommitSignal, PendingMatch};
    use crate::{CosimConfig, CosimStats, Divergence, LookaheadQueue, ReferenceEvent, Xlen};

    const ADDI_X5: u32 = 0x02A0_0293;
    const MUL_X7: u32 = 0x0262_83B3;
    const CSRR_X6: u32 = 0x3010_2373;

    fn retire(pc: u64, insn: u32, reg: u8, wdata: u64) -> CommitSignal {
        CommitSignal {
            rf_wen: reg != 0,
            wb_valid: true,
            rf_waddr: reg,
            wdata,
            pc,
            insn,
            ll_wen: false,
        }
    }

    fn queue_with(events: Vec<ReferenceEvent>) -> LookaheadQueue {
        let mut queue = LookaheadQueue::new(10, 2);
        for event in events {
            queue.push(event).expect("room");
        }
        queue
    }

    #[test]
    fn matching_register_write_commits_and_pops() {
        let mut matcher = CommitMatcher::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1004, ADDI_X5, 5, 0x2A)]);
        let mut stats = CosimStats::default();

        let outcome = matcher
            .commit(&retire(0x1004, ADDI_X5, 5, 0x2A), &mut queue, &mut stats)
            .expect("values agree");
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                pc: 0x1004,
                coalesced: 0,
                popped: 1
            }
        );
        assert!(queue.is_empty());
        assert_eq!(stats.register_checks, 1);
    }

    #[test]
    fn mismatching_register_write_reports_both_values() {
        let mut matcher = CommitMatcher::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1004, ADDI_X5, 5, 0x2A)]);

        let error = matcher
            .commit(
                &retire(0x1004, ADDI_X5, 5, 0x2B),
                &mut queue,
                &mut CosimStats::default(),
            )
            .expect_err("values differ");
        assert_eq!(
            error,
            Divergence::RegisterWriteMismatch {
                pc: 0x1004,
                reg: 5,
                expected: 0x2A,
                actual: 0x2B
            }
        );
    }

    #[test]
    fn rv32_compares_under_register_mask() {
        let config = CosimConfig {
            xlen: Xlen::Rv32,
            ..CosimConfig::default()
        };
        let mut matcher = CommitMatcher::new(&config);
        let mut queue = queue_with(vec![ReferenceEvent::new(
            0x1000,
            ADDI_X5,
            5,
            0xFFFF_FFFF_FFFF_FFFF,
        )]);

        matcher
            .commit(
                &retire(0x1000, ADDI_X5, 5, 0xFFFF_FFFF),
                &mut queue,
                &mut CosimStats::default(),
            )
            .expect("sign-extended value matches under the mask");
    }

    #[test]
    fn csr_writes_are_not_compared() {
        let mut matcher = CommitMatcher::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1000, CSRR_X6, 6, 0x1234)]);

        let outcome = matcher
            .commit(
                &retire(0x1000, CSRR_X6, 6, 0x9999),
                &mut queue,
                &mut CosimStats::default(),
            )
            .expect("csr writes are excluded");
        assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    }

    #[test]
    fn multi_cycle_result_resolves_on_long_latency_port() {
        let mut matcher = CommitMatcher::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1000, MUL_X7, 7, 0x64)]);
        let mut stats = CosimStats::default();

        matcher
            .commit(&retire(0x1000, MUL_X7, 7, 0), &mut queue, &mut stats)
            .expect("multi-cycle write is deferred");
        assert_eq!(
            matcher.pending(),
            Some(&PendingMatch {
                reg: 7,
                value: 0x64,
                pc: 0x1000
            })
        );

        let late = CommitSignal {
            ll_wen: true,
            rf_waddr: 7,
            wdata: 0x64,
            ..CommitSignal::default()
        };
        assert_eq!(
            matcher.commit(&late, &mut queue, &mut stats),
            Ok(CommitOutcome::SideChannel { resolved: true })
        );
        assert!(matcher.pending().is_none());
        assert_eq!(stats.multi_cycle_matches, 1);
    }

    #[test]
    fn mismatching_long_latency_write_is_tolerated() {
        let mut matcher = CommitMatcher::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1000, MUL_X7, 7, 0x64)]);
        let mut stats = CosimStats::default();
        matcher
            .commit(&retire(0x1000, MUL_X7, 7, 0), &mut queue, &mut stats)
            .expect("deferred");

        let wrong = CommitSignal {
            ll_wen: true,
            rf_waddr: 7,
            wdata: 0x65,
            ..CommitSignal::default()
        };
        assert_eq!(
            matcher.commit(&wrong, &mut queue, &mut stats),
            Ok(CommitOutcome::SideChannel { resolved: false })
        );
        assert!(matcher.pending().is_some());
    }

    #[test]
    fn register_write_without_event_is_fatal() {
        let mut matcher = CommitMatcher::new(&CosimConfig::default());
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1000, ADDI_X5, 5, 1)]);

        assert_eq!(
            matcher.commit(
                &retire(0x1000, ADDI_X5, 6, 1),
                &mut queue,
                &mut CosimStats::default()
            ),
            Err(Divergence::UnmatchedRegisterWrite { pc: 0x1000, reg: 6 })
        );
    }

    #[test]
    fn unmatched_retirement_is_fatal_only_when_strict() {
        let mut queue = queue_with(vec![ReferenceEvent::new(0x1000, 0x13, 0, 0)]);
        let mut strict = CommitMatcher::new(&CosimConfig::default());
        assert_eq!(
            strict.commit(&retire(0x2000, 0x13, 0, 0), &mut queue, &mut CosimStats::default()),
            Err(Divergence::UnmatchedRetirement { pc: 0x2000 })
        );

        let mut lenient = CommitMatcher::new(&CosimConfig {
            strict_retirement: false,
            ..CosimConfig::default()
        });
        assert_eq!(
            lenient.commit(&retire(0x2000, 0x13, 0, 0), &mut queue, &mut CosimStats::default()),
            Ok(CommitOutcome::Unmatched { pc: 0x2000 })
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pass_address_short_circuits_before_any_check() {
        let mut matcher = CommitMatcher::new(&CosimConfig {
            pass_address: 0x8000_1000,
            ..CosimConfig::default()
        });
        let mut queue = queue_with(vec![]);

        assert_eq!(
            matcher.commit(
                &retire(0x8000_1000, ADDI_X5, 5, 0xDEAD),
                &mut queue,
                &mut CosimStats::default()
            ),
            Ok(CommitOutcome::Passed { pc: 0x8000_1000 })
        );
        assert_eq!(
            matcher.commit(
                &CommitSignal::default(),
                &mut queue,
                &mut CosimStats::default()
            ),
            Ok(CommitOutcome::Idle)
        );
    }

    #[test]
    fn halves_are_joined_high_then_low() {
        assert_eq!(
            CommitSignal::wdata_from_halves(0x1122_3344, 0x5566_7788),
            0x1122_3344_5566_7788
        );
    }
}

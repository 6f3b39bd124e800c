//! Drives an [`Engine`] through a recorded scenario.

use std::fmt;
use std::path::Path;

use cosim_core::{
    CancelToken, Control, CosimError, CosimStats, Divergence, DivergenceClass, Engine,
    ScriptedModel, Termination,
};
use log::{debug, info};
use thiserror::Error;

use crate::scenario::{CycleRecord, Scenario, ScenarioError};

/// Exit code for a passing run.
pub const EXIT_PASS: i32 = 0;
/// Exit code for a divergence, timeout, exhausted recording or error.
pub const EXIT_FAIL: i32 = 1;
/// Exit code for an interrupted run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// How a replay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The pass address retired.
    Passed {
        /// Retiring pc.
        pc: u64,
    },
    /// The run was cancelled.
    Interrupted,
    /// Kernel time passed the timeout.
    TimedOut {
        /// Kernel time at the check.
        time: u64,
    },
    /// Hardware and reference disagreed.
    Diverged(Divergence),
    /// The recording ended before the run stopped.
    Exhausted,
}

impl ReplayOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Passed { .. } => EXIT_PASS,
            Self::Interrupted => EXIT_INTERRUPTED,
            Self::TimedOut { .. } | Self::Diverged(_) | Self::Exhausted => EXIT_FAIL,
        }
    }
}

impl fmt::Display for ReplayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed { pc } => write!(f, "PASS at pc={pc:#010x}"),
            Self::Interrupted => write!(f, "INTERRUPTED"),
            Self::TimedOut { time } => write!(f, "TIMEOUT at time {time}"),
            Self::Diverged(divergence) => write!(f, "DIVERGED: {divergence}"),
            Self::Exhausted => write!(f, "EXHAUSTED: recording ended before the run stopped"),
        }
    }
}

/// Result of one replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// How the run ended.
    pub outcome: ReplayOutcome,
    /// Cycles driven, including the one that stopped the run.
    pub cycles: usize,
    /// Engine counters at the end of the run.
    pub stats: CosimStats,
}

/// Failure that prevents a replay from producing an outcome.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The scenario is invalid.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// The engine failed outside of a divergence.
    #[error(transparent)]
    Engine(CosimError),
    /// The engine reported a fault latched by an unobserved divergence.
    #[error("engine already faulted with a {0:?} divergence")]
    Faulted(DivergenceClass),
}

/// Where a run currently stands.
enum Step {
    Continue,
    Done(ReplayOutcome),
}

impl Step {
    fn from_result(result: Result<Control, CosimError>) -> Result<Self, ReplayError> {
        match result {
            Ok(Control::Continue) => Ok(Self::Continue),
            Ok(Control::Stop(termination)) => Ok(Self::Done(match termination {
                Termination::Passed { pc } => ReplayOutcome::Passed { pc },
                Termination::Interrupted => ReplayOutcome::Interrupted,
                Termination::TimedOut { time } => ReplayOutcome::TimedOut { time },
                Termination::Faulted(class) => return Err(ReplayError::Faulted(class)),
            })),
            Err(CosimError::Divergence(divergence)) => {
                Ok(Self::Done(ReplayOutcome::Diverged(divergence)))
            }
            Err(other) => Err(ReplayError::Engine(other)),
        }
    }
}

/// Replays `scenario`, resolving file paths against `base_dir`.
///
/// Each cycle calls the engine in kernel order: request peek, response poke,
/// write-back peek, queue refill, then the timeout check. A scenario's
/// `cancel_at` cancels `cancel` just before that cycle runs.
///
/// # Errors
///
/// Returns [`ReplayError`] when the scenario is invalid or the engine fails
/// for a reason other than a divergence.
pub fn replay(
    scenario: &Scenario,
    base_dir: &Path,
    cancel: &CancelToken,
) -> Result<ReplayReport, ReplayError> {
    scenario.config.validate().map_err(ScenarioError::from)?;
    let images = scenario.images(base_dir)?;

    let config = scenario.config.clone();
    let model = ScriptedModel::new(
        scenario.script.clone(),
        config.xlen_bytes(),
        config.line_bytes,
    );
    let mut engine = Engine::new(config, model).map_err(ReplayError::Engine)?;

    let mut cycles = 0;
    let mut step = Step::from_result(engine.init_with_images(&images, cancel))?;

    for (index, record) in scenario.cycles.iter().enumerate() {
        if let Step::Done(_) = step {
            break;
        }
        if scenario.cancel_at == Some(index) {
            info!("interrupt delivered before cycle {index}");
            cancel.cancel();
        }
        cycles = index + 1;
        let now = record
            .time
            .unwrap_or_else(|| u64::try_from(cycles).unwrap_or(u64::MAX));
        step = run_cycle(&mut engine, record, now, cancel)?;
        debug!("cycle {index} at time {now} done");
    }

    let outcome = match step {
        Step::Done(outcome) => outcome,
        Step::Continue => ReplayOutcome::Exhausted,
    };
    info!("replay finished after {cycles} cycles: {outcome}");

    Ok(ReplayReport {
        outcome,
        cycles,
        stats: *engine.stats(),
    })
}

fn run_cycle(
    engine: &mut Engine<ScriptedModel>,
    record: &CycleRecord,
    now: u64,
    cancel: &CancelToken,
) -> Result<Step, ReplayError> {
    if let done @ Step::Done(_) = Step::from_result(engine.peek_request(&record.bus, cancel))? {
        return Ok(done);
    }
    let poked = engine
        .poke_response(record.d_ready, cancel)
        .map(|_| Control::Continue);
    if let done @ Step::Done(_) = Step::from_result(poked)? {
        return Ok(done);
    }
    if let done @ Step::Done(_) = Step::from_result(engine.commit_peek(&record.commit, cancel))? {
        return Ok(done);
    }
    if let done @ Step::Done(_) = Step::from_result(engine.refill_queue(cancel))? {
        return Ok(done);
    }
    Step::from_result(engine.timeout_check(now, cancel))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use cosim_core::{
        BusObservation, CancelToken, CommitSignal, CosimConfig, Divergence, ScriptStep,
    };

    use super::{replay, ReplayOutcome, EXIT_FAIL, EXIT_INTERRUPTED, EXIT_PASS};
    use crate::scenario::{CycleRecord, MemorySegment, Number, Scenario};

    const NOP: u32 = 0x0000_0013;
    const ADDI_X5_42: u32 = 0x02A0_0293;

    fn retire(pc: u64, insn: u32, reg: u8, wdata: u64) -> CycleRecord {
        CycleRecord {
            time: None,
            bus: BusObservation::default(),
            d_ready: true,
            commit: CommitSignal {
                rf_wen: reg != 0,
                wb_valid: true,
                rf_waddr: reg,
                wdata,
                pc,
                insn,
                ll_wen: false,
            },
        }
    }

    fn scenario(x5: u64) -> Scenario {
        Scenario {
            config: CosimConfig {
                reset_vector: 0x1000,
                pass_address: 0x1008,
                ..CosimConfig::default()
            },
            memory: vec![MemorySegment {
                base: Number::Plain(0x1000),
                words: vec![
                    Number::Plain(u64::from(NOP)),
                    Number::Plain(u64::from(ADDI_X5_42)),
                ],
                file: None,
            }],
            script: vec![
                ScriptStep::nop(0x1000),
                ScriptStep::write_reg(0x1004, ADDI_X5_42, 5, 0x2A),
                ScriptStep::nop(0x1008),
            ],
            cycles: vec![
                retire(0x1000, NOP, 0, 0),
                retire(0x1004, ADDI_X5_42, 5, x5),
                retire(0x1008, NOP, 0, 0),
            ],
            cancel_at: None,
        }
    }

    #[test]
    fn matching_run_passes() {
        let report = replay(&scenario(0x2A), Path::new("."), &CancelToken::new())
            .expect("replay runs");
        assert_eq!(report.outcome, ReplayOutcome::Passed { pc: 0x1008 });
        assert_eq!(report.outcome.exit_code(), EXIT_PASS);
        assert_eq!(report.cycles, 3);
        assert_eq!(report.stats.register_checks, 1);
    }

    #[test]
    fn divergence_stops_the_replay() {
        let report = replay(&scenario(0x2B), Path::new("."), &CancelToken::new())
            .expect("replay runs");
        assert_eq!(
            report.outcome,
            ReplayOutcome::Diverged(Divergence::RegisterWriteMismatch {
                pc: 0x1004,
                reg: 5,
                expected: 0x2A,
                actual: 0x2B
            })
        );
        assert_eq!(report.outcome.exit_code(), EXIT_FAIL);
        assert_eq!(report.cycles, 2);
    }

    #[test]
    fn cancel_at_interrupts_before_the_cycle() {
        let mut interrupted = scenario(0x2A);
        interrupted.cancel_at = Some(1);
        let cancel = CancelToken::new();

        let report = replay(&interrupted, Path::new("."), &cancel).expect("replay runs");
        assert_eq!(report.outcome, ReplayOutcome::Interrupted);
        assert_eq!(report.outcome.exit_code(), EXIT_INTERRUPTED);
        assert!(cancel.is_cancelled());
        assert_eq!(report.stats.commits, 1);
    }

    #[test]
    fn short_recording_is_exhausted() {
        let mut short = scenario(0x2A);
        short.cycles.truncate(1);
        let report = replay(&short, Path::new("."), &CancelToken::new()).expect("replay runs");
        assert_eq!(report.outcome, ReplayOutcome::Exhausted);
        assert_eq!(report.outcome.exit_code(), EXIT_FAIL);
    }

    #[test]
    fn recorded_time_drives_the_timeout() {
        let mut slow = scenario(0x2A);
        slow.config.timeout = 100;
        slow.cycles[0].time = Some(101);
        let report = replay(&slow, Path::new("."), &CancelToken::new()).expect("replay runs");
        assert_eq!(report.outcome, ReplayOutcome::TimedOut { time: 101 });
    }
}

//! Reference model seam and the event source stepping it.

use log::{debug, info};

use crate::{Divergence, MemoryView, ReferenceEvent, Retirement};

/// Scripted reference model used by adapters and tests.
pub mod scripted;

pub use scripted::{ScriptRead, ScriptStep, ScriptTrap, ScriptedModel, NOP};

/// Trap raised by the reference model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelTrap {
    /// Instruction fetch faulted; the model takes the trap on its next step.
    Fetch {
        /// Faulting fetch address.
        pc: u64,
        /// Model-provided trap name.
        cause: String,
    },
    /// Unrecoverable trap; the model state no longer tracks the program.
    Fatal {
        /// Pc of the trapping instruction.
        pc: u64,
        /// Model-provided trap name.
        cause: String,
    },
}

impl From<ModelTrap> for Divergence {
    fn from(trap: ModelTrap) -> Self {
        match trap {
            ModelTrap::Fetch { pc, cause } | ModelTrap::Fatal { pc, cause } => {
                Self::ReferenceTrap { pc, cause }
            }
        }
    }
}

/// Privileged state logged once after reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrivilegedSnapshot {
    /// `misa` CSR.
    pub misa: u64,
    /// `mstatus` CSR.
    pub mstatus: u64,
}

/// Instruction-set simulator the hardware is checked against.
///
/// Implementations own the architectural state; the engine only reads the
/// effects each step reports.
pub trait ReferenceModel: MemoryView {
    /// Resets architectural state and sets the pc.
    fn reset(&mut self, pc: u64);

    /// Copies an image into model memory.
    fn load(&mut self, base: u64, bytes: &[u8]);

    /// Current program counter.
    fn pc(&self) -> u64;

    /// Fetches the instruction at the current pc without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelTrap::Fetch`] when the fetch faults, or
    /// [`ModelTrap::Fatal`] when the model cannot continue.
    fn fetch(&mut self) -> Result<u32, ModelTrap>;

    /// Executes exactly one instruction, or takes a pending trap.
    ///
    /// # Errors
    ///
    /// Returns [`ModelTrap::Fatal`] when the model cannot continue.
    fn step(&mut self) -> Result<Retirement, ModelTrap>;

    /// Privileged state for the startup log.
    fn privileged_snapshot(&self) -> PrivilegedSnapshot;
}

/// Produces one [`ReferenceEvent`] per reference instruction.
#[derive(Debug)]
pub struct EventSource<M> {
    model: M,
    trap_successor_pc: u64,
    fetch_traps: u64,
}

impl<M: ReferenceModel> EventSource<M> {
    /// Wraps a model; `trap_successor_pc` is the sentinel pc the model lands on
    /// after executing the first trap-handler instruction.
    pub const fn new(model: M, trap_successor_pc: u64) -> Self {
        Self {
            model,
            trap_successor_pc,
            fetch_traps: 0,
        }
    }

    /// Advances the model by one instruction.
    ///
    /// Returns `Ok(None)` when the fetch trapped; the model is stepped once
    /// more so it takes the trap the same way the hardware redirects to its
    /// trap vector.
    ///
    /// # Errors
    ///
    /// Returns [`Divergence::ReferenceTrap`] when the model raises an
    /// unrecoverable trap.
    pub fn step(&mut self) -> Result<Option<ReferenceEvent>, Divergence> {
        let pc_before = self.model.pc();
        let bits = match self.model.fetch() {
            Ok(bits) => bits,
            Err(ModelTrap::Fetch { pc, cause }) => {
                info!("reference fetch trapped with {cause} at pc={pc:#010x}");
                self.model.step()?;
                self.fetch_traps += 1;
                debug!("reference redirected to pc={:#010x}", self.model.pc());
                return Ok(None);
            }
            Err(trap) => return Err(trap.into()),
        };

        debug!("reference executes pc=[{pc_before:08X}] insn={bits:08X}");
        let mut event = ReferenceEvent::from_retirement(self.model.step()?);
        let pc_after = self.model.pc();
        if pc_after == self.trap_successor_pc {
            event.is_trap = true;
            info!("trap happens at pc = {:08X}", event.pc);
        }
        debug!("reference after execute pc={pc_after:08X}");
        Ok(Some(event))
    }

    /// Number of fetch traps absorbed so far.
    pub const fn fetch_traps(&self) -> u64 {
        self.fetch_traps
    }

    /// Shared access to the wrapped model.
    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Exclusive access to the wrapped model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }
}

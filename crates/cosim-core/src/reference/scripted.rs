use log::trace;

use super::{ModelTrap, PrivilegedSnapshot, ReferenceModel};
use crate::{CacheLine, MemAccess, MemoryImage, MemoryView, Retirement};

/// Canonical `addi x0, x0, 0`.
pub const NOP: u32 = 0x0000_0013;

/// `misa` reported for `rv64gc` with supervisor and user modes.
const MISA_RV64GC: u64 = 0x8000_0000_0014_112D;
/// `misa` reported for `rv32gc` with supervisor and user modes.
const MISA_RV32GC: u64 = 0x4014_112D;

/// How a scripted instruction traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ScriptTrap {
    /// Executes normally.
    #[default]
    None,
    /// Fetch faults; the following step takes the trap.
    Fetch,
    /// Execution raises an unrecoverable trap.
    Fatal,
}

/// Load performed by a scripted instruction; the value comes from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ScriptRead {
    /// Byte address.
    pub addr: u64,
    /// Width in bytes.
    pub size_bytes: u32,
}

/// One instruction of a scripted reference run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScriptStep {
    /// Program counter.
    pub pc: u64,
    /// Raw instruction bits.
    pub bits: u32,
    /// Destination register, `0` when none.
    pub rd: u8,
    /// Value written to `rd`; defaults to the first loaded value.
    pub value: Option<u64>,
    /// Loads.
    pub reads: Vec<ScriptRead>,
    /// Stores, applied to memory after the line snapshot is taken.
    pub writes: Vec<MemAccess>,
    /// Pc after this instruction; defaults to the next step's pc.
    pub next_pc: Option<u64>,
    /// Trap behavior.
    pub trap: ScriptTrap,
}

impl ScriptStep {
    /// `nop` at `pc`.
    #[must_use]
    pub fn nop(pc: u64) -> Self {
        Self::nop_with_bits(pc, NOP)
    }

    /// Instruction without register or memory effects.
    #[must_use]
    pub fn nop_with_bits(pc: u64, bits: u32) -> Self {
        Self {
            pc,
            bits,
            ..Self::default()
        }
    }

    /// Instruction writing `value` to `rd`.
    #[must_use]
    pub fn write_reg(pc: u64, bits: u32, rd: u8, value: u64) -> Self {
        Self {
            pc,
            bits,
            rd,
            value: Some(value),
            ..Self::default()
        }
    }
}

/// Reference model replaying a fixed instruction script over real memory.
///
/// Once the script is exhausted the model keeps retiring `nop`s at
/// sequential addresses.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    steps: Vec<ScriptStep>,
    cursor: usize,
    pc: u64,
    regs: [u64; 32],
    memory: MemoryImage,
    xlen_bytes: u32,
    line_bytes: u32,
}

impl ScriptedModel {
    /// Creates a model with the given beat width and line size in bytes.
    #[must_use]
    pub fn new(steps: Vec<ScriptStep>, xlen_bytes: u32, line_bytes: u32) -> Self {
        let pc = steps.first().map_or(0, |step| step.pc);
        Self {
            steps,
            cursor: 0,
            pc,
            regs: [0; 32],
            memory: MemoryImage::new(),
            xlen_bytes,
            line_bytes,
        }
    }

    /// Number of script steps not yet executed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.steps.len().saturating_sub(self.cursor)
    }

    /// Current value of an integer register.
    #[must_use]
    pub fn reg(&self, index: u8) -> u64 {
        self.regs[usize::from(index) % self.regs.len()]
    }

    fn advance(&mut self, step: &ScriptStep) {
        self.cursor += 1;
        self.pc = step
            .next_pc
            .or_else(|| self.steps.get(self.cursor).map(|next| next.pc))
            .unwrap_or_else(|| step.pc.wrapping_add(4));
    }

    fn snapshot_line(&self, addr: u64) -> CacheLine {
        let base = addr & !u64::from(self.line_bytes - 1);
        let beats = (0..self.line_bytes / self.xlen_bytes)
            .map(|beat| {
                self.memory.read_le(
                    base + u64::from(beat * self.xlen_bytes),
                    self.xlen_bytes,
                )
            })
            .collect();
        CacheLine { base, beats }
    }

    fn execute(&mut self, step: &ScriptStep) -> Retirement {
        let reads: Vec<MemAccess> = step
            .reads
            .iter()
            .map(|read| MemAccess {
                addr: read.addr,
                size_bytes: read.size_bytes,
                value: self.memory.read_le(read.addr, read.size_bytes),
            })
            .collect();

        let first_addr = reads
            .first()
            .map(|access| access.addr)
            .or_else(|| step.writes.first().map(|access| access.addr));
        let line = first_addr.map(|addr| self.snapshot_line(addr));

        for write in &step.writes {
            self.memory.write_le(write.addr, write.size_bytes, write.value);
        }

        let (rd_old, rd_new) = if step.rd == 0 {
            (0, 0)
        } else {
            let index = usize::from(step.rd) % self.regs.len();
            let new = step
                .value
                .or_else(|| reads.first().map(|access| access.value))
                .unwrap_or(0);
            let old = std::mem::replace(&mut self.regs[index], new);
            (old, new)
        };

        Retirement {
            pc: step.pc,
            bits: step.bits,
            rd: step.rd,
            rd_old,
            rd_new,
            reads,
            writes: step.writes.clone(),
            line,
        }
    }
}

impl MemoryView for ScriptedModel {
    fn read_byte(&self, addr: u64) -> u8 {
        self.memory.read_byte(addr)
    }
}

impl ReferenceModel for ScriptedModel {
    fn reset(&mut self, pc: u64) {
        self.regs = [0; 32];
        self.cursor = 0;
        self.pc = self.steps.first().map_or(pc, |step| step.pc);
    }

    fn load(&mut self, base: u64, bytes: &[u8]) {
        for (offset, byte) in (0_u64..).zip(bytes) {
            self.memory.write_byte(base.wrapping_add(offset), *byte);
        }
    }

    fn pc(&self) -> u64 {
        self.pc
    }

    fn fetch(&mut self) -> Result<u32, ModelTrap> {
        match self.steps.get(self.cursor) {
            Some(step) if step.trap == ScriptTrap::Fetch => Err(ModelTrap::Fetch {
                pc: step.pc,
                cause: "instruction_access_fault".to_string(),
            }),
            Some(step) => Ok(step.bits),
            None => Ok(NOP),
        }
    }

    fn step(&mut self) -> Result<Retirement, ModelTrap> {
        let Some(step) = self.steps.get(self.cursor).cloned() else {
            let pc = self.pc;
            self.pc = pc.wrapping_add(4);
            return Ok(Retirement {
                pc,
                bits: NOP,
                ..Retirement::default()
            });
        };

        trace!("scripted step {} at pc={:#010x}", self.cursor, step.pc);
        match step.trap {
            ScriptTrap::Fatal => Err(ModelTrap::Fatal {
                pc: step.pc,
                cause: "illegal_instruction".to_string(),
            }),
            ScriptTrap::Fetch => {
                self.advance(&step);
                Ok(Retirement {
                    pc: step.pc,
                    ..Retirement::default()
                })
            }
            ScriptTrap::None => {
                let retired = self.execute(&step);
                self.advance(&step);
                Ok(retired)
            }
        }
    }

    fn privileged_snapshot(&self) -> PrivilegedSnapshot {
        PrivilegedSnapshot {
            misa: if self.xlen_bytes == 8 {
                MISA_RV64GC
            } else {
                MISA_RV32GC
            },
            mstatus: 0,
        }
    }
}

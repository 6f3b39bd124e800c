//! Reference events: one retired reference instruction and its side effects.

use std::collections::BTreeMap;
use std::fmt;

use crate::isa::InsnClass;

/// One memory access reported by the reference model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MemAccess {
    /// Byte address.
    pub addr: u64,
    /// Access width in bytes.
    pub size_bytes: u32,
    /// Value read or written.
    pub value: u64,
}

/// Recorded access plus whether the bus already answered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessEntry {
    /// Expected value.
    pub value: u64,
    /// Expected width in bytes.
    pub size_bytes: u32,
    /// Set once a bus request consumed this entry.
    pub executed: bool,
}

/// Reads and writes one instruction performs, keyed by byte address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemAccessRecord {
    /// Loads.
    pub reads: BTreeMap<u64, AccessEntry>,
    /// Stores.
    pub writes: BTreeMap<u64, AccessEntry>,
}

impl MemAccessRecord {
    /// Builds a record from the model's access lists.
    #[must_use]
    pub fn from_accesses(reads: &[MemAccess], writes: &[MemAccess]) -> Self {
        let collect = |accesses: &[MemAccess]| -> BTreeMap<u64, AccessEntry> {
            accesses
                .iter()
                .map(|access| {
                    (
                        access.addr,
                        AccessEntry {
                            value: access.value,
                            size_bytes: access.size_bytes,
                            executed: false,
                        },
                    )
                })
                .collect()
        };
        Self {
            reads: collect(reads),
            writes: collect(writes),
        }
    }

    /// Returns `true` when the instruction touched no memory.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }
}

/// Cache-line snapshot the reference model observed for an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CacheLine {
    /// Line-aligned base address.
    pub base: u64,
    /// One register-sized beat per element, lowest address first.
    pub beats: Vec<u64>,
}

/// Architectural effects of one instruction as reported by the reference
/// model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Retirement {
    /// Program counter.
    pub pc: u64,
    /// Raw instruction bits.
    pub bits: u32,
    /// Destination register, `0` when none.
    pub rd: u8,
    /// Destination value before execution.
    pub rd_old: u64,
    /// Destination value after execution.
    pub rd_new: u64,
    /// Loads performed.
    pub reads: Vec<MemAccess>,
    /// Stores performed.
    pub writes: Vec<MemAccess>,
    /// Line content backing a line-granularity access, when any.
    pub line: Option<CacheLine>,
}

/// Queued reference instruction awaiting hardware retirement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReferenceEvent {
    /// Program counter.
    pub pc: u64,
    /// Raw instruction bits.
    pub bits: u32,
    /// Destination register, `0` when none.
    pub rd: u8,
    /// Destination value before execution.
    pub rd_old: u64,
    /// Destination value after execution.
    pub rd_new: u64,
    /// Instruction writes memory; register writes are not compared.
    pub is_store: bool,
    /// Result arrives on the long-latency write-back port.
    pub is_multi_cycle: bool,
    /// Flagged as trapped; committed together with the trap successor.
    pub is_trap: bool,
    /// Hardware retirement matched this event.
    pub is_committed: bool,
    /// Line snapshot used to answer an acquire.
    pub line: Option<CacheLine>,
    /// Expected bus accesses.
    pub access: MemAccessRecord,
}

impl ReferenceEvent {
    /// Builds an event with no memory traffic.
    #[must_use]
    pub fn new(pc: u64, bits: u32, rd: u8, rd_new: u64) -> Self {
        let class = InsnClass::of(bits);
        Self {
            pc,
            bits,
            rd,
            rd_old: 0,
            rd_new,
            is_store: class.is_store,
            is_multi_cycle: class.is_multi_cycle,
            is_trap: false,
            is_committed: false,
            line: None,
            access: MemAccessRecord::default(),
        }
    }

    /// Builds an event from a model retirement.
    #[must_use]
    pub fn from_retirement(retired: Retirement) -> Self {
        let class = InsnClass::of(retired.bits);
        Self {
            pc: retired.pc,
            bits: retired.bits,
            rd: retired.rd,
            rd_old: retired.rd_old,
            rd_new: retired.rd_new,
            is_store: class.is_store,
            is_multi_cycle: class.is_multi_cycle,
            is_trap: false,
            is_committed: false,
            access: MemAccessRecord::from_accesses(&retired.reads, &retired.writes),
            line: retired.line,
        }
    }

    /// Adds an expected load.
    #[must_use]
    pub fn with_read(mut self, addr: u64, size_bytes: u32, value: u64) -> Self {
        self.access.reads.insert(
            addr,
            AccessEntry {
                value,
                size_bytes,
                executed: false,
            },
        );
        self
    }

    /// Adds an expected store.
    #[must_use]
    pub fn with_write(mut self, addr: u64, size_bytes: u32, value: u64) -> Self {
        self.access.writes.insert(
            addr,
            AccessEntry {
                value,
                size_bytes,
                executed: false,
            },
        );
        self
    }

    /// Attaches a line snapshot.
    #[must_use]
    pub fn with_line(mut self, line: CacheLine) -> Self {
        self.line = Some(line);
        self
    }

    /// Marks the event as trapped.
    #[must_use]
    pub fn trapped(mut self) -> Self {
        self.is_trap = true;
        self
    }
}

impl fmt::Display for ReferenceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pc = {:08X}, insn = {:08X}, write reg({}) from {:08x} to {:08X}, commit={}, trap={}",
            self.pc, self.bits, self.rd, self.rd_old, self.rd_new, self.is_committed, self.is_trap
        )?;
        if let Some(line) = &self.line {
            write!(f, ", block.addr = {:08X}", line.base)?;
        }
        Ok(())
    }
}

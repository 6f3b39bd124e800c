//! Instruction-bit helpers used to classify reference events.
//!
//! Only the major opcode and `funct7` fields are inspected; everything else
//! about an instruction comes from the reference model.

/// `STORE` major opcode.
pub const OPCODE_STORE: u32 = 0b010_0011;
/// `STORE-FP` major opcode.
pub const OPCODE_STORE_FP: u32 = 0b010_0111;
/// `AMO` major opcode.
pub const OPCODE_AMO: u32 = 0b010_1111;
/// `OP` major opcode.
pub const OPCODE_OP: u32 = 0b011_0011;
/// `OP-32` major opcode.
pub const OPCODE_OP_32: u32 = 0b011_1011;
/// `SYSTEM` major opcode (CSR access, `ecall`, `mret`, ...).
pub const OPCODE_SYSTEM: u32 = 0b111_0011;
/// `funct7` of the multiply/divide family.
pub const FUNCT7_MULDIV: u32 = 0b000_0001;

/// Major opcode field (`insn[6:0]`).
#[must_use]
pub const fn major_opcode(insn: u32) -> u32 {
    insn & 0x7F
}

/// `funct7` field (`insn[31:25]`).
#[must_use]
pub const fn funct7(insn: u32) -> u32 {
    insn >> 25
}

/// Whether the instruction belongs to the `SYSTEM` opcode space.
///
/// Register writes from these instructions are not compared: CSR side
/// effects are not modeled.
#[must_use]
pub const fn is_csr(insn: u32) -> bool {
    major_opcode(insn) == OPCODE_SYSTEM
}

/// Whether the instruction writes memory.
#[must_use]
pub const fn is_store(insn: u32) -> bool {
    matches!(
        major_opcode(insn),
        OPCODE_STORE | OPCODE_STORE_FP | OPCODE_AMO
    )
}

/// Whether the instruction's result arrives on the long-latency write-back
/// port after retirement.
#[must_use]
pub const fn is_multi_cycle(insn: u32) -> bool {
    matches!(major_opcode(insn), OPCODE_OP | OPCODE_OP_32) && funct7(insn) == FUNCT7_MULDIV
}

/// Static classification of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InsnClass {
    /// Writes memory.
    pub is_store: bool,
    /// Writes back through the long-latency port.
    pub is_multi_cycle: bool,
}

impl InsnClass {
    /// Classifies raw instruction bits.
    #[must_use]
    pub const fn of(insn: u32) -> Self {
        Self {
            is_store: is_store(insn),
            is_multi_cycle: is_multi_cycle(insn),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{is_csr, is_multi_cycle, is_store, InsnClass};

    #[rstest]
    #[case::addi(0x02A0_0293, false, false, false)] // addi x5, x0, 42
    #[case::sw(0x00B5_2023, true, false, false)] // sw x11, 0(x10)
    #[case::fsd(0x00B5_3027, true, false, false)] // fsd f11, 0(x10)
    #[case::amoadd(0x00B5_202F, true, false, false)] // amoadd.w x0, x11, (x10)
    #[case::mul(0x02B5_0533, false, true, false)] // mul x10, x10, x11
    #[case::divw(0x02B5_453B, false, true, false)] // divw x10, x10, x11
    #[case::add(0x00B5_0533, false, false, false)] // add x10, x10, x11
    #[case::csrrw(0x3400_9073, false, false, true)] // csrw mscratch, x1
    #[case::lw(0x0005_2503, false, false, false)] // lw x10, 0(x10)
    fn classification_follows_opcode_fields(
        #[case] insn: u32,
        #[case] store: bool,
        #[case] multi_cycle: bool,
        #[case] csr: bool,
    ) {
        assert_eq!(is_store(insn), store);
        assert_eq!(is_multi_cycle(insn), multi_cycle);
        assert_eq!(is_csr(insn), csr);
        assert_eq!(
            InsnClass::of(insn),
            InsnClass {
                is_store: store,
                is_multi_cycle: multi_cycle
            }
        );
    }
}

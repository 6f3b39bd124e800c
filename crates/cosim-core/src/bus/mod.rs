//! Split-transaction bus model: channel signals, opcodes and the responder.
//!
//! Requests arrive on the A channel (`Get`, `PutFullData`, `AcquireBlock`)
//! and the C channel (`Release`, `ReleaseData`); every answer leaves on the
//! D channel, one beat per cycle.

/// Per-class response slot arrays.
pub mod bank;
/// Request checking and response arbitration.
pub mod responder;

pub use bank::{Bank, BankSlot};
pub use responder::{BusResponder, ResponseClass};

/// A-channel opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AOpcode {
    /// Full-width write.
    PutFullData = 0,
    /// Masked write.
    PutPartialData = 1,
    /// Atomic arithmetic.
    ArithmeticData = 2,
    /// Atomic logical.
    LogicalData = 3,
    /// Read.
    Get = 4,
    /// Prefetch hint.
    Intent = 5,
    /// Acquire a cache line with data.
    AcquireBlock = 6,
    /// Acquire permissions only.
    AcquirePerm = 7,
}

impl AOpcode {
    /// Decodes the 3-bit wire value.
    #[must_use]
    pub const fn from_u8(opcode: u8) -> Option<Self> {
        match opcode {
            0 => Some(Self::PutFullData),
            1 => Some(Self::PutPartialData),
            2 => Some(Self::ArithmeticData),
            3 => Some(Self::LogicalData),
            4 => Some(Self::Get),
            5 => Some(Self::Intent),
            6 => Some(Self::AcquireBlock),
            7 => Some(Self::AcquirePerm),
            _ => None,
        }
    }
}

/// C-channel opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum COpcode {
    /// Probe response without data.
    ProbeAck = 4,
    /// Probe response with data.
    ProbeAckData = 5,
    /// Voluntary release without data.
    Release = 6,
    /// Voluntary release with dirty data.
    ReleaseData = 7,
}

impl COpcode {
    /// Decodes the 3-bit wire value.
    #[must_use]
    pub const fn from_u8(opcode: u8) -> Option<Self> {
        match opcode {
            4 => Some(Self::ProbeAck),
            5 => Some(Self::ProbeAckData),
            6 => Some(Self::Release),
            7 => Some(Self::ReleaseData),
            _ => None,
        }
    }
}

/// D-channel opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum DOpcode {
    /// Write acknowledgement.
    #[default]
    AccessAck = 0,
    /// Read data.
    AccessAckData = 1,
    /// Hint acknowledgement.
    HintAck = 2,
    /// Permission grant.
    Grant = 4,
    /// Permission grant with line data.
    GrantData = 5,
    /// Release acknowledgement.
    ReleaseAck = 6,
}

/// A-channel signals sampled in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelA {
    /// Raw opcode.
    pub opcode: u8,
    /// Opcode parameter (grow permissions for acquires).
    pub param: u8,
    /// `log2` of the transfer size in bytes.
    pub size: u8,
    /// Requester tag echoed in the response.
    pub source: u16,
    /// Byte address.
    pub address: u64,
    /// Byte-lane mask.
    pub mask: u32,
    /// Write data, lane-aligned to the bus width.
    pub data: u64,
    /// Data is corrupt.
    pub corrupt: bool,
    /// Request is valid this cycle.
    pub valid: bool,
}

/// C-channel signals sampled in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelC {
    /// Raw opcode.
    pub opcode: u8,
    /// Opcode parameter (shrink permissions).
    pub param: u8,
    /// `log2` of the transfer size in bytes.
    pub size: u8,
    /// Requester tag echoed in the response.
    pub source: u16,
    /// Byte address.
    pub address: u64,
    /// Release data beat.
    pub data: u64,
    /// Data is corrupt.
    pub corrupt: bool,
    /// Request is valid this cycle.
    pub valid: bool,
}

/// Everything the bus master presents in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BusObservation {
    /// Request channel.
    pub a: ChannelA,
    /// Release channel.
    pub c: ChannelC,
    /// The A request is an instruction-cache refill.
    pub miss: bool,
    /// Hardware pc sampled with the request, for diagnostics.
    pub pc: u64,
}

/// D-channel values driven back to the hardware in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BusResponse {
    /// Response opcode.
    pub opcode: DOpcode,
    /// Opcode parameter (cap permissions for grants).
    pub param: u8,
    /// `log2` of the transfer size in bytes.
    pub size: u8,
    /// Requester tag of the answered request.
    pub source: u16,
    /// Manager sink tag.
    pub sink: u16,
    /// Request denied.
    pub denied: bool,
    /// Data corrupt.
    pub corrupt: bool,
    /// A beat is presented this cycle.
    pub valid: bool,
    /// Beat data.
    pub data: u64,
}

impl BusResponse {
    /// Response with nothing presented.
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            opcode: DOpcode::AccessAck,
            param: 0,
            size: 0,
            source: 0,
            sink: 0,
            denied: false,
            corrupt: false,
            valid: false,
            data: 0,
        }
    }

    /// Upper 32 bits of the beat.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn data_high(&self) -> u32 {
        (self.data >> 32) as u32
    }

    /// Lower 32 bits of the beat.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn data_low(&self) -> u32 {
        self.data as u32
    }
}

/// Converts an encoded transfer size to bytes.
///
/// Returns `None` when the encoding does not fit in 32 bits.
#[must_use]
#[allow(clippy::cast_lossless)]
pub const fn decode_size(encoded: u8) -> Option<u32> {
    1_u32.checked_shl(encoded as u32)
}

use std::path::PathBuf;

use thiserror::Error;

use crate::ConfigError;

/// Divergence classes used for statistics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DivergenceClass {
    /// Bus request disagreed with the reference memory access record.
    Memory,
    /// Register write-back disagreed with the reference model.
    Register,
    /// Hardware retired an instruction the reference never executed.
    Retirement,
    /// Bus request used an encoding the responder does not speak.
    Protocol,
    /// The reference model itself failed.
    Reference,
}

/// Bus channel a request was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Channel {
    /// Request channel (`Get`, `PutFullData`, `AcquireBlock`).
    A,
    /// Release channel (`Release`, `ReleaseData`).
    C,
}

/// Kind of memory access a bus request stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Single-word read.
    Read,
    /// Single-word write.
    Write,
    /// Cache-line acquire.
    Acquire,
}

/// Fatal disagreement between hardware and reference model.
///
/// Any divergence invalidates every later comparison, so none of these are
/// retried: the engine latches and the run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Divergence {
    /// Bus request address is absent from every queued access record.
    #[error("cannot find {kind:?} access of addr {addr:#010x} for bus request (pc={pc:#010x})")]
    UnmatchedMemoryAccess {
        /// Request kind.
        kind: AccessKind,
        /// Requested address.
        addr: u64,
        /// Hardware pc reported with the request.
        pc: u64,
    },
    /// Request size differs from the recorded access size.
    #[error("expect {kind:?} of size {expected} bytes, actual size {actual} bytes (addr={addr:#010x}, pc={pc:#010x})")]
    SizeMismatch {
        /// Request kind.
        kind: AccessKind,
        /// Requested address.
        addr: u64,
        /// Pc of the owning reference event.
        pc: u64,
        /// Recorded size in bytes.
        expected: u32,
        /// Requested size in bytes.
        actual: u32,
    },
    /// Store data differs from the recorded store value.
    #[error("expect mem write of data {expected:#x}, actual data {actual:#x} (addr={addr:#010x}, pc={pc:#010x})")]
    DataMismatch {
        /// Written address.
        addr: u64,
        /// Pc of the owning reference event.
        pc: u64,
        /// Recorded value.
        expected: u64,
        /// Value on the bus.
        actual: u64,
    },
    /// Retiring register value differs from the reference.
    #[error("RTL write Reg({reg})={actual:#x} but reference write={expected:#x} (pc={pc:#010x})")]
    RegisterWriteMismatch {
        /// Retiring pc.
        pc: u64,
        /// Destination register.
        reg: u8,
        /// Reference value under the register-width mask.
        expected: u64,
        /// Hardware value.
        actual: u64,
    },
    /// Register write with no uncommitted reference event at that pc.
    #[error("RTL rf_write cannot find reference event; pc={pc:#010x}, waddr=Reg({reg})")]
    UnmatchedRegisterWrite {
        /// Retiring pc.
        pc: u64,
        /// Destination register.
        reg: u8,
    },
    /// Retirement with no uncommitted reference event at that pc.
    #[error("RTL retired pc={pc:#010x} without a queued reference event")]
    UnmatchedRetirement {
        /// Retiring pc.
        pc: u64,
    },
    /// Opcode not valid for the channel or condition it arrived on.
    #[error("unknown {channel:?} channel opcode {opcode} (miss={miss})")]
    UnknownOpcode {
        /// Channel the request arrived on.
        channel: Channel,
        /// Raw opcode.
        opcode: u8,
        /// Whether the request was flagged as a cache miss.
        miss: bool,
    },
    /// Encoded request size is wider than one cache line.
    #[error("invalid {channel:?} channel size encoding {size} (addr={addr:#010x}, pc={pc:#010x})")]
    InvalidSize {
        /// Channel the request arrived on.
        channel: Channel,
        /// Raw `log2` size field.
        size: u8,
        /// Requested address.
        addr: u64,
        /// Hardware pc reported with the request.
        pc: u64,
    },
    /// Reference model raised a trap it cannot recover from.
    #[error("reference model trapped with {cause} at pc={pc:#010x}")]
    ReferenceTrap {
        /// Pc of the trapping instruction.
        pc: u64,
        /// Model-provided trap name.
        cause: String,
    },
}

impl Divergence {
    /// Returns the statistics class of this divergence.
    #[must_use]
    pub const fn class(&self) -> DivergenceClass {
        match self {
            Self::UnmatchedMemoryAccess { .. }
            | Self::SizeMismatch { .. }
            | Self::DataMismatch { .. } => DivergenceClass::Memory,
            Self::RegisterWriteMismatch { .. } | Self::UnmatchedRegisterWrite { .. } => {
                DivergenceClass::Register
            }
            Self::UnmatchedRetirement { .. } => DivergenceClass::Retirement,
            Self::UnknownOpcode { .. } | Self::InvalidSize { .. } => DivergenceClass::Protocol,
            Self::ReferenceTrap { .. } => DivergenceClass::Reference,
        }
    }
}

/// Top-level error returned by engine callbacks.
#[derive(Debug, Error)]
pub enum CosimError {
    /// Hardware and reference model disagree.
    #[error(transparent)]
    Divergence(#[from] Divergence),
    /// Configuration could not be loaded or is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A binary image could not be read.
    #[error("failed to read image {}: {source}", path.display())]
    Image {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A per-cycle callback ran before the engine was initialized.
    #[error("{callback} called before init")]
    NotInitialized {
        /// Callback name.
        callback: &'static str,
    },
}

impl CosimError {
    /// Returns the divergence behind this error, if it is one.
    #[must_use]
    pub const fn divergence(&self) -> Option<&Divergence> {
        match self {
            Self::Divergence(divergence) => Some(divergence),
            Self::Config(_) | Self::Image { .. } | Self::NotInitialized { .. } => None,
        }
    }
}

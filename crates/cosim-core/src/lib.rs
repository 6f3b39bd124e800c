//! Co-simulation consistency engine.
//!
//! Checks a hardware core, observed cycle by cycle through its bus and
//! write-back signals, against an instruction-set reference model that runs a
//! bounded distance ahead of it.

/// Startup configuration and derived bus/register geometry.
pub mod config;
pub use config::{
    ConfigError, CosimConfig, Xlen, DEFAULT_ENTRANCE_VECTOR, DEFAULT_GRANT_DELAY_CYCLES,
    DEFAULT_LINE_BYTES, DEFAULT_QUEUE_CAPACITY, DEFAULT_REFILL_THRESHOLD,
    DEFAULT_TRAP_SUCCESSOR_PC,
};

/// Divergence taxonomy and top-level error type.
pub mod error;
pub use error::{AccessKind, Channel, CosimError, Divergence, DivergenceClass};

/// Instruction field helpers and classification.
pub mod isa;
pub use isa::InsnClass;

/// Sparse byte-addressed reference memory.
pub mod memory;
pub use memory::{ImageSegment, MemoryImage, MemoryView, PAGE_BYTES};

/// Reference event data model.
pub mod event;
pub use event::{AccessEntry, CacheLine, MemAccess, MemAccessRecord, ReferenceEvent, Retirement};

/// Reference model seam and event source.
pub mod reference;
pub use reference::{
    EventSource, ModelTrap, PrivilegedSnapshot, ReferenceModel, ScriptRead, ScriptStep,
    ScriptTrap, ScriptedModel, NOP,
};

/// Bounded lookahead queue.
pub mod queue;
pub use queue::LookaheadQueue;

/// Bus channel model and responder.
pub mod bus;
pub use bus::{
    decode_size, AOpcode, Bank, BankSlot, BusObservation, BusResponder, BusResponse, COpcode,
    ChannelA, ChannelC, DOpcode, ResponseClass,
};

/// Write-back matching.
pub mod commit;
pub use commit::{CommitMatcher, CommitOutcome, CommitSignal, PendingMatch};

/// Cooperative cancellation.
pub mod cancel;
pub use cancel::CancelToken;

/// Run counters.
pub mod stats;
pub use stats::CosimStats;

/// Lifecycle supervisor and callback surface.
pub mod engine;
pub use engine::{Control, Engine, RunState, Termination};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;

//! Startup configuration and derived bus/register geometry.

use std::path::PathBuf;

use thiserror::Error;

/// Default number of reference events kept ahead of hardware retirement.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default queue length below which the queue is refilled.
pub const DEFAULT_REFILL_THRESHOLD: usize = 2;

/// Default cache-line size in bytes.
pub const DEFAULT_LINE_BYTES: u32 = 64;

/// Program counter of the first instruction after a trap has been taken.
pub const DEFAULT_TRAP_SUCCESSOR_PC: u64 = 0x8000_0004;

/// Address the hardware boots from when an entrance binary is present.
pub const DEFAULT_ENTRANCE_VECTOR: u64 = 0x1000;

/// Response polls an acquire/release answer is held back after being filled.
pub const DEFAULT_GRANT_DELAY_CYCLES: u32 = 1;

/// Architectural register width of the design under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Xlen {
    /// 32-bit registers.
    Rv32,
    /// 64-bit registers.
    #[default]
    Rv64,
}

impl Xlen {
    /// Register width in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Rv32 => 32,
            Self::Rv64 => 64,
        }
    }

    /// Register width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Mask selecting the architecturally visible register bits.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::Rv32 => 0xFFFF_FFFF,
            Self::Rv64 => u64::MAX,
        }
    }

    /// Parses `32` or `64`.
    #[must_use]
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Self::Rv32),
            64 => Some(Self::Rv64),
            _ => None,
        }
    }
}

/// Configuration failures detected while loading or validating settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("cannot find environment of name '{0}'")]
    Missing(&'static str),
    /// A variable is set but its value does not parse.
    #[error("invalid value '{value}' for '{name}'")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
    /// The configured values contradict each other.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Immutable configuration injected into an [`crate::Engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[allow(clippy::struct_excessive_bools)]
pub struct CosimConfig {
    /// Program image loaded at `reset_vector`.
    pub bin: Option<PathBuf>,
    /// Optional boot stub loaded at `entrance_vector`.
    pub entrance_bin: Option<PathBuf>,
    /// Waveform output path handed to the kernel adapter.
    pub wave: Option<PathBuf>,
    /// Load address of the program image.
    pub reset_vector: u64,
    /// Load address of the boot stub and the boot pc when one is present.
    pub entrance_vector: u64,
    /// Kernel time after which the run is stopped as hung.
    pub timeout: u64,
    /// Retiring this pc ends the run successfully.
    pub pass_address: u64,
    /// Register width.
    pub xlen: Xlen,
    /// Cache-line size in bytes.
    pub line_bytes: u32,
    /// Maximum lookahead queue length.
    pub queue_capacity: usize,
    /// Queue length below which a refill is triggered.
    pub refill_threshold: usize,
    /// Sentinel pc identifying the instruction after a trap.
    pub trap_successor_pc: u64,
    /// Response polls an acquire-bank fill waits before draining.
    pub grant_delay_cycles: u32,
    /// Treat a hardware retirement without a queued event as fatal.
    pub strict_retirement: bool,
}

impl Default for CosimConfig {
    fn default() -> Self {
        Self {
            bin: None,
            entrance_bin: None,
            wave: None,
            reset_vector: 0x8000_0000,
            entrance_vector: DEFAULT_ENTRANCE_VECTOR,
            timeout: u64::MAX,
            pass_address: 0,
            xlen: Xlen::Rv64,
            line_bytes: DEFAULT_LINE_BYTES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            refill_threshold: DEFAULT_REFILL_THRESHOLD,
            trap_successor_pc: DEFAULT_TRAP_SUCCESSOR_PC,
            grant_delay_cycles: DEFAULT_GRANT_DELAY_CYCLES,
            strict_retirement: true,
        }
    }
}

impl CosimConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    ///
    /// Reads `COSIM_bin`, `COSIM_entrance_bin`, `COSIM_wave`,
    /// `COSIM_reset_vector` (hex), `COSIM_timeout` (decimal), `passaddress`
    /// (hex) and the optional `COSIM_xlen` (`32`/`64`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing, a value
    /// does not parse, or the result fails [`Self::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let xlen = match lookup("COSIM_xlen") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(Xlen::from_bits)
                .ok_or(ConfigError::Invalid {
                    name: "COSIM_xlen",
                    value: raw,
                })?,
            None => Xlen::Rv64,
        };

        let config = Self {
            bin: Some(PathBuf::from(require("COSIM_bin")?)),
            entrance_bin: lookup("COSIM_entrance_bin")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            wave: lookup("COSIM_wave").map(PathBuf::from),
            reset_vector: parse_hex("COSIM_reset_vector", &require("COSIM_reset_vector")?)?,
            timeout: parse_dec("COSIM_timeout", &require("COSIM_timeout")?)?,
            pass_address: parse_hex("passaddress", &require("passaddress")?)?,
            xlen,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the derived geometry and queue settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Inconsistent`] describing the first violated
    /// constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.line_bytes.is_power_of_two() || self.line_bytes < self.xlen.bytes() {
            return Err(ConfigError::Inconsistent(format!(
                "line size {} is not a power of two of at least one register",
                self.line_bytes
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Inconsistent(
                "queue capacity must be non-zero".to_string(),
            ));
        }
        if self.refill_threshold > self.queue_capacity {
            return Err(ConfigError::Inconsistent(format!(
                "refill threshold {} exceeds queue capacity {}",
                self.refill_threshold, self.queue_capacity
            )));
        }
        Ok(())
    }

    /// Number of register-sized beats in one cache line.
    #[must_use]
    pub const fn beats_per_line(&self) -> usize {
        (self.line_bytes / self.xlen.bytes()) as usize
    }

    /// Register width in bytes, also the width of one bus beat.
    #[must_use]
    pub const fn xlen_bytes(&self) -> u32 {
        self.xlen.bytes()
    }

    /// Register/address mask for the configured width.
    #[must_use]
    pub const fn xlen_mask(&self) -> u64 {
        self.xlen.mask()
    }

    /// Encoded bus size (`log2` bytes) of a full cache line.
    #[must_use]
    pub const fn line_size_log2(&self) -> u8 {
        self.line_bytes.trailing_zeros() as u8
    }

    /// Pc at which the reference model starts executing.
    #[must_use]
    pub const fn boot_pc(&self) -> u64 {
        if self.entrance_bin.is_some() {
            self.entrance_vector
        } else {
            self.reset_vector
        }
    }
}

fn parse_hex(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let digits = raw
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

fn parse_dec(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

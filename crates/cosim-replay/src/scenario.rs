//! JSON scenario format for recorded co-simulation runs.
//!
//! A scenario bundles everything one replay needs:
//!
//! - `config`: overrides on top of [`CosimConfig::default`]
//! - `memory`: image segments, each inline `words` or a binary `file`
//! - `script`: the scripted reference run
//! - `cycles`: per-cycle bus, ready and write-back signals
//! - `cancel_at`: optional cycle index at which an interrupt is delivered
//!
//! Addresses and words may be written as JSON numbers or as `"0x..."`
//! strings.

use std::fs;
use std::path::{Path, PathBuf};

use cosim_core::{
    BusObservation, CommitSignal, ConfigError, CosimConfig, CosimError, ImageSegment, ScriptStep,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load or validate a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The scenario file cannot be read.
    #[error("failed to read scenario {}: {source}", path.display())]
    Io {
        /// Scenario path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The scenario is not valid JSON for this format.
    #[error("failed to parse scenario {}: {source}", path.display())]
    Parse {
        /// Scenario path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A number could not be parsed.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    /// A memory segment names both or neither of `words` and `file`.
    #[error("memory segment at {base:#x} must have exactly one of 'words' or 'file'")]
    AmbiguousSegment {
        /// Segment base.
        base: u64,
    },
    /// Embedded configuration is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A segment image cannot be read.
    #[error(transparent)]
    Image(#[from] CosimError),
}

/// Number written either as a JSON number or as a hex/decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Number {
    /// Plain JSON number.
    Plain(u64),
    /// `"0x..."` hex or decimal text.
    Text(String),
}

impl Number {
    /// Resolves the value.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::InvalidNumber`] for malformed text.
    pub fn value(&self) -> Result<u64, ScenarioError> {
        match self {
            Self::Plain(value) => Ok(*value),
            Self::Text(text) => {
                let trimmed = text.trim();
                let parsed = match trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                {
                    Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
                    None => trimmed.replace('_', "").parse(),
                };
                parsed.map_err(|_| ScenarioError::InvalidNumber(text.clone()))
            }
        }
    }

    fn word(&self) -> Result<u32, ScenarioError> {
        let value = self.value()?;
        u32::try_from(value).map_err(|_| ScenarioError::InvalidNumber(format!("{value:#x}")))
    }
}

/// One memory image loaded before the run starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySegment {
    /// Load address.
    pub base: Number,
    /// Inline little-endian 32-bit words.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Number>,
    /// Binary file, relative to the scenario file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl MemorySegment {
    /// Builds the image, resolving `file` against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] when a number is malformed, the segment is
    /// ambiguous, or the file cannot be read.
    pub fn image(&self, base_dir: &Path) -> Result<ImageSegment, ScenarioError> {
        let base = self.base.value()?;
        match (&self.file, self.words.is_empty()) {
            (Some(file), true) => Ok(ImageSegment::from_file(&base_dir.join(file), base)?),
            (None, false) => {
                let words = self
                    .words
                    .iter()
                    .map(Number::word)
                    .collect::<Result<Vec<u32>, _>>()?;
                Ok(ImageSegment::from_words(base, &words))
            }
            _ => Err(ScenarioError::AmbiguousSegment { base }),
        }
    }
}

const fn ready() -> bool {
    true
}

/// Signals the hardware presents in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CycleRecord {
    /// Kernel time; defaults to the one-based cycle index.
    #[serde(default)]
    pub time: Option<u64>,
    /// A and C channel requests.
    #[serde(default)]
    pub bus: BusObservation,
    /// D-channel ready.
    #[serde(default = "ready")]
    pub d_ready: bool,
    /// Write-back signals.
    #[serde(default)]
    pub commit: CommitSignal,
}

impl Default for CycleRecord {
    fn default() -> Self {
        Self {
            time: None,
            bus: BusObservation::default(),
            d_ready: ready(),
            commit: CommitSignal::default(),
        }
    }
}

/// A recorded co-simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Engine configuration.
    #[serde(default)]
    pub config: CosimConfig,
    /// Images loaded into reference memory.
    #[serde(default)]
    pub memory: Vec<MemorySegment>,
    /// Scripted reference instructions.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
    /// Recorded cycles, in order.
    #[serde(default)]
    pub cycles: Vec<CycleRecord>,
    /// Cycle index at which an interrupt is delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_at: Option<usize>,
}

impl Scenario {
    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Io`] or [`ScenarioError::Parse`].
    pub fn from_path(path: &Path) -> Result<Self, ScenarioError> {
        let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ScenarioError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks the configuration and resolves every memory segment.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScenarioError`] found.
    pub fn validate(&self, base_dir: &Path) -> Result<(), ScenarioError> {
        self.config.validate()?;
        self.images(base_dir).map(|_| ())
    }

    /// Builds every memory image: `config.entrance_bin`, then `config.bin`,
    /// then the `memory` segments in file order. Later images overwrite
    /// earlier ones where they overlap.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScenarioError`] found.
    pub fn images(&self, base_dir: &Path) -> Result<Vec<ImageSegment>, ScenarioError> {
        let mut images = Vec::with_capacity(self.memory.len() + 2);
        if let Some(entrance) = &self.config.entrance_bin {
            images.push(ImageSegment::from_file(
                &base_dir.join(entrance),
                self.config.entrance_vector,
            )?);
        }
        if let Some(bin) = &self.config.bin {
            images.push(ImageSegment::from_file(
                &base_dir.join(bin),
                self.config.reset_vector,
            )?);
        }
        for segment in &self.memory {
            images.push(segment.image(base_dir)?);
        }
        Ok(images)
    }
}

/// Directory scenario-relative paths resolve against.
#[must_use]
pub fn base_dir(scenario_path: &Path) -> PathBuf {
    scenario_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use cosim_core::Xlen;

    use super::{base_dir, MemorySegment, Number, Scenario, ScenarioError};

    #[test]
    fn numbers_accept_json_and_hex_text() {
        assert_eq!(Number::Plain(42).value().ok(), Some(42));
        assert_eq!(Number::Text("0x8000_0000".into()).value().ok(), Some(0x8000_0000));
        assert_eq!(Number::Text("4096".into()).value().ok(), Some(4096));
        assert!(matches!(
            Number::Text("0xZZ".into()).value(),
            Err(ScenarioError::InvalidNumber(_))
        ));
    }

    #[test]
    fn partial_config_overrides_defaults() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "config": { "xlen": "rv32", "pass_address": 2147487744 },
                "memory": [ { "base": "0x1000", "words": ["0x02a00293", 19] } ],
                "cycles": [ { "commit": { "wb_valid": true, "pc": 4096 } } ]
            }"#,
        )
        .expect("valid scenario");

        assert_eq!(scenario.config.xlen, Xlen::Rv32);
        assert_eq!(scenario.config.pass_address, 0x8000_1000);
        assert_eq!(scenario.config.queue_capacity, 10);
        assert!(scenario.cycles[0].d_ready);
        assert!(scenario.cycles[0].commit.wb_valid);

        let images = scenario.images(Path::new(".")).expect("inline words");
        assert_eq!(images[0].base, 0x1000);
        assert_eq!(images[0].bytes[..4], 0x02A0_0293_u32.to_le_bytes());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<Scenario>(r#"{ "cycle": [] }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn segment_needs_exactly_one_source() {
        let segment = MemorySegment {
            base: Number::Plain(0x1000),
            words: vec![],
            file: None,
        };
        assert!(matches!(
            segment.image(Path::new(".")),
            Err(ScenarioError::AmbiguousSegment { base: 0x1000 })
        ));
    }

    #[test]
    fn base_dir_falls_back_to_current_directory() {
        assert_eq!(base_dir(Path::new("runs/a.json")), Path::new("runs"));
        assert_eq!(base_dir(Path::new("/a.json")), Path::new("/"));
    }
}

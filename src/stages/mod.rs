//! Processing stages.
//!
//! A stage is one node in a bus's processing chain: a single upstream
//! source, persistent filter memory, and exactly one output per block.
//! Stages live in an arena owned by their bus and address their upstream
//! by arena index, so the graph is insert-only and cycle-free by
//! construction.

mod frequency_weighting;
mod time_averaging;
mod time_weighting;

pub use frequency_weighting::{FrequencyWeighting, WeightingCurve};
pub use time_averaging::{AverageReadout, TimeAveraging};
pub use time_weighting::{AsymmetricTimeWeighting, BlockReadout, SymmetricTimeWeighting};

use serde::Serialize;

use crate::block::Block;

/// Reference pressure P0 = 20 uPa, the decibel-scale zero for sound
/// pressure.
pub const REFERENCE_PRESSURE: f64 = 20e-6;

/// Where a stage pulls its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// The owning bus's raw block (root stages only).
    Bus,
    /// Another stage in the same bus, by arena index. Always smaller than
    /// the reading stage's own index.
    Stage(usize),
}

/// Fixed construction context handed to every stage: the engine-wide
/// stream parameters plus the channel count of the stage's upstream.
#[derive(Debug, Clone, Copy)]
pub struct StageCtx {
    pub samplerate: u32,
    pub blocksize: usize,
    pub channels: usize,
    pub sensitivity: f64,
}

/// Identity and wiring shared by all stage kinds.
#[derive(Debug, Clone)]
pub struct StageInfo {
    /// Unique id, minted by the owning bus (`"{bus}{counter}"`).
    pub id: String,
    /// Registry token this stage answers to during requirement walks.
    pub kind: String,
    /// Declared input.
    pub upstream: Upstream,
    /// Index of the last block this stage processed, for the re-entry
    /// check.
    pub last_block: Option<u64>,
}

impl StageInfo {
    pub fn new(id: String, kind: impl Into<String>, upstream: Upstream) -> Self {
        Self {
            id,
            kind: kind.into(),
            upstream,
            last_block: None,
        }
    }
}

/// One node in a bus's processing chain.
pub trait Stage {
    /// Shared identity/wiring record.
    fn info(&self) -> &StageInfo;

    /// Mutable access for the bus's bookkeeping.
    fn info_mut(&mut self) -> &mut StageInfo;

    /// Compute this block's output from the upstream's current output.
    ///
    /// Called exactly once per block by the owning bus, in insertion
    /// order. Must run in O(blocksize) and write the stage's fixed-shape
    /// output in place.
    fn process(&mut self, input: &Block);

    /// Zero the output and reinitialize all internal filter memory, as
    /// for a stream restart.
    fn reset(&mut self);

    /// The most recent output.
    fn output(&self) -> &Block;

    /// Meter capability probe; `None` for non-meter stages.
    fn as_meter(&self) -> Option<&dyn Meter> {
        None
    }

    fn id(&self) -> &str {
        &self.info().id
    }

    fn kind(&self) -> &str {
        &self.info().kind
    }

    fn upstream(&self) -> Upstream {
        self.info().upstream
    }
}

/// Decibel/linear readout contract shared by meter-capable stages.
pub trait Meter {
    /// Non-negative linear magnitude per channel.
    fn read_lin(&self) -> Vec<f64>;

    /// Calibration scalar the readings are referenced against.
    fn sensitivity(&self) -> f64;

    /// `10*log10(lin / (P0*sensitivity)^2)` per channel.
    ///
    /// An exactly-zero linear reading yields `f64::NEG_INFINITY`; callers
    /// must handle that value instead of letting it propagate as NaN.
    fn read_db(&self) -> Vec<f64> {
        let reference = (REFERENCE_PRESSURE * self.sensitivity()).powi(2);
        self.read_lin()
            .iter()
            .map(|&lin| 10.0 * (lin / reference).log10())
            .collect()
    }
}

/// One meter reading, as handed to the reporting hook.
#[derive(Debug, Clone, Serialize)]
pub struct MeterReading {
    /// Id of the stage that produced the reading.
    pub stage: String,
    /// Stage kind token, for human-readable reports.
    pub kind: String,
    /// Decibel reading per channel. May contain `-inf` for silence.
    pub db: Vec<f64>,
}

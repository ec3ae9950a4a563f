//! Named signal buses.
//!
//! A bus owns one raw input block, a root frequency-weighting stage, and
//! the insertion-ordered arena of stages attached beneath it. Stages are
//! append-only and every stage is appended after its declared upstream,
//! so insertion order is always a valid topological order and one linear
//! walk evaluates each stage exactly once per block.

use log::debug;

use crate::block::Block;
use crate::error::{Result, SlmError};
use crate::stages::{
    FrequencyWeighting, MeterReading, Stage, StageCtx, Upstream, WeightingCurve,
};

/// A named signal line with a weighting root and downstream stage chain.
pub struct Bus {
    name: String,
    samplerate: u32,
    blocksize: usize,
    channels: usize,
    sensitivity: f64,
    block: Block,
    stages: Vec<Box<dyn Stage>>,
    counter: u32,
}

impl Bus {
    /// Create a bus and install its root frequency-weighting stage.
    pub(crate) fn new(
        name: String,
        samplerate: u32,
        blocksize: usize,
        channels: usize,
        sensitivity: f64,
        curve: WeightingCurve,
    ) -> Self {
        let mut bus = Self {
            name,
            samplerate,
            blocksize,
            channels,
            sensitivity,
            block: Block::new(channels, blocksize),
            stages: Vec::new(),
            counter: 0,
        };
        bus.add_stage(Upstream::Bus, |ctx, id, upstream| {
            Box::new(FrequencyWeighting::new(ctx, id, upstream, curve))
        });
        bus
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The bus's root frequency-weighting stage (arena index 0).
    pub fn root(&self) -> &dyn Stage {
        self.stages[0].as_ref()
    }

    /// All stages in insertion (topological) order.
    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Current raw input block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Append a stage built by `build`, wired to `upstream`.
    ///
    /// Mints a bus-scoped id (`"{bus}{counter}"`, counter from 1) and
    /// hands the builder a context carrying the stream parameters and the
    /// upstream's channel count. Returns the new stage's arena index.
    ///
    /// # Panics
    /// Panics if `upstream` names a stage index that does not exist yet;
    /// upstream indices only ever come from earlier appends.
    pub fn add_stage<F>(&mut self, upstream: Upstream, build: F) -> usize
    where
        F: FnOnce(&StageCtx, String, Upstream) -> Box<dyn Stage>,
    {
        let channels = match upstream {
            Upstream::Bus => self.channels,
            Upstream::Stage(j) => {
                assert!(j < self.stages.len(), "upstream stage {j} does not exist");
                self.stages[j].output().channels()
            }
        };
        self.counter += 1;
        let id = format!("{}{}", self.name, self.counter);
        let ctx = StageCtx {
            samplerate: self.samplerate,
            blocksize: self.blocksize,
            channels,
            sensitivity: self.sensitivity,
        };
        let stage = build(&ctx, id, upstream);
        debug!(
            "bus '{}': added stage '{}' ({})",
            self.name,
            stage.id(),
            stage.kind()
        );
        self.stages.push(stage);
        self.stages.len() - 1
    }

    /// Find a stage whose upstream is `from` and whose kind matches
    /// `token`. Used by the engine's requirement walk.
    pub(crate) fn find_downstream(&self, from: usize, token: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.upstream() == Upstream::Stage(from) && s.kind() == token)
    }

    /// Store `block` and evaluate every stage in insertion order.
    ///
    /// Each stage pulls from its upstream's current output (or the raw
    /// block for roots) and overwrites its own output in place. A stage
    /// seen twice for one block index trips [`SlmError::ExecutionFault`].
    pub fn process(&mut self, block: &Block, block_index: u64) -> Result<()> {
        self.block.copy_from(block);
        for i in 0..self.stages.len() {
            let (before, rest) = self.stages.split_at_mut(i);
            let stage = &mut rest[0];

            if stage.info().last_block == Some(block_index) {
                return Err(SlmError::ExecutionFault {
                    stage: stage.id().to_string(),
                    block_index,
                });
            }
            stage.info_mut().last_block = Some(block_index);

            match stage.upstream() {
                Upstream::Bus => stage.process(&self.block),
                Upstream::Stage(j) => {
                    debug_assert!(j < i, "upstream must precede its reader");
                    stage.process(before[j].output());
                }
            }
        }
        Ok(())
    }

    /// One decibel reading per meter-capable stage.
    pub fn readings(&self) -> Vec<MeterReading> {
        self.stages
            .iter()
            .filter_map(|stage| {
                stage.as_meter().map(|meter| MeterReading {
                    stage: stage.id().to_string(),
                    kind: stage.kind().to_string(),
                    db: meter.read_db(),
                })
            })
            .collect()
    }

    /// Reset every stage for a stream restart.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
            stage.info_mut().last_block = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{BlockReadout, SymmetricTimeWeighting};
    use approx::assert_relative_eq;

    fn test_bus(curve: WeightingCurve) -> Bus {
        Bus::new("Z".into(), 48000, 64, 1, 1.0, curve)
    }

    #[test]
    fn construction_installs_the_root() {
        let bus = test_bus(WeightingCurve::Z);
        assert_eq!(bus.stages().len(), 1);
        assert_eq!(bus.root().id(), "Z1");
        assert_eq!(bus.root().kind(), "Z-weighting");
        assert_eq!(bus.root().upstream(), Upstream::Bus);
    }

    #[test]
    fn ids_count_up_per_bus() {
        let mut bus = test_bus(WeightingCurve::Z);
        let idx = bus.add_stage(Upstream::Stage(0), |ctx, id, up| {
            Box::new(SymmetricTimeWeighting::fast(ctx, id, up, BlockReadout::Last))
        });
        assert_eq!(idx, 1);
        assert_eq!(bus.stages()[1].id(), "Z2");
    }

    #[test]
    fn process_feeds_stages_in_chain_order() {
        let mut bus = test_bus(WeightingCurve::Z);
        bus.add_stage(Upstream::Stage(0), |ctx, id, up| {
            Box::new(SymmetricTimeWeighting::fast(ctx, id, up, BlockReadout::Last))
        });

        let mut block = Block::new(1, 64);
        block.fill(0.5);
        bus.process(&block, 0).unwrap();

        // Root copied the raw block; the meter saw the root's output.
        assert_eq!(bus.root().output(), &block);
        let readings = bus.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].stage, "Z2");
        assert!(readings[0].db[0].is_finite());
    }

    #[test]
    fn double_processing_one_block_faults() {
        let mut bus = test_bus(WeightingCurve::Z);
        let block = Block::new(1, 64);
        bus.process(&block, 7).unwrap();
        let err = bus.process(&block, 7).unwrap_err();
        assert!(matches!(err, SlmError::ExecutionFault { .. }));
        // A fresh index is fine again.
        bus.process(&block, 8).unwrap();
    }

    #[test]
    fn find_downstream_matches_kind_and_wiring() {
        let mut bus = test_bus(WeightingCurve::Z);
        let fast = bus.add_stage(Upstream::Stage(0), |ctx, id, up| {
            Box::new(SymmetricTimeWeighting::fast(ctx, id, up, BlockReadout::Last))
        });
        assert_eq!(bus.find_downstream(0, "fast"), Some(fast));
        assert_eq!(bus.find_downstream(0, "slow"), None);
        assert_eq!(bus.find_downstream(fast, "fast"), None);
    }

    #[test]
    fn reset_clears_meter_state() {
        let mut bus = test_bus(WeightingCurve::Z);
        bus.add_stage(Upstream::Stage(0), |ctx, id, up| {
            Box::new(SymmetricTimeWeighting::fast(ctx, id, up, BlockReadout::Last))
        });
        let mut block = Block::new(1, 64);
        block.fill(1.0);
        bus.process(&block, 0).unwrap();

        bus.reset();
        let readings = bus.readings();
        assert_eq!(readings[0].db[0], f64::NEG_INFINITY);
        assert_relative_eq!(bus.stages()[1].output().channel(0)[0], 0.0);
    }
}

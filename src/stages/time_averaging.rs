//! Time-averaging stage (meter).
//!
//! Windowed averaging over a fixed span of recent blocks: each processed
//! block contributes one mean-square value to a circular buffer sized to
//! the averaging duration, and readout reduces the whole buffer.

use crate::block::Block;
use crate::stages::{Meter, Stage, StageCtx, StageInfo, Upstream};

/// Order-invariant reduction applied over the circular buffer.
///
/// Buffer contents are unordered after wraparound, so only reductions
/// that ignore ordering are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AverageReadout {
    #[default]
    Mean,
    Max,
    Min,
}

impl AverageReadout {
    pub fn over(&self, values: &[f64]) -> f64 {
        match self {
            AverageReadout::Mean => {
                if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            AverageReadout::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AverageReadout::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AverageReadout::Mean => "mean",
            AverageReadout::Max => "max",
            AverageReadout::Min => "min",
        }
    }
}

/// Fixed-capacity circular buffer. Starts zero-filled; pushes overwrite
/// the oldest slot once the write index wraps.
#[derive(Debug, Clone)]
struct Fifo {
    buffer: Vec<f64>,
    index: usize,
}

impl Fifo {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            index: 0,
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }

    fn push(&mut self, value: f64) {
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % self.buffer.len();
    }

    fn values(&self) -> &[f64] {
        &self.buffer
    }
}

/// Time-averaging meter stage.
///
/// Capacity is `round(duration * samplerate / blocksize)` blocks, at
/// least one. For the mean reduction, `read_lin` divides by the
/// averaging duration, matching the dimensional scaling of the
/// time-weighting meters.
pub struct TimeAveraging {
    info: StageInfo,
    duration: f64,
    readout: AverageReadout,
    fifos: Vec<Fifo>,
    output: Block,
    sensitivity: f64,
}

impl TimeAveraging {
    pub fn new(
        ctx: &StageCtx,
        id: String,
        upstream: Upstream,
        kind: &str,
        duration: f64,
        readout: AverageReadout,
    ) -> Self {
        let capacity =
            ((duration * f64::from(ctx.samplerate) / ctx.blocksize as f64).round() as usize).max(1);
        Self {
            info: StageInfo::new(id, kind, upstream),
            duration,
            readout,
            fifos: vec![Fifo::new(capacity); ctx.channels],
            output: Block::new(ctx.channels, 1),
            sensitivity: ctx.sensitivity,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
}

impl Stage for TimeAveraging {
    fn info(&self) -> &StageInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut StageInfo {
        &mut self.info
    }

    fn process(&mut self, input: &Block) {
        for ch in 0..self.output.channels() {
            self.fifos[ch].push(input.mean_square(ch));
            self.output.channel_mut(ch)[0] = self.readout.over(self.fifos[ch].values());
        }
    }

    fn reset(&mut self) {
        self.output.fill(0.0);
        for fifo in &mut self.fifos {
            fifo.reset();
        }
    }

    fn output(&self) -> &Block {
        &self.output
    }

    fn as_meter(&self) -> Option<&dyn Meter> {
        Some(self)
    }
}

impl Meter for TimeAveraging {
    fn read_lin(&self) -> Vec<f64> {
        let scale = match self.readout {
            AverageReadout::Mean => self.duration,
            _ => 1.0,
        };
        (0..self.output.channels())
            .map(|ch| self.output.channel(ch)[0] / scale)
            .collect()
    }

    fn sensitivity(&self) -> f64 {
        self.sensitivity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ctx(samplerate: u32, blocksize: usize) -> StageCtx {
        StageCtx {
            samplerate,
            blocksize,
            channels: 1,
            sensitivity: 1.0,
        }
    }

    fn constant_block(blocksize: usize, value: f64) -> Block {
        let mut block = Block::new(1, blocksize);
        block.fill(value);
        block
    }

    #[test]
    fn fifo_evicts_oldest() {
        // Capacity 4; the fifth push must replace the first.
        let mut fifo = Fifo::new(4);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            fifo.push(v);
        }
        let mean = AverageReadout::Mean.over(fifo.values());
        assert_relative_eq!(mean, (2.0 + 3.0 + 4.0 + 5.0) / 4.0);
    }

    #[test]
    fn capacity_follows_duration() {
        // 1 s at 48 kHz in 1024-sample blocks: round(46.875) = 47 slots.
        let stage = TimeAveraging::new(
            &ctx(48000, 1024),
            "Z2".into(),
            Upstream::Bus,
            "eq1s",
            1.0,
            AverageReadout::Mean,
        );
        assert_eq!(stage.fifos[0].values().len(), 47);
    }

    #[test]
    fn capacity_never_drops_below_one_block() {
        let stage = TimeAveraging::new(
            &ctx(48000, 1024),
            "Z2".into(),
            Upstream::Bus,
            "eqshort",
            0.001,
            AverageReadout::Mean,
        );
        assert_eq!(stage.fifos[0].values().len(), 1);
    }

    #[test]
    fn mean_readout_scales_by_duration() {
        let duration = 0.5;
        let blocksize = 1000;
        let mut stage = TimeAveraging::new(
            &ctx(8000, blocksize),
            "Z2".into(),
            Upstream::Bus,
            "eqhalf",
            duration,
            AverageReadout::Mean,
        );
        let block = constant_block(blocksize, 0.5);
        let capacity = stage.fifos[0].values().len();
        for _ in 0..capacity {
            stage.process(&block);
        }
        // Buffer full of 0.25 mean-squares, reduced and divided by T.
        assert_relative_eq!(stage.read_lin()[0], 0.25 / duration);
    }

    #[test]
    fn max_readout_keeps_the_loudest_block_in_window() {
        let blocksize = 100;
        let mut stage = TimeAveraging::new(
            &ctx(1000, blocksize),
            "Z2".into(),
            Upstream::Bus,
            "eqmax",
            1.0,
            AverageReadout::Max,
        );
        stage.process(&constant_block(blocksize, 0.1));
        stage.process(&constant_block(blocksize, 1.0));
        stage.process(&constant_block(blocksize, 0.2));
        assert_relative_eq!(stage.read_lin()[0], 1.0);
    }

    #[test]
    fn reset_empties_the_window() {
        let blocksize = 100;
        let mut stage = TimeAveraging::new(
            &ctx(1000, blocksize),
            "Z2".into(),
            Upstream::Bus,
            "eq1s",
            1.0,
            AverageReadout::Mean,
        );
        stage.process(&constant_block(blocksize, 1.0));
        assert!(stage.read_lin()[0] > 0.0);
        stage.reset();
        assert_eq!(stage.read_lin()[0], 0.0);
        assert_eq!(stage.read_db()[0], f64::NEG_INFINITY);
    }
}

//! Time-weighting stages (meters).
//!
//! Both kinds consume the squared instantaneous signal and decimate to
//! one reading per block (output shape channels x 1):
//!
//! * [`SymmetricTimeWeighting`]: the standard exponential detectors,
//!   fast (tau = 0.125 s) and slow (tau = 1.0 s), as one first-order
//!   recursion per channel.
//! * [`AsymmetricTimeWeighting`]: the impulse detector, a signal-
//!   dependent attack/release follower (rise 0.035 s, fall 1.5 s). The
//!   coefficient switches on the sign of `x[n] - y[n-1]`, so it cannot
//!   be expressed as one linear filter and is computed sample by sample.

use crate::block::Block;
use crate::stages::{Meter, Stage, StageCtx, StageInfo, Upstream};

/// Which sample of the filtered block becomes the reported value.
///
/// `Last` is the natural choice: time weighting decimates to one reading
/// per block, and the end of the block is the most recent level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockReadout {
    #[default]
    Last,
    Max,
    Min,
}

impl BlockReadout {
    /// Reduce one filtered block to the reported sample.
    pub fn over(&self, samples: &[f64]) -> f64 {
        match self {
            BlockReadout::Last => *samples.last().unwrap_or(&0.0),
            BlockReadout::Max => samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            BlockReadout::Min => samples.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlockReadout::Last => "last",
            BlockReadout::Max => "max",
            BlockReadout::Min => "min",
        }
    }
}

/// Smoothing coefficient `alpha = 1 - e^(-1/(fs*tau))`.
fn alpha(samplerate: u32, tau: f64) -> f64 {
    1.0 - (-1.0 / (f64::from(samplerate) * tau)).exp()
}

/// Symmetric exponential time weighting.
///
/// Per sample: `y[n] = (1-alpha)*y[n-1] + alpha*tau*x[n]^2`, one state
/// value per channel. The filtered value is the exponential-window
/// integral of squared pressure, so [`Meter::read_lin`] divides it by
/// tau: a constant mean-square input of `P^2` settles to exactly `P^2`.
pub struct SymmetricTimeWeighting {
    info: StageInfo,
    tau: f64,
    alpha: f64,
    readout: BlockReadout,
    state: Vec<f64>,
    scratch: Vec<f64>,
    output: Block,
    sensitivity: f64,
}

impl SymmetricTimeWeighting {
    pub fn new(
        ctx: &StageCtx,
        id: String,
        upstream: Upstream,
        kind: &str,
        tau: f64,
        readout: BlockReadout,
    ) -> Self {
        Self {
            info: StageInfo::new(id, kind, upstream),
            tau,
            alpha: alpha(ctx.samplerate, tau),
            readout,
            state: vec![0.0; ctx.channels],
            scratch: vec![0.0; ctx.blocksize],
            output: Block::new(ctx.channels, 1),
            sensitivity: ctx.sensitivity,
        }
    }

    /// Fast detector, tau = 0.125 s.
    pub fn fast(ctx: &StageCtx, id: String, upstream: Upstream, readout: BlockReadout) -> Self {
        Self::new(ctx, id, upstream, "fast", 0.125, readout)
    }

    /// Slow detector, tau = 1.0 s.
    pub fn slow(ctx: &StageCtx, id: String, upstream: Upstream, readout: BlockReadout) -> Self {
        Self::new(ctx, id, upstream, "slow", 1.0, readout)
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }
}

impl Stage for SymmetricTimeWeighting {
    fn info(&self) -> &StageInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut StageInfo {
        &mut self.info
    }

    fn process(&mut self, input: &Block) {
        let gain = self.alpha * self.tau;
        let keep = 1.0 - self.alpha;
        for ch in 0..self.output.channels() {
            // Upstream blocks may be shorter than the engine blocksize
            // (a meter decimates to one sample); only the filled prefix
            // of the scratch buffer is valid for readout.
            let filled = input.channel(ch).len().min(self.scratch.len());
            let mut z = self.state[ch];
            for (slot, &x) in self.scratch[..filled].iter_mut().zip(input.channel(ch)) {
                z = keep * z + gain * x * x;
                *slot = z;
            }
            self.state[ch] = z;
            self.output.channel_mut(ch)[0] = self.readout.over(&self.scratch[..filled]);
        }
    }

    fn reset(&mut self) {
        self.output.fill(0.0);
        self.state.fill(0.0);
    }

    fn output(&self) -> &Block {
        &self.output
    }

    fn as_meter(&self) -> Option<&dyn Meter> {
        Some(self)
    }
}

impl Meter for SymmetricTimeWeighting {
    fn read_lin(&self) -> Vec<f64> {
        (0..self.output.channels())
            .map(|ch| self.output.channel(ch)[0] / self.tau)
            .collect()
    }

    fn sensitivity(&self) -> f64 {
        self.sensitivity
    }
}

/// Asymmetric (impulse) time weighting.
///
/// Rise and fall use separate time constants; the filtered value rises
/// quickly on transients and decays slowly after them.
pub struct AsymmetricTimeWeighting {
    info: StageInfo,
    alpha_rise: f64,
    alpha_fall: f64,
    readout: BlockReadout,
    state: Vec<f64>,
    scratch: Vec<f64>,
    output: Block,
    sensitivity: f64,
}

impl AsymmetricTimeWeighting {
    pub fn new(
        ctx: &StageCtx,
        id: String,
        upstream: Upstream,
        kind: &str,
        tau_rise: f64,
        tau_fall: f64,
        readout: BlockReadout,
    ) -> Self {
        Self {
            info: StageInfo::new(id, kind, upstream),
            alpha_rise: alpha(ctx.samplerate, tau_rise),
            alpha_fall: alpha(ctx.samplerate, tau_fall),
            readout,
            state: vec![0.0; ctx.channels],
            scratch: vec![0.0; ctx.blocksize],
            output: Block::new(ctx.channels, 1),
            sensitivity: ctx.sensitivity,
        }
    }

    /// Impulse detector, rise tau = 0.035 s, fall tau = 1.5 s.
    pub fn impulse(ctx: &StageCtx, id: String, upstream: Upstream, readout: BlockReadout) -> Self {
        Self::new(ctx, id, upstream, "impulse", 0.035, 1.5, readout)
    }
}

impl Stage for AsymmetricTimeWeighting {
    fn info(&self) -> &StageInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut StageInfo {
        &mut self.info
    }

    fn process(&mut self, input: &Block) {
        for ch in 0..self.output.channels() {
            let filled = input.channel(ch).len().min(self.scratch.len());
            let mut z = self.state[ch];
            for (slot, &x) in self.scratch[..filled].iter_mut().zip(input.channel(ch)) {
                let squared = x * x;
                let a = if squared > z {
                    self.alpha_rise
                } else {
                    self.alpha_fall
                };
                z = (1.0 - a) * z + a * squared;
                *slot = z;
            }
            self.state[ch] = z;
            self.output.channel_mut(ch)[0] = self.readout.over(&self.scratch[..filled]);
        }
    }

    fn reset(&mut self) {
        self.output.fill(0.0);
        self.state.fill(0.0);
    }

    fn output(&self) -> &Block {
        &self.output
    }

    fn as_meter(&self) -> Option<&dyn Meter> {
        Some(self)
    }
}

impl Meter for AsymmetricTimeWeighting {
    fn read_lin(&self) -> Vec<f64> {
        (0..self.output.channels())
            .map(|ch| self.output.channel(ch)[0])
            .collect()
    }

    fn sensitivity(&self) -> f64 {
        self.sensitivity
    }
}

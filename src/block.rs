//! Sample block type.
//!
//! A [`Block`] is one fixed-size chunk of sequential audio delivered per
//! read cycle: `channels x len` samples of `f64`, stored per-channel
//! contiguous. Stage outputs are blocks too; their shape is fixed at
//! construction and never reallocated.

/// A channels x len buffer of `f64` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    channels: usize,
    len: usize,
    samples: Vec<f64>,
}

impl Block {
    /// Create a zeroed block with the given shape.
    ///
    /// # Panics
    /// Panics if `channels` is zero.
    pub fn new(channels: usize, len: usize) -> Self {
        assert!(channels > 0, "a block needs at least one channel");
        Self {
            channels,
            len,
            samples: vec![0.0; channels * len],
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Immutable view of one channel.
    pub fn channel(&self, ch: usize) -> &[f64] {
        &self.samples[ch * self.len..(ch + 1) * self.len]
    }

    /// Mutable view of one channel.
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f64] {
        &mut self.samples[ch * self.len..(ch + 1) * self.len]
    }

    /// Set every sample to `value`.
    pub fn fill(&mut self, value: f64) {
        self.samples.fill(value);
    }

    /// Copy another block's samples into this one.
    ///
    /// # Panics
    /// Panics on shape mismatch; block shapes are fixed for the engine
    /// lifetime, so a mismatch is a wiring bug.
    pub fn copy_from(&mut self, other: &Block) {
        assert_eq!(self.channels, other.channels, "channel count mismatch");
        assert_eq!(self.len, other.len, "block length mismatch");
        self.samples.copy_from_slice(&other.samples);
    }

    /// Mean of the squared samples of one channel.
    pub fn mean_square(&self, ch: usize) -> f64 {
        let data = self.channel(ch);
        if data.is_empty() {
            return 0.0;
        }
        data.iter().map(|&s| s * s).sum::<f64>() / data.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn new_block_is_zeroed() {
        let block = Block::new(2, 8);
        assert_eq!(block.channels(), 2);
        assert_eq!(block.len(), 8);
        assert!(block.channel(0).iter().all(|&s| s == 0.0));
        assert!(block.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn channels_are_independent() {
        let mut block = Block::new(2, 4);
        block.channel_mut(0).fill(1.0);
        assert!(block.channel(0).iter().all(|&s| s == 1.0));
        assert!(block.channel(1).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn copy_from_is_bit_exact() {
        let mut src = Block::new(1, 4);
        src.channel_mut(0).copy_from_slice(&[0.25, -0.5, 0.75, -1.0]);
        let mut dst = Block::new(1, 4);
        dst.copy_from(&src);
        assert_eq!(src, dst);
    }

    #[test]
    fn mean_square_of_constant() {
        let mut block = Block::new(1, 16);
        block.fill(0.5);
        assert_relative_eq!(block.mean_square(0), 0.25);
    }

    #[test]
    #[should_panic]
    fn copy_from_rejects_shape_mismatch() {
        let src = Block::new(1, 4);
        let mut dst = Block::new(1, 8);
        dst.copy_from(&src);
    }
}

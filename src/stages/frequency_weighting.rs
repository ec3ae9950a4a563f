//! Frequency-weighting stage.
//!
//! Applies one of the standard sound-level-meter weighting curves as a
//! cascade of biquad second-order sections, carrying the delay-line state
//! across blocks. The digital filter is designed at construction time for
//! the concrete samplerate by bilinear transform of the analog poles and
//! normalized to unity gain at 1 kHz.
//!
//! The delay lines start from the cascade's steady-state response to a
//! constant input rather than from zero, which suppresses the audible
//! transient at stream start. Z weighting is the identity: no filter, no
//! state, the input block is copied through unchanged.

use std::f64::consts::PI;

use crate::block::Block;
use crate::stages::{Stage, StageCtx, StageInfo, Upstream};

// Analog pole frequencies shared by the A and C curves (Hz).
const F1: f64 = 20.598997;
const F2: f64 = 107.65265;
const F3: f64 = 737.86223;
const F4: f64 = 12194.217;

/// Weighting curve selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightingCurve {
    /// A-weighting: approximates perceptual sensitivity at moderate levels.
    A,
    /// C-weighting: near-flat with rolled-off extremes.
    C,
    /// Z (zero) weighting: identity transform.
    Z,
}

impl WeightingCurve {
    /// Curve label as it appears in bus names and stage kinds.
    pub fn label(&self) -> &'static str {
        match self {
            WeightingCurve::A => "A",
            WeightingCurve::C => "C",
            WeightingCurve::Z => "Z",
        }
    }

    /// Stage kind token, e.g. `"A-weighting"`.
    pub fn kind(&self) -> String {
        format!("{}-weighting", self.label())
    }
}

/// One second-order section, normalized so a0 = 1.
/// H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Build a section from two real digital zeros and two real digital
    /// poles, unity leading coefficient.
    fn from_real_pairs(z1: f64, z2: f64, p1: f64, p2: f64) -> Self {
        Self {
            b0: 1.0,
            b1: -(z1 + z2),
            b2: z1 * z2,
            a1: -(p1 + p2),
            a2: p1 * p2,
        }
    }

    /// DC gain of the section.
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Magnitude response at angular frequency `w` (rad/sample).
    fn magnitude_at(&self, w: f64) -> f64 {
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = self.b1 * s1 + self.b2 * s2;
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = self.a1 * s1 + self.a2 * s2;
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Direct-form-I delay line for one section on one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    fn process(&mut self, input: f64, c: &Biquad) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2
            - c.a1 * self.y1
            - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Map one analog pole at `-2*pi*f` to the z-plane.
fn bilinear_pole(f: f64, fs: f64) -> f64 {
    let p = -2.0 * PI * f;
    (1.0 + p / (2.0 * fs)) / (1.0 - p / (2.0 * fs))
}

/// Cascade magnitude at frequency `f` Hz.
fn cascade_magnitude(sections: &[Biquad], fs: f64, f: f64) -> f64 {
    let w = 2.0 * PI * f / fs;
    sections.iter().map(|s| s.magnitude_at(w)).product()
}

/// Design the weighting cascade for `curve` at samplerate `fs`.
///
/// Zeros at s = 0 land on z = 1; the bilinear transform fills the
/// remaining zeros at z = -1. The cascade is scaled for exactly unity
/// gain at 1 kHz.
fn design(curve: WeightingCurve, fs: f64) -> Vec<Biquad> {
    let q1 = bilinear_pole(F1, fs);
    let q4 = bilinear_pole(F4, fs);

    let mut sections = match curve {
        WeightingCurve::A => {
            let q2 = bilinear_pole(F2, fs);
            let q3 = bilinear_pole(F3, fs);
            vec![
                Biquad::from_real_pairs(1.0, 1.0, q1, q1),
                Biquad::from_real_pairs(1.0, 1.0, q2, q3),
                Biquad::from_real_pairs(-1.0, -1.0, q4, q4),
            ]
        }
        WeightingCurve::C => vec![
            Biquad::from_real_pairs(1.0, 1.0, q1, q1),
            Biquad::from_real_pairs(-1.0, -1.0, q4, q4),
        ],
        WeightingCurve::Z => vec![],
    };

    if !sections.is_empty() {
        let gain = cascade_magnitude(&sections, fs, 1000.0);
        sections[0].b0 /= gain;
        sections[0].b1 /= gain;
        sections[0].b2 /= gain;
    }

    sections
}

/// Steady-state delay lines for a unit constant input, one set per
/// channel. The input level entering each section is the product of the
/// DC gains of the sections before it.
fn steady_state(sections: &[Biquad], channels: usize) -> Vec<Vec<BiquadState>> {
    let mut per_channel = Vec::with_capacity(sections.len());
    let mut level = 1.0;
    for section in sections {
        let out = section.dc_gain() * level;
        per_channel.push(BiquadState {
            x1: level,
            x2: level,
            y1: out,
            y2: out,
        });
        level = out;
    }
    vec![per_channel; channels]
}

/// Frequency-weighting stage: the root of every bus.
pub struct FrequencyWeighting {
    info: StageInfo,
    curve: WeightingCurve,
    sections: Vec<Biquad>,
    state: Vec<Vec<BiquadState>>,
    output: Block,
}

impl FrequencyWeighting {
    pub fn new(ctx: &StageCtx, id: String, upstream: Upstream, curve: WeightingCurve) -> Self {
        let sections = design(curve, f64::from(ctx.samplerate));
        let state = steady_state(&sections, ctx.channels);
        Self {
            info: StageInfo::new(id, curve.kind(), upstream),
            curve,
            sections,
            state,
            output: Block::new(ctx.channels, ctx.blocksize),
        }
    }

    pub fn curve(&self) -> WeightingCurve {
        self.curve
    }
}

impl Stage for FrequencyWeighting {
    fn info(&self) -> &StageInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut StageInfo {
        &mut self.info
    }

    fn process(&mut self, input: &Block) {
        if self.curve == WeightingCurve::Z {
            self.output.copy_from(input);
            return;
        }

        for ch in 0..self.output.channels() {
            let states = &mut self.state[ch];
            let out = self.output.channel_mut(ch);
            for (n, &sample) in input.channel(ch).iter().enumerate() {
                let mut acc = sample;
                for (section, state) in self.sections.iter().zip(states.iter_mut()) {
                    acc = state.process(acc, section);
                }
                out[n] = acc;
            }
        }
    }

    fn reset(&mut self) {
        self.output.fill(0.0);
        self.state = steady_state(&self.sections, self.output.channels());
    }

    fn output(&self) -> &Block {
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FS: f64 = 48000.0;

    fn ctx(channels: usize, blocksize: usize) -> StageCtx {
        StageCtx {
            samplerate: 48000,
            blocksize,
            channels,
            sensitivity: 1.0,
        }
    }

    fn gain_db(curve: WeightingCurve, f: f64) -> f64 {
        let sections = design(curve, FS);
        20.0 * cascade_magnitude(&sections, FS, f).log10()
    }

    #[test]
    fn a_curve_is_unity_at_1khz() {
        assert_relative_eq!(gain_db(WeightingCurve::A, 1000.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn a_curve_matches_tabulated_points() {
        // IEC 61672 table values. Warping from the bilinear transform is
        // negligible at the low end and grows toward Nyquist, hence the
        // loose high-frequency band.
        assert_relative_eq!(gain_db(WeightingCurve::A, 100.0), -19.1, epsilon = 0.3);
        let hf = gain_db(WeightingCurve::A, 10000.0);
        assert!((-6.0..=-1.5).contains(&hf), "10 kHz gain {hf} dB");
    }

    #[test]
    fn c_curve_is_flat_in_the_midband() {
        assert_relative_eq!(gain_db(WeightingCurve::C, 1000.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(gain_db(WeightingCurve::C, 400.0), 0.0, epsilon = 0.1);
        assert!(gain_db(WeightingCurve::C, 31.5) < -2.0);
    }

    #[test]
    fn z_weighting_is_identity() {
        let mut stage =
            FrequencyWeighting::new(&ctx(1, 8), "Z1".into(), Upstream::Bus, WeightingCurve::Z);
        let mut input = Block::new(1, 8);
        input
            .channel_mut(0)
            .copy_from_slice(&[0.1, -0.2, 0.3, -0.4, 0.5, -0.6, 0.7, -0.8]);
        stage.process(&input);
        assert_eq!(stage.output(), &input);
    }

    #[test]
    fn steady_state_init_suppresses_startup_transient() {
        // A-weighting of a constant signal is zero (zeros at DC). With
        // steady-state delay lines the first block must already sit there.
        let mut stage =
            FrequencyWeighting::new(&ctx(1, 256), "A1".into(), Upstream::Bus, WeightingCurve::A);
        let mut input = Block::new(1, 256);
        input.fill(1.0);
        stage.process(&input);
        let peak = stage
            .output()
            .channel(0)
            .iter()
            .fold(0.0_f64, |m, &s| m.max(s.abs()));
        assert!(peak < 1e-6, "startup transient peak {peak}");
    }

    #[test]
    fn blockwise_filtering_is_continuous() {
        // Filtering 4 blocks in sequence must equal filtering the
        // concatenated signal in one call.
        let blocksize = 64;
        let total = blocksize * 4;
        let signal: Vec<f64> = (0..total)
            .map(|n| (2.0 * PI * 440.0 * n as f64 / FS).sin())
            .collect();

        let mut whole =
            FrequencyWeighting::new(&ctx(1, total), "A1".into(), Upstream::Bus, WeightingCurve::A);
        let mut input = Block::new(1, total);
        input.channel_mut(0).copy_from_slice(&signal);
        whole.process(&input);
        let expected = whole.output().channel(0).to_vec();

        let mut stepped = FrequencyWeighting::new(
            &ctx(1, blocksize),
            "A1".into(),
            Upstream::Bus,
            WeightingCurve::A,
        );
        let mut got = Vec::with_capacity(total);
        for chunk in signal.chunks(blocksize) {
            let mut block = Block::new(1, blocksize);
            block.channel_mut(0).copy_from_slice(chunk);
            stepped.process(&block);
            got.extend_from_slice(stepped.output().channel(0));
        }

        for (e, g) in expected.iter().zip(&got) {
            assert_relative_eq!(e, g, epsilon = 1e-12);
        }
    }

    #[test]
    fn reset_restores_steady_state() {
        let mut stage =
            FrequencyWeighting::new(&ctx(1, 128), "A1".into(), Upstream::Bus, WeightingCurve::A);
        let mut tone = Block::new(1, 128);
        for (n, s) in tone.channel_mut(0).iter_mut().enumerate() {
            *s = (2.0 * PI * 1000.0 * n as f64 / FS).sin();
        }
        stage.process(&tone);
        stage.reset();

        assert!(stage.output().channel(0).iter().all(|&s| s == 0.0));

        // After reset the constant-input response is transient-free again.
        let mut constant = Block::new(1, 128);
        constant.fill(1.0);
        stage.process(&constant);
        let peak = stage
            .output()
            .channel(0)
            .iter()
            .fold(0.0_f64, |m, &s| m.max(s.abs()));
        assert!(peak < 1e-6);
    }
}

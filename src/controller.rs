//! Block sources.
//!
//! A controller supplies the stream parameters (samplerate, blocksize,
//! channel count, calibration sensitivity) and pull-based block reads.
//! End-of-stream is a distinguished return value, not an error, consumed
//! by the engine to terminate its loop normally.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use log::info;

use crate::block::Block;
use crate::error::{Result, SlmError};

/// Pull-based audio block source.
pub trait Controller {
    /// Stream samplerate in Hz.
    fn samplerate(&self) -> u32;

    /// Samples per block and channel.
    fn blocksize(&self) -> usize;

    /// Channel count of every delivered block.
    fn channels(&self) -> usize;

    /// Calibration scalar applied in decibel readouts.
    fn sensitivity(&self) -> f64;

    /// Read one block. `Ok(None)` signals end-of-stream; I/O faults are
    /// returned as errors and are the caller's responsibility to handle.
    fn read_block(&mut self) -> Result<Option<(Block, u64)>>;
}

/// File-backed controller reading WAV audio via `hound`.
///
/// Samples are converted to `f64` in the ±1.0 range and deinterleaved
/// into channels x blocksize blocks; the final partial block is
/// zero-padded. Block indices count from 0 and keep counting across
/// [`WavFileController::new_file`] swaps.
#[derive(Debug)]
pub struct WavFileController {
    path: PathBuf,
    samplerate: u32,
    blocksize: usize,
    channels: usize,
    sensitivity: f64,
    samples: Vec<f64>,
    cursor: usize,
    next_index: u64,
    done: bool,
}

impl WavFileController {
    /// Open a WAV file for block reading.
    pub fn open(path: impl AsRef<Path>, blocksize: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (samplerate, channels, samples) = read_wav(&path)?;
        info!(
            "opened '{}': {} Hz, {} channel(s), {} frame(s)",
            path.display(),
            samplerate,
            channels,
            samples.len() / channels
        );
        Ok(Self {
            path,
            samplerate,
            blocksize,
            channels,
            sensitivity: 1.0,
            samples,
            cursor: 0,
            next_index: 0,
            done: false,
        })
    }

    /// Set the calibration sensitivity applied to decibel readouts.
    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = sensitivity;
    }

    /// True once the stream has reported end-of-stream.
    pub fn done(&self) -> bool {
        self.done
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swap to another file once the current one is exhausted.
    ///
    /// The new file must match the stream parameters the engine was
    /// built against. Fails with [`SlmError::ControllerBusy`] while the
    /// current stream is unfinished.
    pub fn new_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if !self.done {
            return Err(SlmError::ControllerBusy);
        }
        let path = path.as_ref().to_path_buf();
        let (samplerate, channels, samples) = read_wav(&path)?;
        if samplerate != self.samplerate || channels != self.channels {
            return Err(SlmError::InvalidAudio {
                reason: format!(
                    "'{}' is {} Hz / {} ch, stream is {} Hz / {} ch",
                    path.display(),
                    samplerate,
                    channels,
                    self.samplerate,
                    self.channels
                ),
            });
        }
        self.path = path;
        self.samples = samples;
        self.cursor = 0;
        self.done = false;
        Ok(())
    }
}

impl Controller for WavFileController {
    fn samplerate(&self) -> u32 {
        self.samplerate
    }

    fn blocksize(&self) -> usize {
        self.blocksize
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    fn read_block(&mut self) -> Result<Option<(Block, u64)>> {
        let frame_count = self.samples.len() / self.channels;
        if self.cursor >= frame_count {
            self.done = true;
            return Ok(None);
        }

        let frames = (frame_count - self.cursor).min(self.blocksize);
        let mut block = Block::new(self.channels, self.blocksize);
        for ch in 0..self.channels {
            let out = block.channel_mut(ch);
            for n in 0..frames {
                out[n] = self.samples[(self.cursor + n) * self.channels + ch];
            }
        }
        self.cursor += frames;

        let index = self.next_index;
        self.next_index += 1;
        Ok(Some((block, index)))
    }
}

/// Read a whole WAV file as interleaved `f64` samples in ±1.0.
fn read_wav(path: &Path) -> Result<(u32, usize, Vec<f64>)> {
    let reader = WavReader::open(path).map_err(|e| SlmError::InvalidAudio {
        reason: format!("failed to open '{}': {}", path.display(), e),
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(SlmError::InvalidAudio {
            reason: format!("'{}' declares zero channels", path.display()),
        });
    }

    let samples = read_samples(reader, spec.bits_per_sample, spec.sample_format)?;
    Ok((spec.sample_rate, channels, samples))
}

fn read_samples(
    reader: WavReader<BufReader<File>>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f64>> {
    fn convert(e: hound::Error) -> SlmError {
        SlmError::InvalidAudio {
            reason: format!("failed to decode samples: {e}"),
        }
    }

    match sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from).map_err(convert))
            .collect(),
        SampleFormat::Int => {
            let scale = (1u64 << (bits_per_sample - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| f64::from(v) / scale).map_err(convert))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hound::{WavSpec, WavWriter};
    use tempfile::tempdir;

    fn write_wav(path: &Path, channels: u16, frames: usize) {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for n in 0..frames {
            for ch in 0..channels {
                // Distinct ramps per channel.
                let value = (n as i32 % 100) * (i32::from(ch) + 1) * 100;
                writer.write_sample(value as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn reads_blocks_and_signals_end_of_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 1, 250);

        let mut controller = WavFileController::open(&path, 100).unwrap();
        assert_eq!(controller.samplerate(), 8000);
        assert_eq!(controller.channels(), 1);

        let (block, index) = controller.read_block().unwrap().unwrap();
        assert_eq!(index, 0);
        assert_eq!(block.len(), 100);
        // 16-bit sample 100 scales to 100/32768.
        assert_relative_eq!(block.channel(0)[1], 100.0 / 32768.0, epsilon = 1e-12);

        let (_, index) = controller.read_block().unwrap().unwrap();
        assert_eq!(index, 1);

        // Final partial block is zero-padded.
        let (block, index) = controller.read_block().unwrap().unwrap();
        assert_eq!(index, 2);
        assert!(block.channel(0)[49] != 0.0);
        assert_eq!(block.channel(0)[50], 0.0);

        assert!(controller.read_block().unwrap().is_none());
        assert!(controller.done());
    }

    #[test]
    fn stereo_files_deinterleave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 64);

        let mut controller = WavFileController::open(&path, 64).unwrap();
        let (block, _) = controller.read_block().unwrap().unwrap();
        assert_eq!(block.channels(), 2);
        // Channel 1's ramp is twice channel 0's.
        assert_relative_eq!(block.channel(1)[3], 2.0 * block.channel(0)[3], epsilon = 1e-12);
    }

    #[test]
    fn new_file_requires_a_finished_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 1, 10);

        let mut controller = WavFileController::open(&path, 10).unwrap();
        assert!(matches!(
            controller.new_file(&path).unwrap_err(),
            SlmError::ControllerBusy
        ));

        controller.read_block().unwrap();
        assert!(controller.read_block().unwrap().is_none());

        controller.new_file(&path).unwrap();
        // Block indices keep counting across the swap.
        let (_, index) = controller.read_block().unwrap().unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn open_rejects_non_wav_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, b"not audio").unwrap();
        assert!(matches!(
            WavFileController::open(&path, 64).unwrap_err(),
            SlmError::InvalidAudio { .. }
        ));
    }
}

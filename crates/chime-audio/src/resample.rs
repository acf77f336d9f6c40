//! Converting assets to the output format, using rubato for sample rates.

use chime_core::{Error, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;

use crate::asset::SoundAsset;
use crate::backend::OutputFormat;

/// Frames fed to rubato per call.
const CHUNK_SIZE: usize = 1024;

/// Whether `asset` can be played on `format` without conversion.
pub fn matches(asset: &SoundAsset, format: OutputFormat) -> bool {
    asset.sample_rate() == format.sample_rate && asset.channels() == format.channels
}

/// Convert `asset` to the channel layout and sample rate of `format`.
pub fn conform(asset: &SoundAsset, format: OutputFormat) -> Result<SoundAsset> {
    let remapped = asset.with_channels(format.channels);
    if remapped.sample_rate() == format.sample_rate {
        return Ok(remapped);
    }

    let mut resampler = Resampler::new(
        remapped.sample_rate(),
        format.sample_rate,
        usize::from(format.channels),
    )?;
    let samples = resampler.process_all(remapped.samples())?;
    Ok(SoundAsset::new(samples, format.sample_rate, format.channels))
}

/// Whole-buffer resampler.
pub struct Resampler {
    #[allow(clippy::struct_field_names)]
    resampler: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
}

impl Resampler {
    /// Create a new resampler.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        let resampler = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_SIZE,
            2,
            channels,
        )
        .map_err(|e| Error::Resample(format!("Failed to create resampler: {e}")))?;

        debug!(
            "Resampler created: {}Hz -> {}Hz, {} channels",
            input_rate, output_rate, channels
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
        })
    }

    /// Check if resampling is needed.
    pub const fn needs_resampling(&self) -> bool {
        self.input_rate != self.output_rate
    }

    /// Resample a complete interleaved buffer.
    ///
    /// The filter delay is trimmed from the front and the result is cut to
    /// `input_frames * output_rate / input_rate` frames, so durations survive
    /// the conversion.
    pub fn process_all(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if !self.needs_resampling() {
            return Ok(input.to_vec());
        }

        let input_frames = input.len() / self.channels;
        let expected = usize::try_from(
            input_frames as u64 * u64::from(self.output_rate) / u64::from(self.input_rate),
        )
        .map_err(|e| Error::Resample(format!("Output too large: {e}")))?;
        let delay = self.resampler.output_delay();

        let planes = self.deinterleave(input);
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); self.channels];
        let mut position = 0;

        while output[0].len() < expected + delay {
            // Past the end of the input, zero chunks flush the filter.
            let chunk: Vec<Vec<f32>> = planes
                .iter()
                .map(|plane| {
                    let end = (position + CHUNK_SIZE).min(plane.len());
                    let mut data = plane[position.min(end)..end].to_vec();
                    data.resize(CHUNK_SIZE, 0.0);
                    data
                })
                .collect();
            position += CHUNK_SIZE;

            let resampled = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| Error::Resample(format!("Resample failed: {e}")))?;

            for (plane, data) in output.iter_mut().zip(resampled) {
                plane.extend(data);
            }
        }

        self.resampler.reset();
        Ok(self.interleave(&output, delay, expected))
    }

    /// Split interleaved samples into one buffer per channel.
    fn deinterleave(&self, input: &[f32]) -> Vec<Vec<f32>> {
        let frames = input.len() / self.channels;
        let mut planes = vec![Vec::with_capacity(frames); self.channels];

        for frame in input.chunks_exact(self.channels) {
            for (plane, sample) in planes.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }

        planes
    }

    /// Interleave `frames` frames starting at `skip`.
    fn interleave(&self, planes: &[Vec<f32>], skip: usize, frames: usize) -> Vec<f32> {
        let mut output = Vec::with_capacity(frames * self.channels);

        for frame in skip..skip + frames {
            for plane in planes {
                output.push(plane.get(frame).copied().unwrap_or(0.0));
            }
        }

        output
    }
}

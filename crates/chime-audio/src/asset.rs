//! Decoded audio assets.

use std::sync::Arc;
use std::time::Duration;

/// A decoded sound, ready for playback.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]`. The sample storage is shared,
/// so cloning an asset is cheap and every clone plays the same data.
#[derive(Debug, Clone)]
pub struct SoundAsset {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl SoundAsset {
    /// Create an asset from interleaved samples.
    ///
    /// A trailing partial frame is dropped. Zero channels or a zero sample rate
    /// are clamped to one so that duration math stays defined.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % usize::from(channels);
        samples.truncate(whole);

        Self {
            samples: samples.into(),
            sample_rate: sample_rate.max(1),
            channels,
        }
    }

    /// A silent asset of the given length.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn silence(duration: Duration, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration.as_secs_f64() * f64::from(sample_rate.max(1))).round() as usize;
        Self::new(
            vec![0.0; frames * usize::from(channels.max(1))],
            sample_rate,
            channels,
        )
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample storage.
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    /// Get the sample rate.
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels.
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    /// Playback length at the native sample rate, truncated to whole nanoseconds.
    pub fn duration(&self) -> Duration {
        let nanos = self.frames() as u128 * 1_000_000_000 / u128::from(self.sample_rate);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Remap the channel layout.
    ///
    /// Mono is duplicated to every output channel, anything mixed down to mono
    /// is averaged, and other layouts keep the leading channels (padding with
    /// silence when widening).
    #[allow(clippy::cast_precision_loss)]
    pub fn with_channels(&self, channels: u16) -> Self {
        let channels = channels.max(1);
        if channels == self.channels {
            return self.clone();
        }

        let src = usize::from(self.channels);
        let dst = usize::from(channels);
        let mut output = Vec::with_capacity(self.frames() * dst);

        for frame in self.samples.chunks_exact(src) {
            if src == 1 {
                output.extend(std::iter::repeat(frame[0]).take(dst));
            } else if dst == 1 {
                output.push(frame.iter().sum::<f32>() / src as f32);
            } else {
                for ch in 0..dst {
                    output.push(frame.get(ch).copied().unwrap_or(0.0));
                }
            }
        }

        Self::new(output, self.sample_rate, channels)
    }
}

impl AsRef<Self> for SoundAsset {
    fn as_ref(&self) -> &Self {
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let asset = SoundAsset::new(vec![0.0; 48000 * 2], 48000, 2);
        assert_eq!(asset.frames(), 48000);
        assert_eq!(asset.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_silence_length() {
        let asset = SoundAsset::silence(Duration::from_millis(300), 1000, 1);
        assert_eq!(asset.frames(), 300);
        assert_eq!(asset.duration(), Duration::from_millis(300));
    }

    #[test]
    fn test_partial_frame_dropped() {
        let asset = SoundAsset::new(vec![0.1, 0.2, 0.3], 8000, 2);
        assert_eq!(asset.samples().len(), 2);
        assert_eq!(asset.frames(), 1);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_mono_to_stereo() {
        let asset = SoundAsset::new(vec![0.25, -0.5], 8000, 1);
        let stereo = asset.with_channels(2);
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.samples(), &[0.25, 0.25, -0.5, -0.5]);
        assert_eq!(stereo.duration(), asset.duration());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_stereo_to_mono() {
        let asset = SoundAsset::new(vec![1.0, 0.0, 0.5, 0.5], 8000, 2);
        let mono = asset.with_channels(1);
        assert_eq!(mono.samples(), &[0.5, 0.5]);
    }

    #[test]
    fn test_clone_shares_samples() {
        let asset = SoundAsset::new(vec![0.0; 16], 8000, 2);
        let copy = asset.clone();
        assert!(Arc::ptr_eq(&asset.shared_samples(), &copy.shared_samples()));
    }
}

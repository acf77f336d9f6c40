//! Audio decoding using symphonia.

use std::io::Cursor;

use bytes::Bytes;
use chime_core::LoadError;
use symphonia::core::{
    audio::AudioBufferRef,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, warn};

use crate::asset::SoundAsset;

/// Turns raw resource bytes into a playable asset.
pub trait Decoder: Send + Sync {
    /// Decode a complete resource. `extension` is a format hint such as `"wav"`.
    fn decode(&self, data: Bytes, extension: Option<&str>) -> Result<SoundAsset, LoadError>;
}

/// Decoder for every format symphonia supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl Decoder for SymphoniaDecoder {
    fn decode(&self, data: Bytes, extension: Option<&str>) -> Result<SoundAsset, LoadError> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(data)),
            MediaSourceStreamOptions::default(),
        );

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| LoadError::Decode(format!("Failed to probe format: {e}")))?;

        let mut format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LoadError::Decode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48000);
        #[allow(clippy::cast_possible_truncation)]
        let mut channels = track.codec_params.channels.map_or(2, |c| c.count() as u16);

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}",
            track_id, sample_rate, channels
        );

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(format!("Failed to create decoder: {e}")))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break; // End of stream
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    return Err(LoadError::Decode(format!("Failed to read packet: {e}")));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = decoded.spec();
                    sample_rate = spec.rate;
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        channels = spec.channels.count() as u16;
                    }
                    append_interleaved(&decoded, &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Log and skip corrupt frames
                    warn!("Decode error (skipping): {e}");
                }
                Err(e) => {
                    return Err(LoadError::Decode(format!("Decode failed: {e}")));
                }
            }
        }

        if samples.is_empty() {
            return Err(LoadError::Decode("Stream contains no audio".to_string()));
        }

        let asset = SoundAsset::new(samples, sample_rate, channels);
        debug!(
            "Decoded {} frames ({:?})",
            asset.frames(),
            asset.duration()
        );
        Ok(asset)
    }
}

/// Append an `AudioBuffer` to `output` as interleaved f32 samples.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn append_interleaved(buffer: &AudioBufferRef<'_>, output: &mut Vec<f32>) {
    match buffer {
        AudioBufferRef::F32(buf) => interleave(buf.planes().planes(), output, |s| s),
        AudioBufferRef::F64(buf) => interleave(buf.planes().planes(), output, |s| s as f32),
        AudioBufferRef::S32(buf) => {
            interleave(buf.planes().planes(), output, |s| s as f32 / i32::MAX as f32);
        }
        AudioBufferRef::S16(buf) => {
            interleave(buf.planes().planes(), output, |s| {
                f32::from(s) / f32::from(i16::MAX)
            });
        }
        AudioBufferRef::U8(buf) => {
            interleave(buf.planes().planes(), output, |s| {
                (f32::from(s) - 128.0) / 128.0
            });
        }
        _ => warn!("Unsupported sample format, skipping packet"),
    }
}

fn interleave<T: Copy>(planes: &[&[T]], output: &mut Vec<f32>, convert: impl Fn(T) -> f32) {
    let Some(first) = planes.first() else {
        return;
    };

    let frames = first.len();
    output.reserve(frames * planes.len());

    for frame in 0..frames {
        for plane in planes {
            output.push(convert(plane[frame]));
        }
    }
}

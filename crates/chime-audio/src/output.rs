//! Audio output using cpal.

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use chime_core::{Error, OutputConfig, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, SampleFormat, Stream, StreamConfig, StreamError,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::asset::SoundAsset;
use crate::backend::{Backend, OutputFormat};
use crate::mixer::{Mixer, VoiceGuard};
use crate::resample;

/// Running output stream, owned by the output thread.
struct ActiveOutput {
    mixer: Arc<Mixer>,
    format: OutputFormat,
    device_name: String,
    /// Dropping this ends the output thread and closes the stream.
    _shutdown: Sender<()>,
}

/// Backend playing through the system audio device.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread for
/// as long as the backend does. All playing sounds are summed by one mixer.
pub struct CpalBackend {
    config: OutputConfig,
    output: RwLock<Option<ActiveOutput>>,
}

impl CpalBackend {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config,
            output: RwLock::new(None),
        }
    }

    /// Number of sounds currently being mixed.
    pub fn active_voices(&self) -> usize {
        self.output.read().as_ref().map_or(0, |o| o.mixer.active())
    }

    fn mixer(&self) -> Result<(Arc<Mixer>, OutputFormat)> {
        let output = self.output.read();
        let output = output.as_ref().ok_or(Error::NotInitialized)?;
        if output.mixer.has_failed() {
            return Err(Error::AudioOutput("output stream failed".into()));
        }
        Ok((Arc::clone(&output.mixer), output.format))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

#[async_trait]
impl Backend for CpalBackend {
    async fn init(&self) -> Result<()> {
        if let Some(output) = self.output.read().as_ref() {
            if !output.mixer.has_failed() {
                return Ok(());
            }
            warn!("Output stream failed earlier, reopening device");
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let config = self.config.clone();

        thread::Builder::new()
            .name("chime-output".to_string())
            .spawn(move || run_output_thread(&config, ready_tx, &shutdown_rx))
            .map_err(|e| Error::Initialization(format!("Failed to spawn output thread: {e}")))?;

        let (mixer, format, device_name) = ready_rx
            .await
            .map_err(|_| Error::Initialization("Output thread exited during startup".into()))??;

        info!(
            "Audio output initialized: {} Hz, {} channels, device: {}",
            format.sample_rate, format.channels, device_name
        );

        *self.output.write() = Some(ActiveOutput {
            mixer,
            format,
            device_name,
            _shutdown: shutdown_tx,
        });
        Ok(())
    }

    async fn play_to_completion(&self, asset: &SoundAsset) -> Result<()> {
        let (mixer, format) = self.mixer()?;

        let samples = if resample::matches(asset, format) {
            asset.shared_samples()
        } else {
            debug!(
                "Converting {} Hz/{} ch asset for output",
                asset.sample_rate(),
                asset.channels()
            );
            let asset = asset.clone();
            tokio::task::spawn_blocking(move || resample::conform(&asset, format))
                .await
                .map_err(|e| Error::Internal(format!("Conversion task failed: {e}")))??
                .shared_samples()
        };

        let voice = mixer.add(samples);
        let _guard = VoiceGuard::new(Arc::clone(&voice));
        voice.finished().await;

        if mixer.has_failed() && !voice.is_exhausted() {
            return Err(Error::AudioOutput("output stream failed during playback".into()));
        }
        Ok(())
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.output.read().as_ref().map(|o| o.format)
    }
}

type Ready = Result<(Arc<Mixer>, OutputFormat, String)>;

fn run_output_thread(
    config: &OutputConfig,
    ready: oneshot::Sender<Ready>,
    shutdown: &Receiver<()>,
) {
    match open_stream(config) {
        Ok((stream, mixer, format, device_name)) => {
            if ready.send(Ok((mixer, format, device_name))).is_err() {
                debug!("Backend dropped before output was ready");
                return;
            }
            // Blocks until the backend drops its sender.
            let _ = shutdown.recv();
            drop(stream);
            debug!("Output thread stopped");
        }
        Err(e) => {
            error!("Failed to initialize audio output: {e}");
            let _ = ready.send(Err(e));
        }
    }
}

fn open_stream(config: &OutputConfig) -> Result<(Stream, Arc<Mixer>, OutputFormat, String)> {
    let device = select_device(config.device.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported_config = device
        .default_output_config()
        .map_err(|e| Error::Initialization(format!("Failed to get output config: {e}")))?;

    debug!("Supported output config: {:?}", supported_config);

    let sample_format = supported_config.sample_format();
    let mut stream_config: StreamConfig = supported_config.into();
    if let Some(frames) = config.buffer_size {
        stream_config.buffer_size = BufferSize::Fixed(frames);
    }

    let format = OutputFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };
    let mixer = Arc::new(Mixer::new());

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, &mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, &mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, &mixer)?,
        _ => {
            return Err(Error::Initialization(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::Initialization(format!("Failed to start stream: {e}")))?;

    Ok((stream, mixer, format, device_name))
}

fn select_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Initialization("No output device found".to_string())),
        Some(wanted) => host
            .output_devices()
            .map_err(|e| Error::Initialization(format!("Failed to list devices: {e}")))?
            .find(|d| d.name().is_ok_and(|n| n == wanted))
            .ok_or_else(|| Error::Initialization(format!("Output device not found: {wanted}"))),
    }
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    mixer: &Arc<Mixer>,
) -> Result<Stream> {
    let render_mixer = Arc::clone(mixer);
    let error_mixer = Arc::clone(mixer);
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = move |err| on_stream_error(&error_mixer, &err);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                render_mixer.render(&mut scratch);
                for (sample, value) in data.iter_mut().zip(&scratch) {
                    *sample = T::from_sample(*value);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Initialization(format!("Failed to build stream: {e}")))
}

/// Only a lost device ends the output; other stream errors are transient.
fn on_stream_error(mixer: &Mixer, err: &StreamError) {
    match err {
        StreamError::DeviceNotAvailable => {
            error!("Audio device no longer available");
            mixer.fail();
        }
        _ => warn!("Audio stream error: {err}"),
    }
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

/// Get the default output device name.
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}

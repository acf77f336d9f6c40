//! Playback backends.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chime_core::{Error, Result};
use tracing::{debug, info};

use crate::asset::SoundAsset;

/// Sample layout produced by an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Performs the actual sound output for a sound system.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Prepare the backend. Must succeed before any playback.
    async fn init(&self) -> Result<()>;

    /// Play `asset` from start to end.
    ///
    /// Resolves when the sound has finished. Dropping the future stops the
    /// sound, which is how playback tasks are cancelled.
    async fn play_to_completion(&self, asset: &SoundAsset) -> Result<()>;

    /// Format assets are converted to before playback, once known.
    fn output_format(&self) -> Option<OutputFormat> {
        None
    }
}

/// Backend without an output device.
///
/// Playback waits for the asset's duration on the tokio timer, so channels
/// behave exactly as with real output. Useful headless and in tests.
#[derive(Debug, Default)]
pub struct SilentBackend {
    initialized: AtomicBool,
    fail_init: AtomicBool,
    plays: AtomicUsize,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `init` calls fail, simulating a missing device.
    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }

    /// Number of playbacks started so far.
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for SilentBackend {
    async fn init(&self) -> Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(Error::Initialization("silent backend unavailable".into()));
        }
        if !self.initialized.swap(true, Ordering::SeqCst) {
            info!("Silent audio backend initialized");
        }
        Ok(())
    }

    async fn play_to_completion(&self, asset: &SoundAsset) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        self.plays.fetch_add(1, Ordering::SeqCst);
        debug!("Silently playing {:?}", asset.duration());
        tokio::time::sleep(asset.duration()).await;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_silent_playback_takes_asset_duration() {
        let backend = SilentBackend::new();
        backend.init().await.unwrap();

        let asset = SoundAsset::silence(Duration::from_millis(250), 1000, 1);
        let start = Instant::now();
        backend.play_to_completion(&asset).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(250));
        assert_eq!(backend.plays(), 1);
    }

    #[tokio::test]
    async fn test_play_before_init_fails() {
        let backend = SilentBackend::new();
        let asset = SoundAsset::silence(Duration::from_millis(10), 1000, 1);
        assert!(matches!(
            backend.play_to_completion(&asset).await,
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_init_failure_is_retryable() {
        let backend = SilentBackend::new();
        backend.set_fail_init(true);
        let err = backend.init().await.unwrap_err();
        assert!(err.is_retryable());

        backend.set_fail_init(false);
        assert!(backend.init().await.is_ok());
        assert!(backend.is_initialized());
    }
}

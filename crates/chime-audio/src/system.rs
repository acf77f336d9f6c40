//! The per-context sound system.
//!
//! A [`SoundSystem`] owns the playback backend and a registry of every playing
//! channel's task. Channels register on `play` and deregister on completion or
//! `stop`; `close` cancels whatever is left. Registry access is guarded by a
//! mutex that is never held across an `.await`, so the system is correct on
//! multi-threaded runtimes as well as on a single-threaded loop.
//!
//! Lock order is channel state, then registry. `close` drains the registry
//! before it touches any channel, so the order is never inverted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chime_core::{Error, Result, SoundConfig};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::asset::SoundAsset;
use crate::backend::Backend;
use crate::channel::{ChannelShared, SoundChannel};
use crate::clock::{Clock, TokioClock};
use crate::decode::{Decoder, SymphoniaDecoder};
use crate::output::CpalBackend;
use crate::task::{Scheduler, TaskHandle, TaskId};

/// A playing channel's entry in the registry.
struct Registration {
    task: TaskHandle,
    channel: Weak<ChannelShared>,
}

struct SystemInner {
    backend: Arc<dyn Backend>,
    decoder: Arc<dyn Decoder>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    config: SoundConfig,
    initialized: AtomicBool,
    registry: Mutex<HashMap<TaskId, Registration>>,
}

/// Registry of live playback tasks and factory for channels.
///
/// Cloning yields another handle to the same system. The owning context keeps
/// one and passes it explicitly to whatever needs to play sounds.
#[derive(Clone)]
pub struct SoundSystem {
    inner: Arc<SystemInner>,
}

impl SoundSystem {
    /// Start building a sound system.
    pub fn builder() -> SoundSystemBuilder {
        SoundSystemBuilder::default()
    }

    /// Sound system on the current tokio runtime with default settings.
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self> {
        Self::builder().backend(backend).build()
    }

    /// Prepare the backend.
    ///
    /// Must complete before sounds are played. On failure the system stays
    /// unusable and `init` may be called again.
    pub async fn init(&self) -> Result<()> {
        match self.inner.backend.init().await {
            Ok(()) => {
                if !self.inner.initialized.swap(true, Ordering::SeqCst) {
                    info!("Sound system initialized");
                }
                Ok(())
            }
            Err(e) => {
                warn!("Sound system initialization failed: {e}");
                Err(match e {
                    Error::Initialization(_) => e,
                    other => Error::Initialization(other.to_string()),
                })
            }
        }
    }

    /// Call [`init`](Self::init) up to `config.init_attempts` times.
    pub async fn init_with_retry(&self) -> Result<()> {
        let attempts = self.inner.config.init_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.init().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    debug!("Init attempt {attempt}/{attempts} failed, retrying");
                    tokio::time::sleep(self.inner.config.init_retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Play a sound on a new channel.
    ///
    /// The channel is returned even when it did not start (disabled channels).
    pub fn play(&self, sound: impl AsRef<SoundAsset>) -> SoundChannel {
        let channel = self.create_channel();
        channel.play(sound);
        channel
    }

    /// Allocate an idle channel. Nothing is registered until it plays.
    pub fn create_channel(&self) -> SoundChannel {
        SoundChannel::new(self.clone(), self.inner.config.channels_enabled)
    }

    /// Cancel every playing channel and empty the registry.
    ///
    /// Channels report idle as soon as this returns, while the backend may take
    /// a little longer to go quiet. Calling it again is a no-op.
    pub fn close(&self) {
        let drained: Vec<(TaskId, Registration)> = self.inner.registry.lock().drain().collect();
        if drained.is_empty() {
            return;
        }

        info!("Closing sound system, cancelling {} playbacks", drained.len());
        for (id, registration) in drained {
            registration.task.cancel();
            if let Some(channel) = registration.channel.upgrade() {
                SoundChannel::from_shared(channel).retire(id);
            }
        }
    }

    /// Number of channels currently playing.
    pub fn active_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Whether the task is registered as playing.
    pub fn is_active(&self, id: TaskId) -> bool {
        self.inner.registry.lock().contains_key(&id)
    }

    pub fn config(&self) -> &SoundConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn decoder(&self) -> &Arc<dyn Decoder> {
        &self.inner.decoder
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn register(&self, task: TaskHandle, channel: Weak<ChannelShared>) {
        let id = task.id();
        self.inner
            .registry
            .lock()
            .insert(id, Registration { task, channel });
    }

    pub(crate) fn unregister(&self, id: TaskId) {
        self.inner.registry.lock().remove(&id);
    }
}

/// Builder for [`SoundSystem`].
///
/// Unset collaborators default to the cpal backend, the symphonia decoder, the
/// tokio clock and the current runtime.
#[derive(Default)]
pub struct SoundSystemBuilder {
    backend: Option<Arc<dyn Backend>>,
    decoder: Option<Arc<dyn Decoder>>,
    clock: Option<Arc<dyn Clock>>,
    scheduler: Option<Scheduler>,
    config: Option<SoundConfig>,
}

impl SoundSystemBuilder {
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn config(mut self, config: SoundConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<SoundSystem> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Scheduler::current()?,
        };
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(CpalBackend::new(config.output.clone())));

        Ok(SoundSystem {
            inner: Arc::new(SystemInner {
                backend,
                decoder: self.decoder.unwrap_or_else(|| Arc::new(SymphoniaDecoder)),
                clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock)),
                scheduler,
                config,
                initialized: AtomicBool::new(false),
                registry: Mutex::new(HashMap::new()),
            }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::SilentBackend;
    use std::time::Duration;

    async fn silent_system() -> (SoundSystem, Arc<SilentBackend>) {
        let backend = Arc::new(SilentBackend::new());
        let system = SoundSystem::new(backend.clone()).unwrap();
        system.init().await.unwrap();
        (system, backend)
    }

    fn asset(millis: u64) -> SoundAsset {
        SoundAsset::silence(Duration::from_millis(millis), 1000, 1)
    }

    #[tokio::test]
    async fn test_create_channel_is_pure() {
        let (system, backend) = silent_system().await;
        let channel = system.create_channel();
        assert!(!channel.is_playing());
        assert!(channel.is_enabled());
        assert_eq!(system.active_count(), 0);
        assert_eq!(backend.plays(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_registers_and_completion_unregisters() {
        let (system, _backend) = silent_system().await;
        let channel = system.play(&asset(200));
        let id = channel.task_id().unwrap();

        assert!(channel.is_playing());
        assert!(system.is_active(id));

        channel.wait().await;
        assert!(!channel.is_playing());
        assert!(!system.is_active(id));
        assert_eq!(system.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_all_channels() {
        let (system, _backend) = silent_system().await;
        let channels: Vec<SoundChannel> = (0..3).map(|_| system.play(&asset(300))).collect();
        assert_eq!(system.active_count(), 3);
        assert!(channels.iter().all(SoundChannel::is_playing));

        system.close();

        assert_eq!(system.active_count(), 0);
        for channel in &channels {
            assert!(!channel.is_playing());
            assert_eq!(channel.length(), Duration::ZERO);
            assert_eq!(channel.remaining(), Duration::ZERO);
            channel.wait().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_aborts_playback_tasks() {
        let (system, _backend) = silent_system().await;
        let channels: Vec<SoundChannel> = (0..3).map(|_| system.play(&asset(300))).collect();
        let tasks: Vec<_> = channels
            .iter()
            .map(|c| c.current_task().unwrap())
            .collect();

        let start = tokio::time::Instant::now();
        system.close();
        for task in &tasks {
            task.wait().await;
            assert!(task.is_finished());
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (system, _backend) = silent_system().await;
        system.close();
        system.close();
        assert_eq!(system.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_after_close() {
        let (system, _backend) = silent_system().await;
        system.play(&asset(100));
        system.close();

        let channel = system.play(&asset(100));
        assert!(channel.is_playing());
        assert_eq!(system.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_channels_from_config() {
        let backend = Arc::new(SilentBackend::new());
        let system = SoundSystem::builder()
            .backend(backend)
            .config(SoundConfig {
                channels_enabled: false,
                ..SoundConfig::default()
            })
            .build()
            .unwrap();
        system.init().await.unwrap();

        let channel = system.play(&asset(100));
        assert!(!channel.is_enabled());
        assert!(!channel.is_playing());
        assert_eq!(system.active_count(), 0);
    }

    #[tokio::test]
    async fn test_init_failure_then_retry() {
        let backend = Arc::new(SilentBackend::new());
        backend.set_fail_init(true);
        let system = SoundSystem::new(backend.clone()).unwrap();

        let err = system.init().await.unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
        assert!(!system.is_initialized());

        backend.set_fail_init(false);
        system.init().await.unwrap();
        assert!(system.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_with_retry_gives_up() {
        let backend = Arc::new(SilentBackend::new());
        backend.set_fail_init(true);
        let system = SoundSystem::new(backend).unwrap();

        assert!(system.init_with_retry().await.is_err());
        assert!(!system.is_initialized());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_before_init_retires_channel() {
        let backend = Arc::new(SilentBackend::new());
        let system = SoundSystem::new(backend).unwrap();

        let channel = system.play(&asset(500));
        assert!(channel.is_playing());

        channel.wait().await;
        assert!(!channel.is_playing());
        assert_eq!(system.active_count(), 0);
    }

    #[test]
    fn test_build_without_runtime() {
        let result = SoundSystem::new(Arc::new(SilentBackend::new()));
        assert!(matches!(result, Err(Error::Initialization(_))));
    }
}

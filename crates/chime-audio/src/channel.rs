//! Playback channels.
//!
//! A [`SoundChannel`] is one playback session: `play` starts a task that
//! drives the backend until the sound ends, `stop` cancels it. Position and
//! remaining time are computed from the clock on demand; nothing polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::asset::SoundAsset;
use crate::system::SoundSystem;
use crate::task::{TaskHandle, TaskId};

/// The active playback of a channel.
struct Session {
    task: TaskHandle,
    started_at: Instant,
    length: Duration,
}

enum ChannelState {
    Idle,
    Playing(Session),
}

pub(crate) struct ChannelShared {
    system: SoundSystem,
    enabled: AtomicBool,
    state: Mutex<ChannelState>,
}

/// A single playback session bound to a sound system.
///
/// Clones share the same session. A channel may be played again; the previous
/// playback is always stopped before the new one starts, so a channel never has
/// more than one live task.
#[derive(Clone)]
pub struct SoundChannel {
    shared: Arc<ChannelShared>,
}

impl SoundChannel {
    pub(crate) fn new(system: SoundSystem, enabled: bool) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                system,
                enabled: AtomicBool::new(enabled),
                state: Mutex::new(ChannelState::Idle),
            }),
        }
    }

    pub(crate) const fn from_shared(shared: Arc<ChannelShared>) -> Self {
        Self { shared }
    }

    /// Start playing `sound`, replacing whatever this channel was playing.
    ///
    /// Does nothing while the channel is disabled.
    pub fn play(&self, sound: impl AsRef<SoundAsset>) -> &Self {
        if !self.is_enabled() {
            debug!("Channel disabled, ignoring play");
            return self;
        }

        let system = &self.shared.system;
        if !system.is_initialized() {
            warn!("Playing before the sound system is initialized");
        }

        let asset = sound.as_ref().clone();
        let mut state = self.shared.state.lock();
        self.retire_locked(&mut state);

        let id = TaskId::next();
        let started_at = system.clock().now();
        let length = asset.duration();
        let backend = Arc::clone(system.backend());
        let channel = self.clone();

        let task = system.scheduler().spawn(id, async move {
            if let Err(e) = backend.play_to_completion(&asset).await {
                warn!("Playback of {id} ended early: {e}");
            }
            channel.finish(id);
        });

        debug!("Started {id} ({length:?})");
        system.register(task.clone(), Arc::downgrade(&self.shared));
        *state = ChannelState::Playing(Session {
            task,
            started_at,
            length,
        });
        self
    }

    /// Stop playback.
    ///
    /// The channel is idle and deregistered when this returns; the backend
    /// stops producing sound shortly after. Does nothing on an idle channel.
    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        self.retire_locked(&mut state);
    }

    /// Wait for the current playback to end, naturally or by cancellation.
    ///
    /// Returns immediately on an idle channel.
    pub async fn wait(&self) {
        if let Some(task) = self.current_task() {
            task.wait().await;
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(*self.shared.state.lock(), ChannelState::Playing(_))
    }

    /// Time since playback started, zero when idle.
    pub fn position(&self) -> Duration {
        match &*self.shared.state.lock() {
            ChannelState::Playing(session) => self.elapsed(session),
            ChannelState::Idle => Duration::ZERO,
        }
    }

    /// Time until the sound ends, never negative.
    pub fn remaining(&self) -> Duration {
        match &*self.shared.state.lock() {
            ChannelState::Playing(session) => session.length.saturating_sub(self.elapsed(session)),
            ChannelState::Idle => Duration::ZERO,
        }
    }

    /// Length of the sound being played, zero when idle.
    pub fn length(&self) -> Duration {
        match &*self.shared.state.lock() {
            ChannelState::Playing(session) => session.length,
            ChannelState::Idle => Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Gate future `play` calls. A sound already playing keeps playing.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Id of the live task, if playing.
    pub fn task_id(&self) -> Option<TaskId> {
        self.current_task().map(|task| task.id())
    }

    pub fn system(&self) -> &SoundSystem {
        &self.shared.system
    }

    /// Return to idle if `id` is still the live task. Used by `close`, which
    /// has already removed the registration and cancelled the task.
    pub(crate) fn retire(&self, id: TaskId) {
        let mut state = self.shared.state.lock();
        if Self::is_current(&state, id) {
            *state = ChannelState::Idle;
        }
    }

    /// Completion path of a playback task.
    fn finish(&self, id: TaskId) {
        let mut state = self.shared.state.lock();
        if Self::is_current(&state, id) {
            trace!("{id} finished");
            *state = ChannelState::Idle;
        }
        self.shared.system.unregister(id);
    }

    /// Stop the live task, if any. Caller holds the state lock.
    fn retire_locked(&self, state: &mut ChannelState) {
        if let ChannelState::Playing(session) = std::mem::replace(state, ChannelState::Idle) {
            let id = session.task.id();
            self.shared.system.unregister(id);
            session.task.cancel();
            debug!("Stopped {id}");
        }
    }

    pub(crate) fn current_task(&self) -> Option<TaskHandle> {
        match &*self.shared.state.lock() {
            ChannelState::Playing(session) => Some(session.task.clone()),
            ChannelState::Idle => None,
        }
    }

    fn is_current(state: &ChannelState, id: TaskId) -> bool {
        matches!(state, ChannelState::Playing(session) if session.task.id() == id)
    }

    fn elapsed(&self, session: &Session) -> Duration {
        self.shared
            .system
            .clock()
            .now()
            .saturating_duration_since(session.started_at)
    }
}

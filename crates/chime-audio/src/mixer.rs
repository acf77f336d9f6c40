//! Voice mixer feeding the output device.
//!
//! Every sound being played is a [`Voice`]. The output callback sums all
//! voices into the device buffer and signals each voice once its samples are
//! exhausted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

/// One sound being played by the mixer.
pub struct Voice {
    samples: Arc<[f32]>,
    /// Next sample to read.
    cursor: AtomicUsize,
    /// Set when the owner no longer wants output.
    stopped: AtomicBool,
    finished: Notify,
}

impl Voice {
    fn new(samples: Arc<[f32]>) -> Self {
        Self {
            samples,
            cursor: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            finished: Notify::new(),
        }
    }

    /// Stop contributing to the output. Takes effect on the next callback.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Whether every sample has been rendered.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.load(Ordering::Acquire) >= self.samples.len()
    }

    /// Wait until the voice has been fully rendered or the mixer failed.
    ///
    /// A wake-up issued before this is awaited is not lost.
    pub async fn finished(&self) {
        self.finished.notified().await;
    }
}

/// Stops its voice when dropped, so an abandoned playback goes quiet.
pub struct VoiceGuard(Arc<Voice>);

impl VoiceGuard {
    pub const fn new(voice: Arc<Voice>) -> Self {
        Self(voice)
    }
}

impl Drop for VoiceGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Sums active voices into interleaved output buffers.
#[derive(Default)]
pub struct Mixer {
    voices: Mutex<Vec<Arc<Voice>>>,
    failed: AtomicBool,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playing interleaved samples laid out for this mixer.
    pub fn add(&self, samples: Arc<[f32]>) -> Arc<Voice> {
        let voice = Arc::new(Voice::new(samples));
        let mut voices = self.voices.lock();
        if self.has_failed() {
            voice.finished.notify_one();
        } else {
            voices.push(Arc::clone(&voice));
        }
        voice
    }

    /// Number of voices still attached.
    pub fn active(&self) -> usize {
        self.voices.lock().len()
    }

    /// Whether the output stream reported an error.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Mark the output as dead and release every waiting voice.
    pub fn fail(&self) {
        self.failed.store(true, Ordering::Release);
        for voice in self.voices.lock().drain(..) {
            voice.finished.notify_one();
        }
    }

    /// Fill `out` with the sum of all voices, retiring finished ones.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let mut voices = self.voices.lock();
        voices.retain(|voice| {
            if voice.is_stopped() {
                trace!("Dropping stopped voice");
                return false;
            }

            let start = voice.cursor.load(Ordering::Acquire);
            let end = (start + out.len()).min(voice.samples.len());
            for (dst, src) in out.iter_mut().zip(&voice.samples[start.min(end)..end]) {
                *dst += *src;
            }
            voice.cursor.store(end, Ordering::Release);

            if end >= voice.samples.len() {
                voice.finished.notify_one();
                return false;
            }
            true
        });
        drop(voices);

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

//! Application context owning the sound system.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chime_audio::{
    Backend, CpalBackend, DirResolver, SilentBackend, SoundChannel, SoundFile, SoundSystem,
};
use chime_core::SoundConfig;
use tracing::{info, warn};

/// How a run is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub stop_after: Option<Duration>,
    pub progress_interval: Duration,
}

/// Application context.
///
/// Holds the one sound system of the process, created by `start` and closed
/// by `teardown`.
pub struct App {
    config: SoundConfig,
    sound: Option<SoundSystem>,
}

impl App {
    pub const fn new(config: SoundConfig) -> Self {
        Self {
            config,
            sound: None,
        }
    }

    pub const fn sound(&self) -> Option<&SoundSystem> {
        self.sound.as_ref()
    }

    /// Create and initialize the sound system.
    pub async fn start(&mut self, silent: bool) -> Result<()> {
        let backend: Arc<dyn Backend> = if silent {
            Arc::new(SilentBackend::new())
        } else {
            Arc::new(CpalBackend::new(self.config.output.clone()))
        };

        let system = SoundSystem::builder()
            .backend(backend)
            .config(self.config.clone())
            .build()?;
        system.init_with_retry().await?;

        self.sound = Some(system);
        Ok(())
    }

    /// Play every file at once and report progress until all have ended.
    pub async fn run(&self, files: &[String], options: RunOptions) -> Result<()> {
        let system = self.sound.as_ref().context("Sound system not started")?;
        let resolver = DirResolver::new(&self.config.resource_root);

        let mut playing: Vec<(String, SoundChannel)> = Vec::with_capacity(files.len());
        for path in files {
            let file = SoundFile::load(path, &resolver, system)
                .await
                .with_context(|| format!("Failed to load {path}"))?;
            playing.push((path.clone(), file.play()));
        }

        let deadline = options.stop_after.map(|after| tokio::time::Instant::now() + after);
        let mut ticker = tokio::time::interval(options.progress_interval);

        loop {
            if playing.iter().all(|(_, channel)| !channel.is_playing()) {
                info!("All sounds finished");
                return Ok(());
            }

            tokio::select! {
                _ = ticker.tick() => report(&playing),
                () = sleep_until(deadline) => {
                    info!("Stopping after {:?}", options.stop_after.unwrap_or_default());
                    for (_, channel) in &playing {
                        channel.stop();
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {e}");
                    }
                    info!("Interrupted");
                    system.close();
                }
            }
        }
    }

    /// Cancel everything still playing and release the sound system.
    pub fn teardown(&mut self) {
        if let Some(system) = self.sound.take() {
            system.close();
        }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn report(playing: &[(String, SoundChannel)]) {
    for (path, channel) in playing.iter().filter(|(_, c)| c.is_playing()) {
        info!(
            "{path}: {} / {} ({} left)",
            format_duration(channel.position()),
            format_duration(channel.length()),
            format_duration(channel.remaining())
        );
    }
}

/// Format as seconds with millisecond precision, e.g. `1.250s`.
fn format_duration(duration: Duration) -> String {
    format!("{}.{:03}s", duration.as_secs(), duration.subsec_millis())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1250)), "1.250s");
        assert_eq!(format_duration(Duration::ZERO), "0.000s");
    }

    #[tokio::test]
    async fn test_start_and_teardown() {
        let mut app = App::new(SoundConfig::default());
        assert!(app.sound().is_none());

        app.start(true).await.unwrap();
        let system = app.sound().unwrap().clone();
        assert!(system.is_initialized());

        app.teardown();
        assert!(app.sound().is_none());
        app.teardown();
    }

    #[tokio::test]
    async fn test_run_without_start() {
        let app = App::new(SoundConfig::default());
        let options = RunOptions {
            stop_after: None,
            progress_interval: Duration::from_millis(50),
        };
        assert!(app.run(&[], options).await.is_err());
    }

    #[tokio::test]
    async fn test_run_missing_file() {
        let mut app = App::new(SoundConfig {
            resource_root: std::env::temp_dir().join("chime-missing-root"),
            ..SoundConfig::default()
        });
        app.start(true).await.unwrap();

        let options = RunOptions {
            stop_after: None,
            progress_interval: Duration::from_millis(50),
        };
        let files = vec!["nothing-here.wav".to_string()];
        assert!(app.run(&files, options).await.is_err());
        app.teardown();
    }

    /// Write a silent 16-bit mono WAV of `millis` at 8 kHz.
    fn write_wav(dir: &std::path::Path, name: &str, millis: u32) {
        let frames = millis * 8;
        let data_len = frames * 2;

        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&16000u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(44 + data_len as usize, 0);
        std::fs::write(dir.join(name), out).unwrap();
    }

    async fn started_app(root: &std::path::Path) -> App {
        let mut app = App::new(SoundConfig {
            resource_root: root.to_path_buf(),
            ..SoundConfig::default()
        });
        app.start(true).await.unwrap();
        app
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_plays_until_longest_sound_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(dir.path(), "short.wav", 100);
        write_wav(dir.path(), "long.wav", 300);
        let mut app = started_app(dir.path()).await;

        let options = RunOptions {
            stop_after: None,
            progress_interval: Duration::from_millis(50),
        };
        let files = vec!["short.wav".to_string(), "long.wav".to_string()];

        let start = tokio::time::Instant::now();
        app.run(&files, options).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(350), "{elapsed:?}");
        assert_eq!(app.sound().unwrap().active_count(), 0);
        app.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(dir.path(), "a.wav", 5000);
        write_wav(dir.path(), "b.wav", 8000);
        let mut app = started_app(dir.path()).await;

        let options = RunOptions {
            stop_after: Some(Duration::from_millis(200)),
            progress_interval: Duration::from_millis(50),
        };
        let files = vec!["a.wav".to_string(), "b.wav".to_string()];

        let start = tokio::time::Instant::now();
        app.run(&files, options).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(250), "{elapsed:?}");
        assert_eq!(app.sound().unwrap().active_count(), 0);
        app.teardown();
    }
}

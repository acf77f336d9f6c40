//! Time source for playback progress.

use tokio::time::Instant;

/// Source of the current time used for channel progress queries.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by the tokio timer.
///
/// Follows paused and advanced time under `tokio::time::pause`, which keeps
/// progress queries deterministic in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(clock.now() - start, Duration::from_millis(40));
    }
}

//! Tunables of a read session

use std::time::Duration;

use crate::poller::RetryPolicy;

/// Polling and retry budgets used by the page cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Image readiness polling (30 x 2000 ms by default)
    pub image_polling: RetryPolicy,
    /// Audio fetch retry (3 attempts, 1000 ms linear step by default)
    pub audio_fetch: RetryPolicy,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            image_polling: RetryPolicy::image_polling(),
            audio_fetch: RetryPolicy::audio_fetch(),
        }
    }
}

impl ReaderSettings {
    pub fn with_image_polling(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.image_polling = RetryPolicy::constant(max_attempts, interval);
        self
    }

    pub fn with_audio_fetch(mut self, retry_count: u32, backoff_step: Duration) -> Self {
        self.audio_fetch = RetryPolicy::linear(retry_count, backoff_step);
        self
    }
}

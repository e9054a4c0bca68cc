//! Headless audio output
//!
//! [`PacedOutput`] does not produce sound. It estimates each clip's length
//! from its byte size at a constant bitrate and emits the events a real
//! player would (metadata, time updates, end) on tokio timers. It lets the
//! session run in a terminal or in CI without an audio device.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::audio::{
    AudioOutput, HandleId, OutputHandle, PlaybackEvent, PlaybackEventKind, PlaybackEventSender,
};
use crate::error::AudioError;
use crate::object_url::ObjectUrl;

/// MP3 bitrate assumed when none is configured
pub const DEFAULT_BITRATE_KBPS: u64 = 128;

const TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct PacedOutput {
    bitrate_kbps: u64,
}

impl Default for PacedOutput {
    fn default() -> Self {
        Self::new(DEFAULT_BITRATE_KBPS)
    }
}

impl PacedOutput {
    pub fn new(bitrate_kbps: u64) -> Self {
        Self {
            bitrate_kbps: bitrate_kbps.max(1),
        }
    }

    /// Estimated play time of `bytes` bytes
    pub fn estimate(&self, bytes: usize) -> Duration {
        let millis = (bytes as u64).saturating_mul(8) / self.bitrate_kbps;
        Duration::from_millis(millis)
    }
}

impl AudioOutput for PacedOutput {
    fn open(
        &self,
        handle: HandleId,
        url: &ObjectUrl,
        events: PlaybackEventSender,
    ) -> Result<Box<dyn OutputHandle>, AudioError> {
        let duration = self.estimate(url.blob().len());
        trace!(handle, ?duration, "Opening paced clip");

        let _ = events.send(PlaybackEvent::new(
            handle,
            PlaybackEventKind::MetadataLoaded(duration.as_secs_f64()),
        ));

        Ok(Box::new(PacedHandle {
            id: handle,
            duration,
            position_ms: Arc::new(AtomicU64::new(0)),
            attached: Arc::new(AtomicBool::new(true)),
            events,
            task: None,
        }))
    }
}

struct PacedHandle {
    id: HandleId,
    duration: Duration,
    position_ms: Arc<AtomicU64>,
    attached: Arc<AtomicBool>,
    events: PlaybackEventSender,
    task: Option<JoinHandle<()>>,
}

impl PacedHandle {
    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl OutputHandle for PacedHandle {
    async fn start(&mut self) -> Result<(), AudioError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(AudioError::Output("handle detached".into()));
        }
        self.abort();

        let id = self.id;
        let total_ms = self.duration.as_millis() as u64;
        let position = self.position_ms.clone();
        let attached = self.attached.clone();
        let events = self.events.clone();

        self.task = Some(tokio::spawn(async move {
            let resumed_at = position.load(Ordering::SeqCst);
            let started = Instant::now();

            loop {
                let elapsed = resumed_at + started.elapsed().as_millis() as u64;
                let remaining = total_ms.saturating_sub(elapsed);
                if remaining == 0 {
                    break;
                }
                sleep(TICK.min(Duration::from_millis(remaining))).await;

                let now = (resumed_at + started.elapsed().as_millis() as u64).min(total_ms);
                position.store(now, Ordering::SeqCst);
                if !attached.load(Ordering::SeqCst) {
                    return;
                }
                let _ = events.send(PlaybackEvent::new(
                    id,
                    PlaybackEventKind::TimeUpdate(now as f64 / 1000.0),
                ));
            }

            position.store(total_ms, Ordering::SeqCst);
            if attached.load(Ordering::SeqCst) {
                let _ = events.send(PlaybackEvent::new(id, PlaybackEventKind::Ended));
            }
        }));

        Ok(())
    }

    fn pause(&mut self) {
        self.abort();
    }

    fn detach(&mut self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.abort();
    }
}

impl Drop for PacedHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_url::ObjectUrlRegistry;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    #[test]
    fn test_estimate() {
        let output = PacedOutput::new(128);
        // 16 000 bytes at 128 kbps = 1 s
        assert_eq!(output.estimate(16_000), Duration::from_millis(1000));
        assert_eq!(PacedOutput::new(0).estimate(1), Duration::from_millis(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clip_runs_to_end() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(Bytes::from(vec![0u8; 8_000]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handle = PacedOutput::default().open(1, &url, tx).unwrap();
        handle.start().await.unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.handle, 1);
            let ended = event.kind == PlaybackEventKind::Ended;
            kinds.push(event.kind);
            if ended {
                break;
            }
        }

        assert_eq!(kinds.first(), Some(&PlaybackEventKind::MetadataLoaded(0.5)));
        assert_eq!(kinds.last(), Some(&PlaybackEventKind::Ended));
        assert!(kinds.contains(&PlaybackEventKind::TimeUpdate(0.25)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_handle_is_silent() {
        let registry = ObjectUrlRegistry::new();
        let url = registry.create(Bytes::from(vec![0u8; 8_000]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handle = PacedOutput::default().open(7, &url, tx).unwrap();
        let _metadata = rx.recv().await.unwrap();
        handle.start().await.unwrap();
        handle.pause();
        handle.detach();
        handle.release();
        drop(handle);

        sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }
}

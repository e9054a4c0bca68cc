//! Single-clip audio channel
//!
//! [`AudioChannel`] owns at most one playback handle at a time. Handles are
//! numbered; backend events carry the number of the handle that emitted
//! them and are ignored unless it is still the current one, so a stopped
//! clip's late events can never touch the clip that replaced it.
//!
//! The backend itself sits behind [`AudioOutput`] / [`OutputHandle`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::AudioError;
use crate::object_url::{ObjectUrl, ObjectUrlRegistry};

/// Identifier of one playback handle
pub type HandleId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEventKind {
    Ended,
    Error(String),
    /// Current position, in seconds
    TimeUpdate(f64),
    /// Clip duration, in seconds
    MetadataLoaded(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEvent {
    pub handle: HandleId,
    pub kind: PlaybackEventKind,
}

impl PlaybackEvent {
    pub fn new(handle: HandleId, kind: PlaybackEventKind) -> Self {
        Self { handle, kind }
    }
}

pub type PlaybackEventSender = mpsc::UnboundedSender<PlaybackEvent>;
pub type PlaybackEventReceiver = mpsc::UnboundedReceiver<PlaybackEvent>;

/// One opened clip on the backend
#[async_trait]
pub trait OutputHandle: Send {
    /// Start or resume playback; may be refused by the backend
    async fn start(&mut self) -> Result<(), AudioError>;

    fn pause(&mut self);

    /// Stop emitting events
    fn detach(&mut self);

    /// Drop the underlying source
    fn release(&mut self);
}

/// Playback backend
pub trait AudioOutput: Send + Sync {
    /// Open `url` as handle `handle`; events go to `events`
    fn open(
        &self,
        handle: HandleId,
        url: &ObjectUrl,
        events: PlaybackEventSender,
    ) -> Result<Box<dyn OutputHandle>, AudioError>;
}

/// Observable channel state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
}

type EndedHook = Box<dyn Fn() + Send + Sync>;
type ErrorHook = Box<dyn Fn(AudioError) + Send + Sync>;

struct CurrentClip {
    id: HandleId,
    handle: Box<dyn OutputHandle>,
    url: ObjectUrl,
}

impl CurrentClip {
    /// Detach, revoke, release, in that order
    fn teardown(mut self) {
        self.handle.detach();
        let CurrentClip { mut handle, url, .. } = self;
        drop(url);
        handle.release();
    }
}

pub struct AudioChannel {
    output: Arc<dyn AudioOutput>,
    registry: ObjectUrlRegistry,
    events: PlaybackEventSender,
    next_handle: HandleId,
    current: Option<CurrentClip>,
    state: ChannelState,
    on_ended: Option<EndedHook>,
    on_error: Option<ErrorHook>,
    disposed: bool,
}

impl AudioChannel {
    /// Create a channel over `output`.
    ///
    /// Backend events arrive on the returned receiver; the owner feeds them
    /// back through [`AudioChannel::handle_event`].
    pub fn new(output: Arc<dyn AudioOutput>) -> (Self, PlaybackEventReceiver) {
        Self::with_registry(output, ObjectUrlRegistry::new())
    }

    pub fn with_registry(
        output: Arc<dyn AudioOutput>,
        registry: ObjectUrlRegistry,
    ) -> (Self, PlaybackEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let channel = Self {
            output,
            registry,
            events,
            next_handle: 0,
            current: None,
            state: ChannelState::default(),
            on_ended: None,
            on_error: None,
            disposed: false,
        };
        (channel, rx)
    }

    pub fn set_on_ended(&mut self, hook: impl Fn() + Send + Sync + 'static) {
        if !self.disposed {
            self.on_ended = Some(Box::new(hook));
        }
    }

    pub fn set_on_error(&mut self, hook: impl Fn(AudioError) + Send + Sync + 'static) {
        if !self.disposed {
            self.on_error = Some(Box::new(hook));
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    /// True while a clip is loaded (playing or paused)
    pub fn has_clip(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_handle(&self) -> Option<HandleId> {
        self.current.as_ref().map(|c| c.id)
    }

    pub fn registry(&self) -> &ObjectUrlRegistry {
        &self.registry
    }

    /// Stop the current clip and play `clip` from the start.
    ///
    /// On a refused start the new clip is torn down and the error returned;
    /// nothing is left loaded.
    pub async fn play(&mut self, clip: Bytes) -> Result<(), AudioError> {
        if self.disposed {
            return Err(AudioError::Disposed);
        }

        self.stop();

        self.next_handle += 1;
        let id = self.next_handle;
        let url = self.registry.create(clip);
        let handle = self.output.open(id, &url, self.events.clone())?;

        debug!(handle = id, url = %url, "Starting clip");
        let clip = self.current.insert(CurrentClip { id, handle, url });

        match clip.handle.start().await {
            Ok(()) => {
                self.state.is_playing = true;
                Ok(())
            }
            Err(err) => {
                warn!(handle = id, "Playback start failed: {}", err);
                if let Some(clip) = self.current.take() {
                    clip.teardown();
                }
                self.state = ChannelState::default();
                Err(err)
            }
        }
    }

    pub fn pause(&mut self) {
        if let Some(clip) = self.current.as_mut() {
            clip.handle.pause();
        }
        self.state.is_playing = false;
    }

    /// Resume the current clip; a refused start leaves the channel paused
    pub async fn resume(&mut self) -> Result<(), AudioError> {
        let Some(clip) = self.current.as_mut() else {
            return Err(AudioError::NoClip);
        };

        match clip.handle.start().await {
            Ok(()) => {
                self.state.is_playing = true;
                Ok(())
            }
            Err(err) => {
                warn!(handle = clip.id, "Resume failed: {}", err);
                self.state.is_playing = false;
                Err(err)
            }
        }
    }

    /// Pause, detach, revoke the URL, release the handle, reset position
    pub fn stop(&mut self) {
        if let Some(mut clip) = self.current.take() {
            trace!(handle = clip.id, "Stopping clip");
            clip.handle.pause();
            clip.teardown();
        }
        self.state = ChannelState::default();
    }

    /// Stop and drop the notification hooks for good
    pub fn dispose(&mut self) {
        self.stop();
        self.on_ended = None;
        self.on_error = None;
        self.disposed = true;
    }

    /// Apply a backend event.
    ///
    /// Returns false when the event was dropped because its handle is no
    /// longer current.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> bool {
        if self.current_handle() != Some(event.handle) {
            trace!(handle = event.handle, kind = ?event.kind, "Dropping stale playback event");
            return false;
        }

        match event.kind {
            PlaybackEventKind::TimeUpdate(time) => {
                self.state.current_time = time;
            }
            PlaybackEventKind::MetadataLoaded(duration) => {
                self.state.duration = duration;
            }
            PlaybackEventKind::Ended => {
                debug!(handle = event.handle, "Clip ended");
                self.finish_current();
                if let Some(hook) = &self.on_ended {
                    hook();
                }
            }
            PlaybackEventKind::Error(message) => {
                warn!(handle = event.handle, "Clip failed: {}", message);
                self.finish_current();
                if let Some(hook) = &self.on_error {
                    hook(AudioError::Playback(message));
                }
            }
        }
        true
    }

    fn finish_current(&mut self) {
        if let Some(clip) = self.current.take() {
            clip.teardown();
        }
        self.state.is_playing = false;
    }
}

impl Drop for AudioChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory backend shared by the unit tests

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Open(HandleId),
        Start(HandleId),
        Pause(HandleId),
        Detach(HandleId),
        Release(HandleId),
    }

    #[derive(Default)]
    pub struct Recorder {
        pub calls: Vec<Call>,
        pub opened: Vec<(HandleId, Bytes)>,
        pub senders: Vec<(HandleId, PlaybackEventSender)>,
        pub refuse_start: bool,
        /// Live URL count observed at each release
        pub live_at_release: Vec<usize>,
    }

    #[derive(Clone, Default)]
    pub struct FakeOutput {
        pub recorder: Arc<Mutex<Recorder>>,
        pub registry: Option<ObjectUrlRegistry>,
    }

    impl FakeOutput {
        pub fn calls(&self) -> Vec<Call> {
            self.recorder.lock().unwrap().calls.clone()
        }

        pub fn refuse_start(&self, refuse: bool) {
            self.recorder.lock().unwrap().refuse_start = refuse;
        }

        /// Emit `kind` as if handle `id` produced it
        pub fn emit(&self, id: HandleId, kind: PlaybackEventKind) {
            let recorder = self.recorder.lock().unwrap();
            if let Some((_, tx)) = recorder.senders.iter().find(|(h, _)| *h == id) {
                let _ = tx.send(PlaybackEvent::new(id, kind));
            }
        }
    }

    struct FakeHandle {
        id: HandleId,
        recorder: Arc<Mutex<Recorder>>,
        registry: Option<ObjectUrlRegistry>,
    }

    impl AudioOutput for FakeOutput {
        fn open(
            &self,
            handle: HandleId,
            url: &ObjectUrl,
            events: PlaybackEventSender,
        ) -> Result<Box<dyn OutputHandle>, AudioError> {
            let mut recorder = self.recorder.lock().unwrap();
            recorder.calls.push(Call::Open(handle));
            recorder.opened.push((handle, url.blob().clone()));
            recorder.senders.push((handle, events));
            Ok(Box::new(FakeHandle {
                id: handle,
                recorder: self.recorder.clone(),
                registry: self.registry.clone(),
            }))
        }
    }

    #[async_trait]
    impl OutputHandle for FakeHandle {
        async fn start(&mut self) -> Result<(), AudioError> {
            let mut recorder = self.recorder.lock().unwrap();
            recorder.calls.push(Call::Start(self.id));
            if recorder.refuse_start {
                Err(AudioError::StartFailed("autoplay blocked".into()))
            } else {
                Ok(())
            }
        }

        fn pause(&mut self) {
            self.recorder.lock().unwrap().calls.push(Call::Pause(self.id));
        }

        fn detach(&mut self) {
            self.recorder.lock().unwrap().calls.push(Call::Detach(self.id));
        }

        fn release(&mut self) {
            let live = self.registry.as_ref().map(|r| r.live_count()).unwrap_or(0);
            let mut recorder = self.recorder.lock().unwrap();
            recorder.calls.push(Call::Release(self.id));
            recorder.live_at_release.push(live);
        }
    }
}

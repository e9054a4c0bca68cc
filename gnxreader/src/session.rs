//! Read session: the state machine behind read mode
//!
//! [`ReadSession`] is a handle to a background worker that owns the reading
//! cursor (section, page, detail), the [`AudioChannel`] and the
//! [`PageResourceCache`]. Every transition happens inside the worker; the
//! handle only sends commands and watches the published [`ReadState`].
//!
//! Long operations (metadata fetches, image polling, audio fetches) run in
//! spawned loader tasks. Each load is tagged with a generation number and a
//! child cancellation token; results from a superseded load are dropped
//! before they can touch the state.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gnxapi::GnxClient;
//! use gnxreader::{PacedOutput, ReadSession, ReaderSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(GnxClient::new().await?);
//! let output = Arc::new(PacedOutput::default());
//! let session = ReadSession::spawn(api, output, ReaderSettings::default());
//!
//! session.initialize("1", "10").await?;
//! session.play().await?;
//!
//! let mut updates = session.subscribe();
//! while updates.changed().await.is_ok() {
//!     let state = updates.borrow().clone();
//!     println!(
//!         "{} page {}/{}",
//!         state.current_chapter_label, state.current_page_number, state.total_pages
//!     );
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use gnxapi::{ComicApi, ComicDetail, SectionDetail};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::audio::{AudioChannel, AudioOutput, PlaybackEventReceiver};
use crate::error::{AudioError, SessionError};
use crate::page::PageResourceCache;
use crate::settings::ReaderSettings;
use crate::state::{Cursor, ReadState, SessionPhase};

type Reply = oneshot::Sender<Result<(), SessionError>>;

enum SessionCommand {
    Initialize {
        comic_id: String,
        section_id: String,
        reply: Reply,
    },
    Play(Reply),
    Pause(Reply),
    TogglePlayPause(Reply),
    ScreenTap(Reply),
    PlayButtonClick(Reply),
    Dispose(Reply),
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::Initialize { .. } => "initialize",
            SessionCommand::Play(_) => "play",
            SessionCommand::Pause(_) => "pause",
            SessionCommand::TogglePlayPause(_) => "toggle_play_pause",
            SessionCommand::ScreenTap(_) => "screen_tap",
            SessionCommand::PlayButtonClick(_) => "play_button_click",
            SessionCommand::Dispose(_) => "dispose",
        }
    }
}

/// Outcome of the current clip, raised by the audio channel hooks
#[derive(Debug)]
enum ClipSignal {
    Ended,
    Failed(AudioError),
}

#[derive(Debug)]
enum LoadEvent {
    Metadata {
        comic: Option<ComicDetail>,
        section: SectionDetail,
    },
    ImageResolved(String),
    AudioReady,
    Failed(SessionError),
}

#[derive(Debug)]
struct LoadMessage {
    generation: u64,
    event: LoadEvent,
}

/// Handle to a read session worker
///
/// Clones share the same worker. When the last handle is dropped the worker
/// disposes itself.
#[derive(Clone)]
pub struct ReadSession {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ReadState>,
}

impl ReadSession {
    /// Start a session worker on the current tokio runtime
    pub fn spawn(
        api: Arc<dyn ComicApi>,
        output: Arc<dyn AudioOutput>,
        settings: ReaderSettings,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ReadState::default());

        let (worker, inbox) = SessionWorker::new(api, output, settings, state_tx);
        tokio::spawn(worker.run(commands_rx, inbox));

        Self {
            commands: commands_tx,
            state: state_rx,
        }
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> SessionCommand,
    ) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Disposed)?;
        response.await.unwrap_or(Err(SessionError::Disposed))
    }

    /// Load a section and the resources of its first page.
    ///
    /// Resolves once the page is ready (paused, overlay shown) or loading
    /// failed. A later `initialize` makes this one resolve with
    /// [`SessionError::Superseded`].
    pub async fn initialize(&self, comic_id: &str, section_id: &str) -> Result<(), SessionError> {
        let comic_id = comic_id.to_string();
        let section_id = section_id.to_string();
        self.request(|reply| SessionCommand::Initialize {
            comic_id,
            section_id,
            reply,
        })
        .await
    }

    /// Hide the overlay and play the clip at the cursor.
    ///
    /// While resources are loading this only records the intent to play.
    pub async fn play(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Play).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Pause).await
    }

    pub async fn toggle_play_pause(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::TogglePlayPause).await
    }

    /// Pause and show the overlay if playing
    pub async fn handle_screen_tap(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::ScreenTap).await
    }

    /// Resume a paused clip, or start playing at the cursor
    pub async fn handle_play_button_click(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::PlayButtonClick).await
    }

    /// Stop playback, cancel loads, release every resource and stop the worker
    pub async fn dispose(&self) -> Result<(), SessionError> {
        match self.request(SessionCommand::Dispose).await {
            Err(SessionError::Disposed) => Ok(()),
            other => other,
        }
    }

    pub fn state(&self) -> ReadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadState> {
        self.state.clone()
    }
}

struct WorkerInbox {
    signals: mpsc::UnboundedReceiver<ClipSignal>,
    playback: PlaybackEventReceiver,
    loads: mpsc::UnboundedReceiver<LoadMessage>,
}

struct SessionWorker {
    api: Arc<dyn ComicApi>,
    channel: AudioChannel,
    cache: PageResourceCache,
    state_tx: watch::Sender<ReadState>,
    state: ReadState,

    comic_id: String,
    comic: Option<ComicDetail>,
    section: Option<SectionDetail>,
    cursor: Cursor,

    generation: u64,
    root_cancel: CancellationToken,
    load_cancel: CancellationToken,
    loads: mpsc::UnboundedSender<LoadMessage>,
    image_ready: bool,
    audio_ready: bool,

    pending_init: Option<Reply>,
    disposed: bool,
}

impl SessionWorker {
    fn new(
        api: Arc<dyn ComicApi>,
        output: Arc<dyn AudioOutput>,
        settings: ReaderSettings,
        state_tx: watch::Sender<ReadState>,
    ) -> (Self, WorkerInbox) {
        let (mut channel, playback) = AudioChannel::new(output);
        let (signals_tx, signals) = mpsc::unbounded_channel();
        let (loads_tx, loads) = mpsc::unbounded_channel();

        let ended = signals_tx.clone();
        channel.set_on_ended(move || {
            let _ = ended.send(ClipSignal::Ended);
        });
        channel.set_on_error(move |err| {
            let _ = signals_tx.send(ClipSignal::Failed(err));
        });

        let root_cancel = CancellationToken::new();
        let worker = Self {
            cache: PageResourceCache::new(Arc::clone(&api), settings),
            api,
            channel,
            state_tx,
            state: ReadState::default(),
            comic_id: String::new(),
            comic: None,
            section: None,
            cursor: Cursor::default(),
            generation: 0,
            load_cancel: root_cancel.child_token(),
            root_cancel,
            loads: loads_tx,
            image_ready: false,
            audio_ready: false,
            pending_init: None,
            disposed: false,
        };

        (
            worker,
            WorkerInbox {
                signals,
                playback,
                loads,
            },
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut inbox: WorkerInbox,
    ) {
        debug!("Read session worker started");

        loop {
            // Clip outcomes first: they are raised while handling playback
            // events and must be applied before any later command.
            tokio::select! {
                biased;
                Some(signal) = inbox.signals.recv() => {
                    self.on_clip_signal(signal).await;
                }
                Some(event) = inbox.playback.recv() => {
                    self.channel.handle_event(event);
                }
                Some(message) = inbox.loads.recv() => {
                    self.on_load(message).await;
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        self.handle_command(command).await;
                        if self.disposed {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
            }
        }

        debug!("Read session worker stopped");
    }

    fn publish(&mut self) {
        self.state.is_loading = self.state.phase == SessionPhase::LoadingMetadata
            || self.state.is_loading_image
            || self.state.is_loading_audio;
        self.state_tx.send_replace(self.state.clone());
    }

    /// Start a new load generation, cancelling the previous one
    fn begin_load(&mut self) -> (u64, CancellationToken) {
        self.load_cancel.cancel();
        self.generation += 1;
        self.load_cancel = self.root_cancel.child_token();
        self.image_ready = false;
        self.audio_ready = false;
        (self.generation, self.load_cancel.clone())
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        debug!(command = command.name(), phase = ?self.state.phase, "Session command");

        match command {
            SessionCommand::Initialize {
                comic_id,
                section_id,
                reply,
            } => self.initialize(comic_id, section_id, reply),
            SessionCommand::Play(reply) => {
                let result = self.play().await;
                let _ = reply.send(result);
            }
            SessionCommand::Pause(reply) => {
                self.pause();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::TogglePlayPause(reply) => {
                let result = if self.state.is_playing {
                    self.pause();
                    Ok(())
                } else {
                    self.play_button_click().await
                };
                let _ = reply.send(result);
            }
            SessionCommand::ScreenTap(reply) => {
                self.screen_tap();
                let _ = reply.send(Ok(()));
            }
            SessionCommand::PlayButtonClick(reply) => {
                let result = self.play_button_click().await;
                let _ = reply.send(result);
            }
            SessionCommand::Dispose(reply) => {
                self.shutdown();
                let _ = reply.send(Ok(()));
            }
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    fn initialize(&mut self, comic_id: String, section_id: String, reply: Reply) {
        if let Some(previous) = self.pending_init.take() {
            let _ = previous.send(Err(SessionError::Superseded));
        }

        info!(comic_id = %comic_id, section_id = %section_id, "Initializing read session");

        self.channel.stop();
        self.cache.dispose();
        let (generation, cancel) = self.begin_load();

        self.comic_id = comic_id.clone();
        self.comic = None;
        self.section = None;
        self.cursor = Cursor::at_section(section_id.clone());
        self.state = ReadState {
            phase: SessionPhase::LoadingMetadata,
            ..ReadState::default()
        };
        self.publish();
        self.pending_init = Some(reply);

        let api = Arc::clone(&self.api);
        let loads = self.loads.clone();
        tokio::spawn(async move {
            let (comic, section) = tokio::select! {
                _ = cancel.cancelled() => return,
                results = async {
                    tokio::join!(api.get_comic(&comic_id), api.get_section(&comic_id, &section_id))
                } => results,
            };

            let event = match (comic, section) {
                (Ok(comic), Ok(section)) => LoadEvent::Metadata {
                    comic: Some(comic),
                    section,
                },
                (Err(err), _) => {
                    LoadEvent::Failed(SessionError::metadata(&format!("comic {}", comic_id), err))
                }
                (_, Err(err)) => LoadEvent::Failed(SessionError::metadata(
                    &format!("section {}", section_id),
                    err,
                )),
            };
            let _ = loads.send(LoadMessage { generation, event });
        });
    }

    fn load_section(&mut self, section_id: String) {
        let (generation, cancel) = self.begin_load();
        self.state.phase = SessionPhase::LoadingMetadata;
        self.state.image_url = None;
        self.publish();

        let api = Arc::clone(&self.api);
        let loads = self.loads.clone();
        let comic_id = self.comic_id.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = api.get_section(&comic_id, &section_id) => result,
            };

            let event = match result {
                Ok(section) => LoadEvent::Metadata {
                    comic: None,
                    section,
                },
                Err(err) => LoadEvent::Failed(SessionError::metadata(
                    &format!("section {}", section_id),
                    err,
                )),
            };
            let _ = loads.send(LoadMessage { generation, event });
        });
    }

    /// Reset the cursor to page `index` and resolve its resources
    fn enter_page(&mut self, index: usize) {
        let Some(page) = self.section.as_ref().and_then(|s| s.page(index)) else {
            return;
        };
        let page_id = page.id.clone();
        let detail_ids = page.detail_ids();
        let first_line = page.details.first().map(|d| d.content.clone());

        self.channel.stop();
        self.cursor.page_index = index;
        self.cursor.detail_index = 0;
        let (generation, cancel) = self.begin_load();
        self.cache.initialize(&page_id, &detail_ids);

        debug!(page_id = %page_id, page = index + 1, details = detail_ids.len(), "Entering page");

        self.state.phase = SessionPhase::LoadingResources;
        self.state.image_url = None;
        self.state.current_page_number = index + 1;
        self.state.current_detail_index = 0;
        self.state.current_detail_text = first_line;
        self.state.is_loading_image = true;
        self.state.is_loading_audio = true;
        self.publish();

        let cache = self.cache.clone();
        let loads = self.loads.clone();
        tokio::spawn(async move {
            let send = |event| {
                let _ = loads.send(LoadMessage { generation, event });
            };
            let image = async {
                match cache.load_image().await {
                    Ok(url) => send(LoadEvent::ImageResolved(url)),
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => send(LoadEvent::Failed(err.into())),
                }
            };
            let audio = async {
                match cache.load_all_audios().await {
                    Ok(()) => send(LoadEvent::AudioReady),
                    Err(err) if err.is_cancelled() => {}
                    Err(err) => send(LoadEvent::Failed(err.into())),
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = async { tokio::join!(image, audio) } => {}
            }
        });
    }

    async fn on_load(&mut self, message: LoadMessage) {
        if self.disposed || message.generation != self.generation {
            trace!(
                generation = message.generation,
                current = self.generation,
                "Dropping stale load result"
            );
            return;
        }

        match message.event {
            LoadEvent::Metadata { comic, section } => self.on_metadata(comic, section).await,
            LoadEvent::ImageResolved(url) => {
                self.state.image_url = Some(url);
                self.state.is_loading_image = false;
                self.image_ready = true;
                self.on_page_progress().await;
            }
            LoadEvent::AudioReady => {
                self.state.is_loading_audio = false;
                self.audio_ready = true;
                self.on_page_progress().await;
            }
            LoadEvent::Failed(err) => self.fail(err),
        }
    }

    async fn on_metadata(&mut self, comic: Option<ComicDetail>, section: SectionDetail) {
        if let Some(comic) = comic {
            self.state.comic_title = comic.title.clone();
            self.comic = Some(comic);
        }

        info!(
            section_id = %section.id,
            index = section.index,
            pages = section.pages.len(),
            "Section loaded"
        );

        self.cursor = Cursor::at_section(section.id.clone());
        self.state.current_chapter_label = section.chapter_label();
        self.state.chapter_title = section.title.clone();
        self.state.total_pages = section.pages.len();
        self.state.current_page_number = 0;
        self.state.current_detail_index = 0;
        self.state.current_detail_text = None;

        let has_pages = !section.pages.is_empty();
        self.section = Some(section);

        if has_pages {
            self.enter_page(0);
        } else if self.pending_init.is_some() {
            // Nothing to resolve; play() will move on to the next section
            self.settle().await;
        } else {
            warn!(section_id = %self.cursor.section_id, "Section has no pages, skipping");
            self.next_section();
        }
    }

    async fn on_page_progress(&mut self) {
        if self.image_ready && self.audio_ready {
            self.settle().await;
        } else {
            self.publish();
        }
    }

    /// Resources of the current page are ready: pause on the overlay, or
    /// keep playing if that was the intent.
    async fn settle(&mut self) {
        self.state.is_loading_image = false;
        self.state.is_loading_audio = false;
        let reply = self.pending_init.take();

        if self.state.is_playing {
            self.state.phase = SessionPhase::Playing;
            self.publish();
            let _ = self.start_current().await;
        } else {
            self.state.phase = SessionPhase::Ready;
            self.state.show_overlay = true;
            self.publish();
        }

        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    fn fail(&mut self, err: SessionError) {
        error!("Read session failed: {}", err);

        // Later results of the failed load must not revive the page
        self.begin_load();
        self.channel.stop();
        self.state.is_playing = false;
        self.state.show_overlay = true;
        self.state.is_loading_image = false;
        self.state.is_loading_audio = false;
        self.state.phase = SessionPhase::Error;
        self.state.error = Some(err.to_string());
        self.publish();

        if let Some(reply) = self.pending_init.take() {
            let _ = reply.send(Err(err));
        }
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Play the clip at the cursor, skipping details without audio and
    /// moving to the next page or section when the current one is done.
    async fn start_current(&mut self) -> Result<(), AudioError> {
        loop {
            let Some(section) = self.section.as_ref() else {
                return Ok(());
            };
            let Some(page) = section.page(self.cursor.page_index) else {
                self.next_section();
                return Ok(());
            };
            let Some(detail) = page.details.get(self.cursor.detail_index) else {
                self.next_page();
                return Ok(());
            };
            let detail_id = detail.id.clone();
            let line = detail.content.clone();

            self.state.current_detail_index = self.cursor.detail_index;
            self.state.current_detail_text = Some(line);

            let Some(blob) = self.cache.get_audio_blob(&detail_id) else {
                warn!(detail_id = %detail_id, "No audio for detail, skipping");
                self.cursor.detail_index += 1;
                continue;
            };

            match self.channel.play(blob).await {
                Ok(()) => {
                    debug!(
                        detail_id = %detail_id,
                        index = self.cursor.detail_index,
                        "Playing detail"
                    );
                    self.state.phase = SessionPhase::Playing;
                    self.state.error = None;
                    self.publish();
                    return Ok(());
                }
                Err(err) => {
                    warn!(detail_id = %detail_id, "Could not start playback: {}", err);
                    self.revert_to_paused(&err);
                    return Err(err);
                }
            }
        }
    }

    /// Playback could not (re)start: stay on the page, paused, with the reason
    fn revert_to_paused(&mut self, err: &AudioError) {
        self.state.error = Some(err.to_string());
        self.state.is_playing = false;
        self.state.show_overlay = true;
        if self.state.phase == SessionPhase::Playing {
            self.state.phase = SessionPhase::Ready;
        }
        self.publish();
    }

    async fn on_clip_signal(&mut self, signal: ClipSignal) {
        if self.disposed {
            return;
        }
        match signal {
            ClipSignal::Ended => trace!(index = self.cursor.detail_index, "Clip ended"),
            ClipSignal::Failed(err) => {
                warn!(index = self.cursor.detail_index, "Clip failed, skipping: {}", err)
            }
        }

        let details = self
            .section
            .as_ref()
            .and_then(|s| s.page(self.cursor.page_index))
            .map(|p| p.details.len())
            .unwrap_or(0);
        self.cursor.detail_index = (self.cursor.detail_index + 1).min(details);
        self.state.current_detail_index = self.cursor.detail_index;

        if self.state.is_playing {
            let _ = self.start_current().await;
        } else {
            self.publish();
        }
    }

    fn next_page(&mut self) {
        let pages = self.section.as_ref().map(|s| s.pages.len()).unwrap_or(0);
        if self.cursor.page_index + 1 < pages {
            self.enter_page(self.cursor.page_index + 1);
        } else {
            self.next_section();
        }
    }

    fn next_section(&mut self) {
        let next = match (self.comic.as_ref(), self.section.as_ref()) {
            (Some(comic), Some(section)) => {
                comic.section_after(section.index).map(|s| s.id.clone())
            }
            _ => None,
        };

        match next {
            Some(section_id) => {
                info!(section_id = %section_id, "Advancing to next section");
                self.channel.stop();
                self.load_section(section_id);
            }
            None => self.finish(),
        }
    }

    fn finish(&mut self) {
        info!(comic_id = %self.comic_id, "Reached the end of the comic");
        self.channel.stop();
        self.state.is_playing = false;
        self.state.show_overlay = true;
        self.state.phase = SessionPhase::Finished;
        self.publish();
    }

    // ========================================================================
    // User commands
    // ========================================================================

    async fn play(&mut self) -> Result<(), SessionError> {
        match self.state.phase {
            SessionPhase::Uninitialized => return Err(SessionError::NotInitialized),
            SessionPhase::Error => {
                return Err(SessionError::NotReady(
                    self.state.error.clone().unwrap_or_default(),
                ))
            }
            SessionPhase::Finished => {
                debug!("Nothing left to play");
                return Ok(());
            }
            SessionPhase::LoadingMetadata | SessionPhase::LoadingResources => {
                self.state.is_playing = true;
                self.state.show_overlay = false;
                self.publish();
                return Ok(());
            }
            SessionPhase::Ready | SessionPhase::Playing => {}
        }

        if self.channel.is_playing() {
            return Ok(());
        }

        self.state.is_playing = true;
        self.state.show_overlay = false;
        self.publish();
        self.start_current().await.map_err(SessionError::from)
    }

    fn pause(&mut self) {
        self.channel.pause();
        self.state.is_playing = false;
        if self.state.phase == SessionPhase::Playing {
            self.state.phase = SessionPhase::Ready;
        }
        self.publish();
    }

    fn screen_tap(&mut self) {
        if self.state.is_playing {
            self.channel.pause();
            self.state.is_playing = false;
            self.state.show_overlay = true;
            if self.state.phase == SessionPhase::Playing {
                self.state.phase = SessionPhase::Ready;
            }
            self.publish();
        }
    }

    async fn play_button_click(&mut self) -> Result<(), SessionError> {
        if !self.channel.has_clip() {
            return self.play().await;
        }

        match self.channel.resume().await {
            Ok(()) => {
                self.state.is_playing = true;
                self.state.show_overlay = false;
                self.state.phase = SessionPhase::Playing;
                self.state.error = None;
                self.publish();
                Ok(())
            }
            Err(err) => {
                warn!("Could not resume playback: {}", err);
                self.revert_to_paused(&err);
                Err(err.into())
            }
        }
    }

    fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        info!(comic_id = %self.comic_id, "Disposing read session");

        self.root_cancel.cancel();
        self.channel.dispose();
        self.cache.dispose();
        self.disposed = true;

        if let Some(reply) = self.pending_init.take() {
            let _ = reply.send(Err(SessionError::Disposed));
        }

        self.state.is_playing = false;
        self.state.is_loading_image = false;
        self.state.is_loading_audio = false;
        if self.state.phase.is_loading() {
            self.state.phase = SessionPhase::Uninitialized;
        }
        self.publish();
    }
}

//! Per-page resource cache
//!
//! A [`PageResourceCache`] resolves the resources of the page being read:
//! the generated image (by polling until the backend has produced it) and
//! the narration clip of every page detail (by fetching with retry).
//!
//! The cache is a cheap clonable handle. Loader tasks clone it and write
//! their results back; each write is tagged with the page generation that
//! started it and dropped if [`PageResourceCache::initialize`] or
//! [`PageResourceCache::dispose`] ran in between.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::future::join_all;
use gnxapi::ComicApi;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ResourceError;
use crate::poller::{retry, AssetPoller, Attempt, PollError, RetryError};
use crate::settings::ReaderSettings;

/// Audio state of one page detail
#[derive(Debug, Clone, Default)]
pub struct AudioSlot {
    pub blob: Option<Bytes>,
    pub loading: bool,
    pub error: Option<ResourceError>,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    page_id: Option<String>,
    image_url: Option<String>,
    image_loading: bool,
    image_error: Option<ResourceError>,
    audios: IndexMap<String, AudioSlot>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct PageResourceCache {
    api: Arc<dyn ComicApi>,
    settings: ReaderSettings,
    state: Arc<Mutex<CacheState>>,
}

impl std::fmt::Debug for PageResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PageResourceCache")
            .field("page_id", &state.page_id)
            .field("generation", &state.generation)
            .field("audios", &state.audios.len())
            .finish()
    }
}

impl PageResourceCache {
    pub fn new(api: Arc<dyn ComicApi>, settings: ReaderSettings) -> Self {
        Self {
            api,
            settings,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the previous page and register one empty audio slot per detail
    pub fn initialize(&self, page_id: &str, detail_ids: &[String]) {
        let mut state = self.lock();
        state.cancel.cancel();

        state.generation += 1;
        state.page_id = Some(page_id.to_string());
        state.image_url = None;
        state.image_loading = false;
        state.image_error = None;
        state.audios = detail_ids
            .iter()
            .map(|id| (id.clone(), AudioSlot::default()))
            .collect();
        state.cancel = CancellationToken::new();

        debug!(
            page_id,
            details = detail_ids.len(),
            generation = state.generation,
            "Page cache initialized"
        );
    }

    /// Poll until the page image has a URL.
    ///
    /// A timeout is recorded in [`image_error`](Self::image_error) and
    /// returned. [`ResourceError::Cancelled`] means the page was abandoned
    /// meanwhile and nothing was written.
    pub async fn load_image(&self) -> Result<String, ResourceError> {
        let (page_id, generation, cancel) = {
            let mut state = self.lock();
            let Some(page_id) = state.page_id.clone() else {
                return Err(ResourceError::NotInitialized);
            };
            state.image_loading = true;
            state.image_error = None;
            (page_id, state.generation, state.cancel.clone())
        };

        let poller = AssetPoller::with_token(self.settings.image_polling, cancel);
        debug!(
            page_id = %page_id,
            max_attempts = poller.policy().max_attempts,
            "Polling image"
        );
        let api = Arc::clone(&self.api);
        let poll_id = page_id.clone();
        let result = poller
            .poll(move |attempt| {
                let api = Arc::clone(&api);
                let page_id = poll_id.clone();
                async move {
                    debug!(page_id = %page_id, attempt, "Checking image");
                    Attempt::from(api.get_image_url(&page_id).await)
                }
            })
            .await;

        let mut state = self.lock();
        if state.generation != generation {
            return Err(ResourceError::Cancelled);
        }
        state.image_loading = false;

        match result {
            Ok(url) => {
                info!(page_id = %page_id, url = %url, "Image ready");
                state.image_url = Some(url.clone());
                Ok(url)
            }
            Err(PollError::Timeout {
                attempts,
                last_error,
            }) => {
                let err = ResourceError::ImageTimeout {
                    page_id: page_id.clone(),
                    attempts,
                };
                warn!(page_id = %page_id, last_error = ?last_error, "{}", err);
                state.image_error = Some(err.clone());
                Err(err)
            }
            Err(PollError::Cancelled) => Err(ResourceError::Cancelled),
        }
    }

    /// Fetch the clip of `detail_id` with up to `retry_count` attempts.
    ///
    /// Unknown ids are ignored. A clip already cached is not fetched again.
    pub async fn load_audio(&self, detail_id: &str, retry_count: u32) -> Result<(), ResourceError> {
        let (generation, cancel) = {
            let mut state = self.lock();
            let generation = state.generation;
            let cancel = state.cancel.clone();
            let Some(slot) = state.audios.get_mut(detail_id) else {
                debug!(detail_id, "No audio slot registered, skipping");
                return Ok(());
            };
            if slot.blob.is_some() {
                return Ok(());
            }
            slot.loading = true;
            slot.error = None;
            (generation, cancel)
        };

        let policy = self.settings.audio_fetch.with_max_attempts(retry_count);
        let api = Arc::clone(&self.api);
        let id = detail_id.to_string();
        let result = retry(&policy, &cancel, move |attempt| {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move {
                match api.get_tts_audio(&id).await {
                    Ok(blob) => Attempt::Ready(blob),
                    Err(err) => {
                        warn!(detail_id = %id, attempt, "Audio fetch failed: {}", err);
                        Attempt::Failed(err)
                    }
                }
            }
        })
        .await;

        let mut state = self.lock();
        if state.generation != generation {
            return Err(ResourceError::Cancelled);
        }
        let Some(slot) = state.audios.get_mut(detail_id) else {
            return Err(ResourceError::Cancelled);
        };
        slot.loading = false;

        match result {
            Ok(blob) => {
                debug!(detail_id, size = blob.len(), "Audio ready");
                slot.blob = Some(blob);
                Ok(())
            }
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                let err = ResourceError::AudioFetch {
                    detail_id: detail_id.to_string(),
                    attempts,
                    message: last_error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no response".to_string()),
                };
                slot.error = Some(err.clone());
                Err(err)
            }
            Err(RetryError::Cancelled) => Err(ResourceError::Cancelled),
        }
    }

    /// Fetch every registered clip concurrently.
    ///
    /// Settles once all fetches have finished; the first failure (in detail
    /// order) is returned.
    pub async fn load_all_audios(&self) -> Result<(), ResourceError> {
        let ids: Vec<String> = self.lock().audios.keys().cloned().collect();
        let retry_count = self.settings.audio_fetch.max_attempts;

        let results = join_all(ids.iter().map(|id| self.load_audio(id, retry_count))).await;
        results.into_iter().collect()
    }

    pub fn get_audio_blob(&self, detail_id: &str) -> Option<Bytes> {
        self.lock()
            .audios
            .get(detail_id)
            .and_then(|slot| slot.blob.clone())
    }

    pub fn page_id(&self) -> Option<String> {
        self.lock().page_id.clone()
    }

    pub fn image_url(&self) -> Option<String> {
        self.lock().image_url.clone()
    }

    pub fn is_image_ready(&self) -> bool {
        self.lock().image_url.is_some()
    }

    /// True when the page has clips and all of them are cached
    pub fn are_all_audios_ready(&self) -> bool {
        let state = self.lock();
        !state.audios.is_empty() && state.audios.values().all(|slot| slot.blob.is_some())
    }

    pub fn is_image_loading(&self) -> bool {
        self.lock().image_loading
    }

    pub fn is_audio_loading(&self) -> bool {
        self.lock().audios.values().any(|slot| slot.loading)
    }

    pub fn image_error(&self) -> Option<ResourceError> {
        self.lock().image_error.clone()
    }

    pub fn audio_error(&self, detail_id: &str) -> Option<ResourceError> {
        self.lock()
            .audios
            .get(detail_id)
            .and_then(|slot| slot.error.clone())
    }

    pub fn audio_slot(&self, detail_id: &str) -> Option<AudioSlot> {
        self.lock().audios.get(detail_id).cloned()
    }

    /// Cancel in-flight loads and drop everything cached
    pub fn dispose(&self) {
        let mut state = self.lock();
        state.cancel.cancel();
        state.generation += 1;
        state.page_id = None;
        state.image_url = None;
        state.image_loading = false;
        state.image_error = None;
        state.audios.clear();
    }
}

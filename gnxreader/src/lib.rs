//! Read mode for GNX narrated comics
//!
//! This crate drives the reading of a generated comic: it polls the backend
//! until page images exist, fetches the narration clip of every line, plays
//! the clips in order and moves through pages and sections on its own.
//!
//! # Components
//!
//! - [`poller`]: generic retry combinator and the image readiness poller
//! - [`AudioChannel`]: one clip at a time over an [`AudioOutput`] backend,
//!   with stale event filtering and scoped [`ObjectUrl`]s
//! - [`PageResourceCache`]: image and clips of the current page
//! - [`ReadSession`]: the session state machine, running as a worker task
//!   and publishing [`ReadState`] snapshots
//! - [`PacedOutput`]: a silent output backend driven by timers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gnxapi::GnxClient;
//! use gnxreader::{PacedOutput, ReadSession, ReaderSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = Arc::new(GnxClient::new().await?);
//!     let session = ReadSession::spawn(
//!         api,
//!         Arc::new(PacedOutput::default()),
//!         ReaderSettings::default(),
//!     );
//!
//!     session.initialize("1", "10").await?;
//!     let state = session.state();
//!     println!(
//!         "{} {} ({} pages)",
//!         state.current_chapter_label, state.chapter_title, state.total_pages
//!     );
//!
//!     session.handle_play_button_click().await?;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod error;
pub mod object_url;
pub mod output;
pub mod page;
pub mod poller;
pub mod session;
pub mod settings;
pub mod state;

#[cfg(feature = "gnxconfig")]
pub mod config_ext;

// Re-exports
pub use audio::{
    AudioChannel, AudioOutput, ChannelState, HandleId, OutputHandle, PlaybackEvent,
    PlaybackEventKind, PlaybackEventSender,
};
pub use error::{AudioError, ResourceError, SessionError};
pub use object_url::{ObjectUrl, ObjectUrlRegistry};
pub use output::PacedOutput;
pub use page::{AudioSlot, PageResourceCache};
pub use poller::{retry, AssetPoller, Attempt, Backoff, PollError, RetryError, RetryPolicy};
pub use session::ReadSession;
pub use settings::ReaderSettings;
pub use state::{Cursor, ReadState, SessionPhase};

#[cfg(feature = "gnxconfig")]
pub use config_ext::ReaderConfigExt;

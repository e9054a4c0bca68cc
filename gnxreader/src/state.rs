//! Observable state of a read session

use serde::Serialize;

/// Where the session stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    /// Fetching comic or section metadata
    LoadingMetadata,
    /// Resolving the image and clips of the current page
    LoadingResources,
    /// Resources ready, paused
    Ready,
    Playing,
    /// The last clip of the last section has been played
    Finished,
    Error,
}

impl SessionPhase {
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionPhase::LoadingMetadata | SessionPhase::LoadingResources
        )
    }
}

/// Snapshot published to the render layer after every transition
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadState {
    pub image_url: Option<String>,
    /// Playback intent: stays true while the next page loads
    pub is_playing: bool,
    pub show_overlay: bool,
    /// Image or audio of the current page still loading
    pub is_loading: bool,
    pub comic_title: String,
    /// "第3章" for section index 3
    pub current_chapter_label: String,
    pub chapter_title: String,
    /// 1-based; 0 when the section has no pages
    pub current_page_number: usize,
    pub total_pages: usize,

    pub phase: SessionPhase,
    pub error: Option<String>,
    pub current_detail_index: usize,
    /// Narrated line of the current detail
    pub current_detail_text: Option<String>,
    pub is_loading_image: bool,
    pub is_loading_audio: bool,
}

/// Reading position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub section_id: String,
    pub page_index: usize,
    /// Equal to the detail count once the page is finished, before advancing
    pub detail_index: usize,
}

impl Cursor {
    pub fn at_section(section_id: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            page_index: 0,
            detail_index: 0,
        }
    }
}

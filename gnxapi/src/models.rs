//! Data models for GNX API responses
//!
//! The backend wraps every JSON payload in an [`ApiResponse`] envelope.
//! Identifiers are exposed as strings even though some endpoints emit them
//! as JSON numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Envelope
// ============================================================================

/// `{ code, message, data, details }` envelope returned by every JSON endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T> ApiResponse<T> {
    /// The backend mirrors the HTTP status in `code`; only 200 carries data
    pub fn is_success(&self) -> bool {
        self.code == 200
    }
}

// ============================================================================
// Identifier helpers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?
        .map(String::from)
        .filter(|s| !s.is_empty()))
}

// ============================================================================
// Comics
// ============================================================================

/// Generation status shared by comics and sections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComicStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    /// Any value this client does not know about
    Unknown,
}

impl ComicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComicStatus::Pending => "pending",
            ComicStatus::Completed => "completed",
            ComicStatus::Failed => "failed",
            ComicStatus::Unknown => "unknown",
        }
    }
}

impl From<String> for ComicStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pending" => ComicStatus::Pending,
            "completed" => ComicStatus::Completed,
            "failed" => ComicStatus::Failed,
            _ => ComicStatus::Unknown,
        }
    }
}

impl From<ComicStatus> for String {
    fn from(status: ComicStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ComicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comic as listed by `GET /comics/`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Comic {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: ComicStatus,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub icon_image_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub background_image_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A character of the comic
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Role {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brief: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub image_id: Option<String>,
}

/// Paged comic list
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ComicList {
    #[serde(default)]
    pub comics: Vec<Comic>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

/// Full comic, returned by `GET /comics/{id}/`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ComicDetail {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: ComicStatus,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub icon_image_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub background_image_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ComicDetail {
    /// Section following the one with narrative index `index`.
    ///
    /// Sections are ordered by their `index` field, not by their position in
    /// the payload; gaps in the numbering are skipped.
    pub fn section_after(&self, index: u32) -> Option<&Section> {
        self.sections
            .iter()
            .filter(|s| s.index > index)
            .min_by_key(|s| s.index)
    }
}

// ============================================================================
// Sections, pages, details
// ============================================================================

/// Section summary embedded in [`ComicDetail`]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Section {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// 1-based narrative order
    pub index: u32,
    #[serde(default)]
    pub status: ComicStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One narrated line of a page
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PageDetail {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub role_id: Option<String>,
}

/// A page (storyboard): one image and an ordered list of narrated lines
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Page {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub details: Vec<PageDetail>,
}

impl Page {
    /// Detail ids in narration order
    pub fn detail_ids(&self) -> Vec<String> {
        self.details.iter().map(|d| d.id.clone()).collect()
    }
}

/// Full section, returned by `GET /comics/{id}/sections/{section_id}/`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SectionDetail {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub index: u32,
    #[serde(default)]
    pub status: ComicStatus,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl SectionDetail {
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Chapter label as displayed by the reader ("第3章" for index 3)
    pub fn chapter_label(&self) -> String {
        format!("第{}章", self.index)
    }
}

/// Payload of `GET /images/{id}/url`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ImageUrl {
    #[serde(default)]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_ids() {
        let json = r#"{
            "id": 12, "title": "Ch. 1", "index": 1, "status": "completed",
            "pages": [
                {"id": "7", "details": [{"id": 70, "content": "Hello"}, {"id": "71"}]}
            ]
        }"#;
        let section: SectionDetail = serde_json::from_str(json).unwrap();
        assert_eq!(section.id, "12");
        assert_eq!(section.pages[0].id, "7");
        assert_eq!(section.pages[0].detail_ids(), vec!["70", "71"]);
        assert_eq!(section.pages[0].details[1].content, "");
        assert_eq!(section.chapter_label(), "第1章");
    }

    #[test]
    fn test_unknown_status_does_not_fail() {
        let section: Section =
            serde_json::from_str(r#"{"id": "1", "index": 1, "status": "generating"}"#).unwrap();
        assert_eq!(section.status, ComicStatus::Unknown);

        let section: Section =
            serde_json::from_str(r#"{"id": "1", "index": 1, "status": "FAILED"}"#).unwrap();
        assert_eq!(section.status, ComicStatus::Failed);
    }

    #[test]
    fn test_section_after_uses_index_order() {
        let json = r#"{
            "id": 1, "title": "Book",
            "sections": [
                {"id": "s3", "index": 3},
                {"id": "s1", "index": 1},
                {"id": "s5", "index": 5}
            ]
        }"#;
        let comic: ComicDetail = serde_json::from_str(json).unwrap();
        assert_eq!(comic.section_after(1).map(|s| s.id.as_str()), Some("s3"));
        assert_eq!(comic.section_after(3).map(|s| s.id.as_str()), Some("s5"));
        assert!(comic.section_after(5).is_none());
    }

    #[test]
    fn test_envelope_without_data() {
        let resp: ApiResponse<ImageUrl> =
            serde_json::from_str(r#"{"code": 404, "message": "Not Found", "details": "pending"}"#)
                .unwrap();
        assert!(!resp.is_success());
        assert!(resp.data.is_none());
        assert_eq!(resp.details.as_deref(), Some("pending"));
    }

    fn parse_envelope<T: serde::de::DeserializeOwned>(json: &str) -> ApiResponse<T> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_envelope_over_payload_without_default() {
        let missing: ApiResponse<ComicDetail> = parse_envelope(r#"{"code": 500}"#);
        assert!(missing.data.is_none());
        assert_eq!(missing.message, "");

        let present: ApiResponse<ComicDetail> =
            parse_envelope(r#"{"code": 200, "data": {"id": 9, "title": "Nine"}}"#);
        assert_eq!(present.data.map(|c| c.id), Some("9".to_string()));
    }

    #[test]
    fn test_timestamps_are_parsed() {
        let comic: Comic = serde_json::from_str(
            r#"{"id": 3, "title": "T", "created_at": "2025-10-18T09:30:00Z", "icon_image_id": ""}"#,
        )
        .unwrap();
        assert!(comic.created_at.is_some());
        assert!(comic.icon_image_id.is_none());
        assert_eq!(comic.status, ComicStatus::Pending);
    }
}

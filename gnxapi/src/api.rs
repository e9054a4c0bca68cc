//! Backend abstraction used by the reader
//!
//! [`ComicApi`] lists the calls a reading session needs. [`GnxClient`]
//! implements it over HTTP; tests plug in in-memory fakes.

use crate::client::GnxClient;
use crate::error::Result;
use crate::models::{ComicDetail, ComicList, ComicStatus, SectionDetail};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait ComicApi: Send + Sync {
    async fn list_comics(
        &self,
        page: u32,
        limit: u32,
        status: Option<ComicStatus>,
    ) -> Result<ComicList>;

    async fn get_comic(&self, comic_id: &str) -> Result<ComicDetail>;

    async fn get_section(&self, comic_id: &str, section_id: &str) -> Result<SectionDetail>;

    /// `Ok(None)` while the image is still being generated
    async fn get_image_url(&self, image_id: &str) -> Result<Option<String>>;

    async fn get_tts_audio(&self, detail_id: &str) -> Result<Bytes>;
}

#[async_trait]
impl ComicApi for GnxClient {
    async fn list_comics(
        &self,
        page: u32,
        limit: u32,
        status: Option<ComicStatus>,
    ) -> Result<ComicList> {
        GnxClient::list_comics(self, page, limit, status).await
    }

    async fn get_comic(&self, comic_id: &str) -> Result<ComicDetail> {
        GnxClient::get_comic(self, comic_id).await
    }

    async fn get_section(&self, comic_id: &str, section_id: &str) -> Result<SectionDetail> {
        GnxClient::get_section(self, comic_id, section_id).await
    }

    async fn get_image_url(&self, image_id: &str) -> Result<Option<String>> {
        GnxClient::get_image_url(self, image_id).await
    }

    async fn get_tts_audio(&self, detail_id: &str) -> Result<Bytes> {
        GnxClient::get_tts_audio(self, detail_id).await
    }
}

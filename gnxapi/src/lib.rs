//! GNX comic generation client
//!
//! This crate provides a Rust client for the GNX backend REST API. The
//! backend turns novels into comics: each comic has sections (chapters),
//! each section has pages, and each page has one generated image and an
//! ordered list of narrated lines ("details") with synthesized speech.
//!
//! # Features
//!
//! - **Comics**: paged listing with status filter, full comic metadata
//! - **Sections**: pages and narrated details of a chapter
//! - **Images**: resolution of generated image URLs (`None` while pending)
//! - **TTS**: raw audio bytes for a page detail
//! - **Configuration Extension**: base URL, timeout and User-Agent stored in
//!   gnxconfig
//!
//! # Example
//!
//! ```no_run
//! use gnxapi::GnxClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GnxClient::builder()
//!         .base_url("http://localhost:8080/api")
//!         .build()
//!         .await?;
//!
//!     let section = client.get_section("1", "10").await?;
//!     for page in &section.pages {
//!         println!("page {} has {} lines", page.id, page.details.len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Response envelope
//!
//! JSON endpoints answer `{ code, message, data, details }`. Only `code == 200`
//! carries data; other codes surface as [`Error::Api`]. The image URL
//! endpoint is the exception: any non-200 answer means "not generated yet".

pub mod api;
pub mod client;
pub mod error;
pub mod models;

#[cfg(feature = "gnxconfig")]
pub mod config_ext;

// Re-exports
pub use api::ComicApi;
pub use client::{ClientBuilder, GnxClient};
pub use error::{Error, Result};
pub use models::{
    ApiResponse, Comic, ComicDetail, ComicList, ComicStatus, ImageUrl, Page, PageDetail, Role,
    Section, SectionDetail,
};

#[cfg(feature = "gnxconfig")]
pub use config_ext::GnxApiConfigExt;

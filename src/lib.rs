#![warn(missing_docs)]
//! Gemini Studio - chat with Gemini, generate images from text and edit
//! uploaded pictures from a single web page.
//!
//! The library is usable without the web front end: the [`gemini`] module
//! talks to the API, [`service`] implements generation, editing and chat on
//! top of any [`ModelBackend`], and [`ImageStore`] manages the directory of
//! results.
//!
//! # Quick Start
//!
//! ```no_run
//! use gemini_studio::{service, GeminiClient, ImageStore};
//!
//! #[tokio::main]
//! async fn main() -> gemini_studio::Result<()> {
//!     // Reads GEMINI_API_KEY when no key is set explicitly.
//!     let client = GeminiClient::builder().build()?;
//!     let store = ImageStore::default();
//!
//!     let outcome = service::generate_image(&client, &store, "a tiger dancing").await;
//!     if let Some(path) = outcome.image {
//!         println!("saved {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `server` (default): the axum web UI and the `gemini-studio` binary

mod error;

pub mod config;
pub mod gemini;
pub mod media;
pub mod service;
pub mod session;
pub mod store;

#[cfg(feature = "server")]
pub mod web;

// Re-export error types at crate root
pub use error::{Result, StudioError};

pub use config::StudioConfig;
pub use gemini::{ClientFactory, GeminiClient, GeminiClientFactory, ModelBackend};
pub use media::ImageFormat;
pub use service::{GenerationOutcome, Notice, NoticeLevel};
pub use session::{ChatMessage, SessionState, SessionStore};
pub use store::{Gallery, GalleryEntry, ImageStore};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, StudioError};
    pub use crate::gemini::{GeminiClient, ModelBackend};
    pub use crate::service::{chat, edit_image, generate_image, GenerationOutcome};
    pub use crate::store::ImageStore;
}
